use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use membank_database::{Member, UpdateMemberRequest};

use crate::{ApiError, AppState};

pub async fn create_member(
    State(state): State<AppState>,
    payload: Result<Json<Member>, JsonRejection>,
) -> Result<(StatusCode, Json<Member>), ApiError> {
    let Json(payload) = payload?;
    let member = state.members().save(&payload).await?;
    Ok((StatusCode::CREATED, Json(member)))
}

pub async fn get_member(
    State(state): State<AppState>,
    Path(member_id): Path<String>,
) -> Result<Json<Member>, ApiError> {
    let member = state.members().find_by_id(&member_id).await?;
    Ok(Json(member))
}

pub async fn update_member(
    State(state): State<AppState>,
    Path(member_id): Path<String>,
    payload: Result<Json<UpdateMemberRequest>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(payload) = payload?;
    state.members().update(&member_id, payload.money).await?;
    Ok(StatusCode::NO_CONTENT)
}

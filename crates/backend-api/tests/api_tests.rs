use http_body_util::BodyExt;

use axum::{
    body::Body,
    http::{header::CONTENT_TYPE, Method, Request, StatusCode},
    response::Response,
    routing::get,
    Router,
};
use membank_backend_api::{build_router, handle_panic, ApiError, AppState, GENERIC_ERROR_MESSAGE};
use membank_config::{ConnectionStrategy, DatabaseConfig};
use membank_database::{initialize_database, DataSource};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;
use tower_http::catch_panic::CatchPanicLayer;

type TestResult<T = ()> = anyhow::Result<T>;

struct TestContext {
    _temp_dir: TempDir,
    source: DataSource,
}

impl TestContext {
    async fn new() -> TestResult<Self> {
        Self::with_strategy(ConnectionStrategy::Pooled).await
    }

    async fn with_strategy(strategy: ConnectionStrategy) -> TestResult<Self> {
        let temp_dir = TempDir::new()?;
        let db_path = temp_dir.path().join("backend_api.sqlite");
        let config = DatabaseConfig::new(format!("sqlite://{}", db_path.display()))
            .with_strategy(strategy)
            .with_max_connections(4);

        let source = initialize_database(&config).await?;

        Ok(Self {
            _temp_dir: temp_dir,
            source,
        })
    }

    fn router(&self) -> Router {
        build_router(AppState::from_source(self.source.clone()))
    }

    async fn send(&self, method: Method, uri: &str, body: Option<Value>) -> TestResult<Response> {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => request
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&body)?))?,
            None => request.body(Body::empty())?,
        };

        Ok(self.router().oneshot(request).await?)
    }
}

async fn body_bytes(response: Response) -> TestResult<Vec<u8>> {
    Ok(response.into_body().collect().await?.to_bytes().to_vec())
}

async fn body_json(response: Response) -> TestResult<Value> {
    Ok(serde_json::from_slice(&body_bytes(response).await?)?)
}

#[tokio::test]
async fn member_lifecycle_over_http() -> TestResult {
    let ctx = TestContext::new().await?;

    let response = ctx
        .send(
            Method::POST,
            "/api/members",
            Some(json!({ "member_id": "m1", "money": 1000 })),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(body_json(response).await?, json!({ "member_id": "m1", "money": 1000 }));

    let response = ctx.send(Method::GET, "/api/members/m1", None).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await?["money"], 1000);

    let response = ctx
        .send(Method::PUT, "/api/members/m1", Some(json!({ "money": 500 })))
        .await?;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = ctx.send(Method::GET, "/api/members/m1", None).await?;
    assert_eq!(
        body_json(response).await?,
        json!({ "member_id": "m1", "money": 500 })
    );
    Ok(())
}

#[tokio::test]
async fn direct_strategy_serves_the_same_api() -> TestResult {
    let ctx = TestContext::with_strategy(ConnectionStrategy::Direct).await?;

    let response = ctx
        .send(
            Method::POST,
            "/api/members",
            Some(json!({ "member_id": "direct", "money": 7 })),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = ctx.send(Method::GET, "/api/members/direct", None).await?;
    assert_eq!(body_json(response).await?["money"], 7);
    Ok(())
}

#[tokio::test]
async fn unknown_member_returns_not_found() -> TestResult {
    let ctx = TestContext::new().await?;

    let response = ctx.send(Method::GET, "/api/members/nonexistent", None).await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body = body_json(response).await?;
    assert!(body["error"].as_str().unwrap_or_default().contains("nonexistent"));
    Ok(())
}

#[tokio::test]
async fn updating_unknown_member_returns_not_found() -> TestResult {
    let ctx = TestContext::new().await?;

    let response = ctx
        .send(Method::PUT, "/api/members/ghost", Some(json!({ "money": 1 })))
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn duplicate_member_returns_conflict() -> TestResult {
    let ctx = TestContext::new().await?;
    let member = json!({ "member_id": "dup", "money": 1 });

    let first = ctx.send(Method::POST, "/api/members", Some(member.clone())).await?;
    assert_eq!(first.status(), StatusCode::CREATED);

    let second = ctx.send(Method::POST, "/api/members", Some(member)).await?;
    assert_eq!(second.status(), StatusCode::CONFLICT);
    Ok(())
}

#[tokio::test]
async fn empty_member_id_returns_bad_request() -> TestResult {
    let ctx = TestContext::new().await?;

    let response = ctx
        .send(
            Method::POST,
            "/api/members",
            Some(json!({ "member_id": "", "money": 1 })),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn balance_extremes_round_trip_over_http() -> TestResult {
    let ctx = TestContext::new().await?;

    for (member_id, money) in [("max", i32::MAX), ("min", i32::MIN)] {
        let response = ctx
            .send(
                Method::POST,
                "/api/members",
                Some(json!({ "member_id": member_id, "money": money })),
            )
            .await?;
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = ctx
            .send(Method::GET, &format!("/api/members/{member_id}"), None)
            .await?;
        assert_eq!(
            body_json(response).await?,
            json!({ "member_id": member_id, "money": money })
        );
    }

    let response = ctx
        .send(Method::PUT, "/api/members/max", Some(json!({ "money": i32::MIN })))
        .await?;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = ctx.send(Method::GET, "/api/members/max", None).await?;
    assert_eq!(body_json(response).await?["money"], i32::MIN);
    Ok(())
}

#[tokio::test]
async fn out_of_range_balances_are_rejected() -> TestResult {
    let ctx = TestContext::new().await?;
    let too_large = i64::from(i32::MAX) + 1;
    let too_small = i64::from(i32::MIN) - 1;

    let response = ctx
        .send(
            Method::POST,
            "/api/members",
            Some(json!({ "member_id": "big", "money": too_large })),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = ctx.send(Method::GET, "/api/members/big", None).await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = ctx
        .send(
            Method::POST,
            "/api/members",
            Some(json!({ "member_id": "small", "money": 0 })),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = ctx
        .send(Method::PUT, "/api/members/small", Some(json!({ "money": too_small })))
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = ctx.send(Method::GET, "/api/members/small", None).await?;
    assert_eq!(body_json(response).await?["money"], 0);
    Ok(())
}

#[tokio::test]
async fn malformed_body_returns_bad_request() -> TestResult {
    let ctx = TestContext::new().await?;

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/members")
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from("{\"member_id\": "))?;
    let response = ctx.router().oneshot(request).await?;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_json(response).await?["error"].is_string());
    Ok(())
}

#[tokio::test]
async fn health_reports_strategy_and_pool() -> TestResult {
    let ctx = TestContext::new().await?;

    let response = ctx.send(Method::GET, "/health", None).await?;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await?;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["strategy"], "pooled");
    assert!(body["pool"]["total"].as_u64().unwrap_or_default() <= 4);
    Ok(())
}

#[tokio::test]
async fn closed_pool_returns_service_unavailable() -> TestResult {
    let ctx = TestContext::new().await?;
    ctx.source.close().await;

    let response = ctx.send(Method::GET, "/api/members/m1", None).await?;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    Ok(())
}

#[tokio::test]
async fn unclassified_failures_return_generic_response() -> TestResult {
    let router = Router::new().route(
        "/boom",
        get(|| async { Err::<(), ApiError>(ApiError::from(anyhow::anyhow!("unexpected"))) }),
    );

    let response = router
        .oneshot(Request::builder().uri("/boom").body(Body::empty())?)
        .await?;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_bytes(response).await?, GENERIC_ERROR_MESSAGE.as_bytes());
    Ok(())
}

#[tokio::test]
async fn panicking_handlers_return_generic_response() -> TestResult {
    async fn explode() -> &'static str {
        panic!("handler exploded")
    }

    let router = Router::new()
        .route("/panic", get(explode))
        .layer(CatchPanicLayer::custom(handle_panic));

    let response = router
        .oneshot(Request::builder().uri("/panic").body(Body::empty())?)
        .await?;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_bytes(response).await?, GENERIC_ERROR_MESSAGE.as_bytes());
    Ok(())
}

//! Repository for member data access operations.

use sqlx::{any::AnyRow, Row};
use tracing::info;

use crate::connection::DataSource;
use crate::entities::Member;
use crate::types::{DatabaseError, DatabaseResult};

/// Repository for member database operations.
///
/// Every call borrows exactly one connection from the injected source and
/// gives it back before returning, whatever the outcome.
#[derive(Clone)]
pub struct MemberRepository {
    source: DataSource,
}

impl MemberRepository {
    /// Create a new member repository
    pub fn new(source: DataSource) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &DataSource {
        &self.source
    }

    /// Insert a new member, returning it unchanged.
    pub async fn save(&self, member: &Member) -> DatabaseResult<Member> {
        if member.member_id.is_empty() {
            return Err(DatabaseError::ValidationError(
                "member_id must not be empty".to_string(),
            ));
        }

        let mut conn = self.source.acquire().await?;

        sqlx::query("INSERT INTO member (member_id, money) VALUES ($1, $2)")
            .bind(member.member_id.as_str())
            .bind(member.money)
            .execute(&mut *conn)
            .await
            .map_err(|e| match DatabaseError::from(e) {
                DatabaseError::Duplicate(_) => {
                    DatabaseError::Duplicate(format!("member {}", member.member_id))
                }
                other => other,
            })?;

        info!(
            member_id = %member.member_id,
            money = member.money,
            "saved member"
        );

        Ok(member.clone())
    }

    /// Find member by ID
    pub async fn find_by_id(&self, member_id: &str) -> DatabaseResult<Member> {
        let mut conn = self.source.acquire().await?;

        let row = sqlx::query("SELECT member_id, money FROM member WHERE member_id = $1")
            .bind(member_id)
            .fetch_optional(&mut *conn)
            .await?;

        match row {
            Some(row) => map_member(&row),
            None => Err(DatabaseError::NotFound(format!("member {member_id}"))),
        }
    }

    /// Overwrite a member's balance.
    ///
    /// Fails with [`DatabaseError::NotFound`] when no row matches. Negative
    /// balances are stored as given.
    pub async fn update(&self, member_id: &str, money: i32) -> DatabaseResult<()> {
        let mut conn = self.source.acquire().await?;

        let result = sqlx::query("UPDATE member SET money = $1 WHERE member_id = $2")
            .bind(money)
            .bind(member_id)
            .execute(&mut *conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("member {member_id}")));
        }

        info!(member_id = %member_id, money, "updated member balance");
        Ok(())
    }
}

fn map_member(row: &AnyRow) -> DatabaseResult<Member> {
    Ok(Member {
        member_id: row.try_get("member_id")?,
        money: row.try_get("money")?,
    })
}

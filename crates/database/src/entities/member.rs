//! Member entity definitions

use serde::{Deserialize, Serialize};

/// A member and its balance, stored one row per `member_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub member_id: String,
    pub money: i32,
}

impl Member {
    pub fn new(member_id: impl Into<String>, money: i32) -> Self {
        Self {
            member_id: member_id.into(),
            money,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateMemberRequest {
    pub money: i32,
}

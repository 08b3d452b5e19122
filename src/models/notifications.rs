use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const NEW_SOLUTION: &str = "new_solution";
pub const UPVOTE: &str = "upvote";
pub const BOUNTY_AWARDED: &str = "bountyAwarded";
pub const BOUNTY_RELEASED: &str = "bountyReleased";

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, sqlx::FromRow)]
pub struct Notification {
    pub id: i64,
    pub user_id: i64,
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub kind: String,
    pub message: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// Frame pushed to a live connection.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Event {
    pub event: String,
    pub payload: serde_json::Value,
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, sqlx::FromRow)]
pub struct Problem {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub description: String,
    pub location: Option<String>,
    pub bounty: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct NewProblem {
    pub title: String,
    pub description: String,
    pub location: Option<String>,
    pub bounty: Option<i64>,
}

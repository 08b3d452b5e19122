use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, sqlx::FromRow)]
pub struct Solution {
    pub id: i64,
    pub problem_id: i64,
    pub user_id: i64,
    pub description: String,
    pub votes: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct NewSolution {
    pub problem_id: i64,
    pub description: String,
}

/// Outcome of accepting a solution: who was paid and how much moved.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Award {
    pub solution_id: i64,
    pub problem_id: i64,
    pub solver_id: i64,
    pub amount: i64,
}

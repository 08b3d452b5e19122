use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub balance: i64,
    pub stripe_account_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Client-facing view of a [`User`]; never carries the password hash.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Profile {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub balance: i64,
    pub payout_account_linked: bool,
    pub created_at: DateTime<Utc>,
}

impl From<User> for Profile {
    fn from(user: User) -> Self {
        Profile {
            id: user.id,
            email: user.email,
            name: user.name,
            balance: user.balance,
            payout_account_linked: user.stripe_account_id.is_some(),
            created_at: user.created_at,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct NewUser {
    pub email: String,
    pub password: String,
    pub name: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ProfileUpdate {
    pub name: String,
}

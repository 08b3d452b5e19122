use async_trait::async_trait;
use sqlx::PgPool;

use super::{is_unique_violation, RepositoryError, UserRepository};
use crate::models::users::User;

const USER_COLUMNS: &str =
    "id, email, password_hash, name, balance, stripe_account_id, created_at";

#[derive(Clone)]
pub struct PgUserRepository {
    conn: PgPool,
}

impl PgUserRepository {
    pub fn new(conn: PgPool) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn insert_user(
        &self,
        email: &str,
        password_hash: &str,
        name: &str,
    ) -> Result<User, RepositoryError> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
                INSERT INTO users (email, password_hash, name)
                VALUES ($1, $2, $3)
                RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(email)
        .bind(password_hash)
        .bind(name)
        .fetch_one(&self.conn)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                RepositoryError::Conflict("User already exists".to_string())
            } else {
                RepositoryError::Database(e)
            }
        })?;

        Ok(user)
    }

    async fn get_user_by_id(&self, id: i64) -> Result<Option<User>, RepositoryError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE id = $1",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.conn)
        .await?;

        Ok(user)
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE email = $1",
            USER_COLUMNS
        ))
        .bind(email)
        .fetch_optional(&self.conn)
        .await?;

        Ok(user)
    }

    async fn update_name(&self, id: i64, name: &str) -> Result<Option<User>, RepositoryError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET name = $1 WHERE id = $2 RETURNING {}",
            USER_COLUMNS
        ))
        .bind(name)
        .bind(id)
        .fetch_optional(&self.conn)
        .await?;

        Ok(user)
    }

    async fn set_payout_account(
        &self,
        id: i64,
        account_id: &str,
    ) -> Result<Option<User>, RepositoryError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET stripe_account_id = $1 WHERE id = $2 RETURNING {}",
            USER_COLUMNS
        ))
        .bind(account_id)
        .bind(id)
        .fetch_optional(&self.conn)
        .await?;

        Ok(user)
    }
}

use async_trait::async_trait;
use sqlx::PgPool;

use super::{ProblemRepository, RepositoryError};
use crate::models::problems::Problem;

#[derive(Clone)]
pub struct PgProblemRepository {
    conn: PgPool,
}

impl PgProblemRepository {
    pub fn new(conn: PgPool) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl ProblemRepository for PgProblemRepository {
    async fn insert_problem(
        &self,
        owner_id: i64,
        title: &str,
        description: &str,
        location: Option<&str>,
        bounty: i64,
    ) -> Result<Problem, RepositoryError> {
        let mut tx = self.conn.begin().await?;

        if bounty > 0 {
            let balance: Option<i64> =
                sqlx::query_scalar("SELECT balance FROM users WHERE id = $1 FOR UPDATE")
                    .bind(owner_id)
                    .fetch_optional(&mut *tx)
                    .await?;

            match balance {
                None => return Err(RepositoryError::NotFound("User")),
                Some(balance) if balance < bounty => {
                    return Err(RepositoryError::InsufficientFunds)
                }
                Some(_) => (),
            }

            sqlx::query("UPDATE users SET balance = balance - $1 WHERE id = $2")
                .bind(bounty)
                .bind(owner_id)
                .execute(&mut *tx)
                .await?;
        }

        let problem = sqlx::query_as::<_, Problem>(
            r#"
            INSERT INTO problems (user_id, title, description, location, bounty)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, user_id, title, description, location, bounty, created_at
            "#,
        )
        .bind(owner_id)
        .bind(title)
        .bind(description)
        .bind(location)
        .bind(bounty)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(problem)
    }

    async fn list_problems(&self) -> Result<Vec<Problem>, RepositoryError> {
        let problems = sqlx::query_as::<_, Problem>(
            r#"SELECT id, user_id, title, description, location, bounty, created_at
            FROM problems ORDER BY created_at DESC, id DESC"#,
        )
        .fetch_all(&self.conn)
        .await?;

        Ok(problems)
    }

    async fn get_problem(&self, id: i64) -> Result<Option<Problem>, RepositoryError> {
        let problem = sqlx::query_as::<_, Problem>(
            r#"SELECT id, user_id, title, description, location, bounty, created_at
            FROM problems WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.conn)
        .await?;

        Ok(problem)
    }
}

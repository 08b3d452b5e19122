use async_trait::async_trait;
use sqlx::PgPool;

use super::{violated_foreign_key, RepositoryError, SolutionRepository};
use crate::models::solutions::{Award, Solution};

const SOLUTION_COLUMNS: &str = "id, problem_id, user_id, description, votes, created_at";

const PROBLEM_FOREIGN_KEY: &str = "solutions_problem_id_fkey";
const USER_FOREIGN_KEY: &str = "solutions_user_id_fkey";

#[derive(Clone)]
pub struct PgSolutionRepository {
    conn: PgPool,
}

impl PgSolutionRepository {
    pub fn new(conn: PgPool) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl SolutionRepository for PgSolutionRepository {
    async fn insert_solution(
        &self,
        problem_id: i64,
        user_id: i64,
        description: &str,
    ) -> Result<Solution, RepositoryError> {
        let solution = sqlx::query_as::<_, Solution>(&format!(
            r#"INSERT INTO solutions (problem_id, user_id, description)
            VALUES ($1, $2, $3)
            RETURNING {}"#,
            SOLUTION_COLUMNS
        ))
        .bind(problem_id)
        .bind(user_id)
        .bind(description)
        .fetch_one(&self.conn)
        .await
        .map_err(|e| {
            let missing = match violated_foreign_key(&e) {
                Some(PROBLEM_FOREIGN_KEY) => Some("Problem"),
                Some(USER_FOREIGN_KEY) => Some("User"),
                _ => None,
            };
            match missing {
                Some(entity) => RepositoryError::NotFound(entity),
                None => RepositoryError::Database(e),
            }
        })?;

        Ok(solution)
    }

    async fn list_solutions(&self, problem_id: i64) -> Result<Vec<Solution>, RepositoryError> {
        let solutions = sqlx::query_as::<_, Solution>(&format!(
            r#"SELECT {} FROM solutions WHERE problem_id = $1
            ORDER BY votes DESC, created_at ASC, id ASC"#,
            SOLUTION_COLUMNS
        ))
        .bind(problem_id)
        .fetch_all(&self.conn)
        .await?;

        Ok(solutions)
    }

    async fn get_solution(&self, id: i64) -> Result<Option<Solution>, RepositoryError> {
        let solution = sqlx::query_as::<_, Solution>(&format!(
            "SELECT {} FROM solutions WHERE id = $1",
            SOLUTION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.conn)
        .await?;

        Ok(solution)
    }

    async fn upvote(&self, id: i64) -> Result<Option<Solution>, RepositoryError> {
        let solution = sqlx::query_as::<_, Solution>(&format!(
            "UPDATE solutions SET votes = votes + 1 WHERE id = $1 RETURNING {}",
            SOLUTION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.conn)
        .await?;

        Ok(solution)
    }

    async fn award_bounty(
        &self,
        solution_id: i64,
        problem_id: i64,
        solver_id: i64,
    ) -> Result<Award, RepositoryError> {
        let mut tx = self.conn.begin().await?;

        let amount: i64 =
            sqlx::query_scalar("SELECT bounty FROM problems WHERE id = $1 FOR UPDATE")
                .bind(problem_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or(RepositoryError::NotFound("Problem"))?;

        if amount > 0 {
            let credited = sqlx::query("UPDATE users SET balance = balance + $1 WHERE id = $2")
                .bind(amount)
                .bind(solver_id)
                .execute(&mut *tx)
                .await?;
            if credited.rows_affected() == 0 {
                return Err(RepositoryError::NotFound("User"));
            }

            sqlx::query("UPDATE problems SET bounty = 0 WHERE id = $1")
                .bind(problem_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        Ok(Award {
            solution_id,
            problem_id,
            solver_id,
            amount,
        })
    }
}

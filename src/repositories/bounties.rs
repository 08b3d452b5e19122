use async_trait::async_trait;
use sqlx::PgPool;

use super::{BountyRepository, RepositoryError};
use crate::models::bounties::{Bounty, BountyStatus};

const BOUNTY_COLUMNS: &str = "id, problem_id, user_id, amount, status, payment_intent_id, solver_id, settlement_id, created_at";

#[derive(Clone)]
pub struct PgBountyRepository {
    conn: PgPool,
}

impl PgBountyRepository {
    pub fn new(conn: PgPool) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl BountyRepository for PgBountyRepository {
    async fn insert_bounty(
        &self,
        problem_id: i64,
        funder_id: i64,
        amount: i64,
        payment_intent_id: &str,
    ) -> Result<Bounty, RepositoryError> {
        let bounty = sqlx::query_as::<_, Bounty>(&format!(
            r#"INSERT INTO bounties (problem_id, user_id, amount, status, payment_intent_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {}"#,
            BOUNTY_COLUMNS
        ))
        .bind(problem_id)
        .bind(funder_id)
        .bind(amount)
        .bind(BountyStatus::Pending.as_str())
        .bind(payment_intent_id)
        .fetch_one(&self.conn)
        .await?;

        Ok(bounty)
    }

    async fn get_bounty(&self, id: i64) -> Result<Option<Bounty>, RepositoryError> {
        let bounty = sqlx::query_as::<_, Bounty>(&format!(
            "SELECT {} FROM bounties WHERE id = $1",
            BOUNTY_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.conn)
        .await?;

        Ok(bounty)
    }

    async fn claim_bounty(
        &self,
        id: i64,
        funder_id: i64,
        claim: BountyStatus,
        solver_id: Option<i64>,
    ) -> Result<Option<Bounty>, RepositoryError> {
        if claim.settles_as().is_none() {
            return Ok(None);
        }

        let bounty = sqlx::query_as::<_, Bounty>(&format!(
            r#"UPDATE bounties SET status = $3, solver_id = $4
            WHERE id = $1 AND user_id = $2
              AND (status = $5 OR (status = $3 AND solver_id IS NOT DISTINCT FROM $4))
            RETURNING {}"#,
            BOUNTY_COLUMNS
        ))
        .bind(id)
        .bind(funder_id)
        .bind(claim.as_str())
        .bind(solver_id)
        .bind(BountyStatus::Pending.as_str())
        .fetch_optional(&self.conn)
        .await?;

        Ok(bounty)
    }

    async fn settle_bounty(
        &self,
        id: i64,
        claim: BountyStatus,
        settlement_id: &str,
    ) -> Result<Option<Bounty>, RepositoryError> {
        let Some(settled) = claim.settles_as() else {
            return Ok(None);
        };

        let bounty = sqlx::query_as::<_, Bounty>(&format!(
            r#"UPDATE bounties SET status = $1, settlement_id = $2
            WHERE id = $3 AND status = $4
            RETURNING {}"#,
            BOUNTY_COLUMNS
        ))
        .bind(settled.as_str())
        .bind(settlement_id)
        .bind(id)
        .bind(claim.as_str())
        .fetch_optional(&self.conn)
        .await?;

        Ok(bounty)
    }

    async fn abandon_claim(
        &self,
        id: i64,
        claim: BountyStatus,
    ) -> Result<Option<Bounty>, RepositoryError> {
        let bounty = sqlx::query_as::<_, Bounty>(&format!(
            r#"UPDATE bounties SET status = $1, solver_id = NULL
            WHERE id = $2 AND status = $3
            RETURNING {}"#,
            BOUNTY_COLUMNS
        ))
        .bind(BountyStatus::Pending.as_str())
        .bind(id)
        .bind(claim.as_str())
        .fetch_optional(&self.conn)
        .await?;

        Ok(bounty)
    }
}

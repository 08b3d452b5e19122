use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;

use crate::models::{
    bounties::{Bounty, BountyStatus},
    notifications::Notification,
    problems::Problem,
    solutions::{Award, Solution},
    users::User,
};

pub mod bounties;
#[cfg(any(test, feature = "test-support"))]
pub mod memory;
pub mod notifications;
pub mod payments;
pub mod problems;
pub mod solutions;
pub mod users;

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Conflict(String),
    #[error("Insufficient funds")]
    InsufficientFunds,
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Postgres reports unique violations with SQLSTATE 23505.
pub(crate) fn is_unique_violation(error: &sqlx::Error) -> bool {
    match error {
        sqlx::Error::Database(e) => e.code().as_deref() == Some("23505"),
        _ => false,
    }
}

/// Name of the foreign key constraint behind a SQLSTATE 23503 error.
pub(crate) fn violated_foreign_key(error: &sqlx::Error) -> Option<&str> {
    match error {
        sqlx::Error::Database(e) if e.code().as_deref() == Some("23503") => e.constraint(),
        _ => None,
    }
}

#[async_trait]
pub trait UserRepository: Send + Sync + 'static {
    async fn insert_user(
        &self,
        email: &str,
        password_hash: &str,
        name: &str,
    ) -> Result<User, RepositoryError>;

    async fn get_user_by_id(&self, id: i64) -> Result<Option<User>, RepositoryError>;

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError>;

    async fn update_name(&self, id: i64, name: &str) -> Result<Option<User>, RepositoryError>;

    async fn set_payout_account(
        &self,
        id: i64,
        account_id: &str,
    ) -> Result<Option<User>, RepositoryError>;
}

#[async_trait]
pub trait ProblemRepository: Send + Sync + 'static {
    /// Inserts the problem and, when `bounty > 0`, debits it from the owner's
    /// balance as one unit of work.
    async fn insert_problem(
        &self,
        owner_id: i64,
        title: &str,
        description: &str,
        location: Option<&str>,
        bounty: i64,
    ) -> Result<Problem, RepositoryError>;

    async fn list_problems(&self) -> Result<Vec<Problem>, RepositoryError>;

    async fn get_problem(&self, id: i64) -> Result<Option<Problem>, RepositoryError>;
}

#[async_trait]
pub trait SolutionRepository: Send + Sync + 'static {
    async fn insert_solution(
        &self,
        problem_id: i64,
        user_id: i64,
        description: &str,
    ) -> Result<Solution, RepositoryError>;

    /// Ordered by votes descending, then submission time ascending.
    async fn list_solutions(&self, problem_id: i64) -> Result<Vec<Solution>, RepositoryError>;

    async fn get_solution(&self, id: i64) -> Result<Option<Solution>, RepositoryError>;

    async fn upvote(&self, id: i64) -> Result<Option<Solution>, RepositoryError>;

    /// Moves the problem's current bounty onto the solver's balance and zeroes
    /// it. The problem row is locked for the duration, so a concurrent award
    /// observes zero.
    async fn award_bounty(
        &self,
        solution_id: i64,
        problem_id: i64,
        solver_id: i64,
    ) -> Result<Award, RepositoryError>;
}

#[async_trait]
pub trait BountyRepository: Send + Sync + 'static {
    async fn insert_bounty(
        &self,
        problem_id: i64,
        funder_id: i64,
        amount: i64,
        payment_intent_id: &str,
    ) -> Result<Bounty, RepositoryError>;

    async fn get_bounty(&self, id: i64) -> Result<Option<Bounty>, RepositoryError>;

    /// Marks a bounty as in flight (`Releasing` or `Refunding`) before any
    /// money moves. Only the funder can claim. A pending row is claimed; a row
    /// already carrying the same claim (and, for releases, the same solver) is
    /// returned again so a retried request can complete it. `None` otherwise.
    async fn claim_bounty(
        &self,
        id: i64,
        funder_id: i64,
        claim: BountyStatus,
        solver_id: Option<i64>,
    ) -> Result<Option<Bounty>, RepositoryError>;

    /// Completes a claim, moving the row to the claim's terminal state.
    /// Returns `None` when the row no longer carries `claim`.
    async fn settle_bounty(
        &self,
        id: i64,
        claim: BountyStatus,
        settlement_id: &str,
    ) -> Result<Option<Bounty>, RepositoryError>;

    /// Puts a claimed bounty back to pending after the processor refused the
    /// movement.
    async fn abandon_claim(
        &self,
        id: i64,
        claim: BountyStatus,
    ) -> Result<Option<Bounty>, RepositoryError>;
}

#[async_trait]
pub trait NotificationRepository: Send + Sync + 'static {
    async fn insert_notification(
        &self,
        user_id: i64,
        kind: &str,
        message: &str,
    ) -> Result<Notification, RepositoryError>;

    /// Newest first.
    async fn list_notifications(
        &self,
        user_id: i64,
        unread_only: bool,
    ) -> Result<Vec<Notification>, RepositoryError>;

    async fn mark_all_read(&self, user_id: i64) -> Result<u64, RepositoryError>;
}

#[derive(Clone)]
pub struct Repositories {
    pub users: Arc<dyn UserRepository>,
    pub problems: Arc<dyn ProblemRepository>,
    pub solutions: Arc<dyn SolutionRepository>,
    pub bounties: Arc<dyn BountyRepository>,
    pub notifications: Arc<dyn NotificationRepository>,
}

impl Repositories {
    pub fn postgres(conn: PgPool) -> Self {
        Self {
            users: Arc::new(users::PgUserRepository::new(conn.clone())),
            problems: Arc::new(problems::PgProblemRepository::new(conn.clone())),
            solutions: Arc::new(solutions::PgSolutionRepository::new(conn.clone())),
            bounties: Arc::new(bounties::PgBountyRepository::new(conn.clone())),
            notifications: Arc::new(notifications::PgNotificationRepository::new(conn)),
        }
    }
}

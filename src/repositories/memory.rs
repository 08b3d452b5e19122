//! In-memory stand-ins for the Postgres repositories.
//!
//! All five repositories share one [`MemoryStore`], so cross-table operations
//! such as awarding a bounty see a consistent view, the way they would inside
//! a database transaction.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;

use super::{
    BountyRepository, NotificationRepository, ProblemRepository, Repositories, RepositoryError,
    SolutionRepository, UserRepository,
};
use crate::models::{
    bounties::{Bounty, BountyStatus},
    notifications::Notification,
    problems::Problem,
    solutions::{Award, Solution},
    users::User,
};

#[derive(Default)]
struct MemoryState {
    next_id: i64,
    last_timestamp: Option<DateTime<Utc>>,
    users: Vec<User>,
    problems: Vec<Problem>,
    solutions: Vec<Solution>,
    bounties: Vec<Bounty>,
    notifications: Vec<Notification>,
}

impl MemoryState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    /// Strictly increasing, so insertion order is always recoverable from
    /// `created_at`.
    fn now(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let timestamp = match self.last_timestamp {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_timestamp = Some(timestamp);
        timestamp
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn repositories(&self) -> Repositories {
        Repositories {
            users: Arc::new(self.clone()),
            problems: Arc::new(self.clone()),
            solutions: Arc::new(self.clone()),
            bounties: Arc::new(self.clone()),
            notifications: Arc::new(self.clone()),
        }
    }

    /// Adds `amount` to a user's balance, standing in for a top-up.
    pub async fn credit(&self, user_id: i64, amount: i64) -> Result<i64, RepositoryError> {
        let mut state = self.state.lock().await;
        let user = state
            .users
            .iter_mut()
            .find(|u| u.id == user_id)
            .ok_or(RepositoryError::NotFound("User"))?;
        user.balance += amount;

        Ok(user.balance)
    }

    pub async fn balance(&self, user_id: i64) -> Option<i64> {
        let state = self.state.lock().await;
        state.users.iter().find(|u| u.id == user_id).map(|u| u.balance)
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn insert_user(
        &self,
        email: &str,
        password_hash: &str,
        name: &str,
    ) -> Result<User, RepositoryError> {
        let mut state = self.state.lock().await;
        if state.users.iter().any(|u| u.email == email) {
            return Err(RepositoryError::Conflict("User already exists".to_string()));
        }

        let user = User {
            id: state.next_id(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            name: name.to_string(),
            balance: 0,
            stripe_account_id: None,
            created_at: state.now(),
        };
        state.users.push(user.clone());

        Ok(user)
    }

    async fn get_user_by_id(&self, id: i64) -> Result<Option<User>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state.users.iter().find(|u| u.id == id).cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state.users.iter().find(|u| u.email == email).cloned())
    }

    async fn update_name(&self, id: i64, name: &str) -> Result<Option<User>, RepositoryError> {
        let mut state = self.state.lock().await;
        Ok(state.users.iter_mut().find(|u| u.id == id).map(|u| {
            u.name = name.to_string();
            u.clone()
        }))
    }

    async fn set_payout_account(
        &self,
        id: i64,
        account_id: &str,
    ) -> Result<Option<User>, RepositoryError> {
        let mut state = self.state.lock().await;
        Ok(state.users.iter_mut().find(|u| u.id == id).map(|u| {
            u.stripe_account_id = Some(account_id.to_string());
            u.clone()
        }))
    }
}

#[async_trait]
impl ProblemRepository for MemoryStore {
    async fn insert_problem(
        &self,
        owner_id: i64,
        title: &str,
        description: &str,
        location: Option<&str>,
        bounty: i64,
    ) -> Result<Problem, RepositoryError> {
        let mut state = self.state.lock().await;

        if bounty > 0 {
            let owner = state
                .users
                .iter_mut()
                .find(|u| u.id == owner_id)
                .ok_or(RepositoryError::NotFound("User"))?;
            if owner.balance < bounty {
                return Err(RepositoryError::InsufficientFunds);
            }
            owner.balance -= bounty;
        }

        let problem = Problem {
            id: state.next_id(),
            user_id: owner_id,
            title: title.to_string(),
            description: description.to_string(),
            location: location.map(str::to_string),
            bounty,
            created_at: state.now(),
        };
        state.problems.push(problem.clone());

        Ok(problem)
    }

    async fn list_problems(&self) -> Result<Vec<Problem>, RepositoryError> {
        let state = self.state.lock().await;
        let mut problems = state.problems.clone();
        problems.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        Ok(problems)
    }

    async fn get_problem(&self, id: i64) -> Result<Option<Problem>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state.problems.iter().find(|p| p.id == id).cloned())
    }
}

#[async_trait]
impl SolutionRepository for MemoryStore {
    async fn insert_solution(
        &self,
        problem_id: i64,
        user_id: i64,
        description: &str,
    ) -> Result<Solution, RepositoryError> {
        let mut state = self.state.lock().await;
        if !state.problems.iter().any(|p| p.id == problem_id) {
            return Err(RepositoryError::NotFound("Problem"));
        }
        if !state.users.iter().any(|u| u.id == user_id) {
            return Err(RepositoryError::NotFound("User"));
        }

        let solution = Solution {
            id: state.next_id(),
            problem_id,
            user_id,
            description: description.to_string(),
            votes: 0,
            created_at: state.now(),
        };
        state.solutions.push(solution.clone());

        Ok(solution)
    }

    async fn list_solutions(&self, problem_id: i64) -> Result<Vec<Solution>, RepositoryError> {
        let state = self.state.lock().await;
        let mut solutions: Vec<Solution> = state
            .solutions
            .iter()
            .filter(|s| s.problem_id == problem_id)
            .cloned()
            .collect();
        solutions.sort_by(|a, b| {
            b.votes
                .cmp(&a.votes)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });

        Ok(solutions)
    }

    async fn get_solution(&self, id: i64) -> Result<Option<Solution>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state.solutions.iter().find(|s| s.id == id).cloned())
    }

    async fn upvote(&self, id: i64) -> Result<Option<Solution>, RepositoryError> {
        let mut state = self.state.lock().await;
        Ok(state.solutions.iter_mut().find(|s| s.id == id).map(|s| {
            s.votes += 1;
            s.clone()
        }))
    }

    async fn award_bounty(
        &self,
        solution_id: i64,
        problem_id: i64,
        solver_id: i64,
    ) -> Result<Award, RepositoryError> {
        let mut state = self.state.lock().await;

        let amount = state
            .problems
            .iter()
            .find(|p| p.id == problem_id)
            .map(|p| p.bounty)
            .ok_or(RepositoryError::NotFound("Problem"))?;

        if amount > 0 {
            let solver = state
                .users
                .iter_mut()
                .find(|u| u.id == solver_id)
                .ok_or(RepositoryError::NotFound("User"))?;
            solver.balance += amount;

            if let Some(problem) = state.problems.iter_mut().find(|p| p.id == problem_id) {
                problem.bounty = 0;
            }
        }

        Ok(Award {
            solution_id,
            problem_id,
            solver_id,
            amount,
        })
    }
}

#[async_trait]
impl BountyRepository for MemoryStore {
    async fn insert_bounty(
        &self,
        problem_id: i64,
        funder_id: i64,
        amount: i64,
        payment_intent_id: &str,
    ) -> Result<Bounty, RepositoryError> {
        let mut state = self.state.lock().await;
        let bounty = Bounty {
            id: state.next_id(),
            problem_id,
            user_id: funder_id,
            amount,
            status: BountyStatus::Pending,
            payment_intent_id: Some(payment_intent_id.to_string()),
            solver_id: None,
            settlement_id: None,
            created_at: state.now(),
        };
        state.bounties.push(bounty.clone());

        Ok(bounty)
    }

    async fn get_bounty(&self, id: i64) -> Result<Option<Bounty>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state.bounties.iter().find(|b| b.id == id).cloned())
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

        let mut state = self.state.lock().await;
        Ok(state
            .bounties
            .iter_mut()
            .find(|b| {
                b.id == id
                    && b.user_id == funder_id
                    && (b.status == BountyStatus::Pending
                        || (b.status == claim && b.solver_id == solver_id))
            })
            .map(|b| {
                b.status = claim;
                b.solver_id = solver_id;
                b.clone()
            }))
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

        let mut state = self.state.lock().await;
        Ok(state
            .bounties
            .iter_mut()
            .find(|b| b.id == id && b.status == claim)
            .map(|b| {
                b.status = settled;
                b.settlement_id = Some(settlement_id.to_string());
                b.clone()
            }))
    }

    async fn abandon_claim(
        &self,
        id: i64,
        claim: BountyStatus,
    ) -> Result<Option<Bounty>, RepositoryError> {
        let mut state = self.state.lock().await;
        Ok(state
            .bounties
            .iter_mut()
            .find(|b| b.id == id && b.status == claim)
            .map(|b| {
                b.status = BountyStatus::Pending;
                b.solver_id = None;
                b.clone()
            }))
    }
}

#[async_trait]
impl NotificationRepository for MemoryStore {
    async fn insert_notification(
        &self,
        user_id: i64,
        kind: &str,
        message: &str,
    ) -> Result<Notification, RepositoryError> {
        let mut state = self.state.lock().await;
        let notification = Notification {
            id: state.next_id(),
            user_id,
            kind: kind.to_string(),
            message: message.to_string(),
            is_read: false,
            created_at: state.now(),
        };
        state.notifications.push(notification.clone());

        Ok(notification)
    }

    async fn list_notifications(
        &self,
        user_id: i64,
        unread_only: bool,
    ) -> Result<Vec<Notification>, RepositoryError> {
        let state = self.state.lock().await;
        let mut notifications: Vec<Notification> = state
            .notifications
            .iter()
            .filter(|n| n.user_id == user_id && (!unread_only || !n.is_read))
            .cloned()
            .collect();
        notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        Ok(notifications)
    }

    async fn mark_all_read(&self, user_id: i64) -> Result<u64, RepositoryError> {
        let mut state = self.state.lock().await;
        let mut updated = 0;
        for notification in state
            .notifications
            .iter_mut()
            .filter(|n| n.user_id == user_id && !n.is_read)
        {
            notification.is_read = true;
            updated += 1;
        }

        Ok(updated)
    }
}

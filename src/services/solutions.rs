use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};

use super::{
    notifications::NotificationRequest, validation, RequestHandler, Service, ServiceError,
};
use crate::models::{
    notifications::{BOUNTY_AWARDED, NEW_SOLUTION, UPVOTE},
    solutions::{Award, NewSolution, Solution},
};
use crate::repositories::{ProblemRepository, SolutionRepository};

pub enum SolutionRequest {
    SubmitSolution {
        submitter_id: i64,
        solution: NewSolution,
        response: oneshot::Sender<Result<Solution, ServiceError>>,
    },
    ListSolutions {
        problem_id: i64,
        response: oneshot::Sender<Result<Vec<Solution>, ServiceError>>,
    },
    Upvote {
        solution_id: i64,
        response: oneshot::Sender<Result<Solution, ServiceError>>,
    },
    AcceptSolution {
        solution_id: i64,
        requester_id: i64,
        response: oneshot::Sender<Result<Award, ServiceError>>,
    },
}

#[derive(Clone)]
pub struct SolutionRequestHandler {
    repository: Arc<dyn SolutionRepository>,
    problems: Arc<dyn ProblemRepository>,
    notification_channel: mpsc::Sender<NotificationRequest>,
}

impl SolutionRequestHandler {
    pub fn new(
        repository: Arc<dyn SolutionRepository>,
        problems: Arc<dyn ProblemRepository>,
        notification_channel: mpsc::Sender<NotificationRequest>,
    ) -> Self {
        SolutionRequestHandler {
            repository,
            problems,
            notification_channel,
        }
    }

    /// Queues a notification without waiting for it to be stored or pushed.
    fn notify(&self, user_id: i64, kind: &str, message: String, context: Value) {
        let notification_channel = self.notification_channel.clone();
        let kind = kind.to_string();

        tokio::spawn(async move {
            let _ = notification_channel
                .send(NotificationRequest::Notify {
                    user_id,
                    kind,
                    message,
                    context,
                })
                .await;
        });
    }

    pub async fn submit_solution(
        &self,
        submitter_id: i64,
        solution: NewSolution,
    ) -> Result<Solution, ServiceError> {
        let problem = self
            .problems
            .get_problem(solution.problem_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Problem not found".to_string()))?;

        let mut errors = Vec::new();
        validation::check_required("Description", &solution.description, &mut errors);
        if !errors.is_empty() {
            return Err(ServiceError::InvalidInput(errors));
        }

        let created = self
            .repository
            .insert_solution(problem.id, submitter_id, solution.description.trim())
            .await?;

        log::info!(
            "User {} submitted solution {} to problem {}",
            submitter_id,
            created.id,
            problem.id
        );
        self.notify(
            problem.user_id,
            NEW_SOLUTION,
            format!("A new solution was submitted to \"{}\"", problem.title),
            json!({"problem_id": problem.id, "solution_id": created.id}),
        );

        Ok(created)
    }

    pub async fn list_solutions(&self, problem_id: i64) -> Result<Vec<Solution>, ServiceError> {
        Ok(self.repository.list_solutions(problem_id).await?)
    }

    pub async fn upvote(&self, solution_id: i64) -> Result<Solution, ServiceError> {
        let solution = self
            .repository
            .upvote(solution_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Solution not found".to_string()))?;

        self.notify(
            solution.user_id,
            UPVOTE,
            "Your solution received an upvote".to_string(),
            json!({"solution_id": solution.id, "votes": solution.votes}),
        );

        Ok(solution)
    }

    /// Pays the problem's current bounty to the solution's author. Once the
    /// bounty is zero, later accepts succeed but move nothing.
    pub async fn accept_solution(
        &self,
        solution_id: i64,
        requester_id: i64,
    ) -> Result<Award, ServiceError> {
        let solution = self
            .repository
            .get_solution(solution_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Solution not found".to_string()))?;
        let problem = self
            .problems
            .get_problem(solution.problem_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Solution not found".to_string()))?;

        if problem.user_id != requester_id {
            log::warn!(
                "User {} tried to accept solution {} on problem {} they do not own",
                requester_id,
                solution_id,
                problem.id
            );
            return Err(ServiceError::Forbidden(
                "Only the problem owner can accept a solution".to_string(),
            ));
        }

        let award = self
            .repository
            .award_bounty(solution.id, problem.id, solution.user_id)
            .await?;

        log::info!(
            "Solution {} accepted, {} awarded to user {}",
            solution.id,
            award.amount,
            award.solver_id
        );
        self.notify(
            solution.user_id,
            BOUNTY_AWARDED,
            format!(
                "Your solution to \"{}\" was accepted and earned {}",
                problem.title, award.amount
            ),
            json!({"problem_id": problem.id, "solution_id": solution.id, "amount": award.amount}),
        );

        Ok(award)
    }
}

#[async_trait]
impl RequestHandler<SolutionRequest> for SolutionRequestHandler {
    async fn handle_request(&self, request: SolutionRequest) {
        match request {
            SolutionRequest::SubmitSolution {
                submitter_id,
                solution,
                response,
            } => {
                let result = self.submit_solution(submitter_id, solution).await;
                let _ = response.send(result);
            }
            SolutionRequest::ListSolutions {
                problem_id,
                response,
            } => {
                let result = self.list_solutions(problem_id).await;
                let _ = response.send(result);
            }
            SolutionRequest::Upvote {
                solution_id,
                response,
            } => {
                let result = self.upvote(solution_id).await;
                let _ = response.send(result);
            }
            SolutionRequest::AcceptSolution {
                solution_id,
                requester_id,
                response,
            } => {
                let result = self.accept_solution(solution_id, requester_id).await;
                let _ = response.send(result);
            }
        }
    }
}

pub struct SolutionService;

impl SolutionService {
    pub fn new() -> Self {
        SolutionService {}
    }
}

#[async_trait]
impl Service<SolutionRequest, SolutionRequestHandler> for SolutionService {}

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::oneshot;

use super::{validation, RequestHandler, Service, ServiceError};
use crate::models::problems::{NewProblem, Problem};
use crate::repositories::ProblemRepository;

pub enum ProblemRequest {
    CreateProblem {
        owner_id: i64,
        problem: NewProblem,
        response: oneshot::Sender<Result<Problem, ServiceError>>,
    },
    ListProblems {
        response: oneshot::Sender<Result<Vec<Problem>, ServiceError>>,
    },
    GetProblem {
        id: i64,
        response: oneshot::Sender<Result<Problem, ServiceError>>,
    },
}

#[derive(Clone)]
pub struct ProblemRequestHandler {
    repository: Arc<dyn ProblemRepository>,
}

impl ProblemRequestHandler {
    pub fn new(repository: Arc<dyn ProblemRepository>) -> Self {
        ProblemRequestHandler { repository }
    }

    pub async fn create_problem(
        &self,
        owner_id: i64,
        problem: NewProblem,
    ) -> Result<Problem, ServiceError> {
        let mut errors = Vec::new();
        validation::check_required("Title", &problem.title, &mut errors);
        validation::check_required("Description", &problem.description, &mut errors);
        let bounty = problem.bounty.unwrap_or(0);
        if bounty < 0 {
            errors.push("Bounty must not be negative".to_string());
        }
        if !errors.is_empty() {
            return Err(ServiceError::InvalidInput(errors));
        }

        let location = problem
            .location
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty());

        let created = self
            .repository
            .insert_problem(
                owner_id,
                problem.title.trim(),
                problem.description.trim(),
                location,
                bounty,
            )
            .await
            .inspect_err(|e| log::warn!("User {} could not post problem: {}", owner_id, e))?;

        log::info!(
            "User {} posted problem {} with bounty {}",
            owner_id,
            created.id,
            created.bounty
        );
        Ok(created)
    }

    pub async fn list_problems(&self) -> Result<Vec<Problem>, ServiceError> {
        Ok(self.repository.list_problems().await?)
    }

    pub async fn get_problem(&self, id: i64) -> Result<Problem, ServiceError> {
        self.repository
            .get_problem(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Problem not found".to_string()))
    }
}

#[async_trait]
impl RequestHandler<ProblemRequest> for ProblemRequestHandler {
    async fn handle_request(&self, request: ProblemRequest) {
        match request {
            ProblemRequest::CreateProblem {
                owner_id,
                problem,
                response,
            } => {
                let result = self.create_problem(owner_id, problem).await;
                let _ = response.send(result);
            }
            ProblemRequest::ListProblems { response } => {
                let result = self.list_problems().await;
                let _ = response.send(result);
            }
            ProblemRequest::GetProblem { id, response } => {
                let result = self.get_problem(id).await;
                let _ = response.send(result);
            }
        }
    }
}

pub struct ProblemService;

impl ProblemService {
    pub fn new() -> Self {
        ProblemService {}
    }
}

#[async_trait]
impl Service<ProblemRequest, ProblemRequestHandler> for ProblemService {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::{memory::MemoryStore, UserRepository};

    fn new_problem(title: &str, bounty: Option<i64>) -> NewProblem {
        NewProblem {
            title: title.to_string(),
            description: "Broken street light on 5th".to_string(),
            location: Some("Lagos".to_string()),
            bounty,
        }
    }

    async fn setup(balance: i64) -> (ProblemRequestHandler, MemoryStore, i64) {
        let store = MemoryStore::new();
        let owner = store
            .insert_user("owner@nexro.app", "hash", "Owner")
            .await
            .unwrap();
        store.credit(owner.id, balance).await.unwrap();
        let handler = ProblemRequestHandler::new(store.repositories().problems);
        (handler, store, owner.id)
    }

    #[tokio::test]
    async fn empty_title_or_description_is_rejected() {
        let (handler, _, owner) = setup(0).await;
        let result = handler
            .create_problem(
                owner,
                NewProblem {
                    title: " ".to_string(),
                    description: String::new(),
                    location: None,
                    bounty: None,
                },
            )
            .await;

        match result {
            Err(ServiceError::InvalidInput(errors)) => assert_eq!(
                errors,
                vec!["Title is required", "Description is required"]
            ),
            other => panic!("expected invalid input, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn bounty_above_balance_fails_without_debit() {
        let (handler, store, owner) = setup(99).await;

        let result = handler
            .create_problem(owner, new_problem("Flooding", Some(100)))
            .await;

        assert!(matches!(result, Err(ServiceError::InsufficientFunds)));
        assert_eq!(store.balance(owner).await, Some(99));
        assert!(handler.list_problems().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn bounty_is_debited_from_owner() {
        let (handler, store, owner) = setup(250).await;

        let problem = handler
            .create_problem(owner, new_problem("Flooding", Some(100)))
            .await
            .unwrap();

        assert_eq!(problem.bounty, 100);
        assert_eq!(store.balance(owner).await, Some(150));
    }

    #[tokio::test]
    async fn problems_are_listed_newest_first() {
        let (handler, _, owner) = setup(0).await;
        for title in ["first", "second", "third"] {
            handler
                .create_problem(owner, new_problem(title, None))
                .await
                .unwrap();
        }

        let titles: Vec<String> = handler
            .list_problems()
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.title)
            .collect();

        assert_eq!(titles, vec!["third", "second", "first"]);
    }

    #[tokio::test]
    async fn missing_problem_is_not_found() {
        let (handler, _, _) = setup(0).await;

        assert!(matches!(
            handler.get_problem(404).await,
            Err(ServiceError::NotFound(_))
        ));
    }
}

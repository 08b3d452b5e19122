use std::sync::Arc;

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use tokio::sync::{mpsc, oneshot};

use crate::repositories::{
    payments::{stripe::StripeApi, PaymentError, PaymentGateway},
    Repositories, RepositoryError,
};
use crate::settings::Settings;

pub mod bounties;
pub mod http;
pub mod notifications;
pub mod problems;
pub mod registry;
pub mod sessions;
pub mod solutions;
pub mod users;
pub mod validation;

const CHANNEL_CAPACITY: usize = 512;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Invalid input: {}", .0.join(", "))]
    InvalidInput(Vec<String>),
    #[error("Authentication required")]
    Unauthenticated,
    #[error("Invalid or expired token")]
    InvalidToken,
    #[error("Invalid Credentials")]
    Unauthorized,
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("Insufficient funds")]
    InsufficientFunds,
    #[error("{0}")]
    InvalidState(String),
    #[error("Payment failed: {0}")]
    PaymentFailed(String),
    #[error("Database error: {0}")]
    Database(String),
    #[error("Communication error: {0} - {1}")]
    Communication(String, String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn invalid(message: impl Into<String>) -> Self {
        ServiceError::InvalidInput(vec![message.into()])
    }
}

impl From<RepositoryError> for ServiceError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::NotFound(what) => ServiceError::NotFound(format!("{} not found", what)),
            RepositoryError::Conflict(message) => ServiceError::Conflict(message),
            RepositoryError::InsufficientFunds => ServiceError::InsufficientFunds,
            RepositoryError::Database(e) => ServiceError::Database(e.to_string()),
        }
    }
}

impl From<PaymentError> for ServiceError {
    fn from(error: PaymentError) -> Self {
        ServiceError::PaymentFailed(error.to_string())
    }
}

#[async_trait]
pub trait RequestHandler<T>: Send + Sync + 'static
where
    T: Send + 'static,
{
    async fn handle_request(&self, request: T);
}

#[async_trait]
pub trait Service<T, H>: Send + Sync + 'static
where
    T: Send + 'static,
    H: RequestHandler<T> + Clone + Send,
{
    async fn run(&mut self, handler: H, receiver: &mut mpsc::Receiver<T>) {
        while let Some(request) = receiver.recv().await {
            let handler = handler.clone();

            tokio::spawn(async move {
                handler.handle_request(request).await;
            });
        }
    }
}

/// Sends a request built around a fresh response channel and waits for the
/// service's answer.
pub async fn dispatch<R, T, F>(
    service: &'static str,
    channel: &mpsc::Sender<R>,
    build: F,
) -> Result<T, ServiceError>
where
    R: Send + 'static,
    F: FnOnce(oneshot::Sender<Result<T, ServiceError>>) -> R,
{
    let (response_tx, response_rx) = oneshot::channel();

    channel
        .send(build(response_tx))
        .await
        .map_err(|e| ServiceError::Communication(service.to_string(), e.to_string()))?;

    response_rx
        .await
        .map_err(|e| ServiceError::Communication(service.to_string(), e.to_string()))?
}

/// Senders for every running service.
#[derive(Clone)]
pub struct ServiceChannels {
    pub users: mpsc::Sender<users::UserRequest>,
    pub problems: mpsc::Sender<problems::ProblemRequest>,
    pub solutions: mpsc::Sender<solutions::SolutionRequest>,
    pub bounties: mpsc::Sender<bounties::BountyRequest>,
    pub notifications: mpsc::Sender<notifications::NotificationRequest>,
}

/// Spawns every service loop and returns the channels that reach them.
pub fn spawn_services(
    repositories: Repositories,
    payments: Arc<dyn PaymentGateway>,
    sessions: sessions::SessionIssuer,
    registry: registry::ConnectionRegistry,
    currency: String,
) -> ServiceChannels {
    let (user_tx, mut user_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (problem_tx, mut problem_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (solution_tx, mut solution_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (bounty_tx, mut bounty_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (notification_tx, mut notification_rx) = mpsc::channel(CHANNEL_CAPACITY);

    let mut user_service = users::UserService::new();
    let mut problem_service = problems::ProblemService::new();
    let mut solution_service = solutions::SolutionService::new();
    let mut bounty_service = bounties::BountyService::new();
    let mut notification_service = notifications::NotificationService::new();

    log::info!("Starting notification service.");
    let notification_handler = notifications::NotificationRequestHandler::new(
        repositories.notifications.clone(),
        registry,
    );
    tokio::spawn(async move {
        notification_service
            .run(notification_handler, &mut notification_rx)
            .await;
    });

    log::info!("Starting user service.");
    let user_handler =
        users::UserRequestHandler::new(repositories.users.clone(), payments.clone(), sessions);
    tokio::spawn(async move {
        user_service.run(user_handler, &mut user_rx).await;
    });

    log::info!("Starting problem service.");
    let problem_handler = problems::ProblemRequestHandler::new(repositories.problems.clone());
    tokio::spawn(async move {
        problem_service.run(problem_handler, &mut problem_rx).await;
    });

    log::info!("Starting solution service.");
    let solution_handler = solutions::SolutionRequestHandler::new(
        repositories.solutions.clone(),
        repositories.problems.clone(),
        notification_tx.clone(),
    );
    tokio::spawn(async move {
        solution_service
            .run(solution_handler, &mut solution_rx)
            .await;
    });

    log::info!("Starting bounty service.");
    let bounty_handler = bounties::BountyRequestHandler::new(
        repositories.bounties.clone(),
        repositories.problems.clone(),
        repositories.users.clone(),
        payments,
        notification_tx.clone(),
        currency,
    );
    tokio::spawn(async move {
        bounty_service.run(bounty_handler, &mut bounty_rx).await;
    });

    ServiceChannels {
        users: user_tx,
        problems: problem_tx,
        solutions: solution_tx,
        bounties: bounty_tx,
        notifications: notification_tx,
    }
}

pub async fn start_services(settings: Settings) -> Result<(), anyhow::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(settings.postgres.max_connections)
        .connect(&settings.postgres.url)
        .await?;

    log::info!("Running database migrations.");
    sqlx::migrate!("./migrations").run(&pool).await?;

    let repositories = Repositories::postgres(pool);
    let payments: Arc<dyn PaymentGateway> = Arc::new(StripeApi::new(
        settings.stripe.secret_key,
        settings.stripe.url,
    ));
    let sessions =
        sessions::SessionIssuer::new(&settings.auth.jwt_secret, settings.auth.token_ttl_secs);
    let registry = registry::ConnectionRegistry::new();

    let channels = spawn_services(
        repositories,
        payments,
        sessions.clone(),
        registry.clone(),
        settings.stripe.currency,
    );

    log::info!("Starting HTTP server.");
    let state = http::AppState {
        channels,
        sessions,
        registry,
    };
    http::start_http_server(&settings.http.listen, state).await?;

    Ok(())
}

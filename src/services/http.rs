use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        FromRequest, FromRequestParts,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use serde_json::json;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::{
    registry::ConnectionRegistry, sessions::SessionIssuer, ServiceChannels, ServiceError,
};

mod auth;
mod bounties;
mod notifications;
mod problems;
mod realtime;
mod solutions;
mod users;

pub use auth::AuthUser;

#[derive(Clone)]
pub struct AppState {
    pub channels: ServiceChannels,
    pub sessions: SessionIssuer,
    pub registry: ConnectionRegistry,
}

/// JSON body extractor whose rejection renders like every other input error.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ServiceError))]
pub struct AppJson<T>(pub T);

impl From<JsonRejection> for ServiceError {
    fn from(rejection: JsonRejection) -> Self {
        ServiceError::invalid(rejection.body_text())
    }
}

/// Path parameters, rejected as input errors.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ServiceError))]
pub struct AppPath<T>(pub T);

impl From<PathRejection> for ServiceError {
    fn from(rejection: PathRejection) -> Self {
        ServiceError::invalid(rejection.body_text())
    }
}

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ServiceError))]
pub struct AppQuery<T>(pub T);

impl From<QueryRejection> for ServiceError {
    fn from(rejection: QueryRejection) -> Self {
        ServiceError::invalid(rejection.body_text())
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ServiceError::InvalidInput(details) => (
                StatusCode::BAD_REQUEST,
                json!({"error": "Invalid input", "details": details}),
            ),
            ServiceError::Unauthenticated | ServiceError::Unauthorized => {
                (StatusCode::UNAUTHORIZED, json!({"error": self.to_string()}))
            }
            ServiceError::InvalidToken | ServiceError::Forbidden(_) => {
                (StatusCode::FORBIDDEN, json!({"error": self.to_string()}))
            }
            ServiceError::NotFound(_) => (StatusCode::NOT_FOUND, json!({"error": self.to_string()})),
            ServiceError::Conflict(_) => (StatusCode::CONFLICT, json!({"error": self.to_string()})),
            ServiceError::InsufficientFunds | ServiceError::InvalidState(_) => {
                (StatusCode::BAD_REQUEST, json!({"error": self.to_string()}))
            }
            ServiceError::PaymentFailed(details) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({"error": "Payment failed", "details": details}),
            ),
            ServiceError::Database(_)
            | ServiceError::Communication(_, _)
            | ServiceError::Internal(_) => {
                log::error!("Request failed: {}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({"error": "Internal server error"}),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/users/register", post(users::register))
        .route("/users/login", post(users::login))
        .route(
            "/users/profile",
            get(users::get_profile).put(users::update_profile),
        )
        .route("/users/payout-account", post(users::link_payout_account))
        .route(
            "/problems",
            get(problems::list_problems).post(problems::create_problem),
        )
        .route("/problems/{id}", get(problems::get_problem))
        .route("/solutions", post(solutions::submit_solution))
        .route("/solutions/{problem_id}", get(solutions::list_solutions))
        .route("/solutions/upvote/{id}", patch(solutions::upvote))
        .route("/solutions/accept/{id}", patch(solutions::accept_solution))
        .route("/bounties/pay", post(bounties::fund))
        .route("/bounties/{id}", get(bounties::get_bounty))
        .route("/bounties/release/{id}", post(bounties::release))
        .route("/bounties/refund/{id}", post(bounties::refund))
        .route("/notifications", get(notifications::list_notifications))
        .route("/notifications/mark-read", patch(notifications::mark_all_read));

    Router::new()
        .route("/", get(|| async { "Welcome to the Nexro API" }))
        .route("/health", get(|| async { "OK" }))
        .route("/ws", get(realtime::connect))
        .nest("/api", api)
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

pub async fn start_http_server(listen: &str, state: AppState) -> Result<(), anyhow::Error> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(listen).await?;
    log::info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn render(error: ServiceError) -> (StatusCode, serde_json::Value) {
        let response = error.into_response();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn auth_errors_split_between_401_and_403() {
        let (status, body) = render(ServiceError::Unauthenticated).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Authentication required");

        let (status, body) = render(ServiceError::InvalidToken).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "Invalid or expired token");

        let (status, body) = render(ServiceError::Unauthorized).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Invalid Credentials");
    }

    #[tokio::test]
    async fn invalid_input_lists_every_detail() {
        let (status, body) = render(ServiceError::InvalidInput(vec![
            "Title is required".to_string(),
            "Description is required".to_string(),
        ]))
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body,
            json!({"error": "Invalid input", "details": ["Title is required", "Description is required"]})
        );
    }

    #[tokio::test]
    async fn payment_failures_carry_the_processor_message() {
        let (status, body) =
            render(ServiceError::PaymentFailed("Your card was declined.".to_string())).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["details"], "Your card was declined.");
    }

    #[tokio::test]
    async fn internal_details_are_not_leaked() {
        let (status, body) = render(ServiceError::Database("relation missing".to_string())).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({"error": "Internal server error"}));
    }

    #[tokio::test]
    async fn domain_errors_map_to_client_statuses() {
        assert_eq!(
            render(ServiceError::InsufficientFunds).await.0,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            render(ServiceError::Conflict("User already exists".to_string()))
                .await
                .0,
            StatusCode::CONFLICT
        );
        assert_eq!(
            render(ServiceError::NotFound("Problem not found".to_string()))
                .await
                .0,
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            render(ServiceError::Forbidden("Not yours".to_string()))
                .await
                .0,
            StatusCode::FORBIDDEN
        );
    }
}

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

use super::AppState;
use crate::services::ServiceError;

/// Id of the user named by a valid `Authorization: Bearer <token>` header.
///
/// A missing token is rejected with 401, a bad or expired one with 403.
pub struct AuthUser(pub i64);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ServiceError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(ServiceError::Unauthenticated)?;

        state.sessions.verify(token).map(AuthUser).map_err(|e| {
            log::debug!("Rejected bearer token: {}", e);
            ServiceError::InvalidToken
        })
    }
}

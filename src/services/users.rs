use std::sync::Arc;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use tokio::sync::oneshot;

use super::{sessions::SessionIssuer, validation, RequestHandler, Service, ServiceError};
use crate::models::users::{self, Profile};
use crate::repositories::{payments::PaymentGateway, UserRepository};

pub enum UserRequest {
    Register {
        new_user: users::NewUser,
        response: oneshot::Sender<Result<i64, ServiceError>>,
    },
    Login {
        credentials: users::Credentials,
        response: oneshot::Sender<Result<String, ServiceError>>,
    },
    GetProfile {
        user_id: i64,
        response: oneshot::Sender<Result<Profile, ServiceError>>,
    },
    UpdateProfile {
        user_id: i64,
        update: users::ProfileUpdate,
        response: oneshot::Sender<Result<Profile, ServiceError>>,
    },
    LinkPayoutAccount {
        user_id: i64,
        response: oneshot::Sender<Result<Profile, ServiceError>>,
    },
}

#[derive(Clone)]
pub struct UserRequestHandler {
    repository: Arc<dyn UserRepository>,
    payments: Arc<dyn PaymentGateway>,
    sessions: SessionIssuer,
}

impl UserRequestHandler {
    pub fn new(
        repository: Arc<dyn UserRepository>,
        payments: Arc<dyn PaymentGateway>,
        sessions: SessionIssuer,
    ) -> Self {
        UserRequestHandler {
            repository,
            payments,
            sessions,
        }
    }

    pub async fn register(&self, new_user: users::NewUser) -> Result<i64, ServiceError> {
        let mut errors = Vec::new();
        validation::check_email(&new_user.email, &mut errors);
        validation::check_password(&new_user.password, &mut errors);
        validation::check_name(&new_user.name, &mut errors);
        if !errors.is_empty() {
            return Err(ServiceError::InvalidInput(errors));
        }

        if self
            .repository
            .get_user_by_email(&new_user.email)
            .await?
            .is_some()
        {
            return Err(ServiceError::Conflict("User already exists".to_string()));
        }

        let password_hash = hash_password(new_user.password).await?;
        let user = self
            .repository
            .insert_user(&new_user.email, &password_hash, new_user.name.trim())
            .await?;

        log::info!("Registered user {}", user.id);
        Ok(user.id)
    }

    pub async fn verify_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> Result<i64, ServiceError> {
        let user = self
            .repository
            .get_user_by_email(email)
            .await?
            .ok_or_else(|| ServiceError::NotFound("User not found".to_string()))?;

        if !verify_password(password.to_string(), user.password_hash).await? {
            log::warn!("Rejected login for user {}", user.id);
            return Err(ServiceError::Unauthorized);
        }

        Ok(user.id)
    }

    pub async fn login(&self, credentials: users::Credentials) -> Result<String, ServiceError> {
        let mut errors = Vec::new();
        validation::check_email(&credentials.email, &mut errors);
        validation::check_required("Password", &credentials.password, &mut errors);
        if !errors.is_empty() {
            return Err(ServiceError::InvalidInput(errors));
        }

        let user_id = self
            .verify_credentials(&credentials.email, &credentials.password)
            .await?;

        self.sessions
            .issue(user_id)
            .map_err(|e| ServiceError::Internal(e.to_string()))
    }

    pub async fn get_profile(&self, user_id: i64) -> Result<Profile, ServiceError> {
        self.repository
            .get_user_by_id(user_id)
            .await?
            .map(Profile::from)
            .ok_or_else(|| ServiceError::NotFound("User not found".to_string()))
    }

    pub async fn update_profile(
        &self,
        user_id: i64,
        update: users::ProfileUpdate,
    ) -> Result<Profile, ServiceError> {
        let mut errors = Vec::new();
        validation::check_name(&update.name, &mut errors);
        if !errors.is_empty() {
            return Err(ServiceError::InvalidInput(errors));
        }

        self.repository
            .update_name(user_id, update.name.trim())
            .await?
            .map(Profile::from)
            .ok_or_else(|| ServiceError::NotFound("User not found".to_string()))
    }

    /// Creates a payout account with the payment processor unless one is
    /// already linked.
    pub async fn link_payout_account(&self, user_id: i64) -> Result<Profile, ServiceError> {
        let user = self
            .repository
            .get_user_by_id(user_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("User not found".to_string()))?;

        if user.stripe_account_id.is_some() {
            return Ok(Profile::from(user));
        }

        let account_id = self.payments.create_connected_account(&user.email).await?;
        log::info!("Linked payout account {} to user {}", account_id, user_id);

        self.repository
            .set_payout_account(user_id, &account_id)
            .await?
            .map(Profile::from)
            .ok_or_else(|| ServiceError::NotFound("User not found".to_string()))
    }
}

/// Argon2 is deliberately slow, so it runs off the async workers.
async fn hash_password(password: String) -> Result<String, ServiceError> {
    tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| ServiceError::Internal(format!("Could not hash password: {}", e)))
    })
    .await
    .map_err(|e| ServiceError::Internal(e.to_string()))?
}

async fn verify_password(password: String, password_hash: String) -> Result<bool, ServiceError> {
    tokio::task::spawn_blocking(move || {
        let parsed = PasswordHash::new(&password_hash)
            .map_err(|e| ServiceError::Internal(format!("Invalid password storage: {}", e)))?;

        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    })
    .await
    .map_err(|e| ServiceError::Internal(e.to_string()))?
}

#[async_trait]
impl RequestHandler<UserRequest> for UserRequestHandler {
    async fn handle_request(&self, request: UserRequest) {
        match request {
            UserRequest::Register { new_user, response } => {
                let result = self.register(new_user).await;
                let _ = response.send(result);
            }
            UserRequest::Login {
                credentials,
                response,
            } => {
                let result = self.login(credentials).await;
                let _ = response.send(result);
            }
            UserRequest::GetProfile { user_id, response } => {
                let result = self.get_profile(user_id).await;
                let _ = response.send(result);
            }
            UserRequest::UpdateProfile {
                user_id,
                update,
                response,
            } => {
                let result = self.update_profile(user_id, update).await;
                let _ = response.send(result);
            }
            UserRequest::LinkPayoutAccount { user_id, response } => {
                let result = self.link_payout_account(user_id).await;
                let _ = response.send(result);
            }
        }
    }
}

pub struct UserService;

impl UserService {
    pub fn new() -> Self {
        UserService {}
    }
}

#[async_trait]
impl Service<UserRequest, UserRequestHandler> for UserService {}

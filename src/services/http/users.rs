use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use super::{AppJson, AppState, AuthUser};
use crate::models::users::{Credentials, NewUser, Profile, ProfileUpdate};
use crate::services::{dispatch, users::UserRequest, ServiceError};

pub async fn register(
    State(state): State<AppState>,
    AppJson(new_user): AppJson<NewUser>,
) -> Result<impl IntoResponse, ServiceError> {
    let user_id = dispatch("users", &state.channels.users, |response| {
        UserRequest::Register { new_user, response }
    })
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "User registered successfully",
            "userId": user_id
        })),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    AppJson(credentials): AppJson<Credentials>,
) -> Result<impl IntoResponse, ServiceError> {
    let token = dispatch("users", &state.channels.users, |response| {
        UserRequest::Login {
            credentials,
            response,
        }
    })
    .await?;

    Ok(Json(json!({"message": "Login Successful", "token": token})))
}

pub async fn get_profile(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<Profile>, ServiceError> {
    let profile = dispatch("users", &state.channels.users, |response| {
        UserRequest::GetProfile { user_id, response }
    })
    .await?;

    Ok(Json(profile))
}

pub async fn update_profile(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    AppJson(update): AppJson<ProfileUpdate>,
) -> Result<impl IntoResponse, ServiceError> {
    let profile = dispatch("users", &state.channels.users, |response| {
        UserRequest::UpdateProfile {
            user_id,
            update,
            response,
        }
    })
    .await?;

    Ok(Json(json!({
        "message": "Profile updated successfully",
        "profile": profile
    })))
}

pub async fn link_payout_account(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<Profile>, ServiceError> {
    let profile = dispatch("users", &state.channels.users, |response| {
        UserRequest::LinkPayoutAccount { user_id, response }
    })
    .await?;

    Ok(Json(profile))
}

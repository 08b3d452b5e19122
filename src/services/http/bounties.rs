use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::json;

use super::{AppJson, AppPath, AppState, AuthUser};
use crate::models::bounties::{Bounty, FundBounty, ReleaseBounty};
use crate::services::{bounties::BountyRequest, dispatch, ServiceError};

pub async fn fund(
    State(state): State<AppState>,
    AuthUser(funder_id): AuthUser,
    AppJson(bounty): AppJson<FundBounty>,
) -> Result<impl IntoResponse, ServiceError> {
    let created = dispatch("bounties", &state.channels.bounties, |response| {
        BountyRequest::Fund {
            funder_id,
            bounty,
            response,
        }
    })
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Bounty funded successfully",
            "bounty": created
        })),
    ))
}

pub async fn get_bounty(
    State(state): State<AppState>,
    AppPath(id): AppPath<i64>,
) -> Result<Json<Bounty>, ServiceError> {
    let bounty = dispatch("bounties", &state.channels.bounties, |response| {
        BountyRequest::GetBounty { id, response }
    })
    .await?;

    Ok(Json(bounty))
}

pub async fn release(
    State(state): State<AppState>,
    AuthUser(requester_id): AuthUser,
    AppPath(bounty_id): AppPath<i64>,
    AppJson(release): AppJson<ReleaseBounty>,
) -> Result<impl IntoResponse, ServiceError> {
    let bounty = dispatch("bounties", &state.channels.bounties, |response| {
        BountyRequest::Release {
            bounty_id,
            requester_id,
            solver_id: release.solver_id,
            response,
        }
    })
    .await?;

    Ok(Json(json!({
        "message": "Bounty released successfully",
        "bounty": bounty
    })))
}

pub async fn refund(
    State(state): State<AppState>,
    AuthUser(requester_id): AuthUser,
    AppPath(bounty_id): AppPath<i64>,
) -> Result<impl IntoResponse, ServiceError> {
    let bounty = dispatch("bounties", &state.channels.bounties, |response| {
        BountyRequest::Refund {
            bounty_id,
            requester_id,
            response,
        }
    })
    .await?;

    Ok(Json(json!({
        "message": "Bounty refunded successfully",
        "bounty": bounty
    })))
}

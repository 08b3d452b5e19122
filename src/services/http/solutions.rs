use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::json;

use super::{AppJson, AppPath, AppState, AuthUser};
use crate::models::solutions::{NewSolution, Solution};
use crate::services::{dispatch, solutions::SolutionRequest, ServiceError};

pub async fn submit_solution(
    State(state): State<AppState>,
    AuthUser(submitter_id): AuthUser,
    AppJson(solution): AppJson<NewSolution>,
) -> Result<impl IntoResponse, ServiceError> {
    let created = dispatch("solutions", &state.channels.solutions, |response| {
        SolutionRequest::SubmitSolution {
            submitter_id,
            solution,
            response,
        }
    })
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Solution submitted successfully",
            "solution": created
        })),
    ))
}

pub async fn list_solutions(
    State(state): State<AppState>,
    AppPath(problem_id): AppPath<i64>,
) -> Result<Json<Vec<Solution>>, ServiceError> {
    let solutions = dispatch("solutions", &state.channels.solutions, |response| {
        SolutionRequest::ListSolutions {
            problem_id,
            response,
        }
    })
    .await?;

    Ok(Json(solutions))
}

pub async fn upvote(
    State(state): State<AppState>,
    AuthUser(_): AuthUser,
    AppPath(solution_id): AppPath<i64>,
) -> Result<impl IntoResponse, ServiceError> {
    let solution = dispatch("solutions", &state.channels.solutions, |response| {
        SolutionRequest::Upvote {
            solution_id,
            response,
        }
    })
    .await?;

    Ok(Json(json!({
        "message": "Solution upvoted successfully",
        "solution": solution
    })))
}

pub async fn accept_solution(
    State(state): State<AppState>,
    AuthUser(requester_id): AuthUser,
    AppPath(solution_id): AppPath<i64>,
) -> Result<impl IntoResponse, ServiceError> {
    let award = dispatch("solutions", &state.channels.solutions, |response| {
        SolutionRequest::AcceptSolution {
            solution_id,
            requester_id,
            response,
        }
    })
    .await?;

    Ok(Json(json!({
        "message": "Solution accepted and bounty awarded",
        "award": award
    })))
}

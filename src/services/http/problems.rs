use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::json;

use super::{AppJson, AppPath, AppState, AuthUser};
use crate::models::problems::{NewProblem, Problem};
use crate::services::{dispatch, problems::ProblemRequest, ServiceError};

pub async fn create_problem(
    State(state): State<AppState>,
    AuthUser(owner_id): AuthUser,
    AppJson(problem): AppJson<NewProblem>,
) -> Result<impl IntoResponse, ServiceError> {
    let created = dispatch("problems", &state.channels.problems, |response| {
        ProblemRequest::CreateProblem {
            owner_id,
            problem,
            response,
        }
    })
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Problem posted successfully",
            "problem": created
        })),
    ))
}

pub async fn list_problems(
    State(state): State<AppState>,
) -> Result<Json<Vec<Problem>>, ServiceError> {
    let problems = dispatch("problems", &state.channels.problems, |response| {
        ProblemRequest::ListProblems { response }
    })
    .await?;

    Ok(Json(problems))
}

pub async fn get_problem(
    State(state): State<AppState>,
    AppPath(id): AppPath<i64>,
) -> Result<Json<Problem>, ServiceError> {
    let problem = dispatch("problems", &state.channels.problems, |response| {
        ProblemRequest::GetProblem { id, response }
    })
    .await?;

    Ok(Json(problem))
}

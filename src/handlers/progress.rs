// src/handlers/progress.rs

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use validator::Validate;

use crate::{
    error::AppError,
    models::progress::{AddTimeRequest, CompleteScenarioRequest, SubmitAnswerRequest},
    services::ProgressService,
    utils::jwt::Claims,
};

/// Begins (or resumes) a scenario for the current student.
pub async fn start_scenario(
    State(progress): State<Arc<ProgressService>>,
    Extension(claims): Extension<Claims>,
    Path(scenario_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let student_id = claims.user_id()?;
    let dto = progress.start_scenario(student_id, scenario_id).await?;
    Ok(Json(dto))
}

/// Records one answer. Returns 204; the score only shows up on completion.
pub async fn submit_answer(
    State(progress): State<Arc<ProgressService>>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<SubmitAnswerRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let student_id = claims.user_id()?;

    progress.submit_answer(student_id, payload).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Closes the current attempt with the client-computed score.
pub async fn complete_scenario(
    State(progress): State<Arc<ProgressService>>,
    Extension(claims): Extension<Claims>,
    Path(scenario_id): Path<i64>,
    Json(payload): Json<CompleteScenarioRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let student_id = claims.user_id()?;

    let dto = progress
        .complete_scenario(student_id, scenario_id, payload.score, payload.points_earned)
        .await?;
    Ok(Json(dto))
}

pub async fn add_time_spent(
    State(progress): State<Arc<ProgressService>>,
    Extension(claims): Extension<Claims>,
    Path(scenario_id): Path<i64>,
    Json(payload): Json<AddTimeRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let student_id = claims.user_id()?;

    let dto = progress
        .add_time_spent(student_id, scenario_id, payload.seconds)
        .await?;
    Ok(Json(dto))
}

/// All scenarios the current student has touched, most recent first.
pub async fn get_my_progress(
    State(progress): State<Arc<ProgressService>>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let student_id = claims.user_id()?;
    let list = progress.get_all_progress(student_id).await?;
    Ok(Json(list))
}

pub async fn get_scenario_progress(
    State(progress): State<Arc<ProgressService>>,
    Extension(claims): Extension<Claims>,
    Path(scenario_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let student_id = claims.user_id()?;
    let dto = progress.get_progress(student_id, scenario_id).await?;
    Ok(Json(dto))
}

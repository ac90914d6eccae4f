// src/handlers/badges.rs

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
    models::badge::AwardBadgeRequest,
    services::{BadgeService, StudentContact},
    utils::jwt::Claims,
};

/// Lists all active badges, ordered by name.
pub async fn list_badges(
    State(badges): State<Arc<BadgeService>>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(badges.list_active_badges().await?))
}

pub async fn get_badge(
    State(badges): State<Arc<BadgeService>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(badges.get_badge(id).await?))
}

/// Badges earned by the current student, most recent first.
pub async fn list_my_badges(
    State(badges): State<Arc<BadgeService>>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let student_id = claims.user_id()?;
    Ok(Json(badges.get_student_badges(student_id).await?))
}

/// Awards a badge to a student.
/// Admin only. Returns 201, or 409 if the student already holds it.
pub async fn award_badge(
    State(badges): State<Arc<BadgeService>>,
    Path(badge_id): Path<i64>,
    Json(payload): Json<AwardBadgeRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let student = StudentContact {
        id: payload.student_id,
        name: payload.student_name,
        email: payload.student_email,
    };
    let awarded = badges
        .award_badge(
            &student,
            badge_id,
            payload.earned_description,
            payload.scenario_id,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(awarded)))
}

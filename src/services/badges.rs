// src/services/badges.rs

use std::sync::Arc;

use chrono::Utc;

use crate::{
    error::AppError,
    models::badge::{BadgeResponse, NewStudentBadge},
    notify::{BadgeEarned, BadgeNotifier},
    store::BadgeStore,
    utils::html::clean_html,
};

/// Who receives a badge, and where to tell them about it.
#[derive(Debug, Clone)]
pub struct StudentContact {
    pub id: i64,
    pub name: String,
    pub email: String,
}

/// Grants badges at most once per student and notifies on a best-effort basis.
pub struct BadgeService {
    store: Arc<dyn BadgeStore>,
    notifier: Arc<dyn BadgeNotifier>,
}

impl BadgeService {
    pub fn new(store: Arc<dyn BadgeStore>, notifier: Arc<dyn BadgeNotifier>) -> Self {
        Self { store, notifier }
    }

    pub async fn list_active_badges(&self) -> Result<Vec<BadgeResponse>, AppError> {
        let badges = self.store.list_active_badges().await?;
        Ok(badges.into_iter().map(BadgeResponse::from).collect())
    }

    pub async fn get_badge(&self, badge_id: i64) -> Result<BadgeResponse, AppError> {
        self.store
            .find_badge(badge_id)
            .await?
            .map(BadgeResponse::from)
            .ok_or_else(|| AppError::NotFound(format!("Badge {} not found", badge_id)))
    }

    pub async fn get_student_badges(&self, student_id: i64) -> Result<Vec<BadgeResponse>, AppError> {
        tracing::debug!(student_id, "Fetching student badges");

        let list = self.store.list_student_badges(student_id).await?;
        Ok(list
            .into_iter()
            .map(|(grant, badge)| BadgeResponse::earned(badge, &grant))
            .collect())
    }

    /// Awards a badge whose earn condition the caller has already checked.
    ///
    /// Fails with `AlreadyAwarded` when the student holds the badge, and with
    /// `NotFound` when the badge is missing or inactive. The grant is final once
    /// stored: a failed notification only leaves `notified = false`.
    pub async fn award_badge(
        &self,
        student: &StudentContact,
        badge_id: i64,
        earned_description: Option<String>,
        scenario_id: Option<i64>,
    ) -> Result<BadgeResponse, AppError> {
        tracing::info!(student_id = student.id, badge_id, "Awarding badge");

        // Fast path only; the store's unique constraint decides concurrent races.
        if self.store.has_badge(student.id, badge_id).await? {
            return Err(AppError::AlreadyAwarded(format!(
                "Student {} already has badge {}",
                student.id, badge_id
            )));
        }

        let badge = self
            .store
            .find_badge(badge_id)
            .await?
            .filter(|b| b.active)
            .ok_or_else(|| AppError::NotFound(format!("Badge {} not found", badge_id)))?;

        let (mut grant, badge) = self
            .store
            .grant(NewStudentBadge {
                student_id: student.id,
                badge_id: badge.id,
                earned_at: Utc::now(),
                earned_description: earned_description.as_deref().map(clean_html),
                earned_in_scenario_id: scenario_id,
            })
            .await?;

        let event = BadgeEarned {
            student_email: student.email.clone(),
            student_name: student.name.clone(),
            badge_name: badge.name.clone(),
            badge_description: badge.description.clone(),
        };
        match self.notifier.notify_badge_earned(&event).await {
            Ok(()) => match self.store.mark_notified(grant.id).await {
                Ok(()) => grant.notified = true,
                Err(e) => tracing::warn!(
                    student_badge_id = grant.id,
                    "Failed to mark badge notification as sent: {}",
                    e
                ),
            },
            Err(e) => {
                tracing::warn!(
                    student_id = student.id,
                    badge_id,
                    "Failed to send badge earned notification: {}",
                    e
                );
            }
        }

        tracing::info!(student_id = student.id, badge_id, "Badge awarded");
        Ok(BadgeResponse::earned(badge, &grant))
    }
}

// src/store/mod.rs

//! Storage seams for the progress engine.
//!
//! Each trait method that reads and then writes an aggregate row is a single
//! atomic unit in every implementation. Uniqueness of (student, scenario)
//! and (student, badge) is enforced by the store itself, not by callers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    error::AppError,
    models::{
        badge::{Badge, NewStudentBadge, StudentBadge},
        catalog::{QuestionWithAnswers, Scenario},
        progress::{NewStudentAnswer, StudentAnswer, StudentScenarioProgress},
    },
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Read access to scenario and question reference data.
#[async_trait]
pub trait QuestionCatalog: Send + Sync {
    async fn get_question(&self, question_id: i64)
    -> Result<Option<QuestionWithAnswers>, AppError>;

    async fn get_scenario(&self, scenario_id: i64) -> Result<Option<Scenario>, AppError>;
}

/// Inputs for folding one completed attempt into a progress row.
#[derive(Debug, Clone, Copy)]
pub struct Completion {
    pub score: f64,
    pub points_earned: i32,
    pub pass_threshold: f64,
}

#[async_trait]
pub trait ProgressStore: Send + Sync {
    async fn find_progress(
        &self,
        student_id: i64,
        scenario_id: i64,
    ) -> Result<Option<StudentScenarioProgress>, AppError>;

    /// Most recently accessed first.
    async fn list_progress(&self, student_id: i64)
    -> Result<Vec<StudentScenarioProgress>, AppError>;

    /// Fetch-or-create the row for the pair and move it to `InProgress`.
    async fn start(
        &self,
        student_id: i64,
        scenario_id: i64,
        now: DateTime<Utc>,
    ) -> Result<StudentScenarioProgress, AppError>;

    async fn insert_answer(&self, answer: NewStudentAnswer) -> Result<StudentAnswer, AppError>;

    /// Tallies the pair's answers and applies the completion to the locked row.
    /// Also folds the attempt into the scenario statistics when the scenario exists.
    /// Returns `None` when no progress row exists.
    async fn complete(
        &self,
        student_id: i64,
        scenario_id: i64,
        completion: Completion,
        now: DateTime<Utc>,
    ) -> Result<Option<StudentScenarioProgress>, AppError>;

    /// Returns `None` when no progress row exists.
    async fn add_time_spent(
        &self,
        student_id: i64,
        scenario_id: i64,
        seconds: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<StudentScenarioProgress>, AppError>;
}

#[async_trait]
pub trait BadgeStore: Send + Sync {
    async fn find_badge(&self, badge_id: i64) -> Result<Option<Badge>, AppError>;

    /// Ordered by name.
    async fn list_active_badges(&self) -> Result<Vec<Badge>, AppError>;

    async fn has_badge(&self, student_id: i64, badge_id: i64) -> Result<bool, AppError>;

    /// Inserts the grant and bumps the badge's `earned_count` as one unit.
    ///
    /// A grant that already exists fails with `AlreadyAwarded` and leaves the
    /// count untouched. A missing or inactive badge fails with `NotFound`.
    async fn grant(&self, grant: NewStudentBadge) -> Result<(StudentBadge, Badge), AppError>;

    async fn mark_notified(&self, student_badge_id: i64) -> Result<(), AppError>;

    /// Most recently earned first.
    async fn list_student_badges(
        &self,
        student_id: i64,
    ) -> Result<Vec<(StudentBadge, Badge)>, AppError>;
}

// src/store/postgres.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};

use crate::{
    error::AppError,
    models::{
        badge::{Badge, NewStudentBadge, StudentBadge},
        catalog::{Answer, Question, QuestionWithAnswers, Scenario},
        progress::{AnswerTally, NewStudentAnswer, StudentAnswer, StudentScenarioProgress},
    },
    store::{BadgeStore, Completion, ProgressStore, QuestionCatalog},
};

const PROGRESS_COLUMNS: &str = "id, student_id, scenario_id, status, attempt_count, \
     highest_score, latest_score, average_score, total_points_earned, total_possible_points, \
     time_spent_seconds, correct_answers, total_questions, started_at, completed_at, \
     last_accessed_at, created_at, updated_at";

const ANSWER_COLUMNS: &str = "id, student_id, question_id, scenario_id, student_scenario_id, \
     selected_answer_ids, is_correct, points_earned, time_taken_seconds, hint_used, \
     attempt_number, answered_at";

const SCENARIO_COLUMNS: &str = "id, title, passing_score, published, completion_count, \
     average_score, average_completion_seconds, created_at";

// `type` is reserved in Rust, so it is aliased to the struct field name.
const BADGE_COLUMNS: &str = "id, name, description, type AS badge_type, icon_url, criteria, \
     points_value, active, earned_count, related_scenario_id, related_theme, created_at";

const STUDENT_BADGE_COLUMNS: &str = "id, student_id, badge_id, earned_at, earned_description, \
     earned_in_scenario_id, notified, displayed";

/// Postgres-backed store. Multi-statement operations run in one transaction
/// with the aggregate row locked `FOR UPDATE`.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

async fn lock_progress(
    conn: &mut PgConnection,
    student_id: i64,
    scenario_id: i64,
) -> Result<Option<StudentScenarioProgress>, sqlx::Error> {
    let query = format!(
        "SELECT {PROGRESS_COLUMNS} FROM student_scenarios \
         WHERE student_id = $1 AND scenario_id = $2 \
         FOR UPDATE"
    );
    sqlx::query_as::<_, StudentScenarioProgress>(&query)
        .bind(student_id)
        .bind(scenario_id)
        .fetch_optional(&mut *conn)
        .await
}

async fn save_progress(
    conn: &mut PgConnection,
    p: &StudentScenarioProgress,
) -> Result<StudentScenarioProgress, sqlx::Error> {
    let query = format!(
        "UPDATE student_scenarios SET \
             status = $2, attempt_count = $3, highest_score = $4, latest_score = $5, \
             average_score = $6, total_points_earned = $7, time_spent_seconds = $8, \
             correct_answers = $9, total_questions = $10, started_at = $11, \
             completed_at = $12, last_accessed_at = $13, updated_at = $14 \
         WHERE id = $1 \
         RETURNING {PROGRESS_COLUMNS}"
    );
    sqlx::query_as::<_, StudentScenarioProgress>(&query)
        .bind(p.id)
        .bind(p.status.as_str())
        .bind(p.attempt_count)
        .bind(p.highest_score)
        .bind(p.latest_score)
        .bind(p.average_score)
        .bind(p.total_points_earned)
        .bind(p.time_spent_seconds)
        .bind(p.correct_answers)
        .bind(p.total_questions)
        .bind(p.started_at)
        .bind(p.completed_at)
        .bind(p.last_accessed_at)
        .bind(p.updated_at)
        .fetch_one(&mut *conn)
        .await
}

#[async_trait]
impl QuestionCatalog for PgStore {
    async fn get_question(
        &self,
        question_id: i64,
    ) -> Result<Option<QuestionWithAnswers>, AppError> {
        let question = sqlx::query_as::<_, Question>(
            "SELECT id, scenario_id, points FROM questions WHERE id = $1",
        )
        .bind(question_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(question) = question else {
            return Ok(None);
        };

        let answers = sqlx::query_as::<_, Answer>(
            "SELECT id, question_id, is_correct FROM answers \
             WHERE question_id = $1 \
             ORDER BY display_order, id",
        )
        .bind(question_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(QuestionWithAnswers::new(question, answers)))
    }

    async fn get_scenario(&self, scenario_id: i64) -> Result<Option<Scenario>, AppError> {
        let query = format!("SELECT {SCENARIO_COLUMNS} FROM scenarios WHERE id = $1");
        let scenario = sqlx::query_as::<_, Scenario>(&query)
            .bind(scenario_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(scenario)
    }
}

#[async_trait]
impl ProgressStore for PgStore {
    async fn find_progress(
        &self,
        student_id: i64,
        scenario_id: i64,
    ) -> Result<Option<StudentScenarioProgress>, AppError> {
        let query = format!(
            "SELECT {PROGRESS_COLUMNS} FROM student_scenarios \
             WHERE student_id = $1 AND scenario_id = $2"
        );
        let progress = sqlx::query_as::<_, StudentScenarioProgress>(&query)
            .bind(student_id)
            .bind(scenario_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(progress)
    }

    async fn list_progress(
        &self,
        student_id: i64,
    ) -> Result<Vec<StudentScenarioProgress>, AppError> {
        let query = format!(
            "SELECT {PROGRESS_COLUMNS} FROM student_scenarios \
             WHERE student_id = $1 \
             ORDER BY last_accessed_at DESC NULLS LAST, id DESC"
        );
        let list = sqlx::query_as::<_, StudentScenarioProgress>(&query)
            .bind(student_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(list)
    }

    async fn start(
        &self,
        student_id: i64,
        scenario_id: i64,
        now: DateTime<Utc>,
    ) -> Result<StudentScenarioProgress, AppError> {
        let mut tx = self.pool.begin().await?;

        // Concurrent first starts race on the unique constraint; the loser
        // inserts nothing and locks the winner's row below.
        sqlx::query(
            "INSERT INTO student_scenarios (student_id, scenario_id, status, created_at, updated_at) \
             VALUES ($1, $2, 'NOT_STARTED', $3, $3) \
             ON CONFLICT (student_id, scenario_id) DO NOTHING",
        )
        .bind(student_id)
        .bind(scenario_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let mut progress = lock_progress(&mut tx, student_id, scenario_id)
            .await?
            .ok_or_else(|| {
                AppError::InternalServerError("progress row vanished after upsert".to_string())
            })?;

        progress.start(now);
        let saved = save_progress(&mut tx, &progress).await?;

        tx.commit().await?;
        Ok(saved)
    }

    async fn insert_answer(&self, answer: NewStudentAnswer) -> Result<StudentAnswer, AppError> {
        let query = format!(
            "INSERT INTO student_answers \
             (student_id, question_id, scenario_id, student_scenario_id, selected_answer_ids, \
              is_correct, points_earned, time_taken_seconds, hint_used, attempt_number, answered_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
             RETURNING {ANSWER_COLUMNS}"
        );
        let saved = sqlx::query_as::<_, StudentAnswer>(&query)
            .bind(answer.student_id)
            .bind(answer.question_id)
            .bind(answer.scenario_id)
            .bind(answer.student_scenario_id)
            .bind(&answer.selected_answer_ids)
            .bind(answer.is_correct)
            .bind(answer.points_earned)
            .bind(answer.time_taken_seconds)
            .bind(answer.hint_used)
            .bind(answer.attempt_number)
            .bind(answer.answered_at)
            .fetch_one(&self.pool)
            .await?;
        Ok(saved)
    }

    async fn complete(
        &self,
        student_id: i64,
        scenario_id: i64,
        completion: Completion,
        now: DateTime<Utc>,
    ) -> Result<Option<StudentScenarioProgress>, AppError> {
        let mut tx = self.pool.begin().await?;

        let Some(mut progress) = lock_progress(&mut tx, student_id, scenario_id).await? else {
            return Ok(None);
        };

        let (correct, total): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*) FILTER (WHERE is_correct), COUNT(*) \
             FROM student_answers \
             WHERE student_id = $1 AND scenario_id = $2",
        )
        .bind(student_id)
        .bind(scenario_id)
        .fetch_one(&mut *tx)
        .await?;

        progress.record_completion(
            completion.score,
            completion.points_earned,
            AnswerTally { correct, total },
            completion.pass_threshold,
            now,
        );
        let saved = save_progress(&mut tx, &progress).await?;

        let query = format!("SELECT {SCENARIO_COLUMNS} FROM scenarios WHERE id = $1 FOR UPDATE");
        let scenario = sqlx::query_as::<_, Scenario>(&query)
            .bind(scenario_id)
            .fetch_optional(&mut *tx)
            .await?;

        if let Some(mut scenario) = scenario {
            scenario.record_completion(completion.score, saved.time_spent_seconds as f64);
            sqlx::query(
                "UPDATE scenarios SET completion_count = $2, average_score = $3, \
                 average_completion_seconds = $4 \
                 WHERE id = $1",
            )
            .bind(scenario.id)
            .bind(scenario.completion_count)
            .bind(scenario.average_score)
            .bind(scenario.average_completion_seconds)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(Some(saved))
    }

    async fn add_time_spent(
        &self,
        student_id: i64,
        scenario_id: i64,
        seconds: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<StudentScenarioProgress>, AppError> {
        let mut tx = self.pool.begin().await?;

        let Some(mut progress) = lock_progress(&mut tx, student_id, scenario_id).await? else {
            return Ok(None);
        };

        progress.add_time_spent(seconds, now)?;
        let saved = save_progress(&mut tx, &progress).await?;

        tx.commit().await?;
        Ok(Some(saved))
    }
}

#[async_trait]
impl BadgeStore for PgStore {
    async fn find_badge(&self, badge_id: i64) -> Result<Option<Badge>, AppError> {
        let query = format!("SELECT {BADGE_COLUMNS} FROM badges WHERE id = $1");
        let badge = sqlx::query_as::<_, Badge>(&query)
            .bind(badge_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(badge)
    }

    async fn list_active_badges(&self) -> Result<Vec<Badge>, AppError> {
        let query = format!("SELECT {BADGE_COLUMNS} FROM badges WHERE active ORDER BY name ASC");
        let badges = sqlx::query_as::<_, Badge>(&query)
            .fetch_all(&self.pool)
            .await?;
        Ok(badges)
    }

    async fn has_badge(&self, student_id: i64, badge_id: i64) -> Result<bool, AppError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM student_badges WHERE student_id = $1 AND badge_id = $2)",
        )
        .bind(student_id)
        .bind(badge_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn grant(&self, grant: NewStudentBadge) -> Result<(StudentBadge, Badge), AppError> {
        let mut tx = self.pool.begin().await?;

        let query = format!(
            "INSERT INTO student_badges \
             (student_id, badge_id, earned_at, earned_description, earned_in_scenario_id, notified, displayed) \
             VALUES ($1, $2, $3, $4, $5, FALSE, TRUE) \
             RETURNING {STUDENT_BADGE_COLUMNS}"
        );
        let student_badge = sqlx::query_as::<_, StudentBadge>(&query)
            .bind(grant.student_id)
            .bind(grant.badge_id)
            .bind(grant.earned_at)
            .bind(&grant.earned_description)
            .bind(grant.earned_in_scenario_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                // The unique constraint is the final arbiter for concurrent awards.
                if e.as_database_error()
                    .is_some_and(|db| db.is_unique_violation())
                {
                    AppError::AlreadyAwarded(format!(
                        "Student {} already has badge {}",
                        grant.student_id, grant.badge_id
                    ))
                } else if e
                    .as_database_error()
                    .is_some_and(|db| db.is_foreign_key_violation())
                {
                    AppError::NotFound(format!("Badge {} not found", grant.badge_id))
                } else {
                    AppError::from(e)
                }
            })?;

        let query = format!(
            "UPDATE badges SET earned_count = earned_count + 1 \
             WHERE id = $1 AND active \
             RETURNING {BADGE_COLUMNS}"
        );
        let badge = sqlx::query_as::<_, Badge>(&query)
            .bind(grant.badge_id)
            .fetch_optional(&mut *tx)
            .await?
            // Dropping the transaction rolls back the insert.
            .ok_or_else(|| AppError::NotFound(format!("Badge {} not found", grant.badge_id)))?;

        tx.commit().await?;
        Ok((student_badge, badge))
    }

    async fn mark_notified(&self, student_badge_id: i64) -> Result<(), AppError> {
        sqlx::query("UPDATE student_badges SET notified = TRUE WHERE id = $1")
            .bind(student_badge_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_student_badges(
        &self,
        student_id: i64,
    ) -> Result<Vec<(StudentBadge, Badge)>, AppError> {
        let query = format!(
            "SELECT {STUDENT_BADGE_COLUMNS} FROM student_badges \
             WHERE student_id = $1 \
             ORDER BY earned_at DESC, id DESC"
        );
        let grants = sqlx::query_as::<_, StudentBadge>(&query)
            .bind(student_id)
            .fetch_all(&self.pool)
            .await?;

        if grants.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<i64> = grants.iter().map(|g| g.badge_id).collect();
        let query = format!("SELECT {BADGE_COLUMNS} FROM badges WHERE id = ANY($1)");
        let badges = sqlx::query_as::<_, Badge>(&query)
            .bind(&ids)
            .fetch_all(&self.pool)
            .await?;

        let by_id: std::collections::HashMap<i64, Badge> =
            badges.into_iter().map(|b| (b.id, b)).collect();

        Ok(grants
            .into_iter()
            .filter_map(|g| by_id.get(&g.badge_id).cloned().map(|b| (g, b)))
            .collect())
    }
}

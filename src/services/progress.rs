// src/services/progress.rs

use std::sync::Arc;

use chrono::Utc;

use crate::{
    config::{PASSING_SCORE_PERCENTAGE, PassThresholdMode},
    error::AppError,
    models::progress::{NewStudentAnswer, ProgressResponse, StudentAnswer, SubmitAnswerRequest},
    scoring,
    store::{Completion, ProgressStore, QuestionCatalog},
};

/// Tracks each student's runs through scenarios: start, answers, completion.
pub struct ProgressService {
    store: Arc<dyn ProgressStore>,
    catalog: Arc<dyn QuestionCatalog>,
    threshold_mode: PassThresholdMode,
}

impl ProgressService {
    pub fn new(
        store: Arc<dyn ProgressStore>,
        catalog: Arc<dyn QuestionCatalog>,
        threshold_mode: PassThresholdMode,
    ) -> Self {
        Self {
            store,
            catalog,
            threshold_mode,
        }
    }

    /// Creates the progress row on first call and (re-)enters `InProgress`.
    pub async fn start_scenario(
        &self,
        student_id: i64,
        scenario_id: i64,
    ) -> Result<ProgressResponse, AppError> {
        tracing::info!(student_id, scenario_id, "Student starting scenario");

        let progress = self.store.start(student_id, scenario_id, Utc::now()).await?;
        Ok(progress.into())
    }

    /// Scores and records one answer. Aggregates are untouched until completion.
    ///
    /// Repeat submissions for the same question are stored as separate rows.
    pub async fn submit_answer(
        &self,
        student_id: i64,
        req: SubmitAnswerRequest,
    ) -> Result<StudentAnswer, AppError> {
        tracing::info!(
            student_id,
            question_id = req.question_id,
            scenario_id = req.scenario_id,
            "Student submitting answer"
        );

        let progress = self
            .store
            .find_progress(student_id, req.scenario_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "Progress for scenario {} not found; start the scenario first",
                    req.scenario_id
                ))
            })?;

        let question = self
            .catalog
            .get_question(req.question_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Question {} not found", req.question_id)))?;

        let result = scoring::evaluate(&question, &req.selected_answer_ids);

        let answer = self
            .store
            .insert_answer(NewStudentAnswer {
                student_id,
                question_id: req.question_id,
                scenario_id: req.scenario_id,
                student_scenario_id: Some(progress.id),
                selected_answer_ids: req.selected_answer_ids.into_iter().collect(),
                is_correct: result.is_correct,
                points_earned: result.points_earned,
                time_taken_seconds: req.time_taken_seconds,
                hint_used: req.hint_used.unwrap_or(false),
                attempt_number: 1,
                answered_at: Utc::now(),
            })
            .await?;

        tracing::info!(
            question_id = answer.question_id,
            correct = answer.is_correct,
            points = answer.points_earned,
            "Answer recorded"
        );
        Ok(answer)
    }

    /// Closes an attempt: bumps the attempt count, updates scores and decides pass/fail.
    pub async fn complete_scenario(
        &self,
        student_id: i64,
        scenario_id: i64,
        score: f64,
        points_earned: i32,
    ) -> Result<ProgressResponse, AppError> {
        if !(0.0..=100.0).contains(&score) {
            return Err(AppError::BadRequest(
                "Score must be between 0 and 100".to_string(),
            ));
        }
        if points_earned < 0 {
            return Err(AppError::BadRequest(
                "Points earned cannot be negative".to_string(),
            ));
        }

        tracing::info!(student_id, scenario_id, score, "Student completing scenario");

        let pass_threshold = self.pass_threshold(scenario_id).await?;
        let completion = Completion {
            score,
            points_earned,
            pass_threshold,
        };

        let progress = self
            .store
            .complete(student_id, scenario_id, completion, Utc::now())
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Progress for scenario {} not found", scenario_id))
            })?;

        tracing::info!(
            student_id,
            scenario_id,
            status = progress.status.as_str(),
            attempts = progress.attempt_count,
            "Scenario completed"
        );
        Ok(progress.into())
    }

    pub async fn add_time_spent(
        &self,
        student_id: i64,
        scenario_id: i64,
        seconds: i64,
    ) -> Result<ProgressResponse, AppError> {
        if seconds < 0 {
            return Err(AppError::BadRequest(
                "Seconds cannot be negative".to_string(),
            ));
        }

        let progress = self
            .store
            .add_time_spent(student_id, scenario_id, seconds, Utc::now())
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Progress for scenario {} not found", scenario_id))
            })?;
        Ok(progress.into())
    }

    pub async fn get_progress(
        &self,
        student_id: i64,
        scenario_id: i64,
    ) -> Result<ProgressResponse, AppError> {
        tracing::debug!(student_id, scenario_id, "Fetching scenario progress");

        self.store
            .find_progress(student_id, scenario_id)
            .await?
            .map(ProgressResponse::from)
            .ok_or_else(|| {
                AppError::NotFound(format!("Progress for scenario {} not found", scenario_id))
            })
    }

    pub async fn get_all_progress(&self, student_id: i64) -> Result<Vec<ProgressResponse>, AppError> {
        tracing::debug!(student_id, "Fetching all progress");

        let list = self.store.list_progress(student_id).await?;
        Ok(list.into_iter().map(ProgressResponse::from).collect())
    }

    async fn pass_threshold(&self, scenario_id: i64) -> Result<f64, AppError> {
        match self.threshold_mode {
            PassThresholdMode::Fixed => Ok(PASSING_SCORE_PERCENTAGE),
            PassThresholdMode::Scenario => self
                .catalog
                .get_scenario(scenario_id)
                .await?
                .map(|s| s.passing_score)
                .ok_or_else(|| AppError::NotFound(format!("Scenario {} not found", scenario_id))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{
            catalog::{Answer, QuestionWithAnswers, Scenario},
            progress::CompletionStatus,
        },
        store::MemoryStore,
    };
    use std::collections::BTreeSet;

    const STUDENT: i64 = 42;
    const SCENARIO: i64 = 900;

    fn service(store: &Arc<MemoryStore>, mode: PassThresholdMode) -> ProgressService {
        ProgressService::new(store.clone(), store.clone(), mode)
    }

    /// Question `id` worth `points`; answer `id * 10 + 1` is the only correct one.
    async fn seed_question(store: &MemoryStore, id: i64, points: i32) {
        store
            .insert_question(QuestionWithAnswers {
                id,
                scenario_id: SCENARIO,
                points,
                answers: vec![
                    Answer {
                        id: id * 10 + 1,
                        question_id: id,
                        is_correct: true,
                    },
                    Answer {
                        id: id * 10 + 2,
                        question_id: id,
                        is_correct: false,
                    },
                ],
            })
            .await;
    }

    fn submit(question_id: i64, pick: i64) -> SubmitAnswerRequest {
        SubmitAnswerRequest {
            question_id,
            scenario_id: SCENARIO,
            selected_answer_ids: BTreeSet::from([pick]),
            time_taken_seconds: Some(12),
            hint_used: None,
        }
    }

    #[tokio::test]
    async fn test_start_twice_keeps_started_at() {
        let store = Arc::new(MemoryStore::new());
        let svc = service(&store, PassThresholdMode::Fixed);

        let first = svc.start_scenario(STUDENT, SCENARIO).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = svc.start_scenario(STUDENT, SCENARIO).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.status, CompletionStatus::InProgress);
        assert_eq!(first.started_at, second.started_at);
        assert!(second.last_accessed_at > first.last_accessed_at);
    }

    #[tokio::test]
    async fn test_start_accepts_scenario_missing_from_catalog() {
        let store = Arc::new(MemoryStore::new());
        let svc = service(&store, PassThresholdMode::Fixed);

        assert!(store.get_scenario(SCENARIO).await.unwrap().is_none());
        let p = svc.start_scenario(STUDENT, SCENARIO).await.unwrap();
        assert_eq!(p.scenario_id, SCENARIO);
        assert_eq!(p.status, CompletionStatus::InProgress);
    }

    #[tokio::test]
    async fn test_submit_requires_started_progress() {
        let store = Arc::new(MemoryStore::new());
        seed_question(&store, 1, 10).await;
        let svc = service(&store, PassThresholdMode::Fixed);

        let err = svc.submit_answer(STUDENT, submit(1, 11)).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_submit_unknown_question_is_not_found() {
        let store = Arc::new(MemoryStore::new());
        let svc = service(&store, PassThresholdMode::Fixed);
        svc.start_scenario(STUDENT, SCENARIO).await.unwrap();

        let err = svc.submit_answer(STUDENT, submit(77, 771)).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_submit_records_answer_without_touching_aggregates() {
        let store = Arc::new(MemoryStore::new());
        seed_question(&store, 1, 10).await;
        let svc = service(&store, PassThresholdMode::Fixed);
        let started = svc.start_scenario(STUDENT, SCENARIO).await.unwrap();

        let answer = svc.submit_answer(STUDENT, submit(1, 11)).await.unwrap();
        assert!(answer.is_correct);
        assert_eq!(answer.points_earned, 10);
        assert_eq!(answer.student_scenario_id, Some(started.id));
        assert!(!answer.hint_used);

        let progress = svc.get_progress(STUDENT, SCENARIO).await.unwrap();
        assert_eq!(progress.attempt_count, 0);
        assert_eq!(progress.correct_answers, 0);
        assert_eq!(progress.total_points_earned, 0);
    }

    #[tokio::test]
    async fn test_complete_without_progress_is_not_found() {
        let store = Arc::new(MemoryStore::new());
        let svc = service(&store, PassThresholdMode::Fixed);

        let err = svc
            .complete_scenario(STUDENT, SCENARIO, 80.0, 10)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_complete_rejects_out_of_range_score() {
        let store = Arc::new(MemoryStore::new());
        let svc = service(&store, PassThresholdMode::Fixed);
        svc.start_scenario(STUDENT, SCENARIO).await.unwrap();

        for score in [-1.0, 100.5, f64::NAN] {
            let err = svc
                .complete_scenario(STUDENT, SCENARIO, score, 0)
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::BadRequest(_)));
        }
    }

    #[tokio::test]
    async fn test_completed_at_survives_later_attempts() {
        let store = Arc::new(MemoryStore::new());
        let svc = service(&store, PassThresholdMode::Fixed);
        svc.start_scenario(STUDENT, SCENARIO).await.unwrap();

        let first = svc.complete_scenario(STUDENT, SCENARIO, 80.0, 10).await.unwrap();
        assert_eq!(first.status, CompletionStatus::CompletedPassed);
        let t1 = first.completed_at.unwrap();

        svc.start_scenario(STUDENT, SCENARIO).await.unwrap();
        let second = svc.complete_scenario(STUDENT, SCENARIO, 50.0, 0).await.unwrap();
        assert_eq!(second.status, CompletionStatus::CompletedFailed);
        assert_eq!(second.completed_at, Some(t1));

        svc.start_scenario(STUDENT, SCENARIO).await.unwrap();
        let third = svc.complete_scenario(STUDENT, SCENARIO, 95.0, 10).await.unwrap();
        assert_eq!(third.status, CompletionStatus::CompletedPassed);
        assert_eq!(third.completed_at, Some(t1));
        assert_eq!(third.attempt_count, 3);
        assert_eq!(third.total_points_earned, 20);
    }

    #[tokio::test]
    async fn test_running_average_and_highest_over_attempts() {
        let store = Arc::new(MemoryStore::new());
        let svc = service(&store, PassThresholdMode::Fixed);
        svc.start_scenario(STUDENT, SCENARIO).await.unwrap();

        let mut last = None;
        for (score, avg, best) in [(80.0, 80.0, 80.0), (60.0, 70.0, 80.0), (100.0, 80.0, 100.0)] {
            let p = svc.complete_scenario(STUDENT, SCENARIO, score, 0).await.unwrap();
            assert!((p.average_score.unwrap() - avg).abs() < 1e-9);
            assert_eq!(p.highest_score, Some(best));
            last = Some(p);
        }
        assert_eq!(last.unwrap().latest_score, Some(100.0));
    }

    #[tokio::test]
    async fn test_end_to_end_failing_attempt() {
        let store = Arc::new(MemoryStore::new());
        seed_question(&store, 1, 10).await;
        seed_question(&store, 2, 10).await;
        seed_question(&store, 3, 5).await;
        let svc = service(&store, PassThresholdMode::Fixed);

        svc.start_scenario(STUDENT, SCENARIO).await.unwrap();
        svc.submit_answer(STUDENT, submit(1, 11)).await.unwrap();
        svc.submit_answer(STUDENT, submit(2, 21)).await.unwrap();
        let wrong = svc.submit_answer(STUDENT, submit(3, 32)).await.unwrap();
        assert!(!wrong.is_correct);
        assert_eq!(wrong.points_earned, 0);

        let p = svc.complete_scenario(STUDENT, SCENARIO, 66.7, 20).await.unwrap();
        assert_eq!(p.status, CompletionStatus::CompletedFailed);
        assert_eq!(p.total_points_earned, 20);
        assert_eq!(p.correct_answers, 2);
        assert_eq!(p.total_questions, 3);
        assert_eq!(p.completion_percentage, 66);
        assert!(p.completed_at.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_submissions_are_counted_raw() {
        let store = Arc::new(MemoryStore::new());
        seed_question(&store, 1, 10).await;
        let svc = service(&store, PassThresholdMode::Fixed);
        svc.start_scenario(STUDENT, SCENARIO).await.unwrap();

        svc.submit_answer(STUDENT, submit(1, 11)).await.unwrap();
        svc.submit_answer(STUDENT, submit(1, 11)).await.unwrap();

        let p = svc.complete_scenario(STUDENT, SCENARIO, 100.0, 10).await.unwrap();
        assert_eq!(p.total_questions, 2);
        assert_eq!(p.correct_answers, 2);
        assert_eq!(store.answers_for(STUDENT, SCENARIO).await.len(), 2);
    }

    #[tokio::test]
    async fn test_scenario_threshold_mode_uses_passing_score() {
        let store = Arc::new(MemoryStore::new());
        store
            .insert_scenario(Scenario {
                id: SCENARIO,
                title: "Night driving".to_string(),
                passing_score: 90.0,
                published: true,
                completion_count: 0,
                average_score: None,
                average_completion_seconds: None,
                created_at: None,
            })
            .await;

        let fixed = service(&store, PassThresholdMode::Fixed);
        fixed.start_scenario(STUDENT, SCENARIO).await.unwrap();
        let p = fixed.complete_scenario(STUDENT, SCENARIO, 80.0, 0).await.unwrap();
        assert_eq!(p.status, CompletionStatus::CompletedPassed);

        let per_scenario = service(&store, PassThresholdMode::Scenario);
        let p = per_scenario
            .complete_scenario(STUDENT, SCENARIO, 80.0, 0)
            .await
            .unwrap();
        assert_eq!(p.status, CompletionStatus::CompletedFailed);

        let err = per_scenario
            .complete_scenario(STUDENT, 12345, 80.0, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_completion_updates_scenario_statistics() {
        let store = Arc::new(MemoryStore::new());
        store
            .insert_scenario(Scenario {
                id: SCENARIO,
                title: "Motorway merge".to_string(),
                passing_score: 70.0,
                published: true,
                completion_count: 0,
                average_score: None,
                average_completion_seconds: None,
                created_at: None,
            })
            .await;
        let svc = service(&store, PassThresholdMode::Fixed);

        svc.start_scenario(STUDENT, SCENARIO).await.unwrap();
        svc.add_time_spent(STUDENT, SCENARIO, 120).await.unwrap();
        svc.complete_scenario(STUDENT, SCENARIO, 90.0, 0).await.unwrap();
        svc.start_scenario(STUDENT + 1, SCENARIO).await.unwrap();
        svc.complete_scenario(STUDENT + 1, SCENARIO, 50.0, 0).await.unwrap();

        let scenario = store.get_scenario(SCENARIO).await.unwrap().unwrap();
        assert_eq!(scenario.completion_count, 2);
        assert_eq!(scenario.average_score, Some(70.0));
        assert_eq!(scenario.average_completion_seconds, Some(60.0));
    }

    #[tokio::test]
    async fn test_add_time_spent() {
        let store = Arc::new(MemoryStore::new());
        let svc = service(&store, PassThresholdMode::Fixed);

        let err = svc.add_time_spent(STUDENT, SCENARIO, 30).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        svc.start_scenario(STUDENT, SCENARIO).await.unwrap();
        svc.add_time_spent(STUDENT, SCENARIO, 30).await.unwrap();
        let p = svc.add_time_spent(STUDENT, SCENARIO, 45).await.unwrap();
        assert_eq!(p.time_spent_seconds, 75);
        assert_eq!(p.formatted_time_spent, "1m 15s");

        let err = svc.add_time_spent(STUDENT, SCENARIO, -5).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_add_time_spent_overflow_is_bad_request() {
        let store = Arc::new(MemoryStore::new());
        let svc = service(&store, PassThresholdMode::Fixed);

        svc.start_scenario(STUDENT, SCENARIO).await.unwrap();
        svc.add_time_spent(STUDENT, SCENARIO, i64::MAX).await.unwrap();

        let err = svc.add_time_spent(STUDENT, SCENARIO, 1).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));

        let p = svc.get_progress(STUDENT, SCENARIO).await.unwrap();
        assert_eq!(p.time_spent_seconds, i64::MAX);
    }

    #[tokio::test]
    async fn test_get_all_progress_most_recent_first() {
        let store = Arc::new(MemoryStore::new());
        let svc = service(&store, PassThresholdMode::Fixed);

        svc.start_scenario(STUDENT, 1).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        svc.start_scenario(STUDENT, 2).await.unwrap();
        svc.start_scenario(STUDENT + 1, 3).await.unwrap();

        let list = svc.get_all_progress(STUDENT).await.unwrap();
        let scenarios: Vec<i64> = list.iter().map(|p| p.scenario_id).collect();
        assert_eq!(scenarios, vec![2, 1]);

        let err = svc.get_progress(STUDENT, 3).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}

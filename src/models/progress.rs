// src/models/progress.rs

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::error::AppError;

/// Lifecycle of a student's run through a scenario.
///
/// A missing row is read as `NotStarted`. Both completed states accept a new
/// start, so there is no terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompletionStatus {
    NotStarted,
    InProgress,
    CompletedPassed,
    CompletedFailed,
}

impl CompletionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompletionStatus::NotStarted => "NOT_STARTED",
            CompletionStatus::InProgress => "IN_PROGRESS",
            CompletionStatus::CompletedPassed => "COMPLETED_PASSED",
            CompletionStatus::CompletedFailed => "COMPLETED_FAILED",
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(
            self,
            CompletionStatus::CompletedPassed | CompletionStatus::CompletedFailed
        )
    }
}

impl TryFrom<String> for CompletionStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "NOT_STARTED" => Ok(CompletionStatus::NotStarted),
            "IN_PROGRESS" => Ok(CompletionStatus::InProgress),
            "COMPLETED_PASSED" => Ok(CompletionStatus::CompletedPassed),
            "COMPLETED_FAILED" => Ok(CompletionStatus::CompletedFailed),
            other => Err(format!("unknown completion status '{}'", other)),
        }
    }
}

/// Represents the 'student_scenarios' table.
/// One row per (student, scenario) pair, enforced by a unique constraint.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct StudentScenarioProgress {
    pub id: i64,
    pub student_id: i64,
    pub scenario_id: i64,

    #[sqlx(try_from = "String")]
    pub status: CompletionStatus,

    /// Incremented once per completion, never per question.
    pub attempt_count: i32,

    pub highest_score: Option<f64>,
    pub latest_score: Option<f64>,

    /// Running mean over `attempt_count` completions.
    pub average_score: Option<f64>,

    pub total_points_earned: i64,
    pub total_possible_points: Option<i32>,
    pub time_spent_seconds: i64,

    /// Snapshot of the most recent completion, not cumulative.
    pub correct_answers: i64,
    pub total_questions: i64,

    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_accessed_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Answer counts for one student on one scenario, taken at completion time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnswerTally {
    pub correct: i64,
    pub total: i64,
}

impl StudentScenarioProgress {
    /// A fresh, not yet persisted record. `id` is assigned by the store.
    pub fn new(student_id: i64, scenario_id: i64, now: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            student_id,
            scenario_id,
            status: CompletionStatus::NotStarted,
            attempt_count: 0,
            highest_score: None,
            latest_score: None,
            average_score: None,
            total_points_earned: 0,
            total_possible_points: None,
            time_spent_seconds: 0,
            correct_answers: 0,
            total_questions: 0,
            started_at: None,
            completed_at: None,
            last_accessed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Enters `InProgress`. `started_at` is only ever written once.
    pub fn start(&mut self, now: DateTime<Utc>) {
        if self.started_at.is_none() {
            self.started_at = Some(now);
        }
        self.status = CompletionStatus::InProgress;
        self.last_accessed_at = Some(now);
        self.updated_at = now;
    }

    /// Folds one completed attempt into the aggregate.
    ///
    /// `attempt_count` is bumped before the running mean is applied, so the
    /// mean always divides by the number of completions including this one.
    pub fn record_completion(
        &mut self,
        score: f64,
        points_earned: i32,
        tally: AnswerTally,
        pass_threshold: f64,
        now: DateTime<Utc>,
    ) {
        self.attempt_count += 1;
        self.latest_score = Some(score);
        self.correct_answers = tally.correct;
        self.total_questions = tally.total;
        self.total_points_earned += i64::from(points_earned);

        if self.highest_score.is_none_or(|best| score > best) {
            self.highest_score = Some(score);
        }

        let n = f64::from(self.attempt_count);
        self.average_score = Some(match self.average_score {
            None => score,
            Some(avg) => (avg * (n - 1.0) + score) / n,
        });

        if score >= pass_threshold {
            self.status = CompletionStatus::CompletedPassed;
            if self.completed_at.is_none() {
                self.completed_at = Some(now);
            }
        } else {
            self.status = CompletionStatus::CompletedFailed;
        }

        self.last_accessed_at = Some(now);
        self.updated_at = now;
    }

    /// Leaves the record untouched when the total would overflow.
    pub fn add_time_spent(&mut self, seconds: i64, now: DateTime<Utc>) -> Result<(), AppError> {
        self.time_spent_seconds = self
            .time_spent_seconds
            .checked_add(seconds)
            .ok_or_else(|| AppError::BadRequest("Time spent is out of range".to_string()))?;
        self.updated_at = now;
        Ok(())
    }

    pub fn is_passed(&self) -> bool {
        self.status == CompletionStatus::CompletedPassed
    }

    pub fn is_completed(&self) -> bool {
        self.status.is_completed()
    }

    /// Correct answers as an integer percentage of the latest attempt (truncating).
    pub fn completion_percentage(&self) -> i64 {
        if self.total_questions == 0 {
            return 0;
        }
        (self.correct_answers * 100) / self.total_questions
    }

    pub fn formatted_time_spent(&self) -> String {
        let hours = self.time_spent_seconds / 3600;
        let minutes = (self.time_spent_seconds % 3600) / 60;
        let seconds = self.time_spent_seconds % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, minutes, seconds)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds)
        } else {
            format!("{}s", seconds)
        }
    }
}

/// DTO returned to callers. Carries the derived reads alongside the raw row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressResponse {
    pub id: i64,
    pub student_id: i64,
    pub scenario_id: i64,
    pub status: CompletionStatus,
    pub attempt_count: i32,
    pub highest_score: Option<f64>,
    pub latest_score: Option<f64>,
    pub average_score: Option<f64>,
    pub total_points_earned: i64,
    pub total_possible_points: Option<i32>,
    pub time_spent_seconds: i64,
    pub formatted_time_spent: String,
    pub correct_answers: i64,
    pub total_questions: i64,
    pub completion_percentage: i64,
    pub passed: bool,
    pub completed: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_accessed_at: Option<DateTime<Utc>>,
}

impl From<StudentScenarioProgress> for ProgressResponse {
    fn from(p: StudentScenarioProgress) -> Self {
        Self {
            formatted_time_spent: p.formatted_time_spent(),
            completion_percentage: p.completion_percentage(),
            passed: p.is_passed(),
            completed: p.is_completed(),
            id: p.id,
            student_id: p.student_id,
            scenario_id: p.scenario_id,
            status: p.status,
            attempt_count: p.attempt_count,
            highest_score: p.highest_score,
            latest_score: p.latest_score,
            average_score: p.average_score,
            total_points_earned: p.total_points_earned,
            total_possible_points: p.total_possible_points,
            time_spent_seconds: p.time_spent_seconds,
            correct_answers: p.correct_answers,
            total_questions: p.total_questions,
            started_at: p.started_at,
            completed_at: p.completed_at,
            last_accessed_at: p.last_accessed_at,
        }
    }
}

/// Represents the 'student_answers' table. Rows are never updated.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct StudentAnswer {
    pub id: i64,
    pub student_id: i64,
    pub question_id: i64,
    pub scenario_id: i64,
    pub student_scenario_id: Option<i64>,
    pub selected_answer_ids: Vec<i64>,
    pub is_correct: bool,
    pub points_earned: i32,
    pub time_taken_seconds: Option<i32>,
    pub hint_used: bool,
    pub attempt_number: i32,
    pub answered_at: DateTime<Utc>,
}

/// Insert payload for a `StudentAnswer`.
#[derive(Debug, Clone)]
pub struct NewStudentAnswer {
    pub student_id: i64,
    pub question_id: i64,
    pub scenario_id: i64,
    pub student_scenario_id: Option<i64>,
    pub selected_answer_ids: Vec<i64>,
    pub is_correct: bool,
    pub points_earned: i32,
    pub time_taken_seconds: Option<i32>,
    pub hint_used: bool,
    pub attempt_number: i32,
    pub answered_at: DateTime<Utc>,
}

/// DTO for submitting an answer to a question.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SubmitAnswerRequest {
    pub question_id: i64,
    pub scenario_id: i64,

    /// Treated as a set: duplicates collapse, order is irrelevant.
    #[validate(length(max = 50, message = "Too many selected answers."))]
    pub selected_answer_ids: BTreeSet<i64>,

    #[validate(range(min = 0, message = "Time taken cannot be negative."))]
    pub time_taken_seconds: Option<i32>,

    pub hint_used: Option<bool>,
}

/// DTO for completing a scenario attempt.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CompleteScenarioRequest {
    #[validate(range(min = 0.0, max = 100.0, message = "Score must be between 0 and 100."))]
    pub score: f64,

    #[validate(range(min = 0, message = "Points earned cannot be negative."))]
    pub points_earned: i32,
}

/// DTO for reporting time spent on a scenario.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AddTimeRequest {
    #[validate(range(min = 0, message = "Seconds cannot be negative."))]
    pub seconds: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const PASS: f64 = 70.0;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn started() -> StudentScenarioProgress {
        let mut p = StudentScenarioProgress::new(7, 3, at(0));
        p.start(at(0));
        p
    }

    fn complete(p: &mut StudentScenarioProgress, score: f64, t: i64) {
        p.record_completion(score, 10, AnswerTally { correct: 1, total: 2 }, PASS, at(t));
    }

    #[test]
    fn test_start_sets_started_at_once() {
        let mut p = StudentScenarioProgress::new(1, 1, at(0));
        assert_eq!(p.status, CompletionStatus::NotStarted);

        p.start(at(10));
        p.start(at(20));

        assert_eq!(p.status, CompletionStatus::InProgress);
        assert_eq!(p.started_at, Some(at(10)));
        assert_eq!(p.last_accessed_at, Some(at(20)));
    }

    #[test]
    fn test_running_average_matches_mean() {
        let mut p = started();
        let mut seen = Vec::new();
        for (i, (score, expected)) in [(80.0, 80.0), (60.0, 70.0), (100.0, 80.0)]
            .into_iter()
            .enumerate()
        {
            complete(&mut p, score, i as i64 + 1);
            seen.push(score);
            let mean = seen.iter().sum::<f64>() / seen.len() as f64;
            let avg = p.average_score.unwrap();
            assert!((avg - expected).abs() < 1e-9);
            assert!((avg - mean).abs() < 1e-9);
        }
        assert_eq!(p.attempt_count, 3);
    }

    #[test]
    fn test_running_average_long_sequence() {
        let mut p = started();
        let scores: Vec<f64> = (0..200).map(|i| ((i * 37) % 101) as f64).collect();
        for (i, s) in scores.iter().enumerate() {
            complete(&mut p, *s, i as i64);
        }
        let mean = scores.iter().sum::<f64>() / scores.len() as f64;
        assert!((p.average_score.unwrap() - mean).abs() < 1e-9);
    }

    #[test]
    fn test_highest_score_is_max() {
        let mut p = started();
        complete(&mut p, 60.0, 1);
        assert_eq!(p.highest_score, Some(60.0));
        complete(&mut p, 90.0, 2);
        assert_eq!(p.highest_score, Some(90.0));
        complete(&mut p, 70.0, 3);
        assert_eq!(p.highest_score, Some(90.0));
        assert_eq!(p.latest_score, Some(70.0));
    }

    #[test]
    fn test_completed_at_set_on_first_pass_only() {
        let mut p = started();
        complete(&mut p, 80.0, 1);
        assert_eq!(p.status, CompletionStatus::CompletedPassed);
        assert_eq!(p.completed_at, Some(at(1)));

        complete(&mut p, 50.0, 2);
        assert_eq!(p.status, CompletionStatus::CompletedFailed);
        assert_eq!(p.completed_at, Some(at(1)));

        complete(&mut p, 95.0, 3);
        assert_eq!(p.status, CompletionStatus::CompletedPassed);
        assert_eq!(p.completed_at, Some(at(1)));
    }

    #[test]
    fn test_failing_first_leaves_completed_at_unset() {
        let mut p = started();
        complete(&mut p, 69.99, 1);
        assert_eq!(p.status, CompletionStatus::CompletedFailed);
        assert!(p.completed_at.is_none());

        complete(&mut p, 70.0, 2);
        assert_eq!(p.status, CompletionStatus::CompletedPassed);
        assert_eq!(p.completed_at, Some(at(2)));
    }

    #[test]
    fn test_points_accumulate_and_snapshot_overwrites() {
        let mut p = started();
        p.record_completion(50.0, 20, AnswerTally { correct: 2, total: 3 }, PASS, at(1));
        p.record_completion(90.0, 15, AnswerTally { correct: 5, total: 6 }, PASS, at(2));

        assert_eq!(p.total_points_earned, 35);
        assert_eq!(p.correct_answers, 5);
        assert_eq!(p.total_questions, 6);
    }

    #[test]
    fn test_restart_after_completion_reenters_in_progress() {
        let mut p = started();
        complete(&mut p, 80.0, 1);
        p.start(at(5));
        assert_eq!(p.status, CompletionStatus::InProgress);
        assert_eq!(p.started_at, Some(at(0)));
        assert_eq!(p.attempt_count, 1);
    }

    #[test]
    fn test_completion_percentage_truncates() {
        let mut p = started();
        assert_eq!(p.completion_percentage(), 0);

        p.correct_answers = 2;
        p.total_questions = 3;
        assert_eq!(p.completion_percentage(), 66);
    }

    #[test]
    fn test_formatted_time_spent() {
        let mut p = started();
        p.add_time_spent(42, at(1)).unwrap();
        assert_eq!(p.formatted_time_spent(), "42s");

        p.add_time_spent(60, at(2)).unwrap();
        assert_eq!(p.formatted_time_spent(), "1m 42s");

        p.add_time_spent(3600, at(3)).unwrap();
        assert_eq!(p.formatted_time_spent(), "1h 1m 42s");
    }

    #[test]
    fn test_add_time_spent_rejects_overflow() {
        let mut p = started();
        p.add_time_spent(i64::MAX, at(1)).unwrap();

        let err = p.add_time_spent(1, at(2)).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
        assert_eq!(p.time_spent_seconds, i64::MAX);
        assert_eq!(p.updated_at, at(1));
    }

    #[test]
    fn test_status_round_trips_through_text() {
        for status in [
            CompletionStatus::NotStarted,
            CompletionStatus::InProgress,
            CompletionStatus::CompletedPassed,
            CompletionStatus::CompletedFailed,
        ] {
            let parsed = CompletionStatus::try_from(status.as_str().to_string()).unwrap();
            assert_eq!(parsed, status);
        }
        assert!(CompletionStatus::try_from("DONE".to_string()).is_err());
    }

    #[test]
    fn test_response_carries_derived_fields() {
        let mut p = started();
        p.record_completion(66.7, 20, AnswerTally { correct: 2, total: 3 }, PASS, at(1));

        let dto = ProgressResponse::from(p);
        assert_eq!(dto.completion_percentage, 66);
        assert!(!dto.passed);
        assert!(dto.completed);

        let json = serde_json::to_value(&dto).unwrap();
        assert_eq!(json["status"], "COMPLETED_FAILED");
    }
}

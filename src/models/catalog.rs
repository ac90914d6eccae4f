// src/models/catalog.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Represents the 'scenarios' table in the database.
/// Only the fields the progress engine reads or maintains are mapped here.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Scenario {
    pub id: i64,

    pub title: String,

    /// Passing threshold as a percentage (0-100).
    pub passing_score: f64,

    pub published: bool,

    pub completion_count: i64,
    pub average_score: Option<f64>,
    pub average_completion_seconds: Option<f64>,

    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Represents the 'questions' table.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    pub scenario_id: i64,

    /// Scoring weight awarded for an exactly-correct answer.
    pub points: i32,
}

/// Represents the 'answers' table.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Answer {
    pub id: i64,
    pub question_id: i64,
    pub is_correct: bool,
}

/// A question together with its answer options, as handed to the scorer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionWithAnswers {
    pub id: i64,
    pub scenario_id: i64,
    pub points: i32,
    pub answers: Vec<Answer>,
}

impl QuestionWithAnswers {
    pub fn new(question: Question, answers: Vec<Answer>) -> Self {
        Self {
            id: question.id,
            scenario_id: question.scenario_id,
            points: question.points,
            answers,
        }
    }
}

impl Scenario {
    /// Folds one completion into the scenario-wide running averages.
    pub fn record_completion(&mut self, score: f64, completion_seconds: f64) {
        self.completion_count += 1;
        let n = self.completion_count as f64;

        self.average_score = Some(match self.average_score {
            None => score,
            Some(avg) => (avg * (n - 1.0) + score) / n,
        });
        self.average_completion_seconds = Some(match self.average_completion_seconds {
            None => completion_seconds,
            Some(avg) => (avg * (n - 1.0) + completion_seconds) / n,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario() -> Scenario {
        Scenario {
            id: 1,
            title: "Roundabout entry".to_string(),
            passing_score: 80.0,
            published: true,
            completion_count: 0,
            average_score: None,
            average_completion_seconds: None,
            created_at: None,
        }
    }

    #[test]
    fn test_record_completion_running_averages() {
        let mut s = scenario();
        s.record_completion(90.0, 120.0);
        s.record_completion(60.0, 60.0);

        assert_eq!(s.completion_count, 2);
        assert_eq!(s.average_score, Some(75.0));
        assert_eq!(s.average_completion_seconds, Some(90.0));
    }
}

// src/scoring.rs

use std::collections::BTreeSet;

use crate::models::catalog::QuestionWithAnswers;

/// Result of checking one submission against a question's answer key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation {
    pub is_correct: bool,
    pub points_earned: i32,
}

/// The ids of every answer flagged correct on the question.
pub fn correct_answer_set(question: &QuestionWithAnswers) -> BTreeSet<i64> {
    question
        .answers
        .iter()
        .filter(|a| a.is_correct)
        .map(|a| a.id)
        .collect()
}

/// Scores a submission.
///
/// Correct only on exact set equality with the answer key, for every question
/// type. Subsets, supersets and any wrong pick score zero; there is no partial
/// credit. A question without correct answers only matches an empty selection.
pub fn evaluate(question: &QuestionWithAnswers, selected: &BTreeSet<i64>) -> Evaluation {
    let correct = correct_answer_set(question);

    if correct.is_empty() {
        tracing::warn!(
            question_id = question.id,
            "Question has no correct answers configured"
        );
    }

    let is_correct = *selected == correct;
    Evaluation {
        is_correct,
        points_earned: if is_correct { question.points } else { 0 },
    }
}

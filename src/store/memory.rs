// src/store/memory.rs

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::{
    error::AppError,
    models::{
        badge::{Badge, NewStudentBadge, StudentBadge},
        catalog::{QuestionWithAnswers, Scenario},
        progress::{AnswerTally, NewStudentAnswer, StudentAnswer, StudentScenarioProgress},
    },
    store::{BadgeStore, Completion, ProgressStore, QuestionCatalog},
};

#[derive(Default)]
struct Inner {
    next_id: i64,
    scenarios: HashMap<i64, Scenario>,
    questions: HashMap<i64, QuestionWithAnswers>,
    // Keyed by (student_id, scenario_id): one row per pair.
    progress: HashMap<(i64, i64), StudentScenarioProgress>,
    answers: Vec<StudentAnswer>,
    badges: HashMap<i64, Badge>,
    // Keyed by (student_id, badge_id): one grant per pair.
    student_badges: HashMap<(i64, i64), StudentBadge>,
}

impl Inner {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-process store holding everything behind one async mutex.
///
/// Every trait call takes the lock once, so each operation is atomic and the
/// keyed maps give the same uniqueness guarantees as the database constraints.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a scenario, assigning an id when `scenario.id` is 0.
    pub async fn insert_scenario(&self, mut scenario: Scenario) -> Scenario {
        let mut inner = self.inner.lock().await;
        if scenario.id == 0 {
            scenario.id = inner.next_id();
        }
        inner.scenarios.insert(scenario.id, scenario.clone());
        scenario
    }

    pub async fn insert_question(&self, question: QuestionWithAnswers) -> QuestionWithAnswers {
        let mut inner = self.inner.lock().await;
        inner.questions.insert(question.id, question.clone());
        question
    }

    /// Adds a badge, assigning an id when `badge.id` is 0.
    pub async fn insert_badge(&self, mut badge: Badge) -> Badge {
        let mut inner = self.inner.lock().await;
        if badge.id == 0 {
            badge.id = inner.next_id();
        }
        inner.badges.insert(badge.id, badge.clone());
        badge
    }

    pub async fn answers_for(&self, student_id: i64, scenario_id: i64) -> Vec<StudentAnswer> {
        let inner = self.inner.lock().await;
        inner
            .answers
            .iter()
            .filter(|a| a.student_id == student_id && a.scenario_id == scenario_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl QuestionCatalog for MemoryStore {
    async fn get_question(
        &self,
        question_id: i64,
    ) -> Result<Option<QuestionWithAnswers>, AppError> {
        Ok(self.inner.lock().await.questions.get(&question_id).cloned())
    }

    async fn get_scenario(&self, scenario_id: i64) -> Result<Option<Scenario>, AppError> {
        Ok(self.inner.lock().await.scenarios.get(&scenario_id).cloned())
    }
}

#[async_trait]
impl ProgressStore for MemoryStore {
    async fn find_progress(
        &self,
        student_id: i64,
        scenario_id: i64,
    ) -> Result<Option<StudentScenarioProgress>, AppError> {
        let inner = self.inner.lock().await;
        Ok(inner.progress.get(&(student_id, scenario_id)).cloned())
    }

    async fn list_progress(
        &self,
        student_id: i64,
    ) -> Result<Vec<StudentScenarioProgress>, AppError> {
        let inner = self.inner.lock().await;
        let mut list: Vec<StudentScenarioProgress> = inner
            .progress
            .values()
            .filter(|p| p.student_id == student_id)
            .cloned()
            .collect();
        // None sorts before Some, so reversing puts never-accessed rows last.
        list.sort_by(|a, b| {
            b.last_accessed_at
                .cmp(&a.last_accessed_at)
                .then(b.id.cmp(&a.id))
        });
        Ok(list)
    }

    async fn start(
        &self,
        student_id: i64,
        scenario_id: i64,
        now: DateTime<Utc>,
    ) -> Result<StudentScenarioProgress, AppError> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;

        if !inner.progress.contains_key(&(student_id, scenario_id)) {
            let mut fresh = StudentScenarioProgress::new(student_id, scenario_id, now);
            fresh.id = inner.next_id();
            inner.progress.insert((student_id, scenario_id), fresh);
        }

        let progress = inner
            .progress
            .get_mut(&(student_id, scenario_id))
            .ok_or_else(|| AppError::InternalServerError("progress row missing".to_string()))?;
        progress.start(now);
        Ok(progress.clone())
    }

    async fn insert_answer(&self, answer: NewStudentAnswer) -> Result<StudentAnswer, AppError> {
        let mut inner = self.inner.lock().await;
        let saved = StudentAnswer {
            id: inner.next_id(),
            student_id: answer.student_id,
            question_id: answer.question_id,
            scenario_id: answer.scenario_id,
            student_scenario_id: answer.student_scenario_id,
            selected_answer_ids: answer.selected_answer_ids,
            is_correct: answer.is_correct,
            points_earned: answer.points_earned,
            time_taken_seconds: answer.time_taken_seconds,
            hint_used: answer.hint_used,
            attempt_number: answer.attempt_number,
            answered_at: answer.answered_at,
        };
        inner.answers.push(saved.clone());
        Ok(saved)
    }

    async fn complete(
        &self,
        student_id: i64,
        scenario_id: i64,
        completion: Completion,
        now: DateTime<Utc>,
    ) -> Result<Option<StudentScenarioProgress>, AppError> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;

        if !inner.progress.contains_key(&(student_id, scenario_id)) {
            return Ok(None);
        }

        let tally = inner
            .answers
            .iter()
            .filter(|a| a.student_id == student_id && a.scenario_id == scenario_id)
            .fold(AnswerTally::default(), |mut t, a| {
                t.total += 1;
                if a.is_correct {
                    t.correct += 1;
                }
                t
            });

        let Some(progress) = inner.progress.get_mut(&(student_id, scenario_id)) else {
            return Ok(None);
        };
        progress.record_completion(
            completion.score,
            completion.points_earned,
            tally,
            completion.pass_threshold,
            now,
        );
        let saved = progress.clone();

        if let Some(scenario) = inner.scenarios.get_mut(&scenario_id) {
            scenario.record_completion(completion.score, saved.time_spent_seconds as f64);
        }

        Ok(Some(saved))
    }

    async fn add_time_spent(
        &self,
        student_id: i64,
        scenario_id: i64,
        seconds: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<StudentScenarioProgress>, AppError> {
        let mut inner = self.inner.lock().await;
        let Some(progress) = inner.progress.get_mut(&(student_id, scenario_id)) else {
            return Ok(None);
        };
        progress.add_time_spent(seconds, now)?;
        Ok(Some(progress.clone()))
    }
}

#[async_trait]
impl BadgeStore for MemoryStore {
    async fn find_badge(&self, badge_id: i64) -> Result<Option<Badge>, AppError> {
        Ok(self.inner.lock().await.badges.get(&badge_id).cloned())
    }

    async fn list_active_badges(&self) -> Result<Vec<Badge>, AppError> {
        let inner = self.inner.lock().await;
        let mut badges: Vec<Badge> = inner.badges.values().filter(|b| b.active).cloned().collect();
        badges.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(badges)
    }

    async fn has_badge(&self, student_id: i64, badge_id: i64) -> Result<bool, AppError> {
        let inner = self.inner.lock().await;
        Ok(inner.student_badges.contains_key(&(student_id, badge_id)))
    }

    async fn grant(&self, grant: NewStudentBadge) -> Result<(StudentBadge, Badge), AppError> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;

        let key = (grant.student_id, grant.badge_id);
        if inner.student_badges.contains_key(&key) {
            return Err(AppError::AlreadyAwarded(format!(
                "Student {} already has badge {}",
                grant.student_id, grant.badge_id
            )));
        }
        if !inner.badges.get(&grant.badge_id).is_some_and(|b| b.active) {
            return Err(AppError::NotFound(format!(
                "Badge {} not found",
                grant.badge_id
            )));
        }

        let student_badge = StudentBadge {
            id: inner.next_id(),
            student_id: grant.student_id,
            badge_id: grant.badge_id,
            earned_at: grant.earned_at,
            earned_description: grant.earned_description,
            earned_in_scenario_id: grant.earned_in_scenario_id,
            notified: false,
            displayed: true,
        };

        let badge = inner
            .badges
            .get_mut(&grant.badge_id)
            .ok_or_else(|| AppError::NotFound(format!("Badge {} not found", grant.badge_id)))?;
        badge.earned_count += 1;
        let badge = badge.clone();

        inner.student_badges.insert(key, student_badge.clone());
        Ok((student_badge, badge))
    }

    async fn mark_notified(&self, student_badge_id: i64) -> Result<(), AppError> {
        let mut inner = self.inner.lock().await;
        if let Some(grant) = inner
            .student_badges
            .values_mut()
            .find(|g| g.id == student_badge_id)
        {
            grant.notified = true;
        }
        Ok(())
    }

    async fn list_student_badges(
        &self,
        student_id: i64,
    ) -> Result<Vec<(StudentBadge, Badge)>, AppError> {
        let inner = self.inner.lock().await;
        let mut list: Vec<(StudentBadge, Badge)> = inner
            .student_badges
            .values()
            .filter(|g| g.student_id == student_id)
            .filter_map(|g| inner.badges.get(&g.badge_id).map(|b| (g.clone(), b.clone())))
            .collect();
        list.sort_by(|(a, _), (b, _)| b.earned_at.cmp(&a.earned_at).then(b.id.cmp(&a.id)));
        Ok(list)
    }
}

// src/models/badge.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Kinds of badges a student can earn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BadgeType {
    Completion,
    Performance,
    SkillMastery,
    ThemeMaster,
    Streak,
    Special,
}

impl BadgeType {
    pub fn display_name(&self) -> &'static str {
        match self {
            BadgeType::Completion => "Completion Badge",
            BadgeType::Performance => "Performance Badge",
            BadgeType::SkillMastery => "Skill Mastery Badge",
            BadgeType::ThemeMaster => "Theme Master Badge",
            BadgeType::Streak => "Streak Badge",
            BadgeType::Special => "Special Badge",
        }
    }
}

impl TryFrom<String> for BadgeType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "COMPLETION" => Ok(BadgeType::Completion),
            "PERFORMANCE" => Ok(BadgeType::Performance),
            "SKILL_MASTERY" => Ok(BadgeType::SkillMastery),
            "THEME_MASTER" => Ok(BadgeType::ThemeMaster),
            "STREAK" => Ok(BadgeType::Streak),
            "SPECIAL" => Ok(BadgeType::Special),
            other => Err(format!("unknown badge type '{}'", other)),
        }
    }
}

/// Represents the 'badges' table.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Badge {
    pub id: i64,
    pub name: String,
    pub description: String,

    #[sqlx(try_from = "String")]
    pub badge_type: BadgeType,

    pub icon_url: Option<String>,

    /// Human readable earn condition. Evaluated by callers, not here.
    pub criteria: Option<String>,

    pub points_value: i32,
    pub active: bool,

    /// Number of students holding this badge.
    pub earned_count: i64,

    pub related_scenario_id: Option<i64>,
    pub related_theme: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Represents the 'student_badges' table.
/// (student_id, badge_id) is unique; this is the at-most-once guarantee.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct StudentBadge {
    pub id: i64,
    pub student_id: i64,
    pub badge_id: i64,
    pub earned_at: DateTime<Utc>,
    pub earned_description: Option<String>,
    pub earned_in_scenario_id: Option<i64>,
    pub notified: bool,
    pub displayed: bool,
}

/// Insert payload for a `StudentBadge`.
#[derive(Debug, Clone)]
pub struct NewStudentBadge {
    pub student_id: i64,
    pub badge_id: i64,
    pub earned_at: DateTime<Utc>,
    pub earned_description: Option<String>,
    pub earned_in_scenario_id: Option<i64>,
}

/// DTO for badge responses. Earned fields are only filled for a student's own badges.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BadgeResponse {
    pub id: i64,
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub badge_type: BadgeType,
    pub type_display_name: String,
    pub icon_url: Option<String>,
    pub criteria: Option<String>,
    pub points_value: i32,
    pub active: bool,
    pub earned_count: i64,
    pub related_scenario_id: Option<i64>,
    pub related_theme: Option<String>,
    pub is_earned: bool,
    pub earned_at: Option<DateTime<Utc>>,
    pub earned_description: Option<String>,
    pub notified: Option<bool>,
}

impl From<Badge> for BadgeResponse {
    fn from(b: Badge) -> Self {
        Self {
            type_display_name: b.badge_type.display_name().to_string(),
            id: b.id,
            name: b.name,
            description: b.description,
            badge_type: b.badge_type,
            icon_url: b.icon_url,
            criteria: b.criteria,
            points_value: b.points_value,
            active: b.active,
            earned_count: b.earned_count,
            related_scenario_id: b.related_scenario_id,
            related_theme: b.related_theme,
            is_earned: false,
            earned_at: None,
            earned_description: None,
            notified: None,
        }
    }
}

impl BadgeResponse {
    /// Badge display fields enriched with one student's grant.
    pub fn earned(badge: Badge, grant: &StudentBadge) -> Self {
        let mut dto = Self::from(badge);
        dto.is_earned = true;
        dto.earned_at = Some(grant.earned_at);
        dto.earned_description = grant.earned_description.clone();
        dto.notified = Some(grant.notified);
        dto
    }
}

/// DTO for awarding a badge. The earn condition has already been evaluated by the caller.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AwardBadgeRequest {
    pub student_id: i64,

    #[validate(length(min = 1, max = 100))]
    pub student_name: String,

    #[validate(email)]
    pub student_email: String,

    #[validate(length(max = 500))]
    pub earned_description: Option<String>,

    pub scenario_id: Option<i64>,
}

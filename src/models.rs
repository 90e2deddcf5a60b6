use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// Academic semester a study unit is taught in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Semester {
    Autumn,
    Spring,
}

impl Semester {
    pub fn as_str(&self) -> &'static str {
        match self {
            Semester::Autumn => "autumn",
            Semester::Spring => "spring",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "autumn" | "fall" | "s1" => Some(Semester::Autumn),
            "spring" | "s2" => Some(Semester::Spring),
            _ => None,
        }
    }
}

// A subject grouping several topics, optionally ending with an exam
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyUnit {
    pub id: i64,
    pub name: String,
    pub color: String,
    pub year: String,
    pub semester: Semester,
    pub exam_date: Option<NaiveDate>,
    pub pre_exam_days: u32,
    pub continuous_assessment: bool,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewStudyUnit {
    pub name: String,
    pub color: String,
    pub year: String,
    pub semester: Semester,
    pub exam_date: Option<NaiveDate>,
    pub pre_exam_days: u32,
    pub continuous_assessment: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicKind {
    Course,
    Synthesis,
}

impl TopicKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TopicKind::Course => "course",
            TopicKind::Synthesis => "synthesis",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "course" | "c" => Some(TopicKind::Course),
            "synthesis" | "s" => Some(TopicKind::Synthesis),
            _ => None,
        }
    }
}

// A single lesson or synthesis sheet inside a study unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    pub id: i64,
    pub study_unit_id: i64,
    pub title: String,
    pub kind: TopicKind,
    pub active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewKind {
    Normal,
    PreExam,
}

impl ReviewKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewKind::Normal => "normal",
            ReviewKind::PreExam => "pre_exam",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "normal" => Some(ReviewKind::Normal),
            "pre_exam" | "pre-exam" => Some(ReviewKind::PreExam),
            _ => None,
        }
    }
}

/// One scheduled review of a topic.
///
/// While pending, `grade` is the score that produced the schedule. Once
/// completed it holds the score obtained on completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewRecord {
    pub id: i64,
    pub topic_id: i64,
    pub grade: f64,
    pub scheduled_date: NaiveDate,
    pub completed_date: Option<NaiveDate>,
    pub interval_days: u32,
    pub completed: bool,
    pub kind: ReviewKind,
}

impl ReviewRecord {
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        !self.completed && self.scheduled_date < today
    }

    pub fn is_pre_exam(&self) -> bool {
        self.kind == ReviewKind::PreExam
    }
}

// A pending review waiting to be inserted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewReview {
    pub topic_id: i64,
    pub grade: f64,
    pub scheduled_date: NaiveDate,
    pub interval_days: u32,
    pub kind: ReviewKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BadgeId {
    #[serde(rename = "STREAK_7")]
    Streak7,
    #[serde(rename = "STREAK_30")]
    Streak30,
    #[serde(rename = "STREAK_100")]
    Streak100,
    PerfectScore,
    Perfectionist,
    Dedicated,
    Scholar,
    Improver,
    Excellence,
}

impl BadgeId {
    pub fn as_str(&self) -> &'static str {
        match self {
            BadgeId::Streak7 => "STREAK_7",
            BadgeId::Streak30 => "STREAK_30",
            BadgeId::Streak100 => "STREAK_100",
            BadgeId::PerfectScore => "PERFECT_SCORE",
            BadgeId::Perfectionist => "PERFECTIONIST",
            BadgeId::Dedicated => "DEDICATED",
            BadgeId::Scholar => "SCHOLAR",
            BadgeId::Improver => "IMPROVER",
            BadgeId::Excellence => "EXCELLENCE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BadgeTier {
    Bronze,
    Silver,
    Gold,
}

impl BadgeTier {
    pub fn label(&self) -> &'static str {
        match self {
            BadgeTier::Bronze => "Bronze",
            BadgeTier::Silver => "Silver",
            BadgeTier::Gold => "Gold",
        }
    }
}

// Points, streak and badges for the single learner
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngagementState {
    pub total_points: u64,
    pub streak_days: u32,
    pub best_streak: u32,
    pub last_activity_date: Option<NaiveDate>,
    pub unlocked_badges: BTreeSet<BadgeId>,
}

// JSON output wrapper for CLI
#[derive(Debug, Serialize)]
pub struct JsonOutput<T: Serialize> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> JsonOutput<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

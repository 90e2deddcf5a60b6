//! Fixed checkpoint reviews in the days leading up to an exam.

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::models::ReviewKind;

/// Display rank of a review. `High` orders before `Normal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Normal,
}

impl From<ReviewKind> for Priority {
    fn from(kind: ReviewKind) -> Self {
        match kind {
            ReviewKind::PreExam => Priority::High,
            ReviewKind::Normal => Priority::Normal,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub date: NaiveDate,
    pub days_before: u32,
    pub kind: ReviewKind,
    pub priority: Priority,
}

/// Days before the exam at which a checkpoint is placed, farthest first.
pub fn checkpoint_offsets(pre_exam_days: u32) -> &'static [u32] {
    match pre_exam_days {
        d if d >= 7 => &[7, 3, 1],
        d if d >= 3 => &[3, 1],
        _ => &[1],
    }
}

/// Checkpoints still ahead of `today`. Empty once the exam has passed.
pub fn pre_exam_checkpoints(exam: NaiveDate, pre_exam_days: u32, today: NaiveDate) -> Vec<Checkpoint> {
    if exam <= today {
        return Vec::new();
    }

    checkpoint_offsets(pre_exam_days)
        .iter()
        .filter_map(|&days_before| {
            let date = exam.checked_sub_days(Days::new(u64::from(days_before)))?;
            (date >= today).then_some(Checkpoint {
                date,
                days_before,
                kind: ReviewKind::PreExam,
                priority: ReviewKind::PreExam.into(),
            })
        })
        .collect()
}

pub fn days_until(exam: NaiveDate, today: NaiveDate) -> i64 {
    (exam - today).num_days()
}

/// True when the exam is 1 to `pre_exam_days` days away.
pub fn is_pre_exam_window(exam: NaiveDate, pre_exam_days: u32, today: NaiveDate) -> bool {
    let days = days_until(exam, today);
    days > 0 && days <= i64::from(pre_exam_days)
}

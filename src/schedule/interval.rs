//! Next-interval computation over a fixed day ladder.

use chrono::{Days, NaiveDate};
use tracing::debug;

use super::coefficient::{check_grade_range, CoefficientModel};
use crate::error::ValidationError;
use crate::models::ReviewRecord;

/// Base intervals in days. A review climbs one rung per grading.
pub const INTERVAL_LADDER: [u32; 7] = [1, 7, 14, 30, 90, 180, 365];

pub const MIN_INTERVAL_DAYS: u32 = 1;
pub const MAX_INTERVAL_DAYS: u32 = 365;

const HISTORY_WINDOW: usize = 3;
const CURRENT_WEIGHT: f64 = 0.7;
const HISTORY_WEIGHT: f64 = 0.3;

const ISO_DATE: &str = "%Y-%m-%d";

/// Smallest ladder entry strictly greater than `current`, or the top rung.
pub fn next_ladder_step(current: u32) -> u32 {
    INTERVAL_LADDER
        .iter()
        .copied()
        .find(|&step| step > current)
        .unwrap_or(MAX_INTERVAL_DAYS)
}

/// Blend the current grade with the last (up to) three completed grades.
///
/// `history` is expected in completion order, oldest first.
pub fn effective_grade(current: f64, history: &[ReviewRecord]) -> f64 {
    let recent: Vec<f64> = history
        .iter()
        .rev()
        .filter(|r| r.completed)
        .take(HISTORY_WINDOW)
        .map(|r| r.grade)
        .collect();

    if recent.is_empty() {
        return current;
    }

    let average = recent.iter().sum::<f64>() / recent.len() as f64;
    CURRENT_WEIGHT * current + HISTORY_WEIGHT * average
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct IntervalScheduler {
    model: CoefficientModel,
}

impl IntervalScheduler {
    pub fn new(model: CoefficientModel) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &CoefficientModel {
        &self.model
    }

    /// Days until the next review, always within `[1, 365]`.
    pub fn next_interval(
        &self,
        current_interval: u32,
        grade: f64,
        history: &[ReviewRecord],
    ) -> Result<u32, ValidationError> {
        let grade = check_grade_range(grade)?;
        let base = next_ladder_step(current_interval);
        let effective = effective_grade(grade, history);
        let coefficient = self.model.coefficient(effective)?;

        let raw = (f64::from(base) * coefficient).round();
        let interval = raw.clamp(f64::from(MIN_INTERVAL_DAYS), f64::from(MAX_INTERVAL_DAYS)) as u32;

        debug!(
            current_interval,
            grade, effective, base, coefficient, interval, "computed next interval"
        );
        Ok(interval)
    }
}

/// Calendar-day addition.
pub fn next_date(last: NaiveDate, interval_days: u32) -> Result<NaiveDate, ValidationError> {
    last.checked_add_days(Days::new(u64::from(interval_days)))
        .ok_or_else(|| ValidationError::DateOverflow {
            date: last.to_string(),
            days: interval_days,
        })
}

pub fn parse_iso_date(s: &str) -> Result<NaiveDate, ValidationError> {
    NaiveDate::parse_from_str(s.trim(), ISO_DATE)
        .map_err(|_| ValidationError::InvalidDate(s.to_string()))
}

pub fn next_date_iso(last: &str, interval_days: u32) -> Result<String, ValidationError> {
    let last = parse_iso_date(last)?;
    Ok(next_date(last, interval_days)?.format(ISO_DATE).to_string())
}

//! Aggregates over the completed review history.

use std::collections::BTreeMap;

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::points::LevelProgress;
use crate::gateway::{GatewayResult, PersistenceGateway};
use crate::models::{EngagementState, ReviewRecord};

pub const DEFAULT_STREAK_HORIZON_DAYS: u32 = 1000;

const WEEK_DAYS: u32 = 7;
const MONTH_DAYS: u32 = 30;
const PERFECT_GRADE: f64 = 20.0;

/// Completed reviews bucketed 16-20 / 13-15 / 10-12 / 7-9 / 0-6.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradeDistribution {
    pub excellent: u32,
    pub good: u32,
    pub average: u32,
    pub poor: u32,
    pub very_poor: u32,
}

impl GradeDistribution {
    pub fn record(&mut self, grade: f64) {
        match grade {
            g if g >= 16.0 => self.excellent += 1,
            g if g >= 13.0 => self.good += 1,
            g if g >= 10.0 => self.average += 1,
            g if g >= 7.0 => self.poor += 1,
            _ => self.very_poor += 1,
        }
    }

    pub fn total(&self) -> u32 {
        self.excellent + self.good + self.average + self.poor + self.very_poor
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub total_completed: u32,
    pub streak: u32,
    pub best_streak: u32,
    pub perfect_scores: u32,
    pub average_grade: f64,
    pub average_improvement: f64,
    pub weekly_completed: u32,
    pub monthly_completed: u32,
    pub distribution: GradeDistribution,
    pub total_points: u64,
    pub level: u32,
    pub next_level: LevelProgress,
    pub daily_progress: f64,
}

impl StatsSnapshot {
    /// Same snapshot with the level fields recomputed for `points`.
    pub fn with_points(mut self, points: u64) -> Self {
        let progress = LevelProgress::from_points(points);
        self.total_points = points;
        self.level = progress.level;
        self.next_level = progress;
        self
    }
}

pub fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

pub fn average_grade(records: &[ReviewRecord]) -> f64 {
    if records.is_empty() {
        return 0.0;
    }
    let sum: f64 = records.iter().map(|r| r.grade).sum();
    round_one_decimal(sum / records.len() as f64)
}

/// Mean of (latest - earliest) grade over topics with at least two completions.
///
/// `records` must be in completion order, oldest first.
pub fn average_improvement(records: &[ReviewRecord]) -> f64 {
    // topic -> (first grade, last grade, count)
    let mut per_topic: BTreeMap<i64, (f64, f64, u32)> = BTreeMap::new();
    for r in records.iter().filter(|r| r.completed) {
        let entry = per_topic.entry(r.topic_id).or_insert((r.grade, r.grade, 0));
        entry.1 = r.grade;
        entry.2 += 1;
    }

    let deltas: Vec<f64> = per_topic
        .values()
        .filter(|(_, _, count)| *count >= 2)
        .map(|(first, last, _)| last - first)
        .collect();

    if deltas.is_empty() {
        return 0.0;
    }
    round_one_decimal(deltas.iter().sum::<f64>() / deltas.len() as f64)
}

/// Completions in the `days` calendar days ending with `today`.
pub fn completed_within(records: &[ReviewRecord], today: NaiveDate, days: u32) -> u32 {
    let Some(start) = today.checked_sub_days(Days::new(u64::from(days.saturating_sub(1)))) else {
        return records.len() as u32;
    };
    records
        .iter()
        .filter_map(|r| r.completed_date)
        .filter(|d| *d >= start && *d <= today)
        .count() as u32
}

/// Share of today's workload already done, in percent.
pub fn daily_progress(completed_today: u32, still_due: u32) -> f64 {
    let total = completed_today + still_due;
    if total == 0 {
        0.0
    } else {
        f64::from(completed_today) / f64::from(total) * 100.0
    }
}

pub struct StatsEngine<'a, G: ?Sized> {
    gateway: &'a G,
    horizon_days: u32,
}

impl<'a, G: PersistenceGateway + ?Sized> StatsEngine<'a, G> {
    pub fn new(gateway: &'a G, horizon_days: u32) -> Self {
        Self {
            gateway,
            horizon_days: horizon_days.max(1),
        }
    }

    /// Consecutive days with at least one completion, walking back from today.
    ///
    /// An empty today does not break the run. The walk looks at no more than
    /// `horizon_days` days.
    pub async fn current_streak(&self, today: NaiveDate) -> GatewayResult<u32> {
        let mut streak = 0;
        for offset in 0..self.horizon_days {
            let Some(date) = today.checked_sub_days(Days::new(u64::from(offset))) else {
                break;
            };
            let count = self.gateway.completed_count_on(date).await?;
            if count > 0 {
                streak += 1;
            } else if offset > 0 {
                break;
            }
        }
        Ok(streak)
    }

    pub async fn snapshot(&self, today: NaiveDate) -> GatewayResult<StatsSnapshot> {
        let state = self.gateway.engagement_state().await?;
        self.snapshot_with(today, &state).await
    }

    /// Snapshot using an engagement state the caller already holds.
    pub async fn snapshot_with(
        &self,
        today: NaiveDate,
        state: &EngagementState,
    ) -> GatewayResult<StatsSnapshot> {
        let completed = self.gateway.all_completed_reviews().await?;
        let streak = self.current_streak(today).await?;
        let still_due = self.gateway.pending_reviews_due(today).await?.len() as u32;
        let completed_today = completed_within(&completed, today, 1);

        let mut distribution = GradeDistribution::default();
        for r in &completed {
            distribution.record(r.grade);
        }

        let snapshot = StatsSnapshot {
            total_completed: completed.len() as u32,
            streak,
            best_streak: state.best_streak.max(streak),
            perfect_scores: completed.iter().filter(|r| r.grade >= PERFECT_GRADE).count() as u32,
            average_grade: average_grade(&completed),
            average_improvement: average_improvement(&completed),
            weekly_completed: completed_within(&completed, today, WEEK_DAYS),
            monthly_completed: completed_within(&completed, today, MONTH_DAYS),
            distribution,
            total_points: 0,
            level: 1,
            next_level: LevelProgress::from_points(0),
            daily_progress: daily_progress(completed_today, still_due),
        }
        .with_points(state.total_points);

        debug!(
            total = snapshot.total_completed,
            streak = snapshot.streak,
            perfect = snapshot.perfect_scores,
            "computed stats snapshot"
        );
        Ok(snapshot)
    }
}

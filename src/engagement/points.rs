//! Points earned per grading and the level curve derived from them.

use serde::{Deserialize, Serialize};

pub const POINTS_PER_LEVEL: u64 = 1000;
pub const BADGE_BONUS_POINTS: u64 = 100;

const STREAK_WEEK: u32 = 7;
const POINTS_PER_STREAK_WEEK: u64 = 5;

pub fn base_points(grade: f64) -> u64 {
    match grade {
        g if g >= 18.0 => 10,
        g if g >= 15.0 => 7,
        g if g >= 12.0 => 5,
        g if g >= 9.0 => 3,
        _ => 1,
    }
}

/// Base bracket points, plus twice the improvement over `previous` (rounded),
/// plus 5 points per full week of streak.
pub fn points_for_grade(grade: f64, previous: Option<f64>, streak: u32) -> u64 {
    let improvement = match previous {
        Some(prev) if grade > prev => (2.0 * (grade - prev)).round() as u64,
        _ => 0,
    };
    let streak_bonus = u64::from(streak / STREAK_WEEK) * POINTS_PER_STREAK_WEEK;

    base_points(grade) + improvement + streak_bonus
}

pub fn badge_bonus(new_badges: usize) -> u64 {
    new_badges as u64 * BADGE_BONUS_POINTS
}

pub fn level_for(points: u64) -> u32 {
    u32::try_from(points / POINTS_PER_LEVEL)
        .unwrap_or(u32::MAX - 1)
        .saturating_add(1)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LevelProgress {
    pub level: u32,
    pub current: u64,
    pub required: u64,
    pub percentage: f64,
}

impl LevelProgress {
    pub fn from_points(points: u64) -> Self {
        let current = points % POINTS_PER_LEVEL;
        Self {
            level: level_for(points),
            current,
            required: POINTS_PER_LEVEL,
            percentage: current as f64 / POINTS_PER_LEVEL as f64 * 100.0,
        }
    }
}

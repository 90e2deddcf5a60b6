//! Streaks, points, levels and badges derived from review history.

pub mod badges;
pub mod points;
pub mod stats;

pub use badges::{evaluate as evaluate_badges, BadgeDefinition, BADGE_CATALOG};
pub use points::{points_for_grade, LevelProgress};
pub use stats::{GradeDistribution, StatsEngine, StatsSnapshot};

//! Static badge catalog and unlock evaluation.

use std::collections::BTreeSet;

use super::stats::StatsSnapshot;
use crate::models::{BadgeId, BadgeTier};

pub struct BadgeDefinition {
    pub id: BadgeId,
    pub name: &'static str,
    pub description: &'static str,
    pub icon: &'static str,
    pub tier: BadgeTier,
    pub unlocks: fn(&StatsSnapshot) -> bool,
}

pub static BADGE_CATALOG: [BadgeDefinition; 9] = [
    BadgeDefinition {
        id: BadgeId::Streak7,
        name: "7 Days",
        description: "Reviewed 7 days in a row",
        icon: "🔥",
        tier: BadgeTier::Bronze,
        unlocks: |s| s.streak >= 7,
    },
    BadgeDefinition {
        id: BadgeId::Streak30,
        name: "30 Days",
        description: "Reviewed 30 days in a row",
        icon: "🔥",
        tier: BadgeTier::Silver,
        unlocks: |s| s.streak >= 30,
    },
    BadgeDefinition {
        id: BadgeId::Streak100,
        name: "100 Days",
        description: "Reviewed 100 days in a row",
        icon: "🔥",
        tier: BadgeTier::Gold,
        unlocks: |s| s.streak >= 100,
    },
    BadgeDefinition {
        id: BadgeId::PerfectScore,
        name: "Perfect",
        description: "First perfect score (20/20)",
        icon: "⭐",
        tier: BadgeTier::Gold,
        unlocks: |s| s.perfect_scores >= 1,
    },
    BadgeDefinition {
        id: BadgeId::Perfectionist,
        name: "Perfectionist",
        description: "10 perfect scores",
        icon: "👑",
        tier: BadgeTier::Gold,
        unlocks: |s| s.perfect_scores >= 10,
    },
    BadgeDefinition {
        id: BadgeId::Dedicated,
        name: "Dedicated",
        description: "50 reviews completed",
        icon: "📚",
        tier: BadgeTier::Bronze,
        unlocks: |s| s.total_completed >= 50,
    },
    BadgeDefinition {
        id: BadgeId::Scholar,
        name: "Scholar",
        description: "200 reviews completed",
        icon: "🎓",
        tier: BadgeTier::Gold,
        unlocks: |s| s.total_completed >= 200,
    },
    BadgeDefinition {
        id: BadgeId::Improver,
        name: "Improver",
        description: "Average improvement of 3 points",
        icon: "📈",
        tier: BadgeTier::Silver,
        unlocks: |s| s.average_improvement >= 3.0,
    },
    BadgeDefinition {
        id: BadgeId::Excellence,
        name: "Excellence",
        description: "Average improvement of 5 points",
        icon: "🏆",
        tier: BadgeTier::Gold,
        unlocks: |s| s.average_improvement >= 5.0,
    },
];

pub fn definition(id: BadgeId) -> &'static BadgeDefinition {
    BADGE_CATALOG
        .iter()
        .find(|b| b.id == id)
        .unwrap_or_else(|| unreachable!("every BadgeId has a catalog entry"))
}

/// Badges whose predicate holds and that are not yet in `already_unlocked`,
/// in catalog order.
pub fn evaluate(stats: &StatsSnapshot, already_unlocked: &BTreeSet<BadgeId>) -> Vec<BadgeId> {
    BADGE_CATALOG
        .iter()
        .filter(|b| !already_unlocked.contains(&b.id))
        .filter(|b| (b.unlocks)(stats))
        .map(|b| b.id)
        .collect()
}

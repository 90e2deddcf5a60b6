//! Operations exposed to the CLI: grading, agenda, exam planning.

use chrono::NaiveDate;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::CadenceConfig;
use crate::engagement::points::badge_bonus;
use crate::engagement::{evaluate_badges, points_for_grade, StatsEngine, StatsSnapshot};
use crate::error::{EngineError, PersistenceError, Result};
use crate::gateway::{GatewayResult, PersistenceGateway};
use crate::models::{BadgeId, EngagementState, NewReview, ReviewKind, ReviewRecord};
use crate::schedule::{
    check_submitted_grade, next_date, pre_exam_checkpoints, prioritize, CoefficientModel,
    IntervalScheduler,
};

/// Conditional engagement writes tried before giving up.
const ENGAGEMENT_ATTEMPTS: u32 = 5;

/// Result of one grading event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GradeOutcome {
    pub topic_id: i64,
    /// The pending review that was completed, if any.
    pub completed_review_id: Option<i64>,
    pub next_review_id: i64,
    pub next_interval: u32,
    pub next_date: NaiveDate,
    pub points_awarded: u64,
    pub bonus_points: u64,
    pub new_badges: Vec<BadgeId>,
    /// Set when the grade was saved but points/badges could not be updated.
    pub bookkeeping_error: Option<String>,
}

struct Bookkeeping {
    points_awarded: u64,
    bonus_points: u64,
    new_badges: Vec<BadgeId>,
}

pub struct Engine<G> {
    gateway: G,
    scheduler: IntervalScheduler,
    streak_horizon_days: u32,
    // Serializes engagement updates within this process; the revisioned
    // write in the store covers other processes
    engagement_lock: Mutex<()>,
}

impl<G: PersistenceGateway> Engine<G> {
    pub fn new(gateway: G, model: CoefficientModel, streak_horizon_days: u32) -> Self {
        Self {
            gateway,
            scheduler: IntervalScheduler::new(model),
            streak_horizon_days,
            engagement_lock: Mutex::new(()),
        }
    }

    pub fn from_config(gateway: G, config: &CadenceConfig) -> Self {
        Self::new(
            gateway,
            config.coefficient_model(),
            config.stats.streak_horizon_days,
        )
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn stats(&self) -> StatsEngine<'_, G> {
        StatsEngine::new(&self.gateway, self.streak_horizon_days)
    }

    /// Record `grade` for `topic_id` and schedule the next review.
    ///
    /// With `review_id`, that pending review is completed first. Without it
    /// this is the topic's initial assessment and only a new pending review
    /// is created.
    pub async fn submit_grade(
        &self,
        topic_id: i64,
        review_id: Option<i64>,
        grade: f64,
        today: NaiveDate,
    ) -> Result<GradeOutcome> {
        let grade = check_submitted_grade(grade)?;

        if self.gateway.topic(topic_id).await?.is_none() {
            return Err(EngineError::Consistency(format!(
                "topic {topic_id} does not exist"
            )));
        }

        let pending = match review_id {
            Some(id) => Some(self.pending_review_of(topic_id, id).await?),
            None => None,
        };

        let (current_interval, previous_grade, history) = match &pending {
            Some(review) => (
                review.interval_days,
                Some(review.grade),
                self.gateway.completed_reviews(topic_id).await?,
            ),
            None => (0, None, Vec::new()),
        };

        let next_interval = self
            .scheduler
            .next_interval(current_interval, grade, &history)?;
        let next_date = next_date(today, next_interval)?;
        let next = NewReview {
            topic_id,
            grade,
            scheduled_date: next_date,
            interval_days: next_interval,
            kind: ReviewKind::Normal,
        };

        let next_review_id = match &pending {
            Some(review) => {
                self.gateway
                    .complete_and_reschedule(review.id, grade, today, &next)
                    .await
                    .map_err(|e| match e {
                        PersistenceError::NotPending(id) => EngineError::Consistency(format!(
                            "review {id} is already completed"
                        )),
                        other => other.into(),
                    })?
            }
            None => self.gateway.append_review(&next).await?,
        };

        info!(
            topic_id,
            grade, next_interval, %next_date, "grade recorded"
        );

        let mut outcome = GradeOutcome {
            topic_id,
            completed_review_id: review_id,
            next_review_id,
            next_interval,
            next_date,
            points_awarded: 0,
            bonus_points: 0,
            new_badges: Vec::new(),
            bookkeeping_error: None,
        };

        match self.update_engagement(grade, previous_grade, today).await {
            Ok(book) => {
                outcome.points_awarded = book.points_awarded;
                outcome.bonus_points = book.bonus_points;
                outcome.new_badges = book.new_badges;
            }
            Err(e) => {
                warn!(topic_id, error = %e, "engagement update failed after grade was saved");
                outcome.bookkeeping_error = Some(e.to_string());
            }
        }

        Ok(outcome)
    }

    async fn pending_review_of(&self, topic_id: i64, review_id: i64) -> Result<ReviewRecord> {
        let review = self
            .gateway
            .review(review_id)
            .await?
            .ok_or_else(|| EngineError::Consistency(format!("review {review_id} does not exist")))?;

        if review.topic_id != topic_id {
            return Err(EngineError::Consistency(format!(
                "review {review_id} belongs to topic {}, not {topic_id}",
                review.topic_id
            )));
        }
        if review.completed {
            return Err(EngineError::Consistency(format!(
                "review {review_id} is already completed"
            )));
        }
        Ok(review)
    }

    async fn update_engagement(
        &self,
        grade: f64,
        previous_grade: Option<f64>,
        today: NaiveDate,
    ) -> GatewayResult<Bookkeeping> {
        let _guard = self.engagement_lock.lock().await;

        for attempt in 1..=ENGAGEMENT_ATTEMPTS {
            let (state, revision) = self.gateway.engagement_with_revision().await?;
            let (state, book) = self.credit(state, grade, previous_grade, today).await?;

            if !self
                .gateway
                .replace_engagement_state(&state, revision)
                .await?
            {
                debug!(attempt, revision, "engagement written concurrently, recomputing");
                continue;
            }

            if !book.new_badges.is_empty() {
                info!(badges = ?book.new_badges, bonus_points = book.bonus_points, "badges unlocked");
            }
            debug!(
                points_awarded = book.points_awarded,
                total = state.total_points,
                streak = state.streak_days,
                "engagement updated"
            );
            return Ok(book);
        }

        Err(PersistenceError::EngagementContended(ENGAGEMENT_ATTEMPTS))
    }

    /// Apply one grading event to `state`. Pure apart from the stats reads.
    async fn credit(
        &self,
        mut state: EngagementState,
        grade: f64,
        previous_grade: Option<f64>,
        today: NaiveDate,
    ) -> GatewayResult<(EngagementState, Bookkeeping)> {
        let stats = self.stats().snapshot_with(today, &state).await?;

        let points_awarded = points_for_grade(grade, previous_grade, stats.streak);
        state.total_points = state.total_points.saturating_add(points_awarded);
        state.streak_days = stats.streak;
        state.best_streak = state.best_streak.max(stats.streak);
        state.last_activity_date = Some(today);

        let stats = refreshed(stats, &state);
        let new_badges = evaluate_badges(&stats, &state.unlocked_badges);
        let bonus_points = badge_bonus(new_badges.len());
        state.total_points = state.total_points.saturating_add(bonus_points);
        state.unlocked_badges.extend(new_badges.iter().copied());

        Ok((
            state,
            Bookkeeping {
                points_awarded,
                bonus_points,
                new_badges,
            },
        ))
    }

    /// Pending reviews due on or before `date`, most urgent first.
    pub async fn prioritized_agenda(&self, date: NaiveDate) -> Result<Vec<ReviewRecord>> {
        let pending = self.gateway.pending_reviews_due(date).await?;
        Ok(prioritize(pending, date))
    }

    /// Create the pre-exam checkpoint reviews for every active topic of a unit.
    ///
    /// Checkpoints already on record for a topic and date, pending or done,
    /// are skipped, so calling this repeatedly is harmless.
    pub async fn plan_exam_checkpoints(
        &self,
        study_unit_id: i64,
        today: NaiveDate,
    ) -> Result<Vec<ReviewRecord>> {
        let unit = self.gateway.study_unit(study_unit_id).await?.ok_or_else(|| {
            EngineError::Consistency(format!("study unit {study_unit_id} does not exist"))
        })?;

        let Some(exam_date) = unit.exam_date.filter(|_| unit.active) else {
            debug!(study_unit_id, "no exam to plan for");
            return Ok(Vec::new());
        };

        let checkpoints = pre_exam_checkpoints(exam_date, unit.pre_exam_days, today);
        let mut created = Vec::new();

        for topic in self.gateway.topics_for_unit(study_unit_id).await? {
            let pending = self.gateway.pending_reviews_for_topic(topic.id).await?;
            let completed = self.gateway.completed_reviews(topic.id).await?;
            let grade = completed
                .last()
                .or_else(|| pending.last())
                .map_or(0.0, |r| r.grade);

            for checkpoint in &checkpoints {
                let exists = pending
                    .iter()
                    .chain(&completed)
                    .any(|r| r.is_pre_exam() && r.scheduled_date == checkpoint.date);
                if exists {
                    continue;
                }

                let review = NewReview {
                    topic_id: topic.id,
                    grade,
                    scheduled_date: checkpoint.date,
                    interval_days: checkpoint.days_before,
                    kind: checkpoint.kind,
                };
                let id = self.gateway.append_review(&review).await?;
                created.push(ReviewRecord {
                    id,
                    topic_id: review.topic_id,
                    grade: review.grade,
                    scheduled_date: review.scheduled_date,
                    completed_date: None,
                    interval_days: review.interval_days,
                    completed: false,
                    kind: review.kind,
                });
            }
        }

        info!(study_unit_id, %exam_date, created = created.len(), "planned exam checkpoints");
        Ok(created)
    }

    /// Zero points and streaks and forget every unlocked badge.
    pub async fn reset_engagement(&self) -> Result<()> {
        let _guard = self.engagement_lock.lock().await;
        self.gateway
            .set_engagement_state(&EngagementState::default())
            .await?;
        info!("engagement reset");
        Ok(())
    }
}

fn refreshed(stats: StatsSnapshot, state: &EngagementState) -> StatsSnapshot {
    let mut stats = stats.with_points(state.total_points);
    stats.best_streak = state.best_streak;
    stats
}

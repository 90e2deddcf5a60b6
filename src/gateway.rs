//! Persistence seam consumed by the engine and the stats engine.
//!
//! Implementations may block on I/O; every query is therefore async and
//! callers await it before relying on the result.

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::PersistenceError;
use crate::models::{EngagementState, NewReview, ReviewRecord, StudyUnit, Topic};

pub type GatewayResult<T> = std::result::Result<T, PersistenceError>;

#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Completed reviews of one topic, oldest completion first.
    async fn completed_reviews(&self, topic_id: i64) -> GatewayResult<Vec<ReviewRecord>>;

    /// Every completed review, oldest completion first.
    async fn all_completed_reviews(&self) -> GatewayResult<Vec<ReviewRecord>>;

    async fn completed_count_on(&self, date: NaiveDate) -> GatewayResult<u32>;

    async fn active_study_units(&self) -> GatewayResult<Vec<StudyUnit>>;

    async fn study_unit(&self, id: i64) -> GatewayResult<Option<StudyUnit>>;

    async fn topic(&self, id: i64) -> GatewayResult<Option<Topic>>;

    /// Active topics of a study unit.
    async fn topics_for_unit(&self, study_unit_id: i64) -> GatewayResult<Vec<Topic>>;

    async fn review(&self, id: i64) -> GatewayResult<Option<ReviewRecord>>;

    /// Pending reviews scheduled on or before `date`, for active topics only.
    async fn pending_reviews_due(&self, date: NaiveDate) -> GatewayResult<Vec<ReviewRecord>>;

    /// All pending reviews of one topic, earliest scheduled first.
    async fn pending_reviews_for_topic(&self, topic_id: i64) -> GatewayResult<Vec<ReviewRecord>>;

    async fn engagement_state(&self) -> GatewayResult<EngagementState>;

    /// The engagement aggregate and an opaque revision that changes on
    /// every write, from any process sharing the store.
    async fn engagement_with_revision(&self) -> GatewayResult<(EngagementState, u64)>;

    /// Unconditional overwrite.
    async fn set_engagement_state(&self, state: &EngagementState) -> GatewayResult<()>;

    /// Compare-and-swap: write `state` only if the stored revision still
    /// equals `expected_revision`. Returns false when another writer won.
    async fn replace_engagement_state(
        &self,
        state: &EngagementState,
        expected_revision: u64,
    ) -> GatewayResult<bool>;

    async fn append_review(&self, review: &NewReview) -> GatewayResult<i64>;

    async fn mark_review_completed(
        &self,
        id: i64,
        grade: f64,
        completed_date: NaiveDate,
    ) -> GatewayResult<()>;

    /// Complete `id` and append `next` as one unit of work.
    ///
    /// The default runs the two steps back to back; stores with transactions
    /// should override it so neither write can land without the other.
    async fn complete_and_reschedule(
        &self,
        id: i64,
        grade: f64,
        completed_date: NaiveDate,
        next: &NewReview,
    ) -> GatewayResult<i64> {
        self.mark_review_completed(id, grade, completed_date).await?;
        self.append_review(next).await
    }
}

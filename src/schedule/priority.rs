//! Display order for pending reviews.

use std::cmp::Ordering;

use chrono::NaiveDate;

use super::exam::Priority;
use crate::models::ReviewRecord;

/// Overdue first, then pre-exam, then weakest grade, then oldest date.
pub fn compare_reviews(a: &ReviewRecord, b: &ReviewRecord, today: NaiveDate) -> Ordering {
    b.is_overdue(today)
        .cmp(&a.is_overdue(today))
        .then_with(|| Priority::from(a.kind).cmp(&Priority::from(b.kind)))
        .then_with(|| a.grade.total_cmp(&b.grade))
        .then_with(|| a.scheduled_date.cmp(&b.scheduled_date))
}

/// Stable sort, so fully equal keys keep their input order.
pub fn prioritize(mut reviews: Vec<ReviewRecord>, today: NaiveDate) -> Vec<ReviewRecord> {
    reviews.sort_by(|a, b| compare_reviews(a, b, today));
    reviews
}

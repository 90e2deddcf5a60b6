//! Pure, synchronous scheduling functions.
//!
//! Nothing in here touches persistence or shared state, so every function
//! can be called from any thread with only its arguments.

pub mod coefficient;
pub mod exam;
pub mod interval;
pub mod priority;

pub use coefficient::{check_grade_range, check_submitted_grade, CoefficientModel};
pub use exam::{is_pre_exam_window, pre_exam_checkpoints, Checkpoint, Priority};
pub use interval::{next_date, next_date_iso, parse_iso_date, IntervalScheduler, INTERVAL_LADDER};
pub use priority::{compare_reviews, prioritize};

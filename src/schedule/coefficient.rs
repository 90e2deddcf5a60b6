//! Grade to interval-multiplier mapping.
//!
//! The curve has three pieces split by the elimination threshold `E` and the
//! base threshold `B`:
//!
//! - `grade <= E`: `0.2 + (grade / E) * 0.2`, from 0.2 to 0.4
//! - `E < grade < B`: `0.4 + ((grade - E) / (B - E)) * 0.6`, from 0.4 to 1.0
//! - `grade >= B`: `1.0 + ((grade - B) / (20 - B))^1.5 * 1.5`, from 1.0 to 2.5
//!
//! The pieces meet at `E` (0.4) and `B` (1.0), so the curve is continuous and
//! non-decreasing over the whole grade range.

use crate::error::ValidationError;

pub const MIN_GRADE: f64 = 0.0;
pub const MAX_GRADE: f64 = 20.0;

pub const DEFAULT_ELIMINATION_THRESHOLD: f64 = 9.0;
pub const DEFAULT_BASE_THRESHOLD: f64 = 12.0;

/// Reject grades outside `[0, 20]` (and NaN).
pub fn check_grade_range(grade: f64) -> Result<f64, ValidationError> {
    if grade.is_finite() && (MIN_GRADE..=MAX_GRADE).contains(&grade) {
        Ok(grade)
    } else {
        Err(ValidationError::GradeOutOfRange(grade))
    }
}

/// Grades entered by the learner: in range and at most one decimal digit.
pub fn check_submitted_grade(grade: f64) -> Result<f64, ValidationError> {
    let grade = check_grade_range(grade)?;
    let tenths = grade * 10.0;
    if (tenths.round() - tenths).abs() > 1e-9 {
        return Err(ValidationError::GradePrecision(grade));
    }
    Ok(grade)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoefficientModel {
    elimination: f64,
    base: f64,
}

impl Default for CoefficientModel {
    fn default() -> Self {
        Self {
            elimination: DEFAULT_ELIMINATION_THRESHOLD,
            base: DEFAULT_BASE_THRESHOLD,
        }
    }
}

impl CoefficientModel {
    /// Returns `None` unless `0 < elimination < base < 20`.
    pub fn new(elimination: f64, base: f64) -> Option<Self> {
        let valid = elimination.is_finite()
            && base.is_finite()
            && elimination > MIN_GRADE
            && elimination < base
            && base < MAX_GRADE;
        valid.then_some(Self { elimination, base })
    }

    pub fn elimination_threshold(&self) -> f64 {
        self.elimination
    }

    pub fn base_threshold(&self) -> f64 {
        self.base
    }

    pub fn coefficient(&self, grade: f64) -> Result<f64, ValidationError> {
        let grade = check_grade_range(grade)?;

        let value = if grade <= self.elimination {
            0.2 + (grade / self.elimination) * 0.2
        } else if grade < self.base {
            let normalized = (grade - self.elimination) / (self.base - self.elimination);
            0.4 + normalized * 0.6
        } else {
            let normalized = (grade - self.base) / (MAX_GRADE - self.base);
            1.0 + normalized.powf(1.5) * 1.5
        };

        Ok(value)
    }
}

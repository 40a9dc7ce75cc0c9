//! Result of one grading-scale calculation.

use serde::{Deserialize, Serialize};

use crate::limits::{GRADE_TIERS, MAX_NAME_LENGTH, MAX_STUDENTS};

/// Point range that maps to a single grade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeBound {
    /// Grade (1 = best, 5 = failing).
    pub grade: u8,
    /// Lowest point value that still earns this grade.
    pub lower_bound: f64,
    /// Highest point value within this grade.
    pub upper_bound: f64,
}

/// A graded student.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentGrade {
    pub name: String,
    pub points: f64,
    pub grade: u8,
}

/// Full result set of one calculation.
///
/// Stored by value per session and never mutated after it is stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeReport {
    /// Maximum reachable points.
    pub max_points: u32,
    /// Minimum points required to pass.
    pub min_points: f64,
    /// Percentage at which the scale breaks from linear to the passing threshold.
    pub break_point_percent: f64,
    /// Five-tier grading scale, best grade first.
    pub grade_bounds: Vec<GradeBound>,
    /// Optional per-student grades.
    #[serde(default)]
    pub students: Vec<StudentGrade>,
    /// Average grade over all students, if any were graded.
    #[serde(default)]
    pub average_grade: Option<f64>,
}

impl GradeReport {
    /// Whether the report carries per-student grades.
    pub fn has_students(&self) -> bool {
        !self.students.is_empty()
    }

    /// Check the report against the input limits.
    ///
    /// Returns a human-readable reason when the report is rejected.
    pub fn validate(&self) -> Result<(), String> {
        if self.grade_bounds.len() != GRADE_TIERS {
            return Err(format!(
                "expected {} grade bounds, got {}",
                GRADE_TIERS,
                self.grade_bounds.len()
            ));
        }
        if self.students.len() > MAX_STUDENTS {
            return Err(format!(
                "too many students: {} (max: {})",
                self.students.len(),
                MAX_STUDENTS
            ));
        }
        if let Some(student) = self
            .students
            .iter()
            .find(|s| s.name.chars().count() > MAX_NAME_LENGTH)
        {
            return Err(format!(
                "student name too long: {} characters (max: {})",
                student.name.chars().count(),
                MAX_NAME_LENGTH
            ));
        }
        Ok(())
    }
}

//! Input limits applied to submitted reports.

/// Maximum number of students accepted in one report.
pub const MAX_STUDENTS: usize = 10_000;

/// Maximum length of a student name, in characters.
pub const MAX_NAME_LENGTH: usize = 200;

/// Number of tiers in a grading scale (grades 1 through 5).
pub const GRADE_TIERS: usize = 5;

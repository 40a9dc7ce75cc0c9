//! Shared types for the Notenschluessel grading tool.
//!
//! The grade calculation itself lives outside this workspace; these types are
//! the shape of its output as it is stored per session and served back for
//! download.

pub mod limits;
pub mod report;

pub use report::{GradeBound, GradeReport, StudentGrade};

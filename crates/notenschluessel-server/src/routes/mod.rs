//! API routes.

pub mod health;
pub mod results;

pub use health::{HealthResponse, health_routes};
pub use results::{
    SubmitResponse, delete_result_handler, get_result_handler, result_routes,
    submit_result_handler,
};

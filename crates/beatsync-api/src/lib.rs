//! Axum HTTP gateway for BeatSync video processing.
//!
//! This crate provides:
//! - Upload intake, validation and synchronous dispatch to the processor
//! - Download and cleanup of processed videos by job id
//! - Security headers, request ids and request logging
//! - Prometheus metrics

pub mod config;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use services::JobService;
pub use state::AppState;

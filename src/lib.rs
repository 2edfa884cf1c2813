//! Equipment rental scheduling server
//!
//! Reservation and recurrence scheduling core for equipment rental: availability
//! checks, the booking lifecycle, recurring series and their occurrences, behind
//! a REST JSON API.

use std::sync::Arc;

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: Arc<services::Services>,
}

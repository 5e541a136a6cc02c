//! Library Lending Server
//!
//! REST JSON API for a school library: catalog management, borrow requests
//! approved by librarians, and a first-come first-served reservation queue
//! that hands returned copies to the next student in line.

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

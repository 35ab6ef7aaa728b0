//! Libris campus library server
//!
//! Reservation, borrowing and return lifecycle engine with penalty
//! assessment, exposed as a REST JSON API.

use std::sync::Arc;

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

use repository::Repository;
use services::{
    clock::Clock,
    effects::{AuditSink, EffectDispatcher, NotificationSink},
    Services,
};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: Arc<Services>,
}

impl AppState {
    /// Wire services over a repository and the given collaborators
    pub fn new(
        config: AppConfig,
        repository: Repository,
        notifier: Arc<dyn NotificationSink>,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let dispatcher = EffectDispatcher::new(notifier, audit, clock.clone());
        let services = Services::new(repository, &config, clock, dispatcher);
        Self {
            config: Arc::new(config),
            services: Arc::new(services),
        }
    }
}

//src/health.rs
//! Contract for the platform health-data bridge.
//!
//! The bridge is optional and best-effort: the session core never blocks on
//! it, and a failed export is reported, not retried. Implementations live in
//! the platform layer; tests substitute a recording double.

use crate::models::Workout;
use chrono::NaiveDate;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authorization {
    Authorized,
    Denied,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum HealthBridgeError {
    #[error("Health data access not authorized")]
    NotAuthorized,
    #[error("Workout must be completed before syncing to health data")]
    WorkoutNotComplete,
    #[error("Health bridge failure: {0}")]
    Bridge(String),
}

/// Daily activity metrics, read for display only.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DailyMetrics {
    pub steps: u32,
    pub active_calories: f64,
    pub avg_heart_rate: Option<u32>,
    pub distance_m: f64,
}

pub trait HealthBridge {
    fn request_authorization(&mut self) -> Result<Authorization, HealthBridgeError>;

    /// Exports a completed workout. Callers must check the completion
    /// precondition first; implementations may assume it holds.
    fn save_completed_workout(&mut self, workout: &Workout) -> Result<(), HealthBridgeError>;

    fn fetch_daily_metrics(&self, date: NaiveDate) -> Result<DailyMetrics, HealthBridgeError>;
}

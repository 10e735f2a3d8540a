pub mod client;
pub mod db;
pub mod error;
pub mod http;
pub mod models;
pub mod tracking;

pub use client::{TimerEngine, TimerRegistry, TrackerApi};
pub use db::Database;
pub use error::{TrackerError, TrackerResult};
pub use tracking::{Principal, TimeTrackingService};

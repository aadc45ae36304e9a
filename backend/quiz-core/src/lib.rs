//! Test session and weakness diagnosis engine.
//!
//! Drives learners through sampled question batches with at-most-once answer
//! recording, keeps the mistake ledger and favorites, aggregates accuracy and
//! history, and uses an injected text-generation oracle to diagnose weak
//! topics and explain single questions.

pub mod config;
pub mod error;
pub mod metrics;
pub mod models;
pub mod oracle;
pub mod services;
pub mod store;
pub mod telemetry;
pub mod utils;

pub use config::Config;
pub use error::{QuizError, QuizResult};
pub use services::AppState;

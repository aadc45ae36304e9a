//! Text-generation oracle behind diagnoses and question explanations.

use async_trait::async_trait;

pub mod chat_completion;

pub use chat_completion::{ChatCompletionOracle, OracleError};

/// Prefix of the text returned when the oracle could not be reached.
pub const ORACLE_ERROR_PREFIX: &str = "錯誤：";

/// Sends a prompt and returns free text.
///
/// Implementations never fail: transport or API problems come back as a
/// human-readable error string starting with [`ORACLE_ERROR_PREFIX`].
#[async_trait]
pub trait Oracle: Send + Sync {
    async fn send(&self, prompt: &str) -> String;
}

pub fn error_text(reason: impl std::fmt::Display) -> String {
    format!("{}{}", ORACLE_ERROR_PREFIX, reason)
}

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::fmt;

use super::{AnswerRecord, Topic};

/// 1-based position of a question inside its session, or unknown when the
/// session's question order is no longer available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestionPosition {
    At(usize),
    Unknown,
}

impl QuestionPosition {
    pub fn within(order: &[String], question_id: &str) -> Self {
        order
            .iter()
            .position(|id| id == question_id)
            .map(|index| QuestionPosition::At(index + 1))
            .unwrap_or(QuestionPosition::Unknown)
    }
}

impl fmt::Display for QuestionPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuestionPosition::At(n) => write!(f, "{}", n),
            QuestionPosition::Unknown => f.write_str("?"),
        }
    }
}

// Serialized as a number, or "?" when unknown.
impl Serialize for QuestionPosition {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            QuestionPosition::At(n) => serializer.serialize_u64(*n as u64),
            QuestionPosition::Unknown => serializer.serialize_str("?"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WrongAnswerEntry {
    pub position: QuestionPosition,
    pub record: AnswerRecord,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub total: usize,
    pub correct: usize,
    pub accuracy: f64,
    pub wrong_answers: Vec<WrongAnswerEntry>,
}

/// One row of a learner's test history.
#[derive(Debug, Clone, Serialize)]
pub struct SessionHistoryEntry {
    pub session_id: String,
    /// Earliest answer timestamp of the session.
    pub taken_at: DateTime<Utc>,
    /// `None` when the representative question no longer exists.
    pub topic: Option<Topic>,
    pub total: usize,
    pub correct: usize,
    pub accuracy: f64,
}

/// `round(correct / total * 100, 2)`, 0 for an empty session.
pub fn accuracy_percent(correct: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let raw = correct as f64 / total as f64 * 100.0;
    (raw * 100.0).round() / 100.0
}

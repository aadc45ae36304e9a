use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::reporting::QuestionPosition;
use super::{Question, Topic};
use crate::error::{QuizError, QuizResult};

#[derive(Debug, Clone, Deserialize)]
pub struct StartSessionRequest {
    pub learner_id: String,
    pub topic: Topic,
    pub count: usize,
    #[serde(default)]
    pub mode: String,
    /// When false, generated questions are excluded from the pool.
    #[serde(default = "default_include_generated")]
    pub include_generated: bool,
}

fn default_include_generated() -> bool {
    true
}

/// Transient state of one attempt. Owned by the caller (web session, client
/// storage); the core only reads and updates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionBundle {
    pub session_id: String,
    pub learner_id: String,
    pub topic: Topic,
    pub requested_count: usize,
    /// Sampled order, fixed for the lifetime of the session.
    pub question_ids: Vec<String>,
    pub mode: String,
    pub include_generated: bool,
    /// question id -> last selected option key
    #[serde(default)]
    pub answers: BTreeMap<String, String>,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    InProgress,
    Completed,
}

impl SessionBundle {
    pub fn len(&self) -> usize {
        self.question_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.question_ids.is_empty()
    }

    /// `IndexOutOfRange` doubles as the completion signal.
    pub fn question_id_at(&self, index: usize) -> QuizResult<&str> {
        self.question_ids
            .get(index)
            .map(String::as_str)
            .ok_or(QuizError::IndexOutOfRange {
                index,
                len: self.len(),
            })
    }

    pub fn phase_at(&self, index: usize) -> SessionPhase {
        if index < self.len() {
            SessionPhase::InProgress
        } else {
            SessionPhase::Completed
        }
    }

    /// 1-based position in the sampled order.
    pub fn position_of(&self, question_id: &str) -> QuestionPosition {
        QuestionPosition::within(&self.question_ids, question_id)
    }

    /// Index that follows `question_id`, `None` at the end or when absent.
    pub fn next_index(&self, question_id: &str) -> Option<usize> {
        let index = self.question_ids.iter().position(|id| id == question_id)?;
        let next = index + 1;
        (next < self.len()).then_some(next)
    }

    pub fn selected_for(&self, question_id: &str) -> Option<&str> {
        self.answers.get(question_id).map(String::as_str)
    }
}

/// What the caller renders for the current step.
#[derive(Debug, Clone, Serialize)]
pub struct CurrentQuestion {
    pub index: usize,
    pub total: usize,
    pub question: Question,
    pub selected: Option<String>,
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::mistake::WrongQuestion;

/// One answer event. At most one exists per (learner, question, session).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub learner_id: String,
    pub question_id: String,
    pub session_id: String,
    pub selected_option: String,
    pub correct: bool,
    #[serde(with = "super::bson_datetime_as_chrono")]
    pub created_at: DateTime<Utc>,
}

/// Result of an insert-if-absent on the answer key.
#[derive(Debug, Clone)]
pub enum AnswerInsert {
    Inserted(AnswerRecord),
    /// Another submission for the same key won; carries the stored record.
    Existing(AnswerRecord),
}

/// Result of writing an answer together with its ledger side effect.
///
/// `wrong_question` is only set for `AnswerInsert::Inserted`: a refreshed
/// entry for a wrong answer, or the entry that a correct answer just fixed.
#[derive(Debug, Clone)]
pub struct AnswerWrite {
    pub insert: AnswerInsert,
    pub wrong_question: Option<WrongQuestion>,
}

impl AnswerWrite {
    pub fn existing(record: AnswerRecord) -> Self {
        Self {
            insert: AnswerInsert::Existing(record),
            wrong_question: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AnswerOutcome {
    pub question_id: String,
    pub selected_option: String,
    pub correct: bool,
    pub correct_option: String,
    /// True when the answer had already been recorded for this session.
    pub replayed: bool,
    /// Ledger entry touched by this answer, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wrong_question: Option<WrongQuestion>,
}

impl AnswerOutcome {
    pub fn replay(record: &AnswerRecord, correct_option: &str) -> Self {
        Self {
            question_id: record.question_id.clone(),
            selected_option: record.selected_option.clone(),
            correct: record.correct,
            correct_option: correct_option.to_string(),
            replayed: true,
            wrong_question: None,
        }
    }
}

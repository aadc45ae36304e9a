use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Question;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExplanationSource {
    /// Served from the per-question cache.
    Cache,
    /// Fresh oracle answer, now cached.
    Oracle,
    /// Oracle failed; the text is its error message and nothing was cached.
    Unavailable,
}

impl ExplanationSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExplanationSource::Cache => "cache",
            ExplanationSource::Oracle => "oracle",
            ExplanationSource::Unavailable => "unavailable",
        }
    }
}

/// Oracle-written explanation of a question, cached once per question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    #[serde(rename = "_id")]
    pub question_id: String,
    pub text: String,
    pub source: ExplanationSource,
    #[serde(with = "super::bson_datetime_as_chrono")]
    pub created_at: DateTime<Utc>,
}

/// Everything the explanation page of one session question shows.
#[derive(Debug, Clone, Serialize)]
pub struct ExplanationPage {
    pub question: Question,
    /// The learner's selection in this session, if answered.
    pub selected: Option<String>,
    pub explanation: Explanation,
    pub is_favorite: bool,
    /// Index of the following session question; `None` on the last one.
    pub next_index: Option<usize>,
}

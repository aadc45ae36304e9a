use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Topic;

/// Mistake ledger entry, unique per (learner, question).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WrongQuestion {
    #[serde(rename = "_id")]
    pub id: String,
    pub learner_id: String,
    pub question_id: String,
    /// Copied from the question so the ledger can be filtered without a join.
    pub topic: Topic,
    /// Learner has reviewed the mistake.
    pub confirmed: bool,
    /// Learner has since answered the question correctly.
    #[serde(default)]
    pub fixed: bool,
    #[serde(with = "super::bson_datetime_as_chrono")]
    pub last_wrong_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(with = "super::bson_datetime_as_chrono")]
    pub created_at: DateTime<Utc>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "super::bson_datetime_as_chrono_option"
    )]
    pub fixed_at: Option<DateTime<Utc>>,
}

/// Diagnosed weakness, unique per (learner, category).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeakTopic {
    #[serde(rename = "_id")]
    pub id: String,
    pub learner_id: String,
    pub category: String,
    #[serde(with = "super::bson_datetime_as_chrono")]
    pub last_diagnosed: DateTime<Utc>,
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Starred question, unique per (learner, question).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Favorite {
    #[serde(rename = "_id")]
    pub id: String,
    pub learner_id: String,
    pub question_id: String,
    #[serde(with = "super::bson_datetime_as_chrono")]
    pub created_at: DateTime<Utc>,
}

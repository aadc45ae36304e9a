use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub mod answer;
pub mod diagnosis;
pub mod explanation;
pub mod favorite;
pub mod mistake;
pub mod reporting;
pub mod session;

pub use answer::{AnswerInsert, AnswerOutcome, AnswerRecord, AnswerWrite};
pub use diagnosis::{DiagnosisOutcome, DiagnosisReport};
pub use explanation::{Explanation, ExplanationPage, ExplanationSource};
pub use favorite::Favorite;
pub use mistake::{WeakTopic, WrongQuestion};
pub use reporting::{QuestionPosition, SessionHistoryEntry, SessionSummary, WrongAnswerEntry};
pub use session::{CurrentQuestion, SessionBundle, StartSessionRequest};

/// Question bank topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    Vocab,
    Grammar,
    Cloze,
    Reading,
}

impl Topic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::Vocab => "vocab",
            Topic::Grammar => "grammar",
            Topic::Cloze => "cloze",
            Topic::Reading => "reading",
        }
    }

    pub fn all() -> &'static [Topic] {
        &[Topic::Vocab, Topic::Grammar, Topic::Cloze, Topic::Reading]
    }

    /// Parses a listing filter. `None`, `"all"` and unknown labels mean "no filter".
    pub fn from_filter(raw: Option<&str>) -> Option<Topic> {
        match raw.map(str::trim) {
            None | Some("") | Some("all") => None,
            Some(value) => value.parse().ok(),
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Topic {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "vocab" => Ok(Topic::Vocab),
            "grammar" => Ok(Topic::Grammar),
            "cloze" => Ok(Topic::Cloze),
            "reading" => Ok(Topic::Reading),
            other => Err(format!("Unknown topic: {}", other)),
        }
    }
}

/// Who wrote the question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    #[default]
    Authored,
    Generated,
}

/// Multiple-choice question. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    #[serde(rename = "_id")]
    pub id: String,
    pub content: String,
    /// Option key (single letter) -> option text, ordered by key.
    pub options: BTreeMap<String, String>,
    /// Key of the correct option.
    pub answer: String,
    pub topic: Topic,
    #[serde(default)]
    pub provenance: Provenance,
    #[serde(with = "bson_datetime_as_chrono")]
    pub created_at: DateTime<Utc>,
}

impl Question {
    pub fn is_correct(&self, selected_key: &str) -> bool {
        self.answer == selected_key
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LearnerRole {
    #[default]
    Student,
    Admin,
}

/// Identity the core trusts; credentials live elsewhere.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Learner {
    #[serde(rename = "_id")]
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub role: LearnerRole,
}

// Serde converters for chrono::DateTime <-> mongodb::bson::DateTime
pub(crate) mod bson_datetime_as_chrono {
    use chrono::{DateTime, Utc};
    use mongodb::bson;
    use serde::{de::Error, Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let bson_dt = bson::DateTime::from_millis(date.timestamp_millis());
        bson_dt.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bson_dt = bson::DateTime::deserialize(deserializer)?;
        DateTime::from_timestamp_millis(bson_dt.timestamp_millis())
            .ok_or_else(|| D::Error::custom("timestamp out of range"))
    }
}

pub(crate) mod bson_datetime_as_chrono_option {
    use chrono::{DateTime, Utc};
    use mongodb::bson;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(date: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match date {
            Some(d) => {
                let bson_dt = bson::DateTime::from_millis(d.timestamp_millis());
                serializer.serialize_some(&bson_dt)
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opt_bson_dt: Option<bson::DateTime> = Option::deserialize(deserializer)?;
        opt_bson_dt
            .map(|bson_dt| {
                DateTime::from_timestamp_millis(bson_dt.timestamp_millis())
                    .ok_or_else(|| D::Error::custom("timestamp out of range"))
            })
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_filter_treats_all_as_unfiltered() {
        assert_eq!(Topic::from_filter(None), None);
        assert_eq!(Topic::from_filter(Some("all")), None);
        assert_eq!(Topic::from_filter(Some("Grammar")), Some(Topic::Grammar));
        assert_eq!(Topic::from_filter(Some("listening")), None);
    }

    #[test]
    fn correctness_is_exact_key_match() {
        let question = Question {
            id: "q1".to_string(),
            content: "She ___ to school yesterday.".to_string(),
            options: BTreeMap::from([
                ("A".to_string(), "go".to_string()),
                ("B".to_string(), "went".to_string()),
            ]),
            answer: "B".to_string(),
            topic: Topic::Grammar,
            provenance: Provenance::Authored,
            created_at: Utc::now(),
        };
        assert!(question.is_correct("B"));
        assert!(!question.is_correct("A"));
        assert!(!question.is_correct("b"));
    }
}

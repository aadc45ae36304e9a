//! Persistence gateway.
//!
//! The core needs create, get, filter-by-key and upsert-by-key operations.
//! Implementations must keep these keys unique:
//! - answer records: (learner, question, session)
//! - wrong questions: (learner, question)
//! - weak topics: (learner, category)
//! - favorites: (learner, question)
//! - explanations: question
//!
//! `create_answer_record` is an atomic insert-if-absent on its key: when two
//! submissions race, exactly one gets `AnswerInsert::Inserted`.
//! `record_answer` does the same insert and its mistake-ledger side effect
//! as one all-or-nothing step.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{
    AnswerInsert, AnswerRecord, AnswerWrite, Explanation, Favorite, Learner, Question, Topic,
    WeakTopic, WrongQuestion,
};

pub mod memory;
pub mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

/// Answer records of one session, in creation order.
#[derive(Debug, Clone)]
pub struct SessionRecords {
    pub session_id: String,
    pub records: Vec<AnswerRecord>,
}

impl SessionRecords {
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.records.iter().map(|r| r.created_at).min()
    }
}

#[async_trait]
pub trait QuizStore: Send + Sync {
    async fn find_learner(&self, learner_id: &str) -> Result<Option<Learner>>;

    async fn insert_question(&self, question: &Question) -> Result<()>;

    async fn get_question(&self, question_id: &str) -> Result<Option<Question>>;

    /// All questions of `topic`; generated ones only when `include_generated`.
    async fn filter_questions(&self, topic: Topic, include_generated: bool)
        -> Result<Vec<Question>>;

    async fn find_answer_record(
        &self,
        learner_id: &str,
        question_id: &str,
        session_id: &str,
    ) -> Result<Option<AnswerRecord>>;

    async fn create_answer_record(&self, record: AnswerRecord) -> Result<AnswerInsert>;

    /// Inserts the record if its key is free and, in the same step, updates
    /// the ledger: a wrong answer upserts the WrongQuestion, a correct one
    /// marks an unfixed WrongQuestion fixed. Either both writes land or
    /// neither does. A taken key yields `AnswerInsert::Existing` and leaves
    /// the ledger untouched.
    async fn record_answer(&self, record: AnswerRecord, question: &Question)
        -> Result<AnswerWrite>;

    async fn answer_records_for_session(
        &self,
        learner_id: &str,
        session_id: &str,
    ) -> Result<Vec<AnswerRecord>>;

    /// Every answer of the learner, oldest first.
    async fn answer_records_for_learner(&self, learner_id: &str) -> Result<Vec<AnswerRecord>>;

    /// Groups are ordered by first appearance of their session id.
    async fn group_answer_records_by_session(
        &self,
        learner_id: &str,
    ) -> Result<Vec<SessionRecords>> {
        let records = self.answer_records_for_learner(learner_id).await?;
        Ok(group_by_session(records))
    }

    /// Creates or refreshes the ledger entry after a mistake: `confirmed` and
    /// `fixed` are cleared and `last_wrong_at` set to `at`.
    async fn upsert_wrong_question(
        &self,
        learner_id: &str,
        question: &Question,
        at: DateTime<Utc>,
    ) -> Result<WrongQuestion>;

    /// Marks an unfixed ledger entry as fixed. `None` when there is no
    /// unfixed entry for the key.
    async fn mark_wrong_question_fixed(
        &self,
        learner_id: &str,
        question_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<WrongQuestion>>;

    /// Newest `last_wrong_at` first.
    async fn filter_wrong_questions(
        &self,
        learner_id: &str,
        confirmed: bool,
        topic: Option<Topic>,
    ) -> Result<Vec<WrongQuestion>>;

    async fn confirm_wrong_question(
        &self,
        learner_id: &str,
        question_id: &str,
        note: Option<String>,
    ) -> Result<Option<WrongQuestion>>;

    async fn upsert_weak_topic(
        &self,
        learner_id: &str,
        category: &str,
        at: DateTime<Utc>,
    ) -> Result<WeakTopic>;

    /// Most recently diagnosed first.
    async fn list_weak_topics(&self, learner_id: &str) -> Result<Vec<WeakTopic>>;

    /// Stars the question, or removes the star when it is already set.
    /// Returns whether the question is starred afterwards.
    async fn toggle_favorite(
        &self,
        learner_id: &str,
        question_id: &str,
        at: DateTime<Utc>,
    ) -> Result<bool>;

    async fn is_favorite(&self, learner_id: &str, question_id: &str) -> Result<bool>;

    /// Newest first.
    async fn list_favorites(&self, learner_id: &str) -> Result<Vec<Favorite>>;

    async fn find_explanation(&self, question_id: &str) -> Result<Option<Explanation>>;

    /// Keeps the first explanation stored for a question and returns it.
    async fn save_explanation(&self, explanation: Explanation) -> Result<Explanation>;
}

pub(crate) fn group_by_session(records: Vec<AnswerRecord>) -> Vec<SessionRecords> {
    let mut groups: Vec<SessionRecords> = Vec::new();
    for record in records {
        match groups.iter_mut().find(|g| g.session_id == record.session_id) {
            Some(group) => group.records.push(record),
            None => groups.push(SessionRecords {
                session_id: record.session_id.clone(),
                records: vec![record],
            }),
        }
    }
    groups
}

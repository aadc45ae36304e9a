#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use quizground_core::config::Config;
use quizground_core::models::{
    AnswerInsert, AnswerRecord, AnswerWrite, Explanation, Favorite, Learner, LearnerRole,
    Provenance, Question, SessionBundle, StartSessionRequest, Topic, WeakTopic, WrongQuestion,
};
use quizground_core::oracle::Oracle;
use quizground_core::services::{AppState, CategoryTable};
use quizground_core::store::{MemoryStore, QuizStore};

pub const LEARNER: &str = "learner-1";

/// Oracle fake: records every prompt and answers with canned text,
/// optionally after a delay.
pub struct ScriptedOracle {
    reply: String,
    delay: Option<Duration>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedOracle {
    pub fn replying(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            delay: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Oracle for ScriptedOracle {
    async fn send(&self, prompt: &str) -> String {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.reply.clone()
    }
}

/// Wraps a `MemoryStore` and injects faults into the answer path.
///
/// - `skip_answer_lookup`: `find_answer_record` always misses, so duplicate
///   submissions reach the insert-if-absent write.
/// - `fail_next_answer_write`: the next `record_answer` fails before anything
///   is written, like an aborted transaction.
/// - `fail_ledger_writes`: standalone wrong-question upserts always fail.
pub struct FaultyStore {
    inner: Arc<MemoryStore>,
    skip_answer_lookup: bool,
    fail_next_answer_write: AtomicBool,
    fail_ledger_writes: bool,
}

impl FaultyStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            skip_answer_lookup: false,
            fail_next_answer_write: AtomicBool::new(false),
            fail_ledger_writes: false,
        }
    }

    pub fn skipping_answer_lookup(mut self) -> Self {
        self.skip_answer_lookup = true;
        self
    }

    pub fn failing_next_answer_write(self) -> Self {
        self.fail_next_answer_write.store(true, Ordering::SeqCst);
        self
    }

    pub fn failing_ledger_writes(mut self) -> Self {
        self.fail_ledger_writes = true;
        self
    }
}

#[async_trait]
impl QuizStore for FaultyStore {
    async fn find_learner(&self, learner_id: &str) -> Result<Option<Learner>> {
        self.inner.find_learner(learner_id).await
    }

    async fn insert_question(&self, question: &Question) -> Result<()> {
        self.inner.insert_question(question).await
    }

    async fn get_question(&self, question_id: &str) -> Result<Option<Question>> {
        self.inner.get_question(question_id).await
    }

    async fn filter_questions(
        &self,
        topic: Topic,
        include_generated: bool,
    ) -> Result<Vec<Question>> {
        self.inner.filter_questions(topic, include_generated).await
    }

    async fn find_answer_record(
        &self,
        learner_id: &str,
        question_id: &str,
        session_id: &str,
    ) -> Result<Option<AnswerRecord>> {
        if self.skip_answer_lookup {
            return Ok(None);
        }
        self.inner
            .find_answer_record(learner_id, question_id, session_id)
            .await
    }

    async fn create_answer_record(&self, record: AnswerRecord) -> Result<AnswerInsert> {
        self.inner.create_answer_record(record).await
    }

    async fn record_answer(
        &self,
        record: AnswerRecord,
        question: &Question,
    ) -> Result<AnswerWrite> {
        if self.fail_next_answer_write.swap(false, Ordering::SeqCst) {
            anyhow::bail!("transient write failure");
        }
        self.inner.record_answer(record, question).await
    }

    async fn answer_records_for_session(
        &self,
        learner_id: &str,
        session_id: &str,
    ) -> Result<Vec<AnswerRecord>> {
        self.inner
            .answer_records_for_session(learner_id, session_id)
            .await
    }

    async fn answer_records_for_learner(&self, learner_id: &str) -> Result<Vec<AnswerRecord>> {
        self.inner.answer_records_for_learner(learner_id).await
    }

    async fn upsert_wrong_question(
        &self,
        learner_id: &str,
        question: &Question,
        at: DateTime<Utc>,
    ) -> Result<WrongQuestion> {
        if self.fail_ledger_writes {
            anyhow::bail!("transient write failure");
        }
        self.inner.upsert_wrong_question(learner_id, question, at).await
    }

    async fn mark_wrong_question_fixed(
        &self,
        learner_id: &str,
        question_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<WrongQuestion>> {
        self.inner
            .mark_wrong_question_fixed(learner_id, question_id, at)
            .await
    }

    async fn filter_wrong_questions(
        &self,
        learner_id: &str,
        confirmed: bool,
        topic: Option<Topic>,
    ) -> Result<Vec<WrongQuestion>> {
        self.inner
            .filter_wrong_questions(learner_id, confirmed, topic)
            .await
    }

    async fn confirm_wrong_question(
        &self,
        learner_id: &str,
        question_id: &str,
        note: Option<String>,
    ) -> Result<Option<WrongQuestion>> {
        self.inner
            .confirm_wrong_question(learner_id, question_id, note)
            .await
    }

    async fn upsert_weak_topic(
        &self,
        learner_id: &str,
        category: &str,
        at: DateTime<Utc>,
    ) -> Result<WeakTopic> {
        self.inner.upsert_weak_topic(learner_id, category, at).await
    }

    async fn list_weak_topics(&self, learner_id: &str) -> Result<Vec<WeakTopic>> {
        self.inner.list_weak_topics(learner_id).await
    }

    async fn toggle_favorite(
        &self,
        learner_id: &str,
        question_id: &str,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        self.inner.toggle_favorite(learner_id, question_id, at).await
    }

    async fn is_favorite(&self, learner_id: &str, question_id: &str) -> Result<bool> {
        self.inner.is_favorite(learner_id, question_id).await
    }

    async fn list_favorites(&self, learner_id: &str) -> Result<Vec<Favorite>> {
        self.inner.list_favorites(learner_id).await
    }

    async fn find_explanation(&self, question_id: &str) -> Result<Option<Explanation>> {
        self.inner.find_explanation(question_id).await
    }

    async fn save_explanation(&self, explanation: Explanation) -> Result<Explanation> {
        self.inner.save_explanation(explanation).await
    }
}

pub struct TestContext {
    pub store: Arc<MemoryStore>,
    pub oracle: Arc<ScriptedOracle>,
    pub state: AppState,
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

pub fn question(id: &str, topic: Topic, answer: &str) -> Question {
    Question {
        id: id.to_string(),
        content: format!("Question {}", id),
        options: BTreeMap::from([
            ("A".to_string(), "first".to_string()),
            ("B".to_string(), "second".to_string()),
            ("C".to_string(), "third".to_string()),
        ]),
        answer: answer.to_string(),
        topic,
        provenance: Provenance::Authored,
        created_at: Utc::now(),
    }
}

/// One learner and five grammar questions whose correct answer is "A".
pub async fn create_test_context(oracle: ScriptedOracle) -> TestContext {
    init_tracing();

    let store = Arc::new(MemoryStore::new());
    store
        .insert_learner(Learner {
            id: LEARNER.to_string(),
            username: "alice".to_string(),
            role: LearnerRole::Student,
        })
        .await;

    for i in 0..5 {
        store
            .insert_question(&question(&format!("g{}", i), Topic::Grammar, "A"))
            .await
            .unwrap();
    }

    let oracle = Arc::new(oracle);
    let state = AppState::from_parts(
        Config::default(),
        store.clone(),
        oracle.clone(),
        CategoryTable::default(),
    );

    TestContext {
        store,
        oracle,
        state,
    }
}

/// Same seeded data and oracle, served through another store front.
pub fn state_with_store(ctx: &TestContext, store: Arc<dyn QuizStore>) -> AppState {
    AppState::from_parts(
        Config::default(),
        store,
        ctx.oracle.clone(),
        CategoryTable::default(),
    )
}

pub fn grammar_request(count: usize) -> StartSessionRequest {
    StartSessionRequest {
        learner_id: LEARNER.to_string(),
        topic: Topic::Grammar,
        count,
        mode: "practice".to_string(),
        include_generated: true,
    }
}

pub async fn start_grammar_session(ctx: &TestContext, count: usize) -> SessionBundle {
    ctx.state
        .sessions()
        .start_session(grammar_request(count))
        .await
        .unwrap()
}

/// Records a wrong answer ("B") for each of the given session indexes.
pub async fn answer_wrong(ctx: &TestContext, bundle: &mut SessionBundle, indexes: &[usize]) {
    let sessions = ctx.state.sessions();
    for &index in indexes {
        sessions
            .record_answer(LEARNER, bundle, index, "B")
            .await
            .unwrap();
    }
}

pub async fn unresolved_count(ctx: &TestContext) -> usize {
    ctx.store
        .filter_wrong_questions(LEARNER, false, None)
        .await
        .unwrap()
        .len()
}

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::QuizStore;
use crate::models::{
    AnswerInsert, AnswerRecord, AnswerWrite, Explanation, Favorite, Learner, Question, Topic,
    WeakTopic, WrongQuestion,
};

type AnswerKey = (String, String, String);
type LearnerKey = (String, String);

#[derive(Default)]
struct MemoryState {
    learners: HashMap<String, Learner>,
    questions: Vec<Question>,
    answers: Vec<AnswerRecord>,
    answer_index: HashMap<AnswerKey, usize>,
    wrong_questions: HashMap<LearnerKey, WrongQuestion>,
    weak_topics: HashMap<LearnerKey, WeakTopic>,
    favorites: HashMap<LearnerKey, Favorite>,
    explanations: HashMap<String, Explanation>,
}

impl MemoryState {
    fn insert_answer(&mut self, record: AnswerRecord) -> AnswerInsert {
        let key = answer_key(&record.learner_id, &record.question_id, &record.session_id);
        if let Some(&idx) = self.answer_index.get(&key) {
            return AnswerInsert::Existing(self.answers[idx].clone());
        }
        let idx = self.answers.len();
        self.answers.push(record.clone());
        self.answer_index.insert(key, idx);
        AnswerInsert::Inserted(record)
    }

    fn upsert_wrong_question(
        &mut self,
        learner_id: &str,
        question: &Question,
        at: DateTime<Utc>,
    ) -> WrongQuestion {
        self.wrong_questions
            .entry(learner_key(learner_id, &question.id))
            .and_modify(|wq| {
                wq.confirmed = false;
                wq.fixed = false;
                wq.fixed_at = None;
                wq.last_wrong_at = at;
            })
            .or_insert_with(|| WrongQuestion {
                id: Uuid::new_v4().to_string(),
                learner_id: learner_id.to_string(),
                question_id: question.id.clone(),
                topic: question.topic,
                confirmed: false,
                fixed: false,
                last_wrong_at: at,
                note: None,
                created_at: at,
                fixed_at: None,
            })
            .clone()
    }

    fn mark_wrong_question_fixed(
        &mut self,
        learner_id: &str,
        question_id: &str,
        at: DateTime<Utc>,
    ) -> Option<WrongQuestion> {
        self.wrong_questions
            .get_mut(&learner_key(learner_id, question_id))
            .filter(|wq| !wq.fixed)
            .map(|wq| {
                wq.fixed = true;
                wq.fixed_at = Some(at);
                wq.clone()
            })
    }
}

/// In-process store. A single lock guards all state, so every
/// check-then-write below is atomic.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_learner(&self, learner: Learner) {
        let mut state = self.state.write().await;
        state.learners.insert(learner.id.clone(), learner);
    }

    /// Number of stored answer records, for assertions.
    pub async fn answer_count(&self) -> usize {
        self.state.read().await.answers.len()
    }
}

fn answer_key(learner_id: &str, question_id: &str, session_id: &str) -> AnswerKey {
    (
        learner_id.to_string(),
        question_id.to_string(),
        session_id.to_string(),
    )
}

fn learner_key(learner_id: &str, other: &str) -> LearnerKey {
    (learner_id.to_string(), other.to_string())
}

#[async_trait]
impl QuizStore for MemoryStore {
    async fn find_learner(&self, learner_id: &str) -> Result<Option<Learner>> {
        Ok(self.state.read().await.learners.get(learner_id).cloned())
    }

    async fn insert_question(&self, question: &Question) -> Result<()> {
        let mut state = self.state.write().await;
        if state.questions.iter().any(|q| q.id == question.id) {
            anyhow::bail!("Question {} already exists", question.id);
        }
        state.questions.push(question.clone());
        Ok(())
    }

    async fn get_question(&self, question_id: &str) -> Result<Option<Question>> {
        let state = self.state.read().await;
        Ok(state.questions.iter().find(|q| q.id == question_id).cloned())
    }

    async fn filter_questions(
        &self,
        topic: Topic,
        include_generated: bool,
    ) -> Result<Vec<Question>> {
        let state = self.state.read().await;
        Ok(state
            .questions
            .iter()
            .filter(|q| q.topic == topic)
            .filter(|q| include_generated || q.provenance == crate::models::Provenance::Authored)
            .cloned()
            .collect())
    }

    async fn find_answer_record(
        &self,
        learner_id: &str,
        question_id: &str,
        session_id: &str,
    ) -> Result<Option<AnswerRecord>> {
        let state = self.state.read().await;
        Ok(state
            .answer_index
            .get(&answer_key(learner_id, question_id, session_id))
            .map(|&idx| state.answers[idx].clone()))
    }

    async fn create_answer_record(&self, record: AnswerRecord) -> Result<AnswerInsert> {
        Ok(self.state.write().await.insert_answer(record))
    }

    async fn record_answer(
        &self,
        record: AnswerRecord,
        question: &Question,
    ) -> Result<AnswerWrite> {
        let mut state = self.state.write().await;
        let record = match state.insert_answer(record) {
            AnswerInsert::Inserted(record) => record,
            AnswerInsert::Existing(existing) => return Ok(AnswerWrite::existing(existing)),
        };

        let wrong_question = if record.correct {
            state.mark_wrong_question_fixed(&record.learner_id, &question.id, record.created_at)
        } else {
            Some(state.upsert_wrong_question(&record.learner_id, question, record.created_at))
        };

        Ok(AnswerWrite {
            insert: AnswerInsert::Inserted(record),
            wrong_question,
        })
    }

    async fn answer_records_for_session(
        &self,
        learner_id: &str,
        session_id: &str,
    ) -> Result<Vec<AnswerRecord>> {
        let state = self.state.read().await;
        Ok(state
            .answers
            .iter()
            .filter(|r| r.learner_id == learner_id && r.session_id == session_id)
            .cloned()
            .collect())
    }

    async fn answer_records_for_learner(&self, learner_id: &str) -> Result<Vec<AnswerRecord>> {
        let state = self.state.read().await;
        let mut records: Vec<AnswerRecord> = state
            .answers
            .iter()
            .filter(|r| r.learner_id == learner_id)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }

    async fn upsert_wrong_question(
        &self,
        learner_id: &str,
        question: &Question,
        at: DateTime<Utc>,
    ) -> Result<WrongQuestion> {
        Ok(self
            .state
            .write()
            .await
            .upsert_wrong_question(learner_id, question, at))
    }

    async fn mark_wrong_question_fixed(
        &self,
        learner_id: &str,
        question_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<WrongQuestion>> {
        Ok(self
            .state
            .write()
            .await
            .mark_wrong_question_fixed(learner_id, question_id, at))
    }

    async fn filter_wrong_questions(
        &self,
        learner_id: &str,
        confirmed: bool,
        topic: Option<Topic>,
    ) -> Result<Vec<WrongQuestion>> {
        let state = self.state.read().await;
        let mut items: Vec<WrongQuestion> = state
            .wrong_questions
            .values()
            .filter(|wq| wq.learner_id == learner_id && wq.confirmed == confirmed)
            .filter(|wq| topic.map_or(true, |t| wq.topic == t))
            .cloned()
            .collect();
        items.sort_by(|a, b| b.last_wrong_at.cmp(&a.last_wrong_at));
        Ok(items)
    }

    async fn confirm_wrong_question(
        &self,
        learner_id: &str,
        question_id: &str,
        note: Option<String>,
    ) -> Result<Option<WrongQuestion>> {
        let mut state = self.state.write().await;
        Ok(state
            .wrong_questions
            .get_mut(&learner_key(learner_id, question_id))
            .map(|wq| {
                wq.confirmed = true;
                if note.is_some() {
                    wq.note = note;
                }
                wq.clone()
            }))
    }

    async fn upsert_weak_topic(
        &self,
        learner_id: &str,
        category: &str,
        at: DateTime<Utc>,
    ) -> Result<WeakTopic> {
        let mut state = self.state.write().await;
        let entry = state
            .weak_topics
            .entry(learner_key(learner_id, category))
            .and_modify(|wt| wt.last_diagnosed = at)
            .or_insert_with(|| WeakTopic {
                id: Uuid::new_v4().to_string(),
                learner_id: learner_id.to_string(),
                category: category.to_string(),
                last_diagnosed: at,
            });
        Ok(entry.clone())
    }

    async fn list_weak_topics(&self, learner_id: &str) -> Result<Vec<WeakTopic>> {
        let state = self.state.read().await;
        let mut items: Vec<WeakTopic> = state
            .weak_topics
            .values()
            .filter(|wt| wt.learner_id == learner_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| {
            b.last_diagnosed
                .cmp(&a.last_diagnosed)
                .then_with(|| a.category.cmp(&b.category))
        });
        Ok(items)
    }

    async fn toggle_favorite(
        &self,
        learner_id: &str,
        question_id: &str,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut state = self.state.write().await;
        let key = learner_key(learner_id, question_id);
        if state.favorites.remove(&key).is_some() {
            return Ok(false);
        }
        state.favorites.insert(
            key,
            Favorite {
                id: Uuid::new_v4().to_string(),
                learner_id: learner_id.to_string(),
                question_id: question_id.to_string(),
                created_at: at,
            },
        );
        Ok(true)
    }

    async fn is_favorite(&self, learner_id: &str, question_id: &str) -> Result<bool> {
        let state = self.state.read().await;
        Ok(state
            .favorites
            .contains_key(&learner_key(learner_id, question_id)))
    }

    async fn list_favorites(&self, learner_id: &str) -> Result<Vec<Favorite>> {
        let state = self.state.read().await;
        let mut items: Vec<Favorite> = state
            .favorites
            .values()
            .filter(|f| f.learner_id == learner_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(items)
    }

    async fn find_explanation(&self, question_id: &str) -> Result<Option<Explanation>> {
        Ok(self.state.read().await.explanations.get(question_id).cloned())
    }

    async fn save_explanation(&self, explanation: Explanation) -> Result<Explanation> {
        let mut state = self.state.write().await;
        Ok(state
            .explanations
            .entry(explanation.question_id.clone())
            .or_insert(explanation)
            .clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Provenance;
    use std::collections::BTreeMap;

    fn question(id: &str, topic: Topic) -> Question {
        Question {
            id: id.to_string(),
            content: format!("content {}", id),
            options: BTreeMap::from([("A".to_string(), "a".to_string())]),
            answer: "A".to_string(),
            topic,
            provenance: Provenance::Authored,
            created_at: Utc::now(),
        }
    }

    fn record(id: &str) -> AnswerRecord {
        AnswerRecord {
            id: id.to_string(),
            learner_id: "l1".to_string(),
            question_id: "q1".to_string(),
            session_id: "s1".to_string(),
            selected_option: "A".to_string(),
            correct: true,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn second_insert_for_same_key_returns_first_record() {
        let store = MemoryStore::new();
        let first = store.create_answer_record(record("first")).await.unwrap();
        let second = store.create_answer_record(record("second")).await.unwrap();

        assert!(matches!(first, AnswerInsert::Inserted(_)));
        match second {
            AnswerInsert::Existing(existing) => assert_eq!(existing.id, "first"),
            other => panic!("expected existing record, got {:?}", other),
        }
        assert_eq!(store.answer_count().await, 1);
    }

    #[tokio::test]
    async fn recording_a_wrong_answer_writes_record_and_ledger_together() {
        let store = MemoryStore::new();
        let q = question("q1", Topic::Grammar);
        let mut wrong = record("first");
        wrong.selected_option = "B".to_string();
        wrong.correct = false;

        let write = store.record_answer(wrong, &q).await.unwrap();
        assert!(matches!(write.insert, AnswerInsert::Inserted(_)));
        let entry = write.wrong_question.unwrap();
        assert_eq!(entry.question_id, "q1");
        assert!(!entry.confirmed);

        // Same key again: nothing new is written
        let again = store.record_answer(record("second"), &q).await.unwrap();
        match again.insert {
            AnswerInsert::Existing(existing) => assert_eq!(existing.id, "first"),
            other => panic!("expected existing record, got {:?}", other),
        }
        assert!(again.wrong_question.is_none());
        assert_eq!(store.answer_count().await, 1);
        let ledger = store.filter_wrong_questions("l1", false, None).await.unwrap();
        assert_eq!(ledger.len(), 1);
        assert!(!ledger[0].fixed);
    }

    #[tokio::test]
    async fn recording_a_correct_answer_fixes_the_mistake() {
        let store = MemoryStore::new();
        let q = question("q1", Topic::Grammar);
        store.upsert_wrong_question("l1", &q, Utc::now()).await.unwrap();

        let mut correct = record("later");
        correct.session_id = "s2".to_string();
        let write = store.record_answer(correct, &q).await.unwrap();

        assert!(write.wrong_question.is_some_and(|wq| wq.fixed));
    }

    #[tokio::test]
    async fn favorite_toggles_on_and_off() {
        let store = MemoryStore::new();
        assert!(!store.is_favorite("l1", "q1").await.unwrap());

        assert!(store.toggle_favorite("l1", "q1", Utc::now()).await.unwrap());
        assert!(store.is_favorite("l1", "q1").await.unwrap());
        assert!(!store.is_favorite("l2", "q1").await.unwrap());
        assert_eq!(store.list_favorites("l1").await.unwrap().len(), 1);

        assert!(!store.toggle_favorite("l1", "q1", Utc::now()).await.unwrap());
        assert!(!store.is_favorite("l1", "q1").await.unwrap());
        assert!(store.list_favorites("l1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn first_saved_explanation_wins() {
        let store = MemoryStore::new();
        let explanation = |text: &str| Explanation {
            question_id: "q1".to_string(),
            text: text.to_string(),
            source: crate::models::ExplanationSource::Oracle,
            created_at: Utc::now(),
        };

        store.save_explanation(explanation("first")).await.unwrap();
        let kept = store.save_explanation(explanation("second")).await.unwrap();

        assert_eq!(kept.text, "first");
        let found = store.find_explanation("q1").await.unwrap().unwrap();
        assert_eq!(found.text, "first");
    }

    #[tokio::test]
    async fn wrong_question_refresh_resets_review_state() {
        let store = MemoryStore::new();
        let q = question("q1", Topic::Grammar);
        let t0 = Utc::now();
        store.upsert_wrong_question("l1", &q, t0).await.unwrap();
        store
            .confirm_wrong_question("l1", "q1", Some("remember irregular verbs".into()))
            .await
            .unwrap();

        let t1 = t0 + chrono::Duration::seconds(5);
        let refreshed = store.upsert_wrong_question("l1", &q, t1).await.unwrap();
        assert!(!refreshed.confirmed);
        assert_eq!(refreshed.last_wrong_at, t1);
        assert_eq!(refreshed.created_at, t0);
        assert_eq!(refreshed.note.as_deref(), Some("remember irregular verbs"));
    }

    #[tokio::test]
    async fn fixed_is_only_set_once() {
        let store = MemoryStore::new();
        let q = question("q1", Topic::Vocab);
        store.upsert_wrong_question("l1", &q, Utc::now()).await.unwrap();

        let fixed = store
            .mark_wrong_question_fixed("l1", "q1", Utc::now())
            .await
            .unwrap();
        assert!(fixed.is_some_and(|wq| wq.fixed && wq.fixed_at.is_some()));
        let again = store
            .mark_wrong_question_fixed("l1", "q1", Utc::now())
            .await
            .unwrap();
        assert!(again.is_none());
    }

    #[tokio::test]
    async fn filter_questions_respects_provenance() {
        let store = MemoryStore::new();
        store.insert_question(&question("q1", Topic::Grammar)).await.unwrap();
        let mut generated = question("q2", Topic::Grammar);
        generated.provenance = Provenance::Generated;
        store.insert_question(&generated).await.unwrap();
        store.insert_question(&question("q3", Topic::Reading)).await.unwrap();

        let all = store.filter_questions(Topic::Grammar, true).await.unwrap();
        let authored = store.filter_questions(Topic::Grammar, false).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(authored.len(), 1);
        assert_eq!(authored[0].id, "q1");
    }

    #[tokio::test]
    async fn weak_topic_upsert_keeps_one_row_per_category() {
        let store = MemoryStore::new();
        let t0 = Utc::now();
        let first = store.upsert_weak_topic("l1", "verb tense", t0).await.unwrap();
        let t1 = t0 + chrono::Duration::minutes(1);
        let second = store.upsert_weak_topic("l1", "verb tense", t1).await.unwrap();

        assert_eq!(first.id, second.id);
        let listed = store.list_weak_topics("l1").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].last_diagnosed, t1);
    }
}

use std::collections::BTreeSet;
use std::sync::Arc;

use super::require_learner;
use crate::error::{QuizError, QuizResult};
use crate::models::{Topic, WrongQuestion};
use crate::store::QuizStore;

/// Mistake ledger views and review actions.
pub struct MistakeService {
    store: Arc<dyn QuizStore>,
}

impl MistakeService {
    pub fn new(store: Arc<dyn QuizStore>) -> Self {
        Self { store }
    }

    /// Unconfirmed mistakes, newest first. `topic` of `None`, empty or
    /// "all" lists every topic.
    pub async fn list_unresolved(
        &self,
        learner_id: &str,
        topic: Option<&str>,
    ) -> QuizResult<Vec<WrongQuestion>> {
        require_learner(self.store.as_ref(), learner_id).await?;

        let filter = Topic::from_filter(topic);
        if filter.is_none() && topic.is_some_and(|t| !matches!(t.trim(), "" | "all")) {
            tracing::debug!("Ignoring unknown topic filter {:?}", topic);
        }

        Ok(self
            .store
            .filter_wrong_questions(learner_id, false, filter)
            .await?)
    }

    /// Distinct topics that still have unconfirmed mistakes.
    pub async fn unresolved_topics(&self, learner_id: &str) -> QuizResult<Vec<Topic>> {
        let topics: BTreeSet<Topic> = self
            .list_unresolved(learner_id, None)
            .await?
            .into_iter()
            .map(|wq| wq.topic)
            .collect();
        Ok(topics.into_iter().collect())
    }

    /// Marks a mistake as reviewed, optionally keeping the learner's note.
    #[tracing::instrument(skip(self, note))]
    pub async fn confirm_mistake(
        &self,
        learner_id: &str,
        question_id: &str,
        note: Option<String>,
    ) -> QuizResult<WrongQuestion> {
        require_learner(self.store.as_ref(), learner_id).await?;

        let note = note
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());

        let confirmed = self
            .store
            .confirm_wrong_question(learner_id, question_id, note)
            .await?
            .ok_or_else(|| QuizError::WrongQuestionNotFound {
                learner_id: learner_id.to_string(),
                question_id: question_id.to_string(),
            })?;

        tracing::info!("Mistake confirmed: question={}", question_id);
        Ok(confirmed)
    }
}

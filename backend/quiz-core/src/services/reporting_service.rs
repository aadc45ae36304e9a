use std::sync::Arc;

use super::require_learner;
use crate::error::QuizResult;
use crate::models::reporting::accuracy_percent;
use crate::models::{
    QuestionPosition, SessionBundle, SessionHistoryEntry, SessionSummary, WrongAnswerEntry,
};
use crate::store::QuizStore;

/// Accuracy and history views computed from recorded answers.
pub struct ReportingService {
    store: Arc<dyn QuizStore>,
}

impl ReportingService {
    pub fn new(store: Arc<dyn QuizStore>) -> Self {
        Self { store }
    }

    /// Summary of one session. `question_order` is the session's sampled
    /// order; pass an empty slice when it is no longer known and every
    /// mistake gets an unknown position.
    #[tracing::instrument(skip(self, question_order))]
    pub async fn session_summary(
        &self,
        learner_id: &str,
        session_id: &str,
        question_order: &[String],
    ) -> QuizResult<SessionSummary> {
        require_learner(self.store.as_ref(), learner_id).await?;

        let records = self
            .store
            .answer_records_for_session(learner_id, session_id)
            .await?;

        let total = records.len();
        let correct = records.iter().filter(|r| r.correct).count();
        let wrong_answers = records
            .into_iter()
            .filter(|r| !r.correct)
            .map(|record| WrongAnswerEntry {
                position: QuestionPosition::within(question_order, &record.question_id),
                record,
            })
            .collect();

        Ok(SessionSummary {
            session_id: session_id.to_string(),
            total,
            correct,
            accuracy: accuracy_percent(correct, total),
            wrong_answers,
        })
    }

    pub async fn summary_for_bundle(&self, bundle: &SessionBundle) -> QuizResult<SessionSummary> {
        self.session_summary(&bundle.learner_id, &bundle.session_id, &bundle.question_ids)
            .await
    }

    /// Percentage of correct answers over the learner's whole history.
    pub async fn learner_accuracy(&self, learner_id: &str) -> QuizResult<f64> {
        require_learner(self.store.as_ref(), learner_id).await?;

        let records = self.store.answer_records_for_learner(learner_id).await?;
        if records.is_empty() {
            return Ok(0.0);
        }
        let correct = records.iter().filter(|r| r.correct).count();
        Ok(correct as f64 / records.len() as f64 * 100.0)
    }

    /// Newest sessions first, at most `limit` of them.
    #[tracing::instrument(skip(self))]
    pub async fn recent_session_summaries(
        &self,
        learner_id: &str,
        limit: usize,
    ) -> QuizResult<Vec<SessionHistoryEntry>> {
        require_learner(self.store.as_ref(), learner_id).await?;

        let mut dated: Vec<_> = self
            .store
            .group_answer_records_by_session(learner_id)
            .await?
            .into_iter()
            .filter_map(|group| match group.started_at() {
                Some(taken_at) => Some((taken_at, group)),
                None => {
                    tracing::warn!("Skipping session {} without answers", group.session_id);
                    None
                }
            })
            .collect();

        dated.sort_by(|a, b| b.0.cmp(&a.0));
        dated.truncate(limit);

        let mut history = Vec::with_capacity(dated.len());
        for (taken_at, group) in dated {
            let total = group.records.len();
            let correct = group.records.iter().filter(|r| r.correct).count();

            let topic = match group.records.first() {
                Some(first) => self
                    .store
                    .get_question(&first.question_id)
                    .await?
                    .map(|q| q.topic),
                None => None,
            };

            history.push(SessionHistoryEntry {
                session_id: group.session_id,
                taken_at,
                topic,
                total,
                correct,
                accuracy: accuracy_percent(correct, total),
            });
        }

        Ok(history)
    }
}

use chrono::Utc;
use rand::seq::SliceRandom;
use std::sync::Arc;
use uuid::Uuid;

use super::require_learner;
use crate::error::{QuizError, QuizResult};
use crate::metrics::{
    track_store_operation, ANSWERS_DUPLICATE_TOTAL, ANSWERS_RECORDED_TOTAL,
    SESSIONS_STARTED_TOTAL,
};
use crate::models::{
    AnswerInsert, AnswerOutcome, AnswerRecord, CurrentQuestion, Question, SessionBundle,
    StartSessionRequest,
};
use crate::store::QuizStore;

/// Drives one learner through a sampled batch of questions.
///
/// The session bundle lives with the caller; every operation takes it as
/// input and never keeps a copy.
pub struct SessionService {
    store: Arc<dyn QuizStore>,
}

impl SessionService {
    pub fn new(store: Arc<dyn QuizStore>) -> Self {
        Self { store }
    }

    #[tracing::instrument(
        skip(self, req),
        fields(learner_id = %req.learner_id, topic = %req.topic, count = req.count)
    )]
    pub async fn start_session(&self, req: StartSessionRequest) -> QuizResult<SessionBundle> {
        require_learner(self.store.as_ref(), &req.learner_id).await?;

        let pool = self
            .store
            .filter_questions(req.topic, req.include_generated)
            .await?;
        let question_ids = sample_question_ids(&pool, req.count);

        if question_ids.is_empty() {
            // Empty pool still yields a session; the first CurrentQuestion
            // call reports completion.
            tracing::warn!(
                "No questions available for topic={} include_generated={}",
                req.topic,
                req.include_generated
            );
            SESSIONS_STARTED_TOTAL.with_label_values(&["empty"]).inc();
        } else {
            SESSIONS_STARTED_TOTAL.with_label_values(&["filled"]).inc();
        }

        let bundle = SessionBundle {
            session_id: Uuid::new_v4().to_string(),
            learner_id: req.learner_id,
            topic: req.topic,
            requested_count: req.count,
            question_ids,
            mode: req.mode,
            include_generated: req.include_generated,
            answers: Default::default(),
            started_at: Utc::now(),
        };

        tracing::info!(
            "Session started: {} with {} of {} requested questions (pool {})",
            bundle.session_id,
            bundle.len(),
            bundle.requested_count,
            pool.len()
        );

        Ok(bundle)
    }

    pub async fn current_question(
        &self,
        bundle: &SessionBundle,
        index: usize,
    ) -> QuizResult<CurrentQuestion> {
        let question_id = bundle.question_id_at(index)?;
        let question = self.load_question(question_id).await?;

        Ok(CurrentQuestion {
            index,
            total: bundle.len(),
            selected: bundle.selected_for(&question.id).map(str::to_string),
            question,
        })
    }

    /// Records the answer once per (learner, question, session). The record
    /// and its mistake-ledger update are one store write. Repeated
    /// submissions replay the stored outcome and leave the ledger alone.
    #[tracing::instrument(skip(self, bundle), fields(session_id = %bundle.session_id))]
    pub async fn record_answer(
        &self,
        learner_id: &str,
        bundle: &mut SessionBundle,
        index: usize,
        selected_option: &str,
    ) -> QuizResult<AnswerOutcome> {
        require_learner(self.store.as_ref(), learner_id).await?;
        if bundle.learner_id != learner_id {
            return Err(QuizError::ForeignSession {
                learner_id: learner_id.to_string(),
                session_id: bundle.session_id.clone(),
            });
        }

        let question_id = bundle
            .question_ids
            .get(index)
            .cloned()
            .ok_or(QuizError::UnknownQuestion {
                index,
                len: bundle.len(),
            })?;
        let question = self.load_question(&question_id).await?;

        if let Some(existing) = self
            .store
            .find_answer_record(learner_id, &question.id, &bundle.session_id)
            .await?
        {
            return Ok(replay(bundle, &existing, &question));
        }

        let now = Utc::now();
        let record = AnswerRecord {
            id: Uuid::new_v4().to_string(),
            learner_id: learner_id.to_string(),
            question_id: question.id.clone(),
            session_id: bundle.session_id.clone(),
            selected_option: selected_option.to_string(),
            correct: question.is_correct(selected_option),
            created_at: now,
        };

        let write = track_store_operation(
            "record_answer",
            self.store.record_answer(record, &question),
        )
        .await?;
        let record = match write.insert {
            AnswerInsert::Inserted(record) => record,
            // Lost a race against a concurrent submission of the same answer
            AnswerInsert::Existing(existing) => return Ok(replay(bundle, &existing, &question)),
        };
        let wrong_question = write.wrong_question;

        ANSWERS_RECORDED_TOTAL
            .with_label_values(&[if record.correct { "true" } else { "false" }])
            .inc();
        if record.correct && wrong_question.is_some() {
            tracing::info!("Mistake fixed: question={}", question.id);
        }

        bundle
            .answers
            .insert(question.id.clone(), record.selected_option.clone());

        tracing::info!(
            "Answer recorded: question={} selected={} correct={}",
            question.id,
            record.selected_option,
            record.correct
        );

        Ok(AnswerOutcome {
            question_id: record.question_id,
            selected_option: record.selected_option,
            correct: record.correct,
            correct_option: question.answer,
            replayed: false,
            wrong_question,
        })
    }

    async fn load_question(&self, question_id: &str) -> QuizResult<Question> {
        self.store
            .get_question(question_id)
            .await?
            .ok_or_else(|| QuizError::QuestionNotFound(question_id.to_string()))
    }
}

fn replay(bundle: &mut SessionBundle, existing: &AnswerRecord, question: &Question) -> AnswerOutcome {
    ANSWERS_DUPLICATE_TOTAL.inc();
    tracing::debug!(
        "Answer already recorded: question={} session={}",
        existing.question_id,
        existing.session_id
    );
    bundle
        .answers
        .insert(existing.question_id.clone(), existing.selected_option.clone());
    AnswerOutcome::replay(existing, &question.answer)
}

/// Uniform sample without replacement, clamped to the pool size.
fn sample_question_ids(pool: &[Question], count: usize) -> Vec<String> {
    let mut ids: Vec<String> = pool.iter().map(|q| q.id.clone()).collect();
    ids.shuffle(&mut rand::rng());
    ids.truncate(count);
    ids
}

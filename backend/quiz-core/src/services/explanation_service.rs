use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

use super::require_learner;
use crate::error::{QuizError, QuizResult};
use crate::metrics::EXPLANATIONS_TOTAL;
use crate::models::{Explanation, ExplanationPage, ExplanationSource, Question, SessionBundle};
use crate::oracle::{error_text, Oracle, ORACLE_ERROR_PREFIX};
use crate::store::QuizStore;

/// Oracle-written explanations of single questions, cached per question.
///
/// Only successful oracle answers are cached; a failed call is reported
/// with `ExplanationSource::Unavailable` and retried on the next request.
pub struct ExplanationService {
    store: Arc<dyn QuizStore>,
    oracle: Arc<dyn Oracle>,
    oracle_timeout: Duration,
}

impl ExplanationService {
    pub fn new(
        store: Arc<dyn QuizStore>,
        oracle: Arc<dyn Oracle>,
        oracle_timeout: Duration,
    ) -> Self {
        Self {
            store,
            oracle,
            oracle_timeout,
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn explain(&self, question_id: &str) -> QuizResult<Explanation> {
        let question = self
            .store
            .get_question(question_id)
            .await?
            .ok_or_else(|| QuizError::QuestionNotFound(question_id.to_string()))?;

        self.explain_question(&question).await
    }

    /// Question, the learner's selection, explanation, star state and the
    /// index to continue with, for question `index` of the session.
    #[tracing::instrument(skip(self, bundle), fields(session_id = %bundle.session_id))]
    pub async fn explanation_page(
        &self,
        learner_id: &str,
        bundle: &SessionBundle,
        index: usize,
    ) -> QuizResult<ExplanationPage> {
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
            .ok_or(QuizError::UnknownQuestion {
                index,
                len: bundle.len(),
            })?;
        let question = self
            .store
            .get_question(question_id)
            .await?
            .ok_or_else(|| QuizError::QuestionNotFound(question_id.clone()))?;

        let explanation = self.explain_question(&question).await?;
        let is_favorite = self.store.is_favorite(learner_id, &question.id).await?;

        Ok(ExplanationPage {
            selected: bundle.selected_for(&question.id).map(str::to_string),
            next_index: bundle.next_index(&question.id),
            question,
            explanation,
            is_favorite,
        })
    }

    async fn explain_question(&self, question: &Question) -> QuizResult<Explanation> {
        if let Some(cached) = self.store.find_explanation(&question.id).await? {
            tracing::debug!("Explanation cache hit for question={}", question.id);
            return Ok(served(Explanation {
                source: ExplanationSource::Cache,
                ..cached
            }));
        }

        let prompt = build_explanation_prompt(question);
        let text = match tokio::time::timeout(self.oracle_timeout, self.oracle.send(&prompt))
            .await
        {
            Ok(text) => text.trim().to_string(),
            Err(_) => error_text(format!(
                "oracle did not answer within {}s",
                self.oracle_timeout.as_secs_f64()
            )),
        };

        if text.is_empty() || text.starts_with(ORACLE_ERROR_PREFIX) {
            tracing::warn!(
                "No explanation for question={}: {}",
                question.id,
                if text.is_empty() { "empty answer" } else { text.as_str() }
            );
            return Ok(served(Explanation {
                question_id: question.id.clone(),
                text,
                source: ExplanationSource::Unavailable,
                created_at: Utc::now(),
            }));
        }

        let stored = self
            .store
            .save_explanation(Explanation {
                question_id: question.id.clone(),
                text,
                source: ExplanationSource::Oracle,
                created_at: Utc::now(),
            })
            .await?;
        Ok(served(stored))
    }
}

fn served(explanation: Explanation) -> Explanation {
    EXPLANATIONS_TOTAL
        .with_label_values(&[explanation.source.as_str()])
        .inc();
    explanation
}

pub fn build_explanation_prompt(question: &Question) -> String {
    let options = question
        .options
        .iter()
        .map(|(key, text)| format!("{}. {}", key, text))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "請說明為什麼下面的英文選擇題中，選項「{answer}」是正確或錯誤的，盡可能在100字以內說明每個選項，要在選項前面備註。\n\
         題目：{content}\n\
         選項：\n\
         {options}\n\
         正確答案：{answer}\n\
         請用中文母語的觀點解釋，評斷學生可能錯誤的原因，幫助學生學習。",
        answer = question.answer,
        content = question.content,
        options = options,
    )
}

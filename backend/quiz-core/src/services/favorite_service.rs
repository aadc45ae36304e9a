use chrono::Utc;
use std::sync::Arc;

use super::require_learner;
use crate::error::{QuizError, QuizResult};
use crate::metrics::FAVORITE_TOGGLES_TOTAL;
use crate::models::Favorite;
use crate::store::QuizStore;

/// Per-learner starred questions.
pub struct FavoriteService {
    store: Arc<dyn QuizStore>,
}

impl FavoriteService {
    pub fn new(store: Arc<dyn QuizStore>) -> Self {
        Self { store }
    }

    /// Flips the star on a question. Returns whether it is starred now.
    #[tracing::instrument(skip(self))]
    pub async fn toggle(&self, learner_id: &str, question_id: &str) -> QuizResult<bool> {
        require_learner(self.store.as_ref(), learner_id).await?;
        if self.store.get_question(question_id).await?.is_none() {
            return Err(QuizError::QuestionNotFound(question_id.to_string()));
        }

        let starred = self
            .store
            .toggle_favorite(learner_id, question_id, Utc::now())
            .await?;

        FAVORITE_TOGGLES_TOTAL
            .with_label_values(&[if starred { "true" } else { "false" }])
            .inc();
        tracing::info!("Favorite toggled: question={} starred={}", question_id, starred);

        Ok(starred)
    }

    pub async fn is_favorite(&self, learner_id: &str, question_id: &str) -> QuizResult<bool> {
        require_learner(self.store.as_ref(), learner_id).await?;
        Ok(self.store.is_favorite(learner_id, question_id).await?)
    }

    /// Starred questions, newest first.
    pub async fn list(&self, learner_id: &str) -> QuizResult<Vec<Favorite>> {
        require_learner(self.store.as_ref(), learner_id).await?;
        Ok(self.store.list_favorites(learner_id).await?)
    }
}

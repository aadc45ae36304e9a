use thiserror::Error;

/// Errors surfaced by the quiz core.
///
/// Degradations (empty question pool, no mistakes to diagnose, oracle failure)
/// are not errors; they come back as regular results.
#[derive(Error, Debug)]
pub enum QuizError {
    #[error("Learner not found: {0}")]
    UnknownLearner(String),

    #[error("Session {session_id} does not belong to learner {learner_id}")]
    ForeignSession {
        learner_id: String,
        session_id: String,
    },

    #[error("Question index {index} is outside the session (size {len})")]
    UnknownQuestion { index: usize, len: usize },

    #[error("Question not found: {0}")]
    QuestionNotFound(String),

    /// Returned by `CurrentQuestion` once the session is exhausted.
    #[error("Index {index} out of range (session has {len} questions)")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("No mistake recorded for learner {learner_id} on question {question_id}")]
    WrongQuestionNotFound {
        learner_id: String,
        question_id: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Store error: {0:#}")]
    Store(#[from] anyhow::Error),
}

impl QuizError {
    /// True for the NotFound class (unknown learner, question or mistake key).
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            QuizError::UnknownLearner(_)
                | QuizError::UnknownQuestion { .. }
                | QuizError::QuestionNotFound(_)
                | QuizError::WrongQuestionNotFound { .. }
        )
    }

    /// Only an unresolvable learner is fatal for the learner-facing flow;
    /// callers typically send the user back to authentication.
    pub fn requires_reauthentication(&self) -> bool {
        matches!(self, QuizError::UnknownLearner(_))
    }
}

pub type QuizResult<T> = std::result::Result<T, QuizError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_learner_is_not_found_and_fatal() {
        let err = QuizError::UnknownLearner("ghost".to_string());
        assert!(err.is_not_found());
        assert!(err.requires_reauthentication());
    }

    #[test]
    fn index_out_of_range_is_a_completion_signal_not_a_lookup_failure() {
        let err = QuizError::IndexOutOfRange { index: 5, len: 5 };
        assert!(!err.is_not_found());
        assert!(!err.requires_reauthentication());
    }

    #[test]
    fn foreign_session_is_neither_lookup_failure_nor_fatal() {
        let err = QuizError::ForeignSession {
            learner_id: "l2".to_string(),
            session_id: "s1".to_string(),
        };
        assert!(!err.is_not_found());
        assert!(!err.requires_reauthentication());
        assert!(err.to_string().contains("s1"));
    }

    #[test]
    fn store_errors_keep_context_chain() {
        let err: QuizError = anyhow::anyhow!("connection reset")
            .context("Failed to query answer_records")
            .into();
        let msg = err.to_string();
        assert!(msg.contains("Failed to query answer_records"));
        assert!(msg.contains("connection reset"));
    }
}

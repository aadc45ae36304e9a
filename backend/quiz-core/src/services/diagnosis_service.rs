use chrono::Utc;
use rand::seq::SliceRandom;
use std::sync::Arc;
use std::time::Duration;

use super::category_mapper::CategoryTable;
use super::require_learner;
use crate::error::QuizResult;
use crate::metrics::DIAGNOSES_TOTAL;
use crate::models::{DiagnosisOutcome, DiagnosisReport, Question, WeakTopic, WrongQuestion};
use crate::oracle::{error_text, Oracle, ORACLE_ERROR_PREFIX};
use crate::store::QuizStore;

pub const TOPICS_MARKER: &str = "弱點主題：";
pub const SUMMARY_MARKER: &str = "文字摘要：";

pub const NO_DATA_SUMMARY: &str = "Not enough mistakes to analyse yet.";
pub const FALLBACK_SUMMARY: &str = "The oracle did not return a usable analysis.";

/// Sections extracted from an oracle answer. `None` means the marker line
/// was absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedDiagnosis {
    pub labels: Option<Vec<String>>,
    pub summary: Option<String>,
}

impl ParsedDiagnosis {
    pub fn is_empty(&self) -> bool {
        self.labels.is_none() && self.summary.is_none()
    }
}

/// Samples unresolved mistakes, asks the oracle to label them and persists
/// the mapped weak-topic categories.
pub struct DiagnosisService {
    store: Arc<dyn QuizStore>,
    oracle: Arc<dyn Oracle>,
    categories: Arc<CategoryTable>,
    oracle_timeout: Duration,
}

impl DiagnosisService {
    pub fn new(
        store: Arc<dyn QuizStore>,
        oracle: Arc<dyn Oracle>,
        categories: Arc<CategoryTable>,
        oracle_timeout: Duration,
    ) -> Self {
        Self {
            store,
            oracle,
            categories,
            oracle_timeout,
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn diagnose(&self, learner_id: &str) -> QuizResult<DiagnosisReport> {
        require_learner(self.store.as_ref(), learner_id).await?;

        let unresolved = self
            .store
            .filter_wrong_questions(learner_id, false, None)
            .await?;

        if unresolved.is_empty() {
            tracing::info!("No unresolved mistakes, skipping oracle");
            return Ok(finish(
                Default::default(),
                NO_DATA_SUMMARY.to_string(),
                0,
                DiagnosisOutcome::NoData,
            ));
        }

        let target = sample_size(unresolved.len());
        let sampled = sample_mistakes(unresolved, target);

        let mut questions = Vec::with_capacity(sampled.len());
        for mistake in &sampled {
            match self.store.get_question(&mistake.question_id).await? {
                Some(question) => questions.push(question),
                None => tracing::warn!(
                    "Question {} of a recorded mistake no longer exists",
                    mistake.question_id
                ),
            }
        }

        if questions.is_empty() {
            return Ok(finish(
                Default::default(),
                FALLBACK_SUMMARY.to_string(),
                0,
                DiagnosisOutcome::Degraded,
            ));
        }

        let prompt = build_prompt(&questions);
        let response = match tokio::time::timeout(self.oracle_timeout, self.oracle.send(&prompt))
            .await
        {
            Ok(text) => text,
            Err(_) => error_text(format!(
                "oracle did not answer within {}s",
                self.oracle_timeout.as_secs_f64()
            )),
        };

        if response.starts_with(ORACLE_ERROR_PREFIX) {
            tracing::warn!("Oracle unavailable: {}", response);
        }

        let parsed = parse_oracle_response(&response);
        tracing::debug!(
            "Parsed oracle labels={:?} summary_present={}",
            parsed.labels,
            parsed.summary.is_some()
        );

        let outcome = if parsed.is_empty() {
            tracing::warn!("Oracle answer had no recognizable sections");
            DiagnosisOutcome::Degraded
        } else {
            DiagnosisOutcome::Diagnosed
        };

        let labels = parsed.labels.unwrap_or_default();
        let weak_topics = self.categories.map_to_categories(labels.as_slice());

        let now = Utc::now();
        for category in &weak_topics {
            self.store
                .upsert_weak_topic(learner_id, category, now)
                .await?;
        }

        let summary = parsed
            .summary
            .unwrap_or_else(|| FALLBACK_SUMMARY.to_string());

        Ok(finish(weak_topics, summary, questions.len(), outcome))
    }

    /// Weak topics already on record, most recently diagnosed first.
    pub async fn list_weak_topics(&self, learner_id: &str) -> QuizResult<Vec<WeakTopic>> {
        require_learner(self.store.as_ref(), learner_id).await?;
        Ok(self.store.list_weak_topics(learner_id).await?)
    }
}

fn finish(
    weak_topics: std::collections::BTreeSet<String>,
    summary: String,
    sampled: usize,
    outcome: DiagnosisOutcome,
) -> DiagnosisReport {
    DIAGNOSES_TOTAL.with_label_values(&[outcome.as_str()]).inc();
    tracing::info!(
        "Diagnosis finished: outcome={} sampled={} categories={:?}",
        outcome.as_str(),
        sampled,
        weak_topics
    );
    DiagnosisReport {
        weak_topics,
        summary,
        sampled,
        outcome,
    }
}

/// Half of the unresolved mistakes, but at least one when any exist.
pub fn sample_size(unresolved: usize) -> usize {
    if unresolved == 0 {
        0
    } else {
        (unresolved / 2).max(1)
    }
}

fn sample_mistakes(mut mistakes: Vec<WrongQuestion>, size: usize) -> Vec<WrongQuestion> {
    mistakes.shuffle(&mut rand::rng());
    mistakes.truncate(size);
    mistakes
}

pub fn build_prompt(questions: &[Question]) -> String {
    let mut parts = vec![
        "請分析以下學生答錯的題目，找出學生最主要的學習弱點主題，並提供一段綜合的文字摘要。"
            .to_string(),
    ];

    for (i, question) in questions.iter().enumerate() {
        let options = question
            .options
            .iter()
            .map(|(key, text)| format!("  {}. {}", key, text))
            .collect::<Vec<_>>()
            .join("\n");

        parts.push(format!("\n錯題 {}:", i + 1));
        parts.push(format!("  題目：{}", question.content));
        parts.push(format!("  選項：\n{}", options));
        parts.push(format!("  正確答案：{}", question.answer));
        parts.push("  (學生選擇的答案未提供，請根據題目和選項分析可能的錯誤原因)".to_string());
    }

    parts.push("\n請自由歸納弱點主題。".to_string());
    parts.push("\n請將你的分析結果以下列格式呈現：".to_string());
    parts.push(format!("{}[主題1，主題2，...]", TOPICS_MARKER));
    parts.push(format!(
        "{}[一段綜合的文字摘要，說明學生的主要學習問題和建議]",
        SUMMARY_MARKER
    ));

    parts.join("\n")
}

/// Later marker lines overwrite earlier ones.
pub fn parse_oracle_response(text: &str) -> ParsedDiagnosis {
    let mut parsed = ParsedDiagnosis::default();

    for line in text.lines() {
        if let Some(rest) = line.strip_prefix(TOPICS_MARKER) {
            parsed.labels = Some(split_labels(rest));
        } else if let Some(rest) = line.strip_prefix(SUMMARY_MARKER) {
            let summary = rest.trim();
            parsed.summary = (!summary.is_empty()).then(|| summary.to_string());
        }
    }

    parsed
}

fn split_labels(raw: &str) -> Vec<String> {
    let trimmed = raw.trim();
    let inner = trimmed
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .unwrap_or(trimmed);

    inner
        .split(['，', '、'])
        .map(str::trim)
        .filter(|label| !label.is_empty())
        .map(str::to_string)
        .collect()
}

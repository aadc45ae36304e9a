use serde::Serialize;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosisOutcome {
    /// No unresolved mistakes; the oracle was not consulted.
    NoData,
    Diagnosed,
    /// Oracle failed, timed out or answered without the expected sections.
    Degraded,
}

impl DiagnosisOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosisOutcome::NoData => "no_data",
            DiagnosisOutcome::Diagnosed => "diagnosed",
            DiagnosisOutcome::Degraded => "degraded",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DiagnosisReport {
    pub weak_topics: BTreeSet<String>,
    pub summary: String,
    /// Number of mistakes sent to the oracle.
    pub sampled: usize,
    pub outcome: DiagnosisOutcome,
}

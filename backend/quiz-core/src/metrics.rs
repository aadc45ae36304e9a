use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_histogram_vec, register_int_counter, register_int_counter_vec,
    Encoder, Histogram, HistogramVec, IntCounter, IntCounterVec, TextEncoder,
};

lazy_static! {
    // Store Metrics
    pub static ref STORE_OPERATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "quiz_store_operations_total",
        "Total number of persistence gateway operations",
        &["operation", "status"]
    )
    .unwrap();

    pub static ref STORE_OPERATION_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "quiz_store_operation_duration_seconds",
        "Persistence gateway operation duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .unwrap();

    // Business Metrics
    pub static ref SESSIONS_STARTED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "quiz_sessions_started_total",
        "Total number of test sessions started",
        &["pool"]
    )
    .unwrap();

    pub static ref ANSWERS_RECORDED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "quiz_answers_recorded_total",
        "Total number of answers recorded",
        &["correct"]
    )
    .unwrap();

    pub static ref ANSWERS_DUPLICATE_TOTAL: IntCounter = register_int_counter!(
        "quiz_answers_duplicate_total",
        "Answer submissions replayed because the answer was already recorded"
    )
    .unwrap();

    pub static ref DIAGNOSES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "quiz_diagnoses_total",
        "Total number of weakness diagnoses",
        &["outcome"]
    )
    .unwrap();

    pub static ref EXPLANATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "quiz_explanations_total",
        "Question explanations served, by source",
        &["source"]
    )
    .unwrap();

    pub static ref FAVORITE_TOGGLES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "quiz_favorite_toggles_total",
        "Favorite toggles, by resulting state",
        &["starred"]
    )
    .unwrap();

    // Oracle Metrics
    pub static ref ORACLE_REQUEST_DURATION_SECONDS: Histogram = register_histogram!(
        "quiz_oracle_request_duration_seconds",
        "Oracle request duration in seconds, retries included",
        vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]
    )
    .unwrap();
}

/// Renders all metrics in Prometheus text format
pub fn render_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer)
        .map_err(|e| prometheus::Error::Msg(format!("Failed to convert metrics to UTF-8: {}", e)))
}

/// Helper: track a persistence gateway call with metrics
pub async fn track_store_operation<F, T>(operation: &str, future: F) -> Result<T, anyhow::Error>
where
    F: std::future::Future<Output = Result<T, anyhow::Error>>,
{
    let start = std::time::Instant::now();
    let result = future.await;
    let duration = start.elapsed().as_secs_f64();

    let status = if result.is_ok() { "success" } else { "error" };

    STORE_OPERATIONS_TOTAL
        .with_label_values(&[operation, status])
        .inc();

    STORE_OPERATION_DURATION_SECONDS
        .with_label_values(&[operation])
        .observe(duration);

    result
}

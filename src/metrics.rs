/// Metrics for the Files backend
///
/// Prometheus counters for HTTP traffic, the account lifecycle, the expiry
/// sweeper and other background jobs.

use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge, Encoder, HistogramVec,
    IntCounterVec, IntGauge, TextEncoder,
};

lazy_static! {
    /// Total HTTP requests by method and status class
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "files_http_requests_total",
        "Total number of HTTP requests",
        &["method", "status"]
    )
    .unwrap();

    /// HTTP request duration in seconds
    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "files_http_request_duration_seconds",
        "HTTP request latencies in seconds",
        &["method"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
    )
    .unwrap();

    /// Account lifecycle transitions (registered, confirmed, reset, linked, ...)
    pub static ref ACCOUNT_EVENTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "files_account_events_total",
        "Account lifecycle events by kind",
        &["event"]
    )
    .unwrap();

    /// Accounts removed by the expiry sweeper, by outcome
    pub static ref SWEEPER_ROWS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "files_sweeper_rows_total",
        "Unconfirmed accounts handled by the expiry sweeper",
        &["outcome"]
    )
    .unwrap();

    /// Background job executions by job and status
    pub static ref BACKGROUND_JOBS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "files_background_jobs_total",
        "Total number of background job executions",
        &["job", "status"]
    )
    .unwrap();

    /// Background job duration in seconds
    pub static ref BACKGROUND_JOB_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "files_background_job_duration_seconds",
        "Background job durations in seconds",
        &["job"],
        vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0]
    )
    .unwrap();

    /// Application start time as a unix timestamp
    pub static ref START_TIME_SECONDS: IntGauge = register_int_gauge!(
        "files_start_time_seconds",
        "Unix time the process started"
    )
    .unwrap();
}

/// Render metrics in Prometheus text format
pub fn render_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Record an HTTP request
pub fn record_http_request(method: &str, status: u16, duration: f64) {
    let class = format!("{}xx", status / 100);
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, &class])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method])
        .observe(duration);
}

/// Record an account lifecycle event
pub fn record_account_event(event: &str) {
    ACCOUNT_EVENTS_TOTAL.with_label_values(&[event]).inc();
}

/// Record sweeper row outcomes for one tick
pub fn record_sweep(deleted: usize, failed: usize) {
    SWEEPER_ROWS_TOTAL
        .with_label_values(&["deleted"])
        .inc_by(deleted as u64);
    SWEEPER_ROWS_TOTAL
        .with_label_values(&["failed"])
        .inc_by(failed as u64);
}

/// Record a background job execution
pub fn record_background_job(job: &str, status: &str, duration: f64) {
    BACKGROUND_JOBS_TOTAL
        .with_label_values(&[job, status])
        .inc();
    BACKGROUND_JOB_DURATION_SECONDS
        .with_label_values(&[job])
        .observe(duration);
}

/// Mark the process start
pub fn record_start() {
    START_TIME_SECONDS.set(chrono::Utc::now().timestamp());
}

//! Prometheus metrics for token review
//!
//! Registered with the default registry on first use. A registration
//! failure (e.g. a name clash with another library) is logged and the
//! metric is skipped.

use std::time::Instant;

use prometheus::{HistogramVec, IntCounterVec};

/// Outcome label for requests served without authentication
pub const OUTCOME_EXEMPT: &str = "exempt";
/// Outcome label for requests passed to the wrapped service
pub const OUTCOME_FORWARDED: &str = "forwarded";

/// Remote call label for TokenReview round trips
pub const CALL_TOKEN_REVIEW: &str = "token_review";
/// Remote call label for SubjectAccessReview round trips
pub const CALL_SUBJECT_ACCESS_REVIEW: &str = "subject_access_review";

lazy_static::lazy_static! {
    static ref TOKEN_REVIEW_REQUESTS_TOTAL: Option<IntCounterVec> =
        prometheus::register_int_counter_vec!(
            "token_review_requests_total",
            "Requests seen by the token review middleware, by outcome",
            &["outcome"]
        )
        .map_err(|e| registration_failed("token_review_requests_total", e))
        .ok();

    static ref TOKEN_REVIEW_REMOTE_DURATION_SECONDS: Option<HistogramVec> =
        prometheus::register_histogram_vec!(
            "token_review_remote_duration_seconds",
            "Latency of TokenReview and SubjectAccessReview calls",
            &["call"],
            vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
        )
        .map_err(|e| registration_failed("token_review_remote_duration_seconds", e))
        .ok();
}

fn registration_failed(metric: &str, e: prometheus::Error) {
    tracing::warn!(metric, error = %e, "Failed to register metric");
}

/// Count one request with the given outcome label
pub fn record_outcome(outcome: &str) {
    if let Some(counter) = TOKEN_REVIEW_REQUESTS_TOTAL.as_ref() {
        counter.with_label_values(&[outcome]).inc();
    }
}

/// Observe the latency of a remote call started at `start`
pub fn observe_remote(call: &str, start: Instant) {
    if let Some(histogram) = TOKEN_REVIEW_REMOTE_DURATION_SECONDS.as_ref() {
        histogram
            .with_label_values(&[call])
            .observe(start.elapsed().as_secs_f64());
    }
}

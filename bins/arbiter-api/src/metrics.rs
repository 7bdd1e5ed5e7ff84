// Prometheus metrics for the Arbiter API

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter_vec, register_int_gauge, Histogram, IntCounterVec,
    IntGauge, TextEncoder,
};

lazy_static! {
    pub static ref SUBMISSIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "arbiter_submissions_total",
        "Graded submissions by overall status",
        &["status"]
    )
    .expect("arbiter_submissions_total can be registered");
    pub static ref REJECTIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "arbiter_rejections_total",
        "Submissions that produced no verdict, by reason",
        &["reason"]
    )
    .expect("arbiter_rejections_total can be registered");
    pub static ref GRADING_DURATION_SECONDS: Histogram = register_histogram!(
        "arbiter_grading_duration_seconds",
        "Wall-clock time to grade one submission, queueing included",
        vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]
    )
    .expect("arbiter_grading_duration_seconds can be registered");
    pub static ref INFLIGHT_SUBMISSIONS: IntGauge = register_int_gauge!(
        "arbiter_inflight_submissions",
        "Submissions currently admitted or waiting for admission"
    )
    .expect("arbiter_inflight_submissions can be registered");
}

/// Decrements the in-flight gauge when the request ends, including when the
/// client goes away mid-grading.
pub struct InflightGuard;

impl InflightGuard {
    pub fn enter() -> Self {
        INFLIGHT_SUBMISSIONS.inc();
        InflightGuard
    }
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        INFLIGHT_SUBMISSIONS.dec();
    }
}

/// Text exposition of every registered metric
pub fn render() -> Result<String, prometheus::Error> {
    TextEncoder::new().encode_to_string(&prometheus::gather())
}

// Prometheus metrics exposed on GET /metrics
use anyhow::Result;
use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter_vec, Encoder, Histogram, IntCounterVec, TextEncoder,
};

lazy_static! {
    pub static ref EVALUATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "codegrade_evaluations_total",
        "Completed evaluations by letter grade",
        &["grade"]
    )
    .unwrap();
    pub static ref EVALUATION_DURATION: Histogram = register_histogram!(
        "codegrade_evaluation_duration_seconds",
        "Wall time of one full evaluation",
        vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    )
    .unwrap();
}

pub fn record_evaluation(grade: &str, seconds: f64) {
    EVALUATIONS_TOTAL.with_label_values(&[grade]).inc();
    EVALUATION_DURATION.observe(seconds);
}

/// Text exposition of the default registry
pub fn render() -> Result<String> {
    // Touch the statics so both families appear before the first evaluation
    lazy_static::initialize(&EVALUATIONS_TOTAL);
    lazy_static::initialize(&EVALUATION_DURATION);

    let mut buffer = Vec::new();
    TextEncoder::new().encode(&prometheus::gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

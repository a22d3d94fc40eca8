//! Prometheus metrics for the invocation server
//!
//! All metrics live in the default registry. They are recorded by the
//! server and rendered by [`encode_text`]; the binary can expose that text
//! on a separate listener so the invocation route table stays fixed.
//!
//! | Metric | Type | Labels |
//! |---|---|---|
//! | `agenthost_invocations_total` | counter | `outcome` = single, stream |
//! | `agenthost_invocation_errors_total` | counter | `kind` |
//! | `agenthost_stream_events_total` | counter | `event` = data, error, done |
//! | `agenthost_streams_in_flight` | gauge | |
//! | `agenthost_invocation_duration_seconds` | histogram | `outcome` |
//! | `agenthost_pings_total` | counter | `status` |

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram_vec, register_int_gauge, CounterVec, Encoder,
    HistogramVec, IntGauge, TextEncoder,
};

lazy_static! {
    pub static ref INVOCATIONS_TOTAL: CounterVec = register_counter_vec!(
        "agenthost_invocations_total",
        "Invocations that reached the handler and produced an outcome",
        &["outcome"]
    )
    .expect("register agenthost_invocations_total");

    pub static ref INVOCATION_ERRORS_TOTAL: CounterVec = register_counter_vec!(
        "agenthost_invocation_errors_total",
        "Rejected or failed invocations by kind",
        &["kind"]
    )
    .expect("register agenthost_invocation_errors_total");

    pub static ref STREAM_EVENTS_TOTAL: CounterVec = register_counter_vec!(
        "agenthost_stream_events_total",
        "SSE events written to clients",
        &["event"]
    )
    .expect("register agenthost_stream_events_total");

    pub static ref STREAMS_IN_FLIGHT: IntGauge = register_int_gauge!(
        "agenthost_streams_in_flight",
        "Streaming invocations currently being pumped"
    )
    .expect("register agenthost_streams_in_flight");

    pub static ref INVOCATION_DURATION: HistogramVec = register_histogram_vec!(
        "agenthost_invocation_duration_seconds",
        "Time from request arrival to handler outcome (single) or terminal state (stream)",
        &["outcome"],
        vec![0.005, 0.025, 0.1, 0.5, 1.0, 5.0, 30.0, 120.0]
    )
    .expect("register agenthost_invocation_duration_seconds");

    pub static ref PINGS_TOTAL: CounterVec = register_counter_vec!(
        "agenthost_pings_total",
        "Health checks answered by status",
        &["status"]
    )
    .expect("register agenthost_pings_total");
}

/// Render every registered metric in the Prometheus text format
pub fn encode_text() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_includes_recorded_metrics() {
        INVOCATIONS_TOTAL.with_label_values(&["single"]).inc();
        STREAM_EVENTS_TOTAL.with_label_values(&["done"]).inc();

        let text = encode_text().unwrap();
        assert!(text.contains("agenthost_invocations_total"));
        assert!(text.contains("agenthost_stream_events_total"));
    }
}

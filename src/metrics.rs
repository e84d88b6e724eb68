//! Metric helpers for `amqp-receiver`.
//!
//! This module defines metric names and simple helper functions
//! wrapping the [`metrics`](https://docs.rs/metrics) crate. No exporter is
//! installed; embedders choose their own recorder.

use metrics::{counter, gauge};

/// Name of the counter tracking settled deliveries.
pub const DELIVERIES_SETTLED: &str = "amqp_receiver_deliveries_settled_total";
/// Name of the counter tracking payloads that failed to decode.
pub const DECODE_FAILURES: &str = "amqp_receiver_decode_failures_total";
/// Name of the counter tracking payloads cut short by the read buffer.
pub const PAYLOAD_TRUNCATED: &str = "amqp_receiver_payload_truncated_total";
/// Name of the counter tracking credit issued to the peer.
pub const CREDIT_GRANTED: &str = "amqp_receiver_credit_granted_total";
/// Name of the gauge tracking outstanding link credit after each grant.
pub const OUTSTANDING_CREDIT: &str = "amqp_receiver_outstanding_credit";

/// Record a settled delivery.
pub fn inc_settled() { counter!(DELIVERIES_SETTLED).increment(1); }

/// Record a payload that failed to decode.
pub fn inc_decode_failures() { counter!(DECODE_FAILURES).increment(1); }

/// Record a truncated payload.
pub fn inc_truncated() { counter!(PAYLOAD_TRUNCATED).increment(1); }

/// Record a credit grant of `added` bringing the link to `outstanding`.
pub fn record_credit(added: u32, outstanding: u32) {
    counter!(CREDIT_GRANTED).increment(u64::from(added));
    gauge!(OUTSTANDING_CREDIT).set(f64::from(outstanding));
}

//! Metric helpers for `snacline`.
//!
//! This module defines metric names and simple helper functions wrapping the
//! [`metrics`](https://docs.rs/metrics) crate. With the `metrics` feature
//! disabled the helpers compile to no-ops.

#[cfg(feature = "metrics")]
use metrics::counter;

/// Name of the counter tracking inbound frames dispatched.
pub const FRAMES_DISPATCHED: &str = "snacline_frames_dispatched_total";
/// Name of the counter tracking responses matched to pending requests.
pub const RESPONSES_MATCHED: &str = "snacline_responses_matched_total";
/// Name of the counter tracking pending requests that timed out.
pub const REQUESTS_TIMED_OUT: &str = "snacline_requests_timed_out_total";
/// Name of the counter tracking commands held back by a rate queue.
pub const COMMANDS_QUEUED: &str = "snacline_commands_queued_total";
/// Name of the counter tracking commands written to the transport.
pub const COMMANDS_SENT: &str = "snacline_commands_sent_total";
/// Name of the counter tracking caught dispatch-stage failures.
pub const DISPATCH_ERRORS: &str = "snacline_dispatch_errors_total";

/// Record a dispatched inbound frame.
pub fn inc_frames_dispatched() {
    #[cfg(feature = "metrics")]
    counter!(FRAMES_DISPATCHED).increment(1);
}

/// Record a response routed to its pending request.
pub fn inc_responses_matched() {
    #[cfg(feature = "metrics")]
    counter!(RESPONSES_MATCHED).increment(1);
}

/// Record a pending request timing out.
pub fn inc_requests_timed_out() {
    #[cfg(feature = "metrics")]
    counter!(REQUESTS_TIMED_OUT).increment(1);
}

/// Record a command parked in a rate queue.
pub fn inc_commands_queued() {
    #[cfg(feature = "metrics")]
    counter!(COMMANDS_QUEUED).increment(1);
}

/// Record a command written to the transport.
pub fn inc_commands_sent() {
    #[cfg(feature = "metrics")]
    counter!(COMMANDS_SENT).increment(1);
}

/// Record a caught dispatch-stage failure.
pub fn inc_dispatch_errors() {
    #[cfg(feature = "metrics")]
    counter!(DISPATCH_ERRORS).increment(1);
}

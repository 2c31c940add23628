//! Client metrics definitions
//!
//! OpenTelemetry instruments for monitoring client health. They are
//! recorded only when the client was built with observability enabled and
//! are exported through whatever meter provider is installed globally.
//!
//! # Metrics Collected
//!
//! - **connection_state**: Current connection status (gauge)
//! - **requests_total**: Requests settled, by type and outcome (counter)
//! - **request_duration**: Request latency distribution (histogram)
//! - **errors_total**: Errors encountered, by kind (counter)
//! - **reconnection_attempts**: Reconnection attempt count (counter)
//! - **reconnection_success**: Successful reconnections (counter)
//! - **frames_received**: Inbound frames routed, by type (counter)
//! - **stream_chunks**: Chunks delivered to response streams (counter)
//!
//! # Examples
//!
//! ```rust,no_run
//! use wirebus_client::ClientMetrics;
//!
//! let metrics = ClientMetrics::new("dashboard");
//! metrics.record_frame("metrics_update");
//! ```

use opentelemetry::{
    global,
    metrics::{Counter, Gauge, Histogram, Meter},
    KeyValue,
};

/// Client metrics for monitoring
pub struct ClientMetrics {
    /// Connection state (see `ConnectionState::as_gauge`)
    pub connection_state: Gauge<i64>,
    /// Total number of settled requests
    pub requests_total: Counter<u64>,
    /// Request duration in seconds
    pub request_duration: Histogram<f64>,
    /// Total number of errors
    pub errors_total: Counter<u64>,
    /// Total number of reconnection attempts
    pub reconnection_attempts: Counter<u64>,
    /// Total number of successful reconnections
    pub reconnection_success: Counter<u64>,
    /// Total number of inbound frames
    pub frames_received: Counter<u64>,
    /// Total number of stream chunks delivered
    pub stream_chunks: Counter<u64>,
}

impl ClientMetrics {
    /// Create metrics on the global meter named `service_name`
    pub fn new(service_name: impl Into<String>) -> Self {
        // Meter names must be 'static; clients are built a handful of times per process
        let name: &'static str = Box::leak(service_name.into().into_boxed_str());
        let meter = global::meter(name);
        Self::new_with_meter(&meter)
    }

    /// Create metrics with a custom meter
    pub fn new_with_meter(meter: &Meter) -> Self {
        Self {
            connection_state: meter
                .i64_gauge("wirebus.client.connection.state")
                .with_description("Connection state (0=disconnected, 1=connecting, 2=connected, 3=reconnecting, 4=failed, 5=closing)")
                .build(),
            requests_total: meter
                .u64_counter("wirebus.client.requests.total")
                .with_description("Total number of requests settled")
                .build(),
            request_duration: meter
                .f64_histogram("wirebus.client.request.duration")
                .with_description("Request duration in seconds")
                .build(),
            errors_total: meter
                .u64_counter("wirebus.client.errors.total")
                .with_description("Total number of errors encountered")
                .build(),
            reconnection_attempts: meter
                .u64_counter("wirebus.client.reconnection.attempts")
                .with_description("Total number of reconnection attempts")
                .build(),
            reconnection_success: meter
                .u64_counter("wirebus.client.reconnection.success")
                .with_description("Total number of successful reconnections")
                .build(),
            frames_received: meter
                .u64_counter("wirebus.client.frames.received")
                .with_description("Total number of inbound frames")
                .build(),
            stream_chunks: meter
                .u64_counter("wirebus.client.stream.chunks")
                .with_description("Total number of chunks delivered to response streams")
                .build(),
        }
    }

    /// Update connection state
    pub fn update_connection_state(&self, state: i64) {
        self.connection_state.record(state, &[]);
    }

    /// Record a settled request
    pub fn record_request(&self, request_type: &str, status: &str, duration_secs: f64) {
        let attributes = &[
            KeyValue::new("type", request_type.to_string()),
            KeyValue::new("status", status.to_string()),
        ];
        self.requests_total.add(1, attributes);
        self.request_duration.record(duration_secs, attributes);
    }

    /// Record an error
    pub fn record_error(&self, error_kind: &str) {
        let attributes = &[KeyValue::new("error_kind", error_kind.to_string())];
        self.errors_total.add(1, attributes);
    }

    /// Record a reconnection attempt
    pub fn record_reconnection_attempt(&self) {
        self.reconnection_attempts.add(1, &[]);
    }

    /// Record a successful reconnection
    pub fn record_reconnection_success(&self) {
        self.reconnection_success.add(1, &[]);
    }

    /// Record an inbound frame
    pub fn record_frame(&self, frame_type: &str) {
        let attributes = &[KeyValue::new("type", frame_type.to_string())];
        self.frames_received.add(1, attributes);
    }

    /// Record a chunk delivered to a response stream
    pub fn record_stream_chunk(&self) {
        self.stream_chunks.add(1, &[]);
    }
}

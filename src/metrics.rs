// src/metrics.rs

#[cfg(feature = "metrics")]
mod metrics_impl {
    use once_cell::sync::Lazy;
    use prometheus::{
        register_histogram_vec, register_int_counter, register_int_counter_vec,
        register_int_gauge_vec, HistogramVec, IntCounter, IntCounterVec, IntGaugeVec,
    };

    /// Prometheus metrics for the dispatcher and the conversation engine.
    pub struct Metrics {
        /// Updates handed to a handler, by handler name.
        pub updates_dispatched_total: IntCounterVec,
        /// Updates that carried neither a message nor a callback.
        pub updates_dropped_total: IntCounter,
        /// Middleware failures, by middleware name.
        pub middleware_errors_total: IntCounterVec,
        /// Time spent inside handlers.
        pub handler_duration: HistogramVec,
        /// Step outcomes (accept, reject, error), by conversation.
        pub conversation_steps_total: IntCounterVec,
        /// Conversations currently parked in the registry.
        pub conversations_active: IntGaugeVec,
        /// The counter for recording error occurrences.
        pub error_count: IntCounterVec,
    }

    impl Metrics {
        /// Creates a new metrics instance.
        pub fn new() -> Self {
            Self {
                updates_dispatched_total: register_int_counter_vec!(
                    "classwatch_updates_dispatched_total",
                    "Total number of updates dispatched to a handler",
                    &["handler"]
                )
                .expect("failed to create counter"),
                updates_dropped_total: register_int_counter!(
                    "classwatch_updates_dropped_total",
                    "Total number of updates dropped before dispatch"
                )
                .expect("failed to create counter"),
                middleware_errors_total: register_int_counter_vec!(
                    "classwatch_middleware_errors_total",
                    "Total number of middleware failures",
                    &["middleware"]
                )
                .expect("failed to create counter"),
                handler_duration: register_histogram_vec!(
                    "classwatch_handler_duration_seconds",
                    "Time taken by handlers",
                    &["handler"]
                )
                .expect("failed to create histogram"),
                conversation_steps_total: register_int_counter_vec!(
                    "classwatch_conversation_steps_total",
                    "Conversation step outcomes",
                    &["conversation", "outcome"]
                )
                .expect("failed to create counter"),
                conversations_active: register_int_gauge_vec!(
                    "classwatch_conversations_active",
                    "Conversations currently in progress",
                    &["conversation"]
                )
                .expect("failed to create gauge"),
                error_count: register_int_counter_vec!(
                    "classwatch_errors_total",
                    "Total number of errors encountered",
                    &["component", "error_type"]
                )
                .expect("failed to create counter"),
            }
        }

        pub fn inc_updates_dispatched(&self, handler: &str) {
            self.updates_dispatched_total
                .with_label_values(&[handler])
                .inc();
        }

        pub fn inc_updates_dropped(&self) {
            self.updates_dropped_total.inc();
        }

        pub fn inc_middleware_errors(&self, middleware: &str) {
            self.middleware_errors_total
                .with_label_values(&[middleware])
                .inc();
        }

        /// Records the duration of a handler run in seconds.
        pub fn record_handler_duration(&self, handler: &str, duration: f64) {
            self.handler_duration
                .with_label_values(&[handler])
                .observe(duration);
        }

        pub fn inc_conversation_step(&self, conversation: &str, outcome: &str) {
            self.conversation_steps_total
                .with_label_values(&[conversation, outcome])
                .inc();
        }

        pub fn set_conversations_active(&self, conversation: &str, active: i64) {
            self.conversations_active
                .with_label_values(&[conversation])
                .set(active);
        }

        /// Records an error occurrence.
        ///
        /// # Arguments
        ///
        /// * `component` - The component where the error occurred
        /// * `error_type` - The type of error that occurred
        pub fn record_error(&self, component: &str, error_type: &str) {
            self.error_count
                .with_label_values(&[component, error_type])
                .inc();
        }
    }

    pub static METRICS: Lazy<Metrics> = Lazy::new(Metrics::new);
}

#[cfg(feature = "metrics")]
pub use metrics_impl::*;

////////////////////////////////////////////////////
// When the metrics feature is disabled, provide a stub
#[cfg(not(feature = "metrics"))]
mod metrics_stub {
    /// No-op metrics used when the `metrics` feature is off.
    pub struct Metrics;

    impl Metrics {
        pub fn new() -> Self {
            Metrics
        }

        pub fn inc_updates_dispatched(&self, _handler: &str) {}

        pub fn inc_updates_dropped(&self) {}

        pub fn inc_middleware_errors(&self, _middleware: &str) {}

        pub fn record_handler_duration(&self, _handler: &str, _duration: f64) {}

        pub fn inc_conversation_step(&self, _conversation: &str, _outcome: &str) {}

        pub fn set_conversations_active(&self, _conversation: &str, _active: i64) {}

        pub fn record_error(&self, _component: &str, _error_type: &str) {}
    }

    impl Default for Metrics {
        fn default() -> Self {
            Self::new()
        }
    }

    /// The global metrics instance used throughout the crate.
    pub static METRICS: Metrics = Metrics;
}

#[cfg(not(feature = "metrics"))]
pub use metrics_stub::*;

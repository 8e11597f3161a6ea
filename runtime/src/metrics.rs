//! Prometheus metrics for observability and monitoring.
//!
//! This module provides metric collection for every Marquee component:
//! - Store action processing
//! - Query cache hits, fetches, evictions and invalidations
//! - Optimistic mutations (commits and rollbacks)
//! - Persistence writes and rehydration fallbacks
//!
//! Recording goes through the `metrics` facade, so it is a no-op until a
//! recorder is installed.
//!
//! # Example
//!
//! ```rust,no_run
//! use marquee_runtime::metrics::MetricsRecorder;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let recorder = MetricsRecorder::install()?;
//!
//! // ... run the storefront ...
//!
//! if let Some(text) = recorder.render() {
//!     println!("{text}");
//! }
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;
use thiserror::Error;

// Re-export metrics macros for use in other crates
pub use metrics::{counter, gauge, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Installed Prometheus recorder.
pub struct MetricsRecorder {
    handle: Option<PrometheusHandle>,
}

impl MetricsRecorder {
    /// Describe all metrics and install the Prometheus recorder globally.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed.
    ///
    /// # Note
    ///
    /// If a recorder is already installed (e.g., by another test), the
    /// returned recorder has no handle and [`MetricsRecorder::render`]
    /// returns `None`; recording keeps working.
    pub fn install() -> Result<Self, MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                tracing::info!("Prometheus metrics recorder installed");
                Ok(Self {
                    handle: Some(handle),
                })
            },
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(Self { handle: None })
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            },
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus text format.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
pub fn register_metrics() {
    // Store
    describe_counter!("store_actions_total", "Total number of actions reduced by stores");

    // Query cache
    describe_counter!("query_cache_hits_total", "Requests served from a fresh cache entry");
    describe_counter!("query_fetch_started_total", "Fetches issued to the HTTP collaborator");
    describe_counter!(
        "query_fetch_coalesced_total",
        "Requests attached to an in-flight fetch instead of issuing a new one"
    );
    describe_counter!("query_fetch_failed_total", "Fetches that ended in a rejected entry");
    describe_histogram!("query_fetch_duration_seconds", "Time taken by fetches");
    describe_gauge!("query_entries", "Cache entries currently held");
    describe_counter!("query_entries_evicted_total", "Entries evicted after their retention window");
    describe_counter!("query_entries_invalidated_total", "Entries marked stale by tag invalidation");

    // Mutations
    describe_counter!("mutation_started_total", "Mutations issued");
    describe_counter!("mutation_optimistic_total", "Optimistic patches applied to the cache");
    describe_counter!("mutation_committed_total", "Mutations confirmed by the server");
    describe_counter!("mutation_rolled_back_total", "Mutations whose optimistic patch was undone");

    // Persistence
    describe_counter!("persist_writes_total", "Slice writes completed");
    describe_counter!("persist_write_failures_total", "Slice writes that failed");
    describe_counter!(
        "persist_rehydrate_fallbacks_total",
        "Slices rehydrated from defaults because the payload was unusable"
    );
}

/// Store metrics recorder.
pub struct StoreMetrics;

impl StoreMetrics {
    /// Record an action processed.
    pub fn record_action() {
        counter!("store_actions_total").increment(1);
    }
}

/// Query cache metrics recorder.
pub struct QueryMetrics;

impl QueryMetrics {
    /// Record a request served from cache.
    pub fn record_hit(endpoint: &str) {
        counter!("query_cache_hits_total", "endpoint" => endpoint.to_string()).increment(1);
    }

    /// Record a fetch issued.
    pub fn record_fetch(endpoint: &str) {
        counter!("query_fetch_started_total", "endpoint" => endpoint.to_string()).increment(1);
    }

    /// Record a request that joined an in-flight fetch.
    pub fn record_coalesced(endpoint: &str) {
        counter!("query_fetch_coalesced_total", "endpoint" => endpoint.to_string()).increment(1);
    }

    /// Record a fetch outcome.
    pub fn record_fetch_completed(endpoint: &str, duration: Duration, success: bool) {
        histogram!("query_fetch_duration_seconds", "endpoint" => endpoint.to_string())
            .record(duration.as_secs_f64());
        if !success {
            counter!("query_fetch_failed_total", "endpoint" => endpoint.to_string()).increment(1);
        }
    }

    /// Record the number of entries held.
    #[allow(clippy::cast_precision_loss)] // entry counts stay far below 2^52
    pub fn record_entries(count: usize) {
        gauge!("query_entries").set(count as f64);
    }

    /// Record an eviction.
    pub fn record_eviction() {
        counter!("query_entries_evicted_total").increment(1);
    }

    /// Record entries marked stale by an invalidation.
    pub fn record_invalidated(count: usize) {
        counter!("query_entries_invalidated_total").increment(count as u64);
    }
}

/// Mutation metrics recorder.
pub struct MutationMetrics;

impl MutationMetrics {
    /// Record a mutation issued.
    pub fn record_started(endpoint: &str, optimistic: bool) {
        counter!("mutation_started_total", "endpoint" => endpoint.to_string()).increment(1);
        if optimistic {
            counter!("mutation_optimistic_total", "endpoint" => endpoint.to_string()).increment(1);
        }
    }

    /// Record a confirmed mutation.
    pub fn record_committed(endpoint: &str) {
        counter!("mutation_committed_total", "endpoint" => endpoint.to_string()).increment(1);
    }

    /// Record a rolled back mutation.
    pub fn record_rolled_back(endpoint: &str) {
        counter!("mutation_rolled_back_total", "endpoint" => endpoint.to_string()).increment(1);
    }
}

/// Persistence metrics recorder.
pub struct PersistMetrics;

impl PersistMetrics {
    /// Record a completed write.
    pub fn record_write(slice: &str) {
        counter!("persist_writes_total", "slice" => slice.to_string()).increment(1);
    }

    /// Record a failed write.
    pub fn record_write_failure(slice: &str) {
        counter!("persist_write_failures_total", "slice" => slice.to_string()).increment(1);
    }

    /// Record a slice that fell back to its default on rehydration.
    pub fn record_rehydrate_fallback(slice: &str) {
        counter!("persist_rehydrate_fallbacks_total", "slice" => slice.to_string()).increment(1);
    }
}

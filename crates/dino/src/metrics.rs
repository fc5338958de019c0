//! Metrics collection and reporting using metrics-rs.
//!
//! The bridge records decode outcomes and connection failures through the
//! `metrics` facade. [`CliRecorder`] keeps them in memory for the CLI's
//! `--metrics` summary.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dino_state::{DecodeError, Decoded};
use metrics::{
    Counter, Gauge, Histogram, Key, KeyName, Metadata, Recorder, SharedString, Unit, counter,
    describe_counter, describe_gauge, describe_histogram, gauge, histogram,
};
use parking_lot::RwLock;

// ============================================================================
// Metric descriptions
// ============================================================================

/// Register metric descriptions. Call once at startup.
pub fn init() {
    describe_counter!(
        "dino_snapshots_decoded_total",
        Unit::Count,
        "Frames decoded into a snapshot"
    );
    describe_counter!(
        "dino_snapshots_rejected_total",
        Unit::Count,
        "Frames rejected for a corrupt header"
    );
    describe_counter!(
        "dino_null_buffers_total",
        Unit::Count,
        "Frames where the producer returned no state buffer"
    );
    describe_counter!(
        "dino_trailer_truncations_total",
        Unit::Count,
        "Frames whose obstacle count was clamped to the readable records"
    );
    describe_counter!(
        "dino_fields_repaired_total",
        Unit::Count,
        "Fields replaced by a default value"
    );
    describe_counter!(
        "dino_connection_failures_total",
        Unit::Count,
        "Failed producer acquisitions"
    );
    describe_gauge!("dino_obstacles", Unit::Count, "Obstacles in the last snapshot");
    describe_histogram!(
        "dino_decode_seconds",
        Unit::Seconds,
        "Time spent copying and decoding one frame"
    );
}

// ============================================================================
// Metric recording functions
// ============================================================================

/// Record a successful decode.
#[allow(clippy::cast_precision_loss)]
pub fn record_decoded(decoded: &Decoded, elapsed: Duration) {
    counter!("dino_snapshots_decoded_total").increment(1);
    gauge!("dino_obstacles").set(decoded.snapshot.obstacles.len() as f64);
    histogram!("dino_decode_seconds").record(elapsed.as_secs_f64());

    if decoded.repairs.truncated_from.is_some() {
        counter!("dino_trailer_truncations_total").increment(1);
    }
    if decoded.repairs.fields > 0 {
        counter!("dino_fields_repaired_total").increment(decoded.repairs.fields as u64);
    }
}

/// Record a header-tier rejection.
pub fn record_rejected(error: &DecodeError) {
    counter!("dino_snapshots_rejected_total", "reason" => error.reason()).increment(1);
}

/// Record a frame without a state buffer.
pub fn record_null_buffer() {
    counter!("dino_null_buffers_total").increment(1);
}

/// Record a failed producer acquisition.
pub fn record_connection_failure() {
    counter!("dino_connection_failures_total").increment(1);
}

// ============================================================================
// CLI Recorder for terminal output
// ============================================================================

/// Values collected by a [`CliRecorder`], keyed by name and labels.
#[derive(Default)]
struct Store {
    counters: RwLock<HashMap<String, u64>>,
    gauges: RwLock<HashMap<String, f64>>,
    histograms: RwLock<HashMap<String, Vec<f64>>>,
}

/// One registered metric: its rendered key and the shared store.
struct Handle {
    key: String,
    store: Arc<Store>,
}

impl metrics::CounterFn for Handle {
    fn increment(&self, value: u64) {
        *self.store.counters.write().entry(self.key.clone()).or_insert(0) += value;
    }

    fn absolute(&self, value: u64) {
        self.store.counters.write().insert(self.key.clone(), value);
    }
}

impl metrics::GaugeFn for Handle {
    fn increment(&self, value: f64) {
        *self.store.gauges.write().entry(self.key.clone()).or_insert(0.0) += value;
    }

    fn decrement(&self, value: f64) {
        *self.store.gauges.write().entry(self.key.clone()).or_insert(0.0) -= value;
    }

    fn set(&self, value: f64) {
        self.store.gauges.write().insert(self.key.clone(), value);
    }
}

impl metrics::HistogramFn for Handle {
    fn record(&self, value: f64) {
        self.store
            .histograms
            .write()
            .entry(self.key.clone())
            .or_default()
            .push(value);
    }
}

/// Recorder that keeps metrics in memory for the `--metrics` summary.
#[derive(Default)]
pub struct CliRecorder {
    store: Arc<Store>,
}

impl CliRecorder {
    /// Install as the global recorder. `None` if one is already installed.
    #[must_use]
    pub fn install(self) -> Option<CliRecorderHandle> {
        let handle = self.handle();
        metrics::set_global_recorder(self).ok()?;
        Some(handle)
    }

    fn handle(&self) -> CliRecorderHandle {
        CliRecorderHandle {
            store: Arc::clone(&self.store),
        }
    }

    fn register(&self, key: &Key) -> Arc<Handle> {
        Arc::new(Handle {
            key: key_to_string(key),
            store: Arc::clone(&self.store),
        })
    }
}

fn key_to_string(key: &Key) -> String {
    let labels: Vec<String> = key
        .labels()
        .map(|l| format!("{}={}", l.key(), l.value()))
        .collect();
    if labels.is_empty() {
        key.name().to_string()
    } else {
        format!("{}{{{}}}", key.name(), labels.join(","))
    }
}

impl Recorder for CliRecorder {
    fn describe_counter(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}
    fn describe_gauge(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}
    fn describe_histogram(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn register_counter(&self, key: &Key, _metadata: &Metadata<'_>) -> Counter {
        Counter::from_arc(self.register(key))
    }

    fn register_gauge(&self, key: &Key, _metadata: &Metadata<'_>) -> Gauge {
        Gauge::from_arc(self.register(key))
    }

    fn register_histogram(&self, key: &Key, _metadata: &Metadata<'_>) -> Histogram {
        Histogram::from_arc(self.register(key))
    }
}

/// Read access to metrics collected by a [`CliRecorder`].
pub struct CliRecorderHandle {
    store: Arc<Store>,
}

impl CliRecorderHandle {
    /// Print every collected metric, sorted by key.
    #[allow(clippy::cast_precision_loss)]
    pub fn print_summary(&self) {
        let mut lines: Vec<String> = Vec::new();
        for (key, value) in self.store.counters.read().iter() {
            lines.push(format!("{key}: {value}"));
        }
        for (key, value) in self.store.gauges.read().iter() {
            lines.push(format!("{key}: {value:.6}"));
        }
        for (key, values) in self.store.histograms.read().iter() {
            if values.is_empty() {
                continue;
            }
            let min = values.iter().copied().fold(f64::INFINITY, f64::min);
            let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let avg = values.iter().sum::<f64>() / values.len() as f64;
            lines.push(format!(
                "{key}: count={}, min={min:.6}, max={max:.6}, avg={avg:.6}",
                values.len()
            ));
        }

        if lines.is_empty() {
            eprintln!("No metrics collected.");
            return;
        }
        lines.sort();
        eprintln!();
        eprintln!("## Metrics");
        for line in lines {
            eprintln!("  {line}");
        }
    }

    #[cfg(test)]
    fn counter(&self, key: &str) -> Option<u64> {
        self.store.counters.read().get(key).copied()
    }

    #[cfg(test)]
    fn gauge(&self, key: &str) -> Option<f64> {
        self.store.gauges.read().get(key).copied()
    }

    #[cfg(test)]
    fn samples(&self, key: &str) -> usize {
        self.store.histograms.read().get(key).map_or(0, Vec::len)
    }
}

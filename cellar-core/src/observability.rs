/*!
Observability infrastructure for Cellar.

This module provides:
- Tracing subscriber setup driven by the verbose flag and `RUST_LOG`
- Prometheus metrics for exported and restored tables (behind the `metrics` feature)
*/

#[cfg(feature = "metrics")]
use prometheus::{Counter, Encoder, Histogram, HistogramOpts, Registry, TextEncoder};
#[cfg(feature = "metrics")]
use std::sync::OnceLock;
use tracing::subscriber::set_global_default;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry as TracingRegistry};

use crate::{CellarError, Result};

/// Global metrics instance; `None` if registration failed
#[cfg(feature = "metrics")]
static METRICS: OnceLock<Option<CellarMetrics>> = OnceLock::new();

/// Metrics collection for backup and restore runs
#[cfg(feature = "metrics")]
#[derive(Debug)]
pub struct CellarMetrics {
    pub tables_exported_total: Counter,
    pub rows_exported_total: Counter,
    pub tables_restored_total: Counter,
    pub rows_restored_total: Counter,
    pub restore_failures_total: Counter,
    pub archive_size_bytes: Histogram,

    // Prometheus registry for scraping
    registry: Registry,
}

#[cfg(feature = "metrics")]
fn counter(registry: &Registry, name: &str, help: &str) -> Result<Counter> {
    let counter = Counter::new(name, help)
        .map_err(|e| CellarError::validation(format!("Failed to create {name} metric: {e}")))?;
    registry
        .register(Box::new(counter.clone()))
        .map_err(|e| CellarError::validation(format!("Failed to register {name}: {e}")))?;
    Ok(counter)
}

#[cfg(feature = "metrics")]
impl CellarMetrics {
    fn new() -> Result<Self> {
        let registry = Registry::new();

        let tables_exported_total = counter(
            &registry,
            "cellar_tables_exported_total",
            "Tables written to record files",
        )?;
        let rows_exported_total = counter(
            &registry,
            "cellar_rows_exported_total",
            "Rows written to record files",
        )?;
        let tables_restored_total = counter(
            &registry,
            "cellar_tables_restored_total",
            "Tables committed during restore",
        )?;
        let rows_restored_total = counter(
            &registry,
            "cellar_rows_restored_total",
            "Rows inserted during restore",
        )?;
        let restore_failures_total = counter(
            &registry,
            "cellar_restore_failures_total",
            "Table restores rolled back after a failed insert",
        )?;

        let archive_size_bytes = Histogram::with_opts(
            HistogramOpts::new("cellar_archive_size_bytes", "Size of written archives in bytes")
                .buckets(prometheus::exponential_buckets(1024.0, 4.0, 10).unwrap_or_default()),
        )
        .map_err(|e| {
            CellarError::validation(format!("Failed to create archive_size_bytes metric: {e}"))
        })?;
        registry
            .register(Box::new(archive_size_bytes.clone()))
            .map_err(|e| {
                CellarError::validation(format!("Failed to register archive_size_bytes: {e}"))
            })?;

        Ok(Self {
            tables_exported_total,
            rows_exported_total,
            tables_restored_total,
            rows_restored_total,
            restore_failures_total,
            archive_size_bytes,
            registry,
        })
    }

    /// Get or initialize the global metrics instance
    pub fn global() -> Option<&'static CellarMetrics> {
        METRICS
            .get_or_init(|| match Self::new() {
                Ok(metrics) => Some(metrics),
                Err(e) => {
                    tracing::warn!("Metrics disabled: {}", e);
                    None
                }
            })
            .as_ref()
    }

    pub fn record_table_exported(&self, rows: usize) {
        self.tables_exported_total.inc();
        self.rows_exported_total.inc_by(rows as f64);
    }

    pub fn record_table_restored(&self, rows: usize) {
        self.tables_restored_total.inc();
        self.rows_restored_total.inc_by(rows as f64);
    }

    pub fn record_restore_failure(&self) {
        self.restore_failures_total.inc();
    }

    pub fn record_archive_size(&self, size_bytes: u64) {
        self.archive_size_bytes.observe(size_bytes as f64);
    }

    /// Gather metrics in Prometheus text format
    pub fn gather_metrics(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| CellarError::validation(format!("Failed to encode metrics: {e}")))?;

        String::from_utf8(buffer).map_err(|e| {
            CellarError::validation(format!("Failed to convert metrics to string: {e}"))
        })
    }
}

/// Filter directive used when `RUST_LOG` is unset
pub fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "debug"
    } else {
        "error"
    }
}

/// Install the global tracing subscriber.
///
/// Verbose runs log at `debug`, quiet runs only report errors. `RUST_LOG`, when
/// set, takes precedence over both. Output goes to stderr so stdout stays usable
/// for command output.
pub fn init_tracing(verbose: bool) -> Result<()> {
    #[cfg(feature = "metrics")]
    CellarMetrics::global();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    let subscriber = TracingRegistry::default().with(filter).with(fmt_layer);

    set_global_default(subscriber).map_err(|e| {
        CellarError::validation(format!("Failed to set global tracing subscriber: {e}"))
    })?;

    tracing::debug!("Cellar tracing initialized");
    Ok(())
}

/// Like [`init_tracing`], with JSON-formatted events for log shippers
pub fn init_json_tracing(verbose: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_current_span(true);

    let subscriber = TracingRegistry::default().with(filter).with(fmt_layer);

    set_global_default(subscriber).map_err(|e| {
        CellarError::validation(format!("Failed to set global tracing subscriber: {e}"))
    })
}

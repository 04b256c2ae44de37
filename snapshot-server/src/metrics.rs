//! Prometheus exporter for per-source snapshot metrics.
//!
//! Values are read from the source registry on every scrape, so a source
//! removed by a refresh disappears from the very next scrape.

use crate::registry::SourceRegistry;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use parking_lot::Mutex;
use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;
use prometheus::{Encoder, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};
use std::sync::Arc;

const SOURCE_LABELS: &[&str] = &["host", "path", "username"];

/// Gauges describing the latest snapshot of each exposed source.
struct LastSnapshotCollector {
    registry: Arc<SourceRegistry>,
    dirs: IntGaugeVec,
    files: IntGaugeVec,
    size_bytes: IntGaugeVec,
    start_timestamp: IntGaugeVec,
    known_sources: IntGauge,
    // Serializes reset-and-fill between concurrent scrapes
    collect_lock: Mutex<()>,
}

impl LastSnapshotCollector {
    fn new(registry: Arc<SourceRegistry>) -> prometheus::Result<Self> {
        let gauge = |name: &str, help: &str| IntGaugeVec::new(Opts::new(name, help), SOURCE_LABELS);

        Ok(Self {
            registry,
            dirs: gauge(
                "kopia_last_snapshot_dirs",
                "Number of directories in the latest snapshot of the source",
            )?,
            files: gauge(
                "kopia_last_snapshot_files",
                "Number of files in the latest snapshot of the source",
            )?,
            size_bytes: gauge(
                "kopia_last_snapshot_size_bytes",
                "Total size in bytes of the latest snapshot of the source",
            )?,
            start_timestamp: gauge(
                "kopia_last_snapshot_start_timestamp_seconds",
                "Start time of the latest snapshot of the source",
            )?,
            known_sources: IntGauge::new(
                "kopia_server_sources",
                "Number of sources known to the server",
            )?,
            collect_lock: Mutex::new(()),
        })
    }

    fn gauge_vecs(&self) -> [&IntGaugeVec; 4] {
        [&self.dirs, &self.files, &self.size_bytes, &self.start_timestamp]
    }
}

impl Collector for LastSnapshotCollector {
    fn desc(&self) -> Vec<&Desc> {
        let mut descs: Vec<&Desc> = self.gauge_vecs().into_iter().flat_map(|g| g.desc()).collect();
        descs.extend(self.known_sources.desc());
        descs
    }

    fn collect(&self) -> Vec<MetricFamily> {
        let _guard = self.collect_lock.lock();

        for g in self.gauge_vecs() {
            g.reset();
        }
        let exposure = self.registry.exposure();
        self.known_sources.set(exposure.known_sources as i64);

        for (source, latest) in exposure.exposed {
            let labels = [
                source.host.as_str(),
                source.path.as_str(),
                source.user_name.as_str(),
            ];
            self.dirs.with_label_values(&labels).set(latest.stats.total_dirs);
            self.files.with_label_values(&labels).set(latest.stats.total_files);
            self.size_bytes.with_label_values(&labels).set(latest.stats.total_bytes);
            self.start_timestamp
                .with_label_values(&labels)
                .set(latest.start_time.timestamp());
        }

        let mut families: Vec<MetricFamily> =
            self.gauge_vecs().into_iter().flat_map(|g| g.collect()).collect();
        families.extend(self.known_sources.collect());
        families
    }
}

/// Renders the exposition text for the metrics listener.
#[derive(Clone)]
pub struct MetricsExporter {
    registry: Registry,
}

impl MetricsExporter {
    pub fn new(sources: Arc<SourceRegistry>) -> anyhow::Result<Self> {
        let registry = Registry::new();
        registry.register(Box::new(LastSnapshotCollector::new(sources)?))?;
        Ok(Self { registry })
    }

    pub fn render(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

async fn metrics_handler(State(exporter): State<MetricsExporter>) -> Response {
    match exporter.render() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Failed to render metrics: {e:#}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Router for the dedicated metrics listener.
pub fn metrics_router(exporter: MetricsExporter) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(exporter)
}

//! # Prometheus Metrics
//!
//! Operation counters and ledger gauges, registered in a dedicated
//! `reserve_`-prefixed registry and served at `/metrics` on the metrics
//! port.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    Encoder, Gauge, Histogram, HistogramOpts, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use reserve_contracts::TreasurySummary;
use std::sync::Arc;

/// Metric handles for the node. Clones share the same underlying series.
#[derive(Clone)]
pub struct NodeMetrics {
    registry: Registry,
    /// Committed operations, by operation name.
    pub operations_total: IntCounterVec,
    /// Rejected operations, by operation name.
    pub rejections_total: IntCounterVec,
    pub total_reserves: Gauge,
    pub total_debt: Gauge,
    pub excess_reserves: Gauge,
    pub pending_changes: IntGauge,
    /// Time spent inside the ledger lock, including the save.
    pub operation_latency_seconds: Histogram,
}

impl NodeMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("reserve".into()), None)?;

        let operations_total = IntCounterVec::new(
            Opts::new("operations_total", "Ledger operations committed"),
            &["op"],
        )?;
        let rejections_total = IntCounterVec::new(
            Opts::new("rejections_total", "Ledger operations rejected"),
            &["op"],
        )?;
        let total_reserves = Gauge::new("total_reserves", "Total reserves in backed-token units")?;
        let total_debt = Gauge::new("total_debt", "Outstanding debt in backed-token units")?;
        let excess_reserves = Gauge::new(
            "excess_reserves",
            "Reserves beyond backed supply and outstanding debt",
        )?;
        let pending_changes = IntGauge::new("pending_changes", "Queued permission changes")?;
        let operation_latency_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "operation_latency_seconds",
                "Time to apply and persist one ledger operation",
            )
            .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
        )?;

        registry.register(Box::new(operations_total.clone()))?;
        registry.register(Box::new(rejections_total.clone()))?;
        registry.register(Box::new(total_reserves.clone()))?;
        registry.register(Box::new(total_debt.clone()))?;
        registry.register(Box::new(excess_reserves.clone()))?;
        registry.register(Box::new(pending_changes.clone()))?;
        registry.register(Box::new(operation_latency_seconds.clone()))?;

        Ok(Self {
            registry,
            operations_total,
            rejections_total,
            total_reserves,
            total_debt,
            excess_reserves,
            pending_changes,
            operation_latency_seconds,
        })
    }

    /// Refreshes the ledger gauges from a summary.
    pub fn observe(&self, summary: &TreasurySummary) {
        // Gauges are f64; precision loss above 2^53 is acceptable for
        // dashboards.
        self.total_reserves.set(summary.total_reserves as f64);
        self.total_debt.set(summary.total_debt as f64);
        self.excess_reserves.set(summary.excess_reserves as f64);
        self.pending_changes
            .set(i64::try_from(summary.pending_changes).unwrap_or(i64::MAX));
    }

    /// Prometheus text exposition of every registered metric.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

pub type SharedMetrics = Arc<NodeMetrics>;

/// `GET /metrics`
pub async fn metrics_handler(State(metrics): State<SharedMetrics>) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}

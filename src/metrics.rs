// ===============================
// src/metrics.rs
// ===============================
use once_cell::sync::Lazy;
use prometheus::{
    Encoder, Gauge, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::path::Path;

// Single custom registry (we register everything here)
pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

// -------- Quote source lookups --------
pub static LOOKUPS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("quote_lookups_total", "quote source lookups (labels: kind, outcome)"),
        &["kind", "outcome"],
    )
    .unwrap()
});

// Wall time of one instrument resolution, price + optional fx (milliseconds)
pub static RESOLVE_LATENCY: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(HistogramOpts::new(
        "resolve_latency_ms",
        "Latency of resolving one instrument to USD (ms)",
    ))
    .unwrap()
});

pub static HOLDINGS_RESOLVED: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("holdings_resolved_total", "holdings priced in USD").unwrap());

// -------- Portfolio --------
pub static PORTFOLIO_VALUE: Lazy<Gauge> =
    Lazy::new(|| Gauge::new("portfolio_value_usd", "total portfolio value (USD)").unwrap());

pub static PORTFOLIO_HOLDINGS: Lazy<IntGauge> =
    Lazy::new(|| IntGauge::new("portfolio_holdings", "lines in the valued portfolio").unwrap());

pub fn init() {
    for m in [
        REGISTRY.register(Box::new(LOOKUPS.clone())),
        REGISTRY.register(Box::new(RESOLVE_LATENCY.clone())),
        REGISTRY.register(Box::new(HOLDINGS_RESOLVED.clone())),
        REGISTRY.register(Box::new(PORTFOLIO_VALUE.clone())),
        REGISTRY.register(Box::new(PORTFOLIO_HOLDINGS.clone())),
    ] {
        let _ = m;
    }
}

// Encode all metrics in Prometheus text format
pub fn encode_metrics() -> Vec<u8> {
    let encoder = TextEncoder::new();
    let families = REGISTRY.gather();
    let mut buf = Vec::new();
    if encoder.encode(&families, &mut buf).is_err() || buf.is_empty() {
        buf.extend_from_slice(b"# no metrics\n");
    }
    buf
}

/// One-shot process: dump a textfile for node_exporter's textfile collector
/// instead of serving an endpoint. Temp file + rename, the collector must
/// never see a partial file.
pub async fn write_textfile(path: &str) -> std::io::Result<()> {
    let target = Path::new(path);
    if let Some(parent) = target.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    let tmp = target.with_extension("prom.tmp");
    tokio::fs::write(&tmp, encode_metrics()).await?;
    tokio::fs::rename(&tmp, target).await
}

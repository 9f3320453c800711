//! Prometheus metrics for query translation

use prometheus::proto::MetricFamily;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounterVec, Opts, Registry, TextEncoder};
use tracing::warn;

/// Outcome label for `udv_queries_total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Ok,
    Rejected,
    Error,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Ok => "ok",
            Outcome::Rejected => "rejected",
            Outcome::Error => "error",
        }
    }
}

#[derive(Clone, Debug)]
pub struct Metrics {
    registry: Registry,
    queries_total: IntCounterVec,
    translate_seconds: Histogram,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let queries_total = IntCounterVec::new(
            Opts::new("udv_queries_total", "Queries received, by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(queries_total.clone()))?;

        let translate_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "udv_translate_duration_seconds",
                "Time spent validating, planning and emitting a query",
            )
            .buckets(vec![0.0001, 0.00025, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.05]),
        )?;
        registry.register(Box::new(translate_seconds.clone()))?;

        Ok(Self {
            registry,
            queries_total,
            translate_seconds,
        })
    }

    pub fn record(&self, outcome: Outcome, secs: f64) {
        self.queries_total
            .with_label_values(&[outcome.as_str()])
            .inc();
        self.translate_seconds.observe(secs.max(0.0));
    }

    pub fn render_prometheus(&self) -> String {
        encode_text(&self.registry.gather())
    }
}

/// Text exposition format. Encoding failures are logged and render as empty.
fn encode_text(metric_families: &[MetricFamily]) -> String {
    let mut out = Vec::new();
    if let Err(e) = TextEncoder::new().encode(metric_families, &mut out) {
        warn!(error = %e, "failed to encode metrics");
        return String::new();
    }
    String::from_utf8(out).unwrap_or_else(|e| {
        warn!(error = %e, "metrics output is not valid utf-8");
        String::new()
    })
}

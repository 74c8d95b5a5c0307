use crate::config::LogLevel;
use pneumonia_inference::Label;
use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry};
use std::collections::HashSet;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub fn init_tracing(log_level: &LogLevel) {
    let log_level = &format!("{},ort=info", log_level.as_str());

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with(tracing_subscriber::fmt::layer().json().with_level(true))
        .init();
}

pub struct Metrics {
    predictions: IntCounterVec,
    prediction_failures: IntCounter,
    heatmaps: IntCounterVec,
    prediction_duration: Histogram,
    pub registry: Registry,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let predictions = IntCounterVec::new(
            Opts::new("predictions_total", "Number of analysed images by predicted label"),
            &["label"],
        )?;
        let prediction_failures = IntCounter::new(
            "prediction_failures_total",
            "Number of uploads that could not be analysed",
        )?;
        let heatmaps = IntCounterVec::new(
            Opts::new("heatmaps_total", "Number of requested heatmaps by outcome"),
            &["outcome"],
        )?;
        let prediction_duration = Histogram::with_opts(
            HistogramOpts::new(
                "prediction_duration_ms",
                "Duration of a single prediction in milliseconds",
            )
            .buckets(generate_boundaries((10, 50, 100, 1000, 5000))),
        )?;

        registry.register(Box::new(predictions.clone()))?;
        registry.register(Box::new(prediction_failures.clone()))?;
        registry.register(Box::new(heatmaps.clone()))?;
        registry.register(Box::new(prediction_duration.clone()))?;

        Ok(Metrics {
            predictions,
            prediction_failures,
            heatmaps,
            prediction_duration,
            registry,
        })
    }

    pub fn record_prediction(&self, label: Label, duration_ms: u64) {
        self.predictions
            .with_label_values(&[label.as_str()])
            .inc();
        self.prediction_duration.observe(duration_ms as f64);
    }

    pub fn record_prediction_failure(&self) {
        self.prediction_failures.inc();
    }

    pub fn record_heatmap(&self, rendered: bool) {
        let outcome = if rendered { "rendered" } else { "unavailable" };
        self.heatmaps.with_label_values(&[outcome]).inc();
    }
}

fn generate_boundaries(parts: (i32, i32, i32, i32, i32)) -> Vec<f64> {
    let first_step: usize = 10;
    let middle_step: usize = 25;
    let end_step: usize = 100;
    let tail_step: usize = 1000;
    let first_part = (parts.0..=parts.1).step_by(first_step);
    let middle_part = (parts.1..=parts.2).step_by(middle_step);
    let end_part = (parts.2..=parts.3).step_by(end_step);
    let tail_part = (parts.3..=parts.4).step_by(tail_step);

    let mut seen = HashSet::new();
    first_part
        .chain(middle_part)
        .chain(end_part)
        .chain(tail_part)
        .filter(|&x| seen.insert(x))
        .map(|x| x as f64)
        .collect()
}

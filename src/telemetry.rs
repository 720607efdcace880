use opentelemetry::{
    global,
    metrics::{Counter, Histogram, MeterProvider},
    KeyValue,
};
use prometheus::Registry;
use std::collections::HashSet;

pub struct Metrics {
    request_counter: Counter<u64>,
    upload_duration: Histogram<u64>,
    upload_counter: Counter<u64>,
    backend_error_counter: Counter<u64>,
    pub registry: Registry,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();
        let exporter = opentelemetry_prometheus::exporter()
            .with_registry(registry.clone())
            .build()?;

        let provider = opentelemetry_sdk::metrics::SdkMeterProvider::builder()
            .with_reader(exporter)
            .build();

        let meter = provider.meter("classifier_web");
        global::set_meter_provider(provider);

        let request_counter = meter
            .u64_counter("page_requests_total")
            .with_description("Total number of page requests")
            .build();

        let boundaries = generate_boundaries((50, 250, 300, 1000, 10000));

        let upload_duration = meter
            .u64_histogram("upload_duration_ms")
            .with_boundaries(boundaries)
            .with_description("Duration of image submissions in milliseconds")
            .build();

        let upload_counter = meter
            .u64_counter("uploads_total")
            .with_description("Image submissions by outcome")
            .build();

        let backend_error_counter = meter
            .u64_counter("classifier_api_errors_total")
            .with_description("Failed calls to the classification service by error kind")
            .build();

        Ok(Metrics {
            request_counter,
            upload_duration,
            upload_counter,
            backend_error_counter,
            registry,
        })
    }

    pub fn record_request(&self, route: &str) {
        let attributes = vec![KeyValue::new("route", route.to_string())];
        self.request_counter.add(1, &attributes);
    }

    pub fn record_upload(&self, duration_ms: u64, outcome: &str) {
        let attributes = vec![KeyValue::new("outcome", outcome.to_string())];
        self.upload_duration.record(duration_ms, &attributes);
        self.upload_counter.add(1, &attributes);
    }

    pub fn record_backend_error(&self, route: &str, kind: &str) {
        let attributes = vec![
            KeyValue::new("route", route.to_string()),
            KeyValue::new("kind", kind.to_string()),
        ];
        self.backend_error_counter.add(1, &attributes);
    }
}

fn generate_boundaries(parts: (i32, i32, i32, i32, i32)) -> Vec<f64> {
    let first_step: usize = 50;
    let middle_step: usize = 10;
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

/// Prometheus metrics for the API server
///
/// A process-global registry holding request counters and latency
/// histograms, populated by [`track_metrics`] and exposed through
/// [`metrics_handler`] at `GET /metrics` in the standard text exposition
/// format.
///
/// # Metrics
///
/// - `http_requests_total{method, path, status}` - request counter
/// - `http_request_duration_seconds{method, path}` - latency histogram
/// - `tasklane_build_info{version}` - constant 1, labels carry the version

use crate::app::AppState;
use axum::{
    extract::{MatchedPath, Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
};
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder,
};
use std::time::Instant;

/// Metric handles plus the registry they are registered in
pub struct Metrics {
    registry: Registry,

    /// Requests by method, matched route pattern, and status code
    pub http_requests_total: IntCounterVec,

    /// Request latency by method and matched route pattern
    pub http_request_duration_seconds: HistogramVec,
}

impl Metrics {
    /// Creates the registry and registers all collectors
    pub fn new() -> Self {
        let registry = Registry::new();

        let http_requests_total = IntCounterVec::new(
            Opts::new("http_requests_total", "Total HTTP requests handled"),
            &["method", "path", "status"],
        )
        .expect("valid metric definition");

        let http_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "http_request_duration_seconds",
                "HTTP request latency in seconds",
            ),
            &["method", "path"],
        )
        .expect("valid metric definition");

        let build_info = IntGaugeVec::new(
            Opts::new("tasklane_build_info", "Build information"),
            &["version"],
        )
        .expect("valid metric definition");
        build_info
            .with_label_values(&[env!("CARGO_PKG_VERSION")])
            .set(1);

        registry
            .register(Box::new(http_requests_total.clone()))
            .expect("metric registers once");
        registry
            .register(Box::new(http_request_duration_seconds.clone()))
            .expect("metric registers once");
        registry
            .register(Box::new(build_info))
            .expect("metric registers once");

        Self {
            registry,
            http_requests_total,
            http_request_duration_seconds,
        }
    }

    /// Records one handled request
    pub fn observe_request(&self, method: &str, path: &str, status: u16, seconds: f64) {
        self.http_requests_total
            .with_label_values(&[method, path, &status.to_string()])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method, path])
            .observe(seconds);
    }

    /// Renders all metrics in the Prometheus text exposition format
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buffer) {
            tracing::error!(error = %e, "Failed to encode metrics");
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Middleware recording counters and latency for every request
///
/// Uses the matched route pattern (e.g. `/api/v1/tasks/:id`) as the path
/// label so per-id URLs don't explode label cardinality.
pub async fn track_metrics(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| req.uri().path().to_owned());

    let response = next.run(req).await;

    state.metrics.observe_request(
        method.as_str(),
        &path,
        response.status().as_u16(),
        start.elapsed().as_secs_f64(),
    );

    response
}

/// `GET /metrics` handler
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

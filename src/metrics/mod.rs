/*!
 * # Metrics Module
 *
 * Prometheus metrics for the storefront API: HTTP request counts and
 * latencies plus domain counters (coupon redemptions, reviews, orders,
 * outbound email). Exposed in Prometheus text format at `/metrics`.
 */

use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use lazy_static::lazy_static;
use prometheus::{
    HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::time::Instant;
use tracing::error;

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("http_requests_total", "Total number of HTTP requests"),
        &["method", "path", "status"]
    )
    .expect("metric can be created");

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "http_request_duration_seconds",
            "HTTP request latency in seconds"
        )
        .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
        &["method", "path"]
    )
    .expect("metric can be created");

    pub static ref COUPON_REDEMPTIONS_TOTAL: IntCounter = IntCounter::new(
        "coupon_redemptions_total",
        "Total number of successful coupon redemptions"
    )
    .expect("metric can be created");

    pub static ref COUPON_REDEMPTION_FAILURES_TOTAL: IntCounter = IntCounter::new(
        "coupon_redemption_failures_total",
        "Total number of rejected coupon redemptions"
    )
    .expect("metric can be created");

    pub static ref REVIEWS_SUBMITTED_TOTAL: IntCounter = IntCounter::new(
        "reviews_submitted_total",
        "Total number of product reviews submitted"
    )
    .expect("metric can be created");

    pub static ref RATING_RECALCULATIONS_TOTAL: IntCounter = IntCounter::new(
        "rating_recalculations_total",
        "Total number of product rating recomputations"
    )
    .expect("metric can be created");

    pub static ref ORDERS_CREATED_TOTAL: IntCounter = IntCounter::new(
        "orders_created_total",
        "Total number of orders created at checkout"
    )
    .expect("metric can be created");

    pub static ref EMAILS_SENT_TOTAL: IntCounter = IntCounter::new(
        "emails_sent_total",
        "Total number of notification emails sent"
    )
    .expect("metric can be created");

    pub static ref EMAILS_FAILED_TOTAL: IntCounter = IntCounter::new(
        "emails_failed_total",
        "Total number of notification emails that failed to send"
    )
    .expect("metric can be created");
}

/// Registers all metrics with the global registry. Idempotent enough for
/// tests: duplicate registration errors are logged and ignored.
pub fn register_metrics() {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(HTTP_REQUESTS_TOTAL.clone()),
        Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()),
        Box::new(COUPON_REDEMPTIONS_TOTAL.clone()),
        Box::new(COUPON_REDEMPTION_FAILURES_TOTAL.clone()),
        Box::new(REVIEWS_SUBMITTED_TOTAL.clone()),
        Box::new(RATING_RECALCULATIONS_TOTAL.clone()),
        Box::new(ORDERS_CREATED_TOTAL.clone()),
        Box::new(EMAILS_SENT_TOTAL.clone()),
        Box::new(EMAILS_FAILED_TOTAL.clone()),
    ];

    for collector in collectors {
        if let Err(e) = REGISTRY.register(collector) {
            error!("Failed to register metric: {}", e);
        }
    }
}

/// Axum middleware recording request count and latency per matched route.
///
/// Uses the matched route template (e.g. `/api/v1/products/:id`) rather than
/// the raw path to keep label cardinality bounded.
pub async fn track_metrics(request: Request, next: Next) -> Response {
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let method = request.method().to_string();

    let start = Instant::now();
    let response = next.run(request).await;
    let latency = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    HTTP_REQUESTS_TOTAL
        .with_label_values(&[&method, &path, &status])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[&method, &path])
        .observe(latency);

    response
}

/// Handler for `/metrics` rendering the registry in Prometheus text format.
pub async fn metrics_handler() -> Response {
    let encoder = TextEncoder::new();
    match encoder.encode_to_string(&REGISTRY.gather()) {
        Ok(body) => (
            [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            (
                axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                "metrics encoding error",
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment() {
        let before = COUPON_REDEMPTIONS_TOTAL.get();
        COUPON_REDEMPTIONS_TOTAL.inc();
        assert_eq!(COUPON_REDEMPTIONS_TOTAL.get(), before + 1);
    }

    #[test]
    fn register_metrics_is_safe_to_call_twice() {
        register_metrics();
        register_metrics();

        HTTP_REQUESTS_TOTAL
            .with_label_values(&["GET", "/api/v1/products", "200"])
            .inc();

        let encoder = TextEncoder::new();
        let rendered = encoder
            .encode_to_string(&REGISTRY.gather())
            .expect("metrics encode");
        assert!(rendered.contains("http_requests_total"));
    }
}

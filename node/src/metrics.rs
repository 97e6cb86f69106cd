//! # Prometheus Metrics
//!
//! Operational metrics for the payment node, scraped at `/metrics` on the
//! configured metrics port. All metrics live in a dedicated registry under
//! the `yieldpay` namespace.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, Registry, TextEncoder};
use std::sync::Arc;

/// Metric handles shared by the request handlers.
#[derive(Clone)]
pub struct NodeMetrics {
    registry: Registry,
    /// Payment requests received, valid or not.
    pub payment_requests_total: IntCounter,
    /// Payment batches handed to the wallet.
    pub payments_submitted_total: IntCounter,
    /// Payment batches confirmed on-chain.
    pub payments_confirmed_total: IntCounter,
    /// Payment attempts that ended in an error, before or after submission.
    pub payments_failed_total: IntCounter,
    /// Supply/withdraw calls emitted by payment batches.
    pub conversion_calls_total: IntCounter,
    /// Confirmed earn on/off toggles.
    pub earn_toggles_total: IntCounter,
    /// Confirmed faucet top-ups.
    pub top_ups_total: IntCounter,
    /// Requests relayed by the RPC proxy.
    pub rpc_proxy_requests_total: IntCounter,
    /// Wall time of a payment from request to confirmation.
    pub payment_latency_seconds: Histogram,
}

fn counter(registry: &Registry, name: &str, help: &str) -> IntCounter {
    let c = IntCounter::new(name, help).expect("metric creation");
    registry
        .register(Box::new(c.clone()))
        .expect("metric registration");
    c
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Self {
        let registry = Registry::new_custom(Some("yieldpay".into()), None)
            .expect("failed to create prometheus registry");

        let payment_requests_total = counter(
            &registry,
            "payment_requests_total",
            "Payment requests received",
        );
        let payments_submitted_total = counter(
            &registry,
            "payments_submitted_total",
            "Payment batches submitted to the wallet",
        );
        let payments_confirmed_total = counter(
            &registry,
            "payments_confirmed_total",
            "Payment batches confirmed on-chain",
        );
        let payments_failed_total = counter(
            &registry,
            "payments_failed_total",
            "Payment attempts that failed",
        );
        let conversion_calls_total = counter(
            &registry,
            "conversion_calls_total",
            "Supply and withdraw calls emitted by payment batches",
        );
        let earn_toggles_total = counter(
            &registry,
            "earn_toggles_total",
            "Confirmed earning toggles",
        );
        let top_ups_total = counter(&registry, "top_ups_total", "Confirmed faucet top-ups");
        let rpc_proxy_requests_total = counter(
            &registry,
            "rpc_proxy_requests_total",
            "Requests relayed by the RPC proxy",
        );

        let payment_latency_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "payment_latency_seconds",
                "Payment latency from request to confirmation, in seconds",
            )
            .buckets(vec![0.25, 0.5, 1.0, 2.0, 4.0, 8.0, 16.0, 32.0, 64.0, 128.0]),
        )
        .expect("metric creation");
        registry
            .register(Box::new(payment_latency_seconds.clone()))
            .expect("metric registration");

        Self {
            registry,
            payment_requests_total,
            payments_submitted_total,
            payments_confirmed_total,
            payments_failed_total,
            conversion_calls_total,
            earn_toggles_total,
            top_ups_total,
            rpc_proxy_requests_total,
            payment_latency_seconds,
        }
    }

    /// Encodes all registered metrics into the Prometheus text format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

impl Default for NodeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

pub type SharedMetrics = Arc<NodeMetrics>;

/// `GET /metrics` in Prometheus text format.
pub async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<SharedMetrics>,
) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_namespaced_counters() {
        let m = NodeMetrics::new();
        m.payments_submitted_total.inc();
        m.conversion_calls_total.inc_by(2);
        m.payment_latency_seconds.observe(1.5);

        let text = m.encode().unwrap();
        assert!(text.contains("yieldpay_payments_submitted_total 1"));
        assert!(text.contains("yieldpay_conversion_calls_total 2"));
        assert!(text.contains("yieldpay_payment_latency_seconds_count 1"));
    }
}

use std::sync::Arc;

use axum::{extract::Extension, routing::get, Router};
use prometheus::{Encoder, TextEncoder};
use thiserror::Error;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

// Re-exported so binary crates can construct a registry without taking
// `prometheus` as a direct dependency of their own.
pub use prometheus::Registry;

#[derive(Debug, Error)]
pub enum ProbeServerError {
    #[error("failed to bind probe server to {0}: {1}")]
    Bind(String, std::io::Error),
    #[error("probe server failed: {0}")]
    Serve(std::io::Error),
}

/// The liveness (`/healthz`) and readiness (`/readyz`) endpoints, always
/// 200 while the process is up — readiness has no dependency on
/// reconcile progress by design, since a controller that is merely
/// behind on work is still live and able to serve traffic to its probes.
/// Bound to a separate address from the plain-text metrics endpoint per
/// §4.5, but both are served from one `axum` app here for simplicity.
pub struct ProbeServer {
    pub bind_address: String,
    pub registry: Arc<Registry>,
}

impl ProbeServer {
    pub fn new(bind_address: impl Into<String>, registry: Arc<Registry>) -> Self {
        Self {
            bind_address: bind_address.into(),
            registry,
        }
    }

    pub async fn run(self) -> Result<(), ProbeServerError> {
        let service_builder = ServiceBuilder::new().layer(TraceLayer::new_for_http());

        let app = Router::new()
            .route("/healthz", get(healthz))
            .route("/readyz", get(readyz))
            .route("/metrics", get(metrics))
            .layer(Extension(self.registry))
            .layer(service_builder);

        let listener = TcpListener::bind(&self.bind_address)
            .await
            .map_err(|e| ProbeServerError::Bind(self.bind_address.clone(), e))?;

        axum::serve(listener, app)
            .await
            .map_err(ProbeServerError::Serve)
    }
}

async fn healthz() -> &'static str {
    "ok"
}

async fn readyz() -> &'static str {
    "ok"
}

async fn metrics(Extension(registry): Extension<Arc<Registry>>) -> String {
    let metric_families = registry.gather();
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    encoder.encode(&metric_families, &mut buffer).ok();
    String::from_utf8(buffer).unwrap_or_default()
}

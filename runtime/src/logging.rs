use tracing_subscriber::{fmt, EnvFilter};

/// Installs a `tracing` subscriber driven by `RUST_LOG`, defaulting to
/// `info` when unset. Call once at process start, before anything else
/// logs.
pub fn init_tracing(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    fmt().with_env_filter(filter).with_target(true).init();
}

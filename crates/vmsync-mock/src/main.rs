//! Binary entrypoint for the vmsync mock backend.
//!
//! Reads configuration from environment variables:
//! - `VMSYNC_MOCK_PORT`: listen port (default: "3210")
//! - `VMSYNC_IDLE_TIMEOUT_SECS`: idle session timeout (default: "300")
//! - `VMSYNC_SWEEP_INTERVAL_SECS`: idle sweep period (default: "60")

use tracing_subscriber::EnvFilter;

use vmsync_mock::config::MockConfig;
use vmsync_mock::router::build_router;
use vmsync_mock::state::AppState;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = MockConfig::from_env();
    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!(
        idle_timeout_secs = config.idle_timeout.as_secs(),
        sweep_interval_secs = config.sweep_interval.as_secs(),
        "vmsync mock backend starting on {}",
        addr
    );

    let app = build_router(AppState::new(config));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind listen address");
    axum::serve(listener, app).await.expect("server error");
}

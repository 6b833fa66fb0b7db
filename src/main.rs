//! shell-ipc hub entry point.
//!
//! Serves the `/ws` endpoint that shell widgets connect to.

use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use shell_ipc::app_state::AppState;
use shell_ipc::config::IpcConfig;
use shell_ipc::service::HubListener;
use shell_ipc::ws::handler::router;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = IpcConfig::from_env()?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if config.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    tracing::info!(
        addr = %config.listen_addr,
        idle_timeout_secs = config.idle_timeout_secs,
        default_topics = ?config.default_topics,
        "starting shell-ipc hub"
    );

    // Build hub state
    let state = AppState::from_config(&config);

    // Liveness check for widgets
    let ping = HubListener::new(|ctx, payload| {
        if let Err(e) = ctx.send("pong", payload) {
            tracing::debug!(client = %ctx.id(), error = %e, "pong not delivered");
        }
    });
    state.hub.listen("ping", &ping);

    // Build router
    let app = router(state).layer(TraceLayer::new_for_http());

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    tracing::info!(addr = %config.listen_addr, "hub listening");

    axum::serve(listener, app).await?;

    Ok(())
}

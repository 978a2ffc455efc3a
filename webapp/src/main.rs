use aad_webapp::{build_router, AppState, CliArgs, Config};
use clap::Parser;
use std::time::Duration;
use tracing_subscriber::{prelude::*, reload, EnvFilter};

/// How often idle sessions are swept
const SESSION_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli_args = CliArgs::parse();

    // Tracing comes up before config so loader warnings and fatal errors are
    // logged; the configured level is applied once config is known.
    let env_filter = EnvFilter::try_from_default_env().ok();
    let has_env_filter = env_filter.is_some();
    let initial = env_filter
        .unwrap_or_else(|| EnvFilter::new(cli_args.log_level.as_deref().unwrap_or("info")));
    let (filter_layer, filter_handle) = reload::Layer::new(initial);
    tracing_subscriber::registry()
        .with(filter_layer)
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Missing required configuration is fatal
    let config = match Config::load(&cli_args) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Could not load authentication configuration. Exiting");
            std::process::exit(1);
        }
    };

    // RUST_LOG wins over the configured level
    if !has_env_filter {
        filter_handle.reload(EnvFilter::new(&config.log_level))?;
    }

    tracing::info!(
        authority = %config.authority,
        client_id = %config.client_id,
        version = %config.version,
        protected = ?config.protected_endpoints.entries(),
        "Web application starting"
    );

    let listen_addr = config.listen_addr.clone();
    let state = AppState::new(config)?.shared();

    let sessions = state.sessions.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SESSION_CLEANUP_INTERVAL);
        loop {
            interval.tick().await;
            sessions.cleanup_expired();
            tracing::debug!(active_sessions = sessions.size(), "Session cleanup");
        }
    });

    let app = build_router(state);

    tracing::info!("Listening on {}", listen_addr);
    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

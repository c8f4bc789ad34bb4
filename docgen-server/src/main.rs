use anyhow::Context;
use docgen_core::Settings;
use docgen_server::{AppState, api_routes};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    docgen_telemetry::init_with_config(docgen_telemetry::TelemetryConfig::from_env());

    let settings = Settings::from_env();
    tracing::info!(
        output_root = %settings.output_root.display(),
        cache_root = %settings.cache_root.display(),
        "starting docgen server"
    );

    let state = AppState::new(settings);
    let app = api_routes(state);

    let addr = std::env::var("DOCGEN_LISTEN").unwrap_or_else(|_| "0.0.0.0:8000".to_string());
    let listener =
        tokio::net::TcpListener::bind(&addr).await.with_context(|| format!("bind {addr}"))?;
    tracing::info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await
        .context("server error")?;
    Ok(())
}

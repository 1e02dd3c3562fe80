use manim_render::api::{ApiServer, AppState};
use manim_render::config::AppConfig;
use manim_render::logging::init_logging;
use manim_render::services::ServiceContainer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env()?;
    let _log_guard = init_logging(&config.logging)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        data_dir = %config.data_dir.display(),
        quality = %config.render.quality,
        timeout_secs = config.render.timeout.as_secs(),
        "Starting manim-render"
    );

    let server_config = config.server.clone();
    let services = ServiceContainer::new(config)?;
    services.start();

    let server = ApiServer::new(server_config, AppState::from_services(&services))
        .with_cancel_token(services.cancellation_token().child_token());

    let shutdown_token = services.cancellation_token();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Received shutdown signal"),
            Err(e) => tracing::error!("Failed to listen for shutdown signal: {}", e),
        }
        shutdown_token.cancel();
    });

    let result = server.run().await;
    services.shutdown().await;
    result?;

    tracing::info!("manim-render stopped");
    Ok(())
}

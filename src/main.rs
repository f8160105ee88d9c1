use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::Context;
use blog_users::{configure, AppState, Settings};
use dotenv::dotenv;
use std::net::TcpListener;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenv().ok();

    // Initialize logging
    FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    // Load configuration
    let config = Settings::new().context("loading configuration")?;
    info!("Configuration loaded ({} environment)", config.environment);

    // Initialize application state
    let state = AppState::new(config.clone())
        .await
        .context("initialising application state")?;
    let state = web::Data::new(state);

    // Expired login sessions are swept periodically
    let sweep_state = state.clone();
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(SESSION_SWEEP_INTERVAL).await;
            match sweep_state.sessions.cleanup_expired_sessions().await {
                Ok(0) => {}
                Ok(removed) => info!("Removed {} expired sessions", removed),
                Err(e) => error!("Session cleanup failed: {}", e),
            }
        }
    });

    let listener = TcpListener::bind(config.bind_address())
        .with_context(|| format!("binding {}", config.bind_address()))?;
    info!("Starting server at http://{}", config.bind_address());

    let server_state = state.clone();
    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(server_state.clone())
            .configure(configure)
    })
    .listen(listener)?
    .workers(config.server.workers as usize)
    .run()
    .await
    .context("running HTTP server")?;

    state.shutdown().await?;
    Ok(())
}

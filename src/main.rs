use actix_web::{middleware, web, App, HttpServer};
use crm_server::auth::guard::route_guard;
use crm_server::{configure_app, AppError, AppState, Settings};
use dotenv::dotenv;
use std::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[actix_web::main]
async fn main() -> crm_server::Result<()> {
    // Load environment variables
    dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    // Load configuration; a missing signing secret stops the process here.
    let config = Settings::new().map_err(|e| {
        error!("Invalid configuration: {}", e);
        AppError::from(e)
    })?;
    info!("Configuration loaded successfully");

    info!("Starting server at {}:{}", config.server.host, config.server.port);

    // Initialize application state
    let state = AppState::new(config.clone()).await?;
    let data = web::Data::new(state.clone());

    // Create and bind TCP listener
    let listener = TcpListener::bind(format!("{}:{}", config.server.host, config.server.port))?;

    // Start HTTP server
    HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .wrap(middleware::from_fn(route_guard))
            .configure(configure_app)
    })
    .listen(listener)?
    .workers(config.server.workers as usize)
    .run()
    .await
    .map_err(|e| AppError::InternalError(e.to_string()))?;

    state.shutdown().await?;
    info!("Server stopped");

    Ok(())
}

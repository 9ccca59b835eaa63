pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod pages;

use std::sync::Arc;
use sqlx::SqlitePool;
use actix_web::{web, HttpResponse};
use chrono::Duration;
use tracing::{debug, info};

pub use error::AppError;
pub type Result<T> = std::result::Result<T, AppError>;
pub use config::Settings;

pub use auth::{AuthService, RateLimiter, RateLimitConfig};
pub use db::{Credential, CredentialStore, DbOperations};

use auth::{PasswordHasher, SessionManager, TokenCodec, TotpVerifier};

/// Health check endpoint handler
/// Returns a JSON response with server status and timestamp
pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Application state shared across all components
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Settings>,
    pub db_pool: Arc<SqlitePool>,
    pub auth_service: Arc<AuthService>,
}

impl AppState {
    pub async fn new(config: Settings) -> Result<Self> {
        // Initialize database connection pool
        let db_pool = Arc::new(
            DbOperations::connect(&config.database.url, config.database.max_connections).await?,
        );
        let store = Arc::new(DbOperations::new(db_pool.clone()));

        // Missing or unusable secrets fail here, before the server binds.
        let codec = Arc::new(TokenCodec::new(&config.auth.session_secret)?);
        let sessions = SessionManager::new(
            codec.clone(),
            Duration::days(config.auth.session_ttl_days),
            Duration::minutes(config.auth.refresh_after_minutes),
            config.is_production(),
        );
        let limiter = RateLimiter::new(RateLimitConfig::from(&config.rate_limit));
        let passwords = PasswordHasher::new(config.auth.argon2_memory_kib, config.auth.argon2_iterations)?;

        let auth_service = Arc::new(AuthService::new(
            store,
            codec,
            sessions,
            limiter,
            TotpVerifier::new(config.totp.issuer.clone()),
            passwords,
            Duration::minutes(config.auth.challenge_ttl_minutes),
        ));

        if let (Some(username), Some(password)) =
            (&config.auth.bootstrap_username, &config.auth.bootstrap_password)
        {
            auth_service
                .ensure_account(username, password, config.auth.bootstrap_display_name.clone())
                .await?;
        }

        info!(environment = %config.environment, "Application state initialized");
        Ok(Self {
            config: Arc::new(config),
            db_pool,
            auth_service,
        })
    }

    pub async fn shutdown(&self) -> Result<()> {
        // Close database connections
        self.db_pool.close().await;
        Ok(())
    }
}

/// Routes served by the application; the route guard is applied by the caller.
pub fn configure_app(cfg: &mut web::ServiceConfig) {
    cfg.app_data(json_config())
        .route("/health", web::get().to(health_check))
        .route(auth::guard::LOGIN_PATH, web::get().to(pages::login_page))
        .route("/", web::get().to(pages::dashboard))
        .configure(auth::handlers::configure);
}

/// Malformed bodies get the same JSON failure shape as every other error,
/// without the parser's detail.
fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err, req| {
        debug!(path = req.path(), error = %err, "Rejected request body");
        AppError::ValidationError("Invalid request body".into()).into()
    })
}

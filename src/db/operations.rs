use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::db::models::{Credential, NewCredential};
use crate::error::{AppError, DatabaseError};

const CREDENTIAL_COLUMNS: &str =
    "id, username, display_name, password_hash, totp_secret, totp_enabled, created_at, updated_at";

/// Credential lookups and the few updates the auth flow performs.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_by_username(&self, username: &str) -> Result<Option<Credential>, AppError>;
    async fn find_by_id(&self, id: i64) -> Result<Option<Credential>, AppError>;
    async fn create(&self, credential: NewCredential) -> Result<Credential, AppError>;
    async fn update_password_hash(&self, id: i64, password_hash: &str) -> Result<(), AppError>;
    async fn set_two_factor(&self, id: i64, secret: Option<String>, enabled: bool) -> Result<(), AppError>;
}

#[derive(Clone)]
pub struct DbOperations {
    pool: Arc<SqlitePool>,
}

impl DbOperations {
    pub fn new(pool: Arc<SqlitePool>) -> Self {
        Self { pool }
    }

    /// Opens (creating if needed) the database and applies migrations.
    pub async fn connect(url: &str, max_connections: u32) -> Result<SqlitePool, AppError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| DatabaseError::ConnectionError(e.to_string()))?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            // In-memory databases vanish with their connection.
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| DatabaseError::ConnectionError(e.to_string()))?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(pool)
    }

    fn expect_updated(id: i64, rows_affected: u64) -> Result<(), AppError> {
        if rows_affected == 0 {
            tracing::warn!(credential_id = id, "Update matched no credential");
            return Err(DatabaseError::NotFound.into());
        }
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for DbOperations {
    async fn find_by_username(&self, username: &str) -> Result<Option<Credential>, AppError> {
        let credential = sqlx::query_as::<_, Credential>(&format!(
            "SELECT {} FROM credentials WHERE username = ?1",
            CREDENTIAL_COLUMNS
        ))
        .bind(username)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(credential)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Credential>, AppError> {
        let credential = sqlx::query_as::<_, Credential>(&format!(
            "SELECT {} FROM credentials WHERE id = ?1",
            CREDENTIAL_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(credential)
    }

    async fn create(&self, credential: NewCredential) -> Result<Credential, AppError> {
        let now = Utc::now();
        let mut transaction = self.pool.begin().await?;

        let created = sqlx::query_as::<_, Credential>(&format!(
            r#"
            INSERT INTO credentials (username, display_name, password_hash, totp_secret, totp_enabled, created_at, updated_at)
            VALUES (?1, ?2, ?3, NULL, FALSE, ?4, ?4)
            RETURNING {}
            "#,
            CREDENTIAL_COLUMNS
        ))
        .bind(&credential.username)
        .bind(&credential.display_name)
        .bind(&credential.password_hash)
        .bind(now)
        .fetch_one(&mut *transaction)
        .await;

        match created {
            Ok(created) => {
                transaction.commit().await?;
                Ok(created)
            }
            Err(e) => {
                transaction.rollback().await?;
                Err(e.into())
            }
        }
    }

    async fn update_password_hash(&self, id: i64, password_hash: &str) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE credentials SET password_hash = ?1, updated_at = ?2 WHERE id = ?3",
        )
        .bind(password_hash)
        .bind(Utc::now())
        .bind(id)
        .execute(self.pool.as_ref())
        .await?;

        Self::expect_updated(id, result.rows_affected())
    }

    async fn set_two_factor(&self, id: i64, secret: Option<String>, enabled: bool) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE credentials SET totp_secret = ?1, totp_enabled = ?2, updated_at = ?3 WHERE id = ?4",
        )
        .bind(secret)
        .bind(enabled)
        .bind(Utc::now())
        .bind(id)
        .execute(self.pool.as_ref())
        .await?;

        Self::expect_updated(id, result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup_test_db() -> DbOperations {
        let pool = DbOperations::connect("sqlite::memory:", 1)
            .await
            .expect("Failed to open in-memory database");
        DbOperations::new(Arc::new(pool))
    }

    fn new_credential(username: &str) -> NewCredential {
        NewCredential {
            username: username.to_string(),
            display_name: Some("Test User".to_string()),
            password_hash: "$argon2id$v=19$stub".to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_and_find() {
        let db = setup_test_db().await;
        let created = db.create(new_credential("admin")).await.unwrap();

        assert_eq!(created.username, "admin");
        assert!(!created.totp_enabled);
        assert!(created.totp_secret.is_none());

        let by_name = db.find_by_username("admin").await.unwrap().unwrap();
        assert_eq!(by_name.id, created.id);

        let by_id = db.find_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(by_id.username, "admin");

        assert!(db.find_by_username("nobody").await.unwrap().is_none());
        assert!(db.find_by_id(created.id + 100).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_username() {
        let db = setup_test_db().await;
        db.create(new_credential("admin")).await.unwrap();

        let err = db.create(new_credential("admin")).await.unwrap_err();
        assert!(matches!(err, AppError::DatabaseError(DatabaseError::Duplicate)));
    }

    #[tokio::test]
    async fn test_update_password_hash() {
        let db = setup_test_db().await;
        let created = db.create(new_credential("admin")).await.unwrap();

        db.update_password_hash(created.id, "$argon2id$new").await.unwrap();
        let updated = db.find_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(updated.password_hash, "$argon2id$new");
        assert!(updated.updated_at >= created.updated_at);

        let err = db.update_password_hash(created.id + 1, "x").await.unwrap_err();
        assert!(matches!(err, AppError::DatabaseError(DatabaseError::NotFound)));
    }

    #[tokio::test]
    async fn test_set_and_clear_two_factor() {
        let db = setup_test_db().await;
        let created = db.create(new_credential("admin")).await.unwrap();

        db.set_two_factor(created.id, Some("JBSWY3DPEHPK3PXP".into()), true).await.unwrap();
        let enabled = db.find_by_id(created.id).await.unwrap().unwrap();
        assert!(enabled.has_two_factor());

        db.set_two_factor(created.id, None, false).await.unwrap();
        let disabled = db.find_by_id(created.id).await.unwrap().unwrap();
        assert!(!disabled.totp_enabled);
        assert!(disabled.totp_secret.is_none());
    }
}

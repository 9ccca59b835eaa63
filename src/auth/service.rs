use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use actix_web::cookie::Cookie;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::password::{validate_new_password, PasswordHasher};
use crate::auth::rate_limit::RateLimiter;
use crate::auth::session::SessionManager;
use crate::auth::token::{TokenCodec, TokenStatus};
use crate::auth::totp::TotpVerifier;
use crate::db::{Credential, CredentialStore, NewCredential};
use crate::error::{AppError, AuthError};

pub const CHALLENGE_PURPOSE: &str = "2fa_challenge";

/// Signed proof that the password step passed for `sub`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeClaims {
    pub sub: String,
    pub purpose: String,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug)]
pub enum LoginOutcome {
    Authenticated { session: Cookie<'static> },
    TwoFactorRequired { challenge_token: String },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TwoFactorSetup {
    pub secret: String,
    pub provisioning_uri: String,
}

pub struct AuthService {
    store: Arc<dyn CredentialStore>,
    codec: Arc<TokenCodec>,
    sessions: SessionManager,
    limiter: RateLimiter,
    totp: TotpVerifier,
    passwords: PasswordHasher,
    challenge_ttl: Duration,
    /// jti -> exp of challenges already exchanged for a session.
    consumed_challenges: Mutex<HashMap<String, i64>>,
}

impl AuthService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        codec: Arc<TokenCodec>,
        sessions: SessionManager,
        limiter: RateLimiter,
        totp: TotpVerifier,
        passwords: PasswordHasher,
        challenge_ttl: Duration,
    ) -> Self {
        Self {
            store,
            codec,
            sessions,
            limiter,
            totp,
            passwords,
            challenge_ttl,
            consumed_challenges: Mutex::new(HashMap::new()),
        }
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub async fn login_user(&self, username: &str, password: &str) -> Result<LoginOutcome, AppError> {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return Err(AppError::ValidationError("Username and password are required".into()));
        }

        if !self.limiter.check_rate_limit(&format!("login:{}", username)).await.allowed {
            warn!(username, "Login throttled");
            return Err(AuthError::RateLimited.into());
        }

        let credential = match self.store.find_by_username(username).await? {
            Some(credential) => credential,
            None => {
                self.passwords.verify_dummy(password);
                info!(username, "Login failed");
                return Err(AuthError::InvalidCredentials.into());
            }
        };

        if !self.passwords.verify(password, &credential.password_hash) {
            info!(username, "Login failed");
            return Err(AuthError::InvalidCredentials.into());
        }

        if !credential.has_two_factor() {
            info!(username, user_id = credential.id, "Login succeeded");
            let session = self
                .sessions
                .create_session(credential.id, credential.display_name(), false)?;
            return Ok(LoginOutcome::Authenticated { session });
        }

        let now = Utc::now();
        let challenge = ChallengeClaims {
            sub: credential.id.to_string(),
            purpose: CHALLENGE_PURPOSE.to_string(),
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: (now + self.challenge_ttl).timestamp(),
        };
        info!(username, user_id = credential.id, "Password accepted, two-factor code required");
        Ok(LoginOutcome::TwoFactorRequired {
            challenge_token: self.codec.sign(&challenge)?,
        })
    }

    pub async fn verify_two_factor(
        &self,
        challenge_token: &str,
        code: &str,
    ) -> Result<Cookie<'static>, AppError> {
        let challenge = match self.codec.decode::<ChallengeClaims>(Some(challenge_token)) {
            TokenStatus::Valid(claims) if claims.purpose == CHALLENGE_PURPOSE => claims,
            TokenStatus::Expired => return Err(AuthError::ChallengeExpired.into()),
            status => {
                info!(status = status.label(), "Rejected two-factor challenge");
                return Err(AuthError::InvalidChallenge.into());
            }
        };

        // Re-checked here so the expiry rule holds whatever the codec's leeway.
        if challenge.exp <= Utc::now().timestamp() {
            return Err(AuthError::ChallengeExpired.into());
        }

        if self.is_consumed(&challenge.jti) {
            warn!(user_id = %challenge.sub, "Replayed two-factor challenge");
            return Err(AuthError::InvalidChallenge.into());
        }

        if !self.limiter.check_rate_limit(&format!("2fa:{}", challenge.sub)).await.allowed {
            warn!(user_id = %challenge.sub, "Two-factor verification throttled");
            return Err(AuthError::RateLimited.into());
        }

        let user_id: i64 = challenge
            .sub
            .parse()
            .map_err(|_| AppError::AuthError(AuthError::InvalidChallenge))?;
        let credential = self
            .store
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::InvalidChallenge)?;

        let secret = match credential.totp_secret.as_deref() {
            Some(secret) if credential.has_two_factor() => secret,
            _ => return Err(AuthError::TwoFactorNotConfigured.into()),
        };

        if !self.totp.verify(secret, code.trim()) {
            info!(user_id, "Invalid two-factor code");
            return Err(AuthError::InvalidCode.into());
        }

        self.consume(challenge.jti, challenge.exp);
        info!(user_id, "Two-factor verification succeeded");
        self.sessions
            .create_session(credential.id, credential.display_name(), true)
    }

    pub async fn change_password(
        &self,
        user_id: i64,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), AppError> {
        if current_password.is_empty() || new_password.is_empty() {
            return Err(AppError::ValidationError("Current and new password are required".into()));
        }
        validate_new_password(new_password)?;

        let credential = self.credential(user_id).await?;
        if !self.passwords.verify(current_password, &credential.password_hash) {
            return Err(AppError::ValidationError("Current password is incorrect".into()));
        }

        let hash = self.passwords.hash(new_password)?;
        self.store.update_password_hash(user_id, &hash).await?;
        info!(user_id, "Password changed");
        Ok(())
    }

    /// Proposes a new secret. Nothing is stored until [`Self::enable_two_factor`].
    pub async fn generate_two_factor_secret(&self, user_id: i64) -> Result<TwoFactorSetup, AppError> {
        let credential = self.credential(user_id).await?;
        let secret = self.totp.generate_secret();
        let provisioning_uri = self.totp.provisioning_uri(&secret, &credential.username)?;
        Ok(TwoFactorSetup { secret, provisioning_uri })
    }

    pub async fn enable_two_factor(&self, user_id: i64, secret: &str, code: &str) -> Result<(), AppError> {
        let secret = secret.trim();
        if secret.is_empty() || code.trim().is_empty() {
            return Err(AppError::ValidationError("Secret and code are required".into()));
        }
        self.credential(user_id).await?;

        if !self.totp.verify(secret, code.trim()) {
            return Err(AuthError::InvalidCode.into());
        }

        self.store
            .set_two_factor(user_id, Some(secret.to_string()), true)
            .await?;
        info!(user_id, "Two-factor authentication enabled");
        Ok(())
    }

    pub async fn disable_two_factor(&self, user_id: i64) -> Result<(), AppError> {
        self.store.set_two_factor(user_id, None, false).await?;
        info!(user_id, "Two-factor authentication disabled");
        Ok(())
    }

    pub async fn two_factor_status(&self, user_id: i64) -> Result<bool, AppError> {
        Ok(self.credential(user_id).await?.has_two_factor())
    }

    /// Creates the configured first account unless it already exists.
    pub async fn ensure_account(
        &self,
        username: &str,
        password: &str,
        display_name: Option<String>,
    ) -> Result<Option<Credential>, AppError> {
        if self.store.find_by_username(username).await?.is_some() {
            return Ok(None);
        }
        validate_new_password(password)?;

        let created = self
            .store
            .create(NewCredential {
                username: username.to_string(),
                display_name,
                password_hash: self.passwords.hash(password)?,
            })
            .await?;
        info!(username, user_id = created.id, "Created bootstrap account");
        Ok(Some(created))
    }

    async fn credential(&self, user_id: i64) -> Result<Credential, AppError> {
        self.store
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AuthError::Unauthorized.into())
    }

    fn is_consumed(&self, jti: &str) -> bool {
        self.consumed_challenges
            .lock()
            .map(|consumed| consumed.contains_key(jti))
            .unwrap_or(true)
    }

    fn consume(&self, jti: String, exp: i64) {
        if let Ok(mut consumed) = self.consumed_challenges.lock() {
            let now = Utc::now().timestamp();
            consumed.retain(|_, expires| *expires > now);
            consumed.insert(jti, exp);
        }
    }
}

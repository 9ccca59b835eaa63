use crate::error::AppError;
use totp_rs::{Algorithm, Secret, TOTP};

const DIGITS: usize = 6;
const SKEW: u8 = 1;
const STEP_SECONDS: u64 = 30;

#[derive(Debug, Clone)]
pub struct TotpVerifier {
    issuer: String,
}

impl TotpVerifier {
    pub fn new(issuer: impl Into<String>) -> Self {
        Self { issuer: issuer.into() }
    }

    /// Fresh 160-bit secret, base32 encoded.
    pub fn generate_secret(&self) -> String {
        Secret::generate_secret().to_encoded().to_string()
    }

    pub fn provisioning_uri(&self, secret: &str, account: &str) -> Result<String, AppError> {
        Ok(self.build(secret, account)?.get_url())
    }

    pub fn verify(&self, secret: &str, code: &str) -> bool {
        match std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH) {
            Ok(now) => self.verify_at(secret, code, now.as_secs()),
            Err(_) => false,
        }
    }

    /// Accepts codes for the step containing `unix_time` and one step either side.
    pub fn verify_at(&self, secret: &str, code: &str, unix_time: u64) -> bool {
        if code.len() != DIGITS || !code.bytes().all(|b| b.is_ascii_digit()) {
            return false;
        }
        match self.build(secret, "account") {
            Ok(totp) => totp.check(code, unix_time),
            Err(_) => false,
        }
    }

    fn build(&self, secret: &str, account: &str) -> Result<TOTP, AppError> {
        let bytes = Secret::Encoded(secret.to_string())
            .to_bytes()
            .map_err(|_| AppError::ValidationError("Invalid two-factor secret".into()))?;

        TOTP::new(
            Algorithm::SHA1,
            DIGITS,
            SKEW,
            STEP_SECONDS,
            bytes,
            Some(self.issuer.clone()),
            account.to_string(),
        )
        .map_err(|e| AppError::ValidationError(format!("Invalid two-factor setup: {}", e)))
    }
}

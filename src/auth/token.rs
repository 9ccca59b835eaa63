use crate::error::AppError;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Outcome of decoding a token, kept distinct for logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenStatus<C> {
    Absent,
    Malformed,
    Expired,
    Valid(C),
}

impl<C> TokenStatus<C> {
    pub fn into_claims(self) -> Option<C> {
        match self {
            TokenStatus::Valid(claims) => Some(claims),
            _ => None,
        }
    }

    /// Short label for log fields.
    pub fn label(&self) -> &'static str {
        match self {
            TokenStatus::Absent => "absent",
            TokenStatus::Malformed => "malformed",
            TokenStatus::Expired => "expired",
            TokenStatus::Valid(_) => "valid",
        }
    }
}

/// HS256 signer shared by session cookies and two-factor challenges.
/// Verification never errors; every non-`Valid` outcome must look the same
/// to the client.
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenCodec {
    pub fn new(secret: &str) -> Result<Self, AppError> {
        if secret.is_empty() {
            return Err(AppError::ConfigError("token signing secret is empty".into()));
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        })
    }

    pub fn sign<C: Serialize>(&self, claims: &C) -> Result<String, AppError> {
        Ok(encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)?)
    }

    pub fn decode<C: DeserializeOwned>(&self, token: Option<&str>) -> TokenStatus<C> {
        let token = match token.map(str::trim) {
            Some(token) if !token.is_empty() => token,
            _ => return TokenStatus::Absent,
        };

        match decode::<C>(token, &self.decoding_key, &self.validation) {
            Ok(data) => TokenStatus::Valid(data.claims),
            Err(e) => match e.kind() {
                ErrorKind::ExpiredSignature => TokenStatus::Expired,
                _ => TokenStatus::Malformed,
            },
        }
    }

    pub fn verify<C: DeserializeOwned>(&self, token: &str) -> Option<C> {
        self.decode(Some(token)).into_claims()
    }
}

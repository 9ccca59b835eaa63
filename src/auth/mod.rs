//! Authentication for the dashboard.
//!
//! Password login with an optional TOTP second factor, cookie sessions
//! signed with the process secret, per-identity attempt limiting and the
//! route guard that keeps everything else behind a session.

pub mod extract;
pub mod guard;
pub mod handlers;
pub mod password;
pub mod rate_limit;
pub mod service;
pub mod session;
pub mod token;
pub mod totp;

pub use extract::AuthenticatedUser;
pub use password::PasswordHasher;
pub use rate_limit::{RateLimitConfig, RateLimitResult, RateLimiter};
pub use service::{AuthService, ChallengeClaims, LoginOutcome, TwoFactorSetup};
pub use session::{SessionClaims, SessionManager, SESSION_COOKIE};
pub use token::{TokenCodec, TokenStatus};
pub use totp::TotpVerifier;

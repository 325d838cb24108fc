//! Admin session tokens.
//!
//! A successful password check yields a signed HS256 token carrying
//! `{admin, iat, exp}`. Nothing is stored server side: a session ends when the
//! client drops its cookie or the token expires.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use tracing::{debug, warn};

/// Cookie that carries the admin session token.
pub const SESSION_COOKIE: &str = "admin_session";

pub const DEFAULT_SESSION_TTL: Duration = Duration::hours(24);

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("failed to sign session token: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
}

#[derive(Debug, Serialize, Deserialize)]
struct SessionClaims {
    admin: bool,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Clone)]
pub struct SessionToken {
    pub token: String,
    pub expires_at: OffsetDateTime,
}

pub struct AdminAuthService {
    password_digest: Vec<u8>,
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl AdminAuthService {
    pub fn new(admin_password: &str, token_secret: &str, ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // expiry is checked against the caller's clock in `verify_at`
        validation.validate_exp = false;
        validation.leeway = 0;

        Self {
            password_digest: hash_secret(admin_password),
            encoding: EncodingKey::from_secret(token_secret.as_bytes()),
            decoding: DecodingKey::from_secret(token_secret.as_bytes()),
            validation,
            ttl,
        }
    }

    pub fn session_ttl(&self) -> Duration {
        self.ttl
    }

    pub fn issue(&self, password: &str) -> Result<SessionToken, AuthError> {
        self.issue_at(password, OffsetDateTime::now_utc())
    }

    pub fn issue_at(&self, password: &str, now: OffsetDateTime) -> Result<SessionToken, AuthError> {
        let supplied = hash_secret(password);
        if self.password_digest.ct_eq(&supplied).unwrap_u8() == 0 {
            warn!(target = "portfolio::auth", "rejected admin login");
            return Err(AuthError::InvalidCredentials);
        }

        let expires_at = now + self.ttl;
        let claims = SessionClaims {
            admin: true,
            iat: now.unix_timestamp(),
            exp: expires_at.unix_timestamp(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?;

        Ok(SessionToken { token, expires_at })
    }

    /// True when `token` is a well-signed, unexpired admin session. Never fails.
    pub fn verify(&self, token: Option<&str>) -> bool {
        self.verify_at(token, OffsetDateTime::now_utc())
    }

    pub fn verify_at(&self, token: Option<&str>, now: OffsetDateTime) -> bool {
        let Some(token) = token.filter(|token| !token.is_empty()) else {
            return false;
        };

        let claims = match decode::<SessionClaims>(token, &self.decoding, &self.validation) {
            Ok(data) => data.claims,
            Err(err) => {
                warn!(
                    target = "portfolio::auth",
                    error = %err,
                    "rejected admin session token"
                );
                return false;
            }
        };

        if claims.exp <= now.unix_timestamp() {
            debug!(
                target = "portfolio::auth",
                issued_at = claims.iat,
                expired_at = claims.exp,
                "admin session expired"
            );
            return false;
        }

        claims.admin
    }
}

fn hash_secret(secret: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.finalize().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn service() -> AdminAuthService {
        AdminAuthService::new("correct horse", SECRET, DEFAULT_SESSION_TTL)
    }

    #[test]
    fn issued_token_verifies_until_expiry() {
        let auth = service();
        let now = OffsetDateTime::now_utc();
        let session = auth.issue_at("correct horse", now).expect("issue");

        assert_eq!(session.expires_at, now + Duration::hours(24));
        assert!(auth.verify_at(Some(&session.token), now));
        assert!(auth.verify_at(
            Some(&session.token),
            now + Duration::hours(24) - Duration::seconds(1)
        ));
        assert!(!auth.verify_at(Some(&session.token), now + Duration::hours(24)));
    }

    #[test]
    fn wrong_password_is_rejected() {
        let err = service().issue("Correct horse").expect_err("wrong password");
        assert!(matches!(err, AuthError::InvalidCredentials));
    }

    #[test]
    fn missing_or_malformed_tokens_fail_closed() {
        let auth = service();
        assert!(!auth.verify(None));
        assert!(!auth.verify(Some("")));
        assert!(!auth.verify(Some("not-a-jwt")));
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let other = AdminAuthService::new(
            "correct horse",
            "ffffffffffffffffffffffffffffffff",
            DEFAULT_SESSION_TTL,
        );
        let session = other.issue("correct horse").expect("issue");
        assert!(!service().verify(Some(&session.token)));
    }

    #[test]
    fn token_without_admin_flag_is_rejected() {
        let now = OffsetDateTime::now_utc();
        let claims = SessionClaims {
            admin: false,
            iat: now.unix_timestamp(),
            exp: (now + Duration::hours(1)).unix_timestamp(),
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .expect("encode");
        assert!(!service().verify(Some(&token)));
    }
}

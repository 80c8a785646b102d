//! JWT Token Handler
//! Mission: Issue and verify signed, time-limited bearer tokens

use crate::auth::models::{Claims, Role};
use crate::clock::{Clock, SystemClock};
use anyhow::{Context, Result};
use chrono::Duration;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use std::sync::Arc;
use tracing::debug;

/// Why a token was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("token has expired")]
    Expired,
    #[error("invalid token")]
    Invalid,
}

/// A freshly signed token.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_in: i64, // seconds
}

/// JWT Handler for token operations
pub struct JwtHandler {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl JwtHandler {
    /// Create a new JWT handler with secret key and 24-hour tokens
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::hours(24),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Sign a token for `subject` carrying `role`.
    pub fn issue(&self, subject: &str, role: Role) -> Result<IssuedToken> {
        let now = self.clock.now();
        let expiration = now
            .checked_add_signed(self.ttl)
            .context("Invalid timestamp")?;

        let claims = Claims {
            sub: subject.to_string(),
            role,
            iat: now.timestamp(),
            exp: expiration.timestamp(),
        };

        debug!(
            subject,
            role = role.as_str(),
            ttl_hours = self.ttl.num_hours(),
            "Issuing JWT"
        );

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .context("Failed to generate JWT")?;

        Ok(IssuedToken {
            token,
            expires_in: self.ttl.num_seconds(),
        })
    }

    /// Verify signature and expiry and return the claims.
    pub fn decode(&self, token: &str) -> Result<Claims, TokenError> {
        // Signature and structure are checked by jsonwebtoken; expiry is checked
        // below against our own clock.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let decoded = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| {
            debug!(error = %e, "Rejected JWT");
            TokenError::Invalid
        })?;

        if self.clock.now().timestamp() > decoded.claims.exp {
            debug!(subject = %decoded.claims.sub, "Rejected expired JWT");
            return Err(TokenError::Expired);
        }

        Ok(decoded.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::Utc;

    fn handler_with_clock(secret: &str) -> (JwtHandler, ManualClock) {
        let clock = ManualClock::new(Utc::now());
        let handler = JwtHandler::new(secret).with_clock(Arc::new(clock.clone()));
        (handler, clock)
    }

    #[test]
    fn test_jwt_issue_and_decode() {
        let handler = JwtHandler::new("test-secret-key-12345");

        let issued = handler.issue("u1@example.com", Role::Manager).unwrap();
        assert!(!issued.token.is_empty());
        assert_eq!(issued.expires_in, 24 * 3600);

        let claims = handler.decode(&issued.token).unwrap();
        assert_eq!(claims.sub, "u1@example.com");
        assert_eq!(claims.role, Role::Manager);
        assert_eq!(claims.exp - claims.iat, 24 * 3600);
    }

    #[test]
    fn test_round_trip_for_every_role() {
        let handler = JwtHandler::new("test-secret-key-12345");
        for role in [Role::User, Role::Manager, Role::Admin] {
            let issued = handler.issue("someone@example.com", role).unwrap();
            let claims = handler.decode(&issued.token).unwrap();
            assert_eq!((claims.sub.as_str(), claims.role), ("someone@example.com", role));
        }
    }

    #[test]
    fn test_token_valid_until_expiry() {
        let (handler, clock) = handler_with_clock("test-secret-key-12345");
        let issued = handler.issue("u1@example.com", Role::User).unwrap();

        clock.advance(Duration::hours(23) + Duration::minutes(59));
        assert!(handler.decode(&issued.token).is_ok());
    }

    #[test]
    fn test_token_older_than_a_day_is_expired() {
        let (handler, clock) = handler_with_clock("test-secret-key-12345");
        let issued = handler.issue("u1@example.com", Role::User).unwrap();

        clock.advance(Duration::days(1) + Duration::seconds(1));
        assert_eq!(handler.decode(&issued.token), Err(TokenError::Expired));
    }

    #[test]
    fn test_invalid_token_rejected() {
        let handler = JwtHandler::new("test-secret-key-12345");
        assert_eq!(handler.decode("invalid.token.here"), Err(TokenError::Invalid));
        assert_eq!(handler.decode(""), Err(TokenError::Invalid));
    }

    #[test]
    fn test_different_secrets_reject() {
        let handler1 = JwtHandler::new("secret-number-one");
        let handler2 = JwtHandler::new("secret-number-two");

        let issued = handler1.issue("u1@example.com", Role::Admin).unwrap();
        assert_eq!(handler2.decode(&issued.token), Err(TokenError::Invalid));
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let handler = JwtHandler::new("test-secret-key-12345");
        let user_token = handler.issue("u1@example.com", Role::User).unwrap().token;
        let admin_token = handler.issue("u1@example.com", Role::Admin).unwrap().token;

        // Splice the admin payload onto the user token's signature
        let user_parts: Vec<&str> = user_token.split('.').collect();
        let admin_parts: Vec<&str> = admin_token.split('.').collect();
        let forged = format!("{}.{}.{}", user_parts[0], admin_parts[1], user_parts[2]);

        assert_eq!(handler.decode(&forged), Err(TokenError::Invalid));
    }

    #[test]
    fn test_wrong_algorithm_rejected() {
        let handler = JwtHandler::new("test-secret-key-12345");
        let claims = Claims {
            sub: "u1@example.com".to_string(),
            role: Role::Admin,
            iat: Utc::now().timestamp(),
            exp: Utc::now().timestamp() + 3600,
        };
        let token = encode(
            &Header::new(Algorithm::HS512),
            &claims,
            &EncodingKey::from_secret(b"test-secret-key-12345"),
        )
        .unwrap();

        assert_eq!(handler.decode(&token), Err(TokenError::Invalid));
    }
}

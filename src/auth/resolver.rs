//! Bearer token → stored user.

use crate::auth::{
    jwt::{JwtHandler, TokenError},
    middleware::AuthError,
    models::User,
    user_store::UserRepository,
};
use std::sync::Arc;
use tracing::{debug, error};

/// Turns a credential into the persisted account it names.
#[derive(Clone)]
pub struct IdentityResolver {
    jwt: Arc<JwtHandler>,
    users: Arc<dyn UserRepository>,
}

impl IdentityResolver {
    pub fn new(jwt: Arc<JwtHandler>, users: Arc<dyn UserRepository>) -> Self {
        Self { jwt, users }
    }

    pub async fn resolve(&self, token: &str) -> Result<User, AuthError> {
        let claims = self.jwt.decode(token).map_err(|e| match e {
            TokenError::Expired => AuthError::ExpiredToken,
            TokenError::Invalid => AuthError::InvalidToken,
        })?;

        match self.users.find_by_username(&claims.sub).await {
            Ok(Some(user)) => Ok(user),
            Ok(None) => {
                debug!(subject = %claims.sub, "Token subject has no account");
                Err(AuthError::UnknownIdentity)
            }
            Err(e) => {
                error!(error = %e, "User lookup failed during authentication");
                Err(AuthError::Internal)
            }
        }
    }
}

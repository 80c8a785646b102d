//! Authentication Extractors
//! Mission: Protect API endpoints with bearer tokens and role checks
//!
//! Handlers opt in by naming an extractor in their signature:
//! [`CurrentUser`] only authenticates, [`RequireAdmin`], [`RequireAnyRole`]
//! and [`RequireManagerOrAdmin`] additionally apply an access policy.

use crate::auth::{models::User, policy, resolver::IdentityResolver};
use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use serde_json::json;

/// Auth error types
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing authorization token")]
    MissingToken,
    #[error("invalid token")]
    InvalidToken,
    #[error("token has expired")]
    ExpiredToken,
    #[error("no account for token subject")]
    UnknownIdentity,
    #[error("insufficient permissions")]
    Forbidden,
    #[error("internal error")]
    Internal,
}

impl From<policy::Forbidden> for AuthError {
    fn from(_: policy::Forbidden) -> Self {
        AuthError::Forbidden
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AuthError::MissingToken => (
                StatusCode::UNAUTHORIZED,
                "missing_token",
                "Missing authorization token. Use: Bearer {token}",
            ),
            AuthError::InvalidToken => {
                (StatusCode::UNAUTHORIZED, "invalid_token", "Invalid token")
            }
            AuthError::ExpiredToken => (
                StatusCode::UNAUTHORIZED,
                "expired_token",
                "The token has already expired",
            ),
            AuthError::UnknownIdentity => (
                StatusCode::UNAUTHORIZED,
                "unknown_identity",
                "Could not validate credentials",
            ),
            AuthError::Forbidden => (
                StatusCode::FORBIDDEN,
                "forbidden",
                "Insufficient permissions",
            ),
            AuthError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "Internal server error",
            ),
        };

        let body = Json(json!({ "error": code, "message": message }));
        if status == StatusCode::UNAUTHORIZED {
            (status, [(header::WWW_AUTHENTICATE, "Bearer")], body).into_response()
        } else {
            (status, body).into_response()
        }
    }
}

/// Any caller holding a valid token for an existing account.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
    IdentityResolver: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        // Already resolved earlier in this request
        if let Some(user) = parts.extensions.get::<User>() {
            return Ok(CurrentUser(user.clone()));
        }

        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| AuthError::MissingToken)?;

        let resolver = IdentityResolver::from_ref(state);
        let user = resolver.resolve(bearer.token()).await?;

        parts.extensions.insert(user.clone());
        Ok(CurrentUser(user))
    }
}

macro_rules! policy_extractor {
    ($(#[$doc:meta])* $name:ident => $check:path) => {
        $(#[$doc])*
        #[derive(Debug, Clone)]
        pub struct $name(pub User);

        #[async_trait]
        impl<S> FromRequestParts<S> for $name
        where
            S: Send + Sync,
            IdentityResolver: FromRef<S>,
        {
            type Rejection = AuthError;

            async fn from_request_parts(
                parts: &mut Parts,
                state: &S,
            ) -> Result<Self, Self::Rejection> {
                let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;
                Ok($name($check(user)?))
            }
        }
    };
}

policy_extractor!(
    /// Confirmed administrators.
    RequireAdmin => policy::require_admin
);
policy_extractor!(
    /// Any confirmed account.
    RequireAnyRole => policy::require_any_role
);
policy_extractor!(
    /// Managers and administrators, confirmed or not.
    RequireManagerOrAdmin => policy::require_manager_or_admin
);

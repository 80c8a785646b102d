//! Authentication API Endpoints
//! Mission: Provide registration, login and user management endpoints

use crate::auth::{
    jwt::JwtHandler,
    middleware::{CurrentUser, RequireAdmin},
    models::{AssignRoleRequest, ConfirmRequest, LoginForm, RegisterRequest, TokenResponse, User},
    service::{ServiceError, UserService, MIN_PASSWORD_LEN},
};
use crate::media::ImageStore;
use axum::{
    extract::{multipart::MultipartError, Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Form, Json,
};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Multipart field carrying the avatar image.
const UPLOAD_FIELD: &str = "file";

/// Shared auth state
#[derive(Clone)]
pub struct AuthState {
    pub users: Arc<UserService>,
    pub jwt_handler: Arc<JwtHandler>,
    pub images: Arc<dyn ImageStore>,
    pub max_upload_bytes: usize,
}

/// Register - POST /users/register
pub async fn register(
    State(state): State<AuthState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<User>), AuthApiError> {
    let user = state
        .users
        .register(&payload.username, &payload.password)
        .await?;

    info!("👤 User registered: {}", user.username);
    Ok((StatusCode::CREATED, Json(user)))
}

/// Login - POST /users/token (form encoded)
pub async fn token(
    State(state): State<AuthState>,
    Form(form): Form<LoginForm>,
) -> Result<Json<TokenResponse>, AuthApiError> {
    info!("🔐 Login attempt: {}", form.username);

    let Some(user) = state
        .users
        .authenticate(&form.username, &form.password)
        .await?
    else {
        warn!("❌ Failed login attempt: {}", form.username);
        return Err(AuthApiError::InvalidCredentials);
    };

    let issued = state
        .jwt_handler
        .issue(&user.username, user.role)
        .map_err(|e| {
            error!("Token issue failed: {:#}", e);
            AuthApiError::InternalError
        })?;

    info!("✅ Login successful: {} ({})", user.username, user.role);
    Ok(Json(TokenResponse::bearer(issued.token, issued.expires_in)))
}

/// Confirm email - POST /users/confirmed
pub async fn confirm(
    State(state): State<AuthState>,
    Json(payload): Json<ConfirmRequest>,
) -> Result<Json<User>, AuthApiError> {
    let user = state
        .users
        .confirm(&payload.email, &payload.otp)
        .await
        .map_err(|e| match e {
            // Unknown accounts are refused like bad credentials
            ServiceError::UserNotFound => AuthApiError::ConfirmationRejected,
            other => other.into(),
        })?;
    Ok(Json(user))
}

/// Current user - GET /users/protected-resource
pub async fn protected_resource(CurrentUser(user): CurrentUser) -> Json<User> {
    Json(user)
}

/// Avatar upload - POST /users/upload_image (multipart, field `file`)
pub async fn upload_image(
    CurrentUser(user): CurrentUser,
    State(state): State<AuthState>,
    mut multipart: Multipart,
) -> Result<Json<User>, AuthApiError> {
    let (name, bytes) = loop {
        let Some(field) = multipart.next_field().await? else {
            return Err(AuthApiError::MissingFile);
        };
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let name = field.file_name().unwrap_or("avatar").to_string();
        break (name, field.bytes().await?);
    };

    if bytes.is_empty() {
        return Err(AuthApiError::MissingFile);
    }
    if bytes.len() > state.max_upload_bytes {
        return Err(AuthApiError::FileTooLarge(state.max_upload_bytes));
    }

    let size = bytes.len();
    let uploaded = state
        .images
        .upload(bytes.to_vec(), &name)
        .await
        .map_err(|e| {
            error!(username = %user.username, "Image upload failed: {:#}", e);
            AuthApiError::UploadFailed
        })?;

    info!(username = %user.username, size, "🖼️  Avatar uploaded");
    let user = state
        .users
        .set_image(&user.username, &uploaded.secure_url)
        .await?;
    Ok(Json(user))
}

/// List all users - GET /users (Admin only)
pub async fn list_users(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AuthState>,
) -> Result<Json<Vec<User>>, AuthApiError> {
    Ok(Json(state.users.list().await?))
}

/// Assign role - PUT /users/:username/role (Admin only)
pub async fn assign_role(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AuthState>,
    Path(username): Path<String>,
    Json(payload): Json<AssignRoleRequest>,
) -> Result<Json<User>, AuthApiError> {
    let user = state.users.set_role(&username, payload.role).await?;
    info!(
        "🛡️  {} assigned role {} to {}",
        admin.username, user.role, user.username
    );
    Ok(Json(user))
}

/// Auth API errors
#[derive(Debug)]
pub enum AuthApiError {
    InvalidCredentials,
    ConfirmationRejected,
    InvalidEmail,
    WeakPassword,
    UserAlreadyExists,
    UserNotFound,
    MissingFile,
    FileTooLarge(usize),
    Multipart(MultipartError),
    UploadFailed,
    InternalError,
}

impl From<ServiceError> for AuthApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::InvalidEmail => AuthApiError::InvalidEmail,
            ServiceError::WeakPassword => AuthApiError::WeakPassword,
            ServiceError::UserAlreadyExists => AuthApiError::UserAlreadyExists,
            ServiceError::UserNotFound => AuthApiError::UserNotFound,
            other => {
                error!("User service failure: {}", other);
                AuthApiError::InternalError
            }
        }
    }
}

impl From<MultipartError> for AuthApiError {
    fn from(err: MultipartError) -> Self {
        AuthApiError::Multipart(err)
    }
}

impl IntoResponse for AuthApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AuthApiError::InvalidCredentials => (
                StatusCode::FORBIDDEN,
                "invalid_credentials",
                "Incorrect username or password".to_string(),
            ),
            AuthApiError::ConfirmationRejected => (
                StatusCode::FORBIDDEN,
                "confirmation_rejected",
                "Unknown account".to_string(),
            ),
            AuthApiError::InvalidEmail => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "invalid_email",
                "Username must be a valid email address".to_string(),
            ),
            AuthApiError::WeakPassword => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "weak_password",
                format!("Password must be at least {MIN_PASSWORD_LEN} characters"),
            ),
            AuthApiError::UserAlreadyExists => (
                StatusCode::CONFLICT,
                "user_exists",
                "Account already exists".to_string(),
            ),
            AuthApiError::UserNotFound => (
                StatusCode::NOT_FOUND,
                "user_not_found",
                "User not found".to_string(),
            ),
            AuthApiError::MissingFile => (
                StatusCode::BAD_REQUEST,
                "missing_file",
                format!("Expected a non-empty multipart field named `{UPLOAD_FIELD}`"),
            ),
            AuthApiError::FileTooLarge(limit) => (
                StatusCode::PAYLOAD_TOO_LARGE,
                "file_too_large",
                format!("File exceeds the {limit} byte limit"),
            ),
            AuthApiError::Multipart(e) => (e.status(), "bad_multipart", e.body_text()),
            AuthApiError::UploadFailed => (
                StatusCode::BAD_GATEWAY,
                "upload_failed",
                "There was an error uploading the file".to_string(),
            ),
            AuthApiError::InternalError => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "Internal server error".to_string(),
            ),
        };

        (status, Json(json!({ "error": code, "message": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::StoreError;

    #[test]
    fn test_auth_api_error_responses() {
        let invalid_creds = AuthApiError::InvalidCredentials.into_response();
        assert_eq!(invalid_creds.status(), StatusCode::FORBIDDEN);

        let rejected = AuthApiError::ConfirmationRejected.into_response();
        assert_eq!(rejected.status(), StatusCode::FORBIDDEN);

        let not_found = AuthApiError::UserNotFound.into_response();
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);

        let conflict = AuthApiError::UserAlreadyExists.into_response();
        assert_eq!(conflict.status(), StatusCode::CONFLICT);

        let too_large = AuthApiError::FileTooLarge(10).into_response();
        assert_eq!(too_large.status(), StatusCode::PAYLOAD_TOO_LARGE);

        let upload = AuthApiError::UploadFailed.into_response();
        assert_eq!(upload.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_service_errors_map_to_api_errors() {
        assert!(matches!(
            AuthApiError::from(ServiceError::WeakPassword),
            AuthApiError::WeakPassword
        ));
        assert!(matches!(
            AuthApiError::from(ServiceError::UserAlreadyExists),
            AuthApiError::UserAlreadyExists
        ));
        assert!(matches!(
            AuthApiError::from(ServiceError::Store(StoreError::Corrupt("row".into()))),
            AuthApiError::InternalError
        ));
    }
}

//! Account lifecycle: registration, email confirmation, login, profile updates.

use crate::auth::{
    models::{is_valid_email, Role, User},
    user_store::UserRepository,
};
use crate::db::StoreError;
use crate::notify::{EmailMessage, MailQueue};
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::Utc;
use rand::Rng;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

pub const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("invalid email address")]
    InvalidEmail,
    #[error("password must be at least {MIN_PASSWORD_LEN} characters")]
    WeakPassword,
    #[error("username already exists")]
    UserAlreadyExists,
    #[error("user not found")]
    UserNotFound,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("password hashing failed: {0}")]
    Hash(String),
}

pub struct UserService {
    users: Arc<dyn UserRepository>,
    mail: MailQueue,
    hash_cost: u32,
}

impl UserService {
    pub fn new(users: Arc<dyn UserRepository>, mail: MailQueue) -> Self {
        Self {
            users,
            mail,
            hash_cost: DEFAULT_COST,
        }
    }

    /// Override the bcrypt cost (tests use the minimum to stay fast).
    pub fn with_hash_cost(mut self, cost: u32) -> Self {
        self.hash_cost = cost;
        self
    }

    pub fn repository(&self) -> Arc<dyn UserRepository> {
        self.users.clone()
    }

    /// Create an unconfirmed `User`-role account and mail it a one-time code.
    ///
    /// The code is delivered in the background; a delivery failure never fails
    /// the registration.
    pub async fn register(&self, username: &str, password: &str) -> Result<User, ServiceError> {
        let username = normalize_username(username).to_string();
        if !is_valid_email(&username) {
            return Err(ServiceError::InvalidEmail);
        }
        if password.len() < MIN_PASSWORD_LEN {
            return Err(ServiceError::WeakPassword);
        }

        let otp = generate_otp();
        let user = User {
            id: Uuid::new_v4(),
            username,
            password_hash: self.hash_password(password).await?,
            role: Role::User,
            confirmed: false,
            otp: Some(otp.clone()),
            image: None,
            created_at: Utc::now().to_rfc3339(),
        };

        let user = self.users.create(user).await.map_err(|e| match e {
            StoreError::Conflict(_) => ServiceError::UserAlreadyExists,
            other => ServiceError::Store(other),
        })?;

        let queued = self.mail.enqueue(EmailMessage {
            subject: "Welcome".to_string(),
            body: format!("your code is {otp}"),
            recipient: user.username.clone(),
        });
        if !queued {
            warn!(username = %user.username, "Confirmation code email not queued; account still created");
        }

        Ok(user)
    }

    /// Confirm `email` when `otp` matches. A wrong code leaves the account as
    /// it was and is not an error.
    pub async fn confirm(&self, email: &str, otp: &str) -> Result<User, ServiceError> {
        let email = normalize_username(email);
        let user = self.users.confirm(email, otp).await.map_err(not_found)?;

        if user.confirmed {
            info!(username = %user.username, "✅ Account confirmed");
        } else {
            warn!(username = %user.username, "❌ Confirmation code mismatch");
        }
        Ok(user)
    }

    /// Check credentials; `None` when the user is unknown or the password is wrong.
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<User>, ServiceError> {
        let username = normalize_username(username);
        let Some(user) = self.users.find_by_username(username).await? else {
            return Ok(None);
        };

        let password = password.to_string();
        let stored = user.password_hash.clone();
        let valid = tokio::task::spawn_blocking(move || verify(password, &stored))
            .await
            .map_err(|e| ServiceError::Hash(e.to_string()))?
            .unwrap_or(false);

        Ok(valid.then_some(user))
    }

    pub async fn get_by_username(&self, username: &str) -> Result<User, ServiceError> {
        self.users
            .find_by_username(normalize_username(username))
            .await?
            .ok_or(ServiceError::UserNotFound)
    }

    pub async fn set_image(&self, username: &str, url: &str) -> Result<User, ServiceError> {
        self.users
            .set_image(normalize_username(username), url)
            .await
            .map_err(not_found)
    }

    pub async fn set_role(&self, username: &str, role: Role) -> Result<User, ServiceError> {
        let user = self
            .users
            .set_role(normalize_username(username), role)
            .await
            .map_err(not_found)?;
        info!(username = %user.username, role = role.as_str(), "Role assigned");
        Ok(user)
    }

    pub async fn list(&self) -> Result<Vec<User>, ServiceError> {
        Ok(self.users.list().await?)
    }

    /// Create a confirmed administrator unless the username already exists.
    pub async fn ensure_admin(&self, username: &str, password: &str) -> Result<(), ServiceError> {
        let username = normalize_username(username);
        if self.users.find_by_username(username).await?.is_some() {
            return Ok(());
        }

        let admin = User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            password_hash: self.hash_password(password).await?,
            role: Role::Admin,
            confirmed: true,
            otp: None,
            image: None,
            created_at: Utc::now().to_rfc3339(),
        };
        self.users.create(admin).await?;
        info!("🔐 Bootstrap admin user created (username: {})", username);
        Ok(())
    }

    async fn hash_password(&self, password: &str) -> Result<String, ServiceError> {
        let password = password.to_string();
        let cost = self.hash_cost;
        tokio::task::spawn_blocking(move || hash(password, cost))
            .await
            .map_err(|e| ServiceError::Hash(e.to_string()))?
            .map_err(|e| ServiceError::Hash(e.to_string()))
    }
}

/// Usernames are stored trimmed; every lookup goes through here too.
fn normalize_username(username: &str) -> &str {
    username.trim()
}

fn not_found(err: StoreError) -> ServiceError {
    match err {
        StoreError::NotFound(_) => ServiceError::UserNotFound,
        other => ServiceError::Store(other),
    }
}

/// Six-digit numeric one-time code.
pub fn generate_otp() -> String {
    rand::thread_rng().gen_range(100_000..=999_999).to_string()
}

//! Authentication Module
//! Mission: Secure API access with JWT tokens, role checks and confirmed accounts

pub mod api;
pub mod jwt;
pub mod middleware;
pub mod models;
pub mod policy;
pub mod resolver;
pub mod service;
pub mod user_store;

pub use api::AuthState;
pub use jwt::JwtHandler;
pub use middleware::{AuthError, CurrentUser, RequireAdmin, RequireAnyRole, RequireManagerOrAdmin};
pub use models::{Role, User};
pub use resolver::IdentityResolver;
pub use service::UserService;
pub use user_store::{SqliteUserStore, UserRepository};

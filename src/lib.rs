//! Todo Backend Library
//!
//! Exposes the modules used by the server binary and the integration tests.

pub mod app;
pub mod auth;
pub mod clock;
pub mod config;
pub mod db;
pub mod media;
pub mod middleware;
pub mod notify;
pub mod todos;

pub use app::{build_router, AppState};
pub use config::Config;

//! Application wiring
//! Mission: Assemble shared state and the HTTP router

use crate::auth::{
    api as auth_api, models::is_valid_email, AuthState, IdentityResolver, JwtHandler,
    RequireAdmin, SqliteUserStore, UserRepository, UserService,
};
use crate::config::Config;
use crate::db::Database;
use crate::media::ImageStore;
use crate::middleware::{rate_limit_middleware, request_logging, RateLimitConfig, RateLimiter};
use crate::notify::{EmailMessage, EmailSender, MailQueue, RetryPolicy};
use crate::todos::{api as todo_api, api::TodoState, SqliteTodoStore};
use axum::{
    extract::{DefaultBodyLimit, FromRef, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

/// Multipart framing allowance on top of the raw file limit.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub auth: AuthState,
    pub todos: TodoState,
    pub resolver: IdentityResolver,
    pub rate_limiter: RateLimiter,
    pub mail: MailQueue,
}

impl FromRef<AppState> for AuthState {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}

impl FromRef<AppState> for TodoState {
    fn from_ref(state: &AppState) -> Self {
        state.todos.clone()
    }
}

impl FromRef<AppState> for IdentityResolver {
    fn from_ref(state: &AppState) -> Self {
        state.resolver.clone()
    }
}

impl FromRef<AppState> for MailQueue {
    fn from_ref(state: &AppState) -> Self {
        state.mail.clone()
    }
}

impl AppState {
    /// Wire stores, token handling and the mail queue over an open database.
    ///
    /// Must be called inside a tokio runtime: the mail workers start here.
    pub fn new(
        config: &Config,
        db: Database,
        mailer: Arc<dyn EmailSender>,
        images: Arc<dyn ImageStore>,
    ) -> Self {
        let jwt_handler = Arc::new(
            JwtHandler::new(&config.jwt_secret)
                .with_ttl(chrono::Duration::hours(config.token_ttl_hours)),
        );

        let users: Arc<dyn UserRepository> = Arc::new(SqliteUserStore::new(db.clone()));
        let todos: TodoState = Arc::new(SqliteTodoStore::new(db));

        let mail = MailQueue::spawn(
            mailer,
            config.mail.queue_size,
            config.mail.workers,
            RetryPolicy::with_max_attempts(config.mail.max_attempts),
        );

        let service = Arc::new(
            UserService::new(users.clone(), mail.clone()).with_hash_cost(config.bcrypt_cost),
        );

        let rate_limiter = RateLimiter::new(RateLimitConfig {
            max_requests: config.rate_limit_max_requests,
            window: config.rate_limit_window,
        });

        Self {
            auth: AuthState {
                users: service,
                jwt_handler: jwt_handler.clone(),
                images,
                max_upload_bytes: config.max_upload_bytes,
            },
            todos,
            resolver: IdentityResolver::new(jwt_handler, users),
            rate_limiter,
            mail,
        }
    }
}

/// Build the full router: public, rate-limited, authenticated and todo routes.
pub fn build_router(state: AppState, cors_origins: &[String]) -> Router {
    let upload_limit = state.auth.max_upload_bytes + MULTIPART_OVERHEAD;

    // Credential endpoints share one per-client quota
    let limited_routes = Router::new()
        .route("/users/register", post(auth_api::register))
        .route("/users/token", post(auth_api::token))
        .route("/users/confirmed", post(auth_api::confirm))
        .route_layer(middleware::from_fn_with_state(
            state.rate_limiter.clone(),
            rate_limit_middleware,
        ));

    let user_routes = Router::new()
        .route(
            "/users/protected-resource",
            get(auth_api::protected_resource),
        )
        .route(
            "/users/upload_image",
            post(auth_api::upload_image).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/users", get(auth_api::list_users))
        .route("/users/:username/role", put(auth_api::assign_role));

    let todo_routes = Router::new()
        .route(
            "/todo",
            get(todo_api::list_todos).post(todo_api::create_todo),
        )
        .route(
            "/todo/:id",
            get(todo_api::get_todo)
                .put(todo_api::update_todo)
                .delete(todo_api::delete_todo),
        );

    Router::new()
        .route("/", get(health_check))
        .route("/send-email", post(send_email))
        .merge(limited_routes)
        .merge(user_routes)
        .merge(todo_routes)
        .with_state(state)
        .layer(middleware::from_fn(request_logging))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(cors_origins))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
}

/// Health check - GET /
async fn health_check() -> Json<Value> {
    Json(json!({ "OK": true }))
}

#[derive(Debug, Deserialize)]
pub struct SendEmailRequest {
    pub email: String,
}

/// Queue a greeting - POST /send-email (Admin only)
async fn send_email(
    RequireAdmin(admin): RequireAdmin,
    State(mail): State<MailQueue>,
    Json(payload): Json<SendEmailRequest>,
) -> impl IntoResponse {
    if !is_valid_email(&payload.email) {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "error": "invalid_email", "message": "Not a valid email address" })),
        );
    }

    let queued = mail.enqueue(EmailMessage {
        subject: "Hello".to_string(),
        body: "Hello from the todo service!".to_string(),
        recipient: payload.email.clone(),
    });

    if !queued {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": "mail_unavailable", "message": "Mail queue is not accepting messages" })),
        );
    }

    info!("📧 {} queued a greeting to {}", admin.username, payload.email);
    (
        StatusCode::ACCEPTED,
        Json(json!({ "message": "email has been queued" })),
    )
}

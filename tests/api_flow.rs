//! End-to-end checks against the assembled router.

use anyhow::Result;
use async_trait::async_trait;
use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header, Request, StatusCode},
    Router,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use todo_backend::{
    auth::{models::Role, JwtHandler},
    build_router,
    db::Database,
    media::{DisabledImageStore, ImageStore, UploadedImage},
    notify::{EmailMessage, EmailSender},
    AppState, Config,
};
use tower::ServiceExt;

const ADMIN: &str = "admin@example.com";
const ADMIN_PASSWORD: &str = "admin-password";

#[derive(Default)]
struct RecordingMailer {
    sent: Mutex<Vec<EmailMessage>>,
}

#[async_trait]
impl EmailSender for RecordingMailer {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        self.sent.lock().push(message.clone());
        Ok(())
    }
}

impl RecordingMailer {
    /// Wait for the background queue to deliver a message to `recipient`.
    async fn wait_for(&self, recipient: &str) -> EmailMessage {
        for _ in 0..200 {
            if let Some(found) = self
                .sent
                .lock()
                .iter()
                .find(|m| m.recipient == recipient)
                .cloned()
            {
                return found;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("no email delivered to {recipient}");
    }
}

struct StubImageStore;

#[async_trait]
impl ImageStore for StubImageStore {
    async fn upload(&self, bytes: Vec<u8>, name: &str) -> Result<UploadedImage> {
        assert!(!bytes.is_empty());
        Ok(UploadedImage {
            secure_url: format!("https://img.example.com/{name}"),
        })
    }
}

/// Holds every upload until the test releases it.
#[derive(Default)]
struct GatedImageStore {
    started: Notify,
    release: Notify,
}

#[async_trait]
impl ImageStore for GatedImageStore {
    async fn upload(&self, _bytes: Vec<u8>, name: &str) -> Result<UploadedImage> {
        self.started.notify_one();
        self.release.notified().await;
        Ok(UploadedImage {
            secure_url: format!("https://img.example.com/{name}"),
        })
    }
}

struct TestApp {
    router: Router,
    mailer: Arc<RecordingMailer>,
    config: Config,
}

async fn spawn_app(rate_limit: u32, images: Arc<dyn ImageStore>) -> TestApp {
    let config = Config {
        bcrypt_cost: 4,
        rate_limit_max_requests: rate_limit,
        ..Config::default()
    };
    let mailer = Arc::new(RecordingMailer::default());
    let state = AppState::new(
        &config,
        Database::open_in_memory().unwrap(),
        mailer.clone(),
        images,
    );
    state
        .auth
        .users
        .ensure_admin(ADMIN, ADMIN_PASSWORD)
        .await
        .unwrap();

    TestApp {
        router: build_router(state, &config.cors_origins),
        mailer,
        config,
    }
}

impl TestApp {
    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    async fn register(&self, username: &str, password: &str) -> (StatusCode, Value) {
        self.send(json_request(
            "POST",
            "/users/register",
            None,
            json!({ "username": username, "password": password }),
        ))
        .await
    }

    async fn login(&self, username: &str, password: &str) -> String {
        let (status, body) = self.send(login_request(username, password)).await;
        assert_eq!(status, StatusCode::OK, "login failed: {body}");
        assert_eq!(body["token_type"], "bearer");
        body["access_token"].as_str().unwrap().to_string()
    }

    /// Register and confirm `username`, returning a token.
    async fn confirmed_user(&self, username: &str) -> String {
        let (status, _) = self.register(username, "password123").await;
        assert_eq!(status, StatusCode::CREATED);
        let otp = otp_from(&self.mailer.wait_for(username).await);
        let (status, body) = self
            .send(json_request(
                "POST",
                "/users/confirmed",
                None,
                json!({ "email": username, "otp": otp }),
            ))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["confirmed"], true);
        self.login(username, "password123").await
    }
}

fn json_request(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get_request(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

fn login_request(username: &str, password: &str) -> Request<Body> {
    let form = format!(
        "username={}&password={}",
        username.replace('@', "%40"),
        password
    );
    Request::builder()
        .method("POST")
        .uri("/users/token")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(form))
        .unwrap()
}

fn from_peer(mut request: Request<Body>, peer: &str) -> Request<Body> {
    let addr: SocketAddr = peer.parse().unwrap();
    request.extensions_mut().insert(ConnectInfo(addr));
    request
}

fn otp_from(message: &EmailMessage) -> String {
    message
        .body
        .split_whitespace()
        .last()
        .unwrap()
        .to_string()
}

fn todo_body(id: i64) -> Value {
    json!({
        "id": id,
        "name": "Ada",
        "surname": "Lovelace",
        "email": "ada@example.com",
        "phone": 5550100,
        "birthday": "1815-12-10",
        "description": "notes on the engine"
    })
}

#[tokio::test]
async fn test_health_check() {
    let app = spawn_app(100, Arc::new(DisabledImageStore)).await;
    let (status, body) = app.send(get_request("/", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "OK": true }));
}

#[tokio::test]
async fn test_register_confirm_and_access() {
    let app = spawn_app(100, Arc::new(DisabledImageStore)).await;

    let (status, user) = app.register("u1@example.com", "password123").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(user["confirmed"], false);
    assert_eq!(user["role"], "User");
    assert!(user.get("password_hash").is_none());
    assert!(user.get("otp").is_none());

    let mail = app.mailer.wait_for("u1@example.com").await;
    assert_eq!(mail.subject, "Welcome");
    let otp = otp_from(&mail);
    assert_eq!(otp.len(), 6);

    // Unconfirmed accounts can log in but not pass role checks
    let token = app.login("u1@example.com", "password123").await;
    let (status, _) = app.send(get_request("/todo", Some(token.as_str()))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .send(json_request(
            "POST",
            "/users/confirmed",
            None,
            json!({ "email": "u1@example.com", "otp": "000000" }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["confirmed"], false);

    let (status, body) = app
        .send(json_request(
            "POST",
            "/users/confirmed",
            None,
            json!({ "email": "u1@example.com", "otp": otp }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["confirmed"], true);

    let (status, body) = app.send(get_request("/todo", Some(token.as_str()))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));

    let (status, me) = app
        .send(get_request("/users/protected-resource", Some(token.as_str())))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["username"], "u1@example.com");
}

#[tokio::test]
async fn test_registration_rejections() {
    let app = spawn_app(100, Arc::new(DisabledImageStore)).await;

    let (status, _) = app.register("not-an-email", "password123").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = app.register("u2@example.com", "short").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = app.register("u2@example.com", "password123").await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, body) = app.register("u2@example.com", "password123").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "user_exists");
}

#[tokio::test]
async fn test_confirming_unknown_account_is_forbidden() {
    let app = spawn_app(100, Arc::new(DisabledImageStore)).await;

    let (status, body) = app
        .send(json_request(
            "POST",
            "/users/confirmed",
            None,
            json!({ "email": "nobody@example.com", "otp": "123456" }),
        ))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "confirmation_rejected");
}

#[tokio::test]
async fn test_bad_credentials_are_forbidden() {
    let app = spawn_app(100, Arc::new(DisabledImageStore)).await;

    let (status, _) = app.send(login_request(ADMIN, "wrong-password")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .send(login_request("nobody@example.com", "password123"))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_unauthenticated_requests() {
    let app = spawn_app(100, Arc::new(DisabledImageStore)).await;

    let response = app
        .router
        .clone()
        .oneshot(get_request("/todo", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
        "Bearer"
    );

    let (status, body) = app
        .send(get_request("/users/protected-resource", Some("garbage")))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "invalid_token");

    // Well-signed token for an account that does not exist
    let ghost = JwtHandler::new(&app.config.jwt_secret)
        .issue("ghost@example.com", Role::Admin)
        .unwrap();
    let (status, body) = app.send(get_request("/users", Some(ghost.token.as_str()))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unknown_identity");
}

#[tokio::test]
async fn test_todo_role_gates() {
    let app = spawn_app(100, Arc::new(DisabledImageStore)).await;
    let admin = app.login(ADMIN, ADMIN_PASSWORD).await;
    let user = app.confirmed_user("worker@example.com").await;

    // Users read, only admins create
    let (status, _) = app
        .send(json_request("POST", "/todo", Some(user.as_str()), todo_body(1)))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, created) = app
        .send(json_request("POST", "/todo", Some(admin.as_str()), todo_body(1)))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["id"], 1);
    assert_eq!(created["is_done"], false);

    let (status, _) = app
        .send(json_request("POST", "/todo", Some(admin.as_str()), todo_body(1)))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, fetched) = app.send(get_request("/todo/1", Some(user.as_str()))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["birthday"], "1815-12-10");

    // Plain users cannot update
    let (status, _) = app
        .send(json_request(
            "PUT",
            "/todo/1",
            Some(user.as_str()),
            json!({ "is_done": true }),
        ))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Promote to manager; the existing token picks up the stored role
    let (status, promoted) = app
        .send(json_request(
            "PUT",
            "/users/worker@example.com/role",
            Some(admin.as_str()),
            json!({ "role": "Manager" }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(promoted["role"], "Manager");

    let (status, updated) = app
        .send(json_request(
            "PUT",
            "/todo/1",
            Some(user.as_str()),
            json!({ "is_done": true }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["is_done"], true);
    assert_eq!(updated["name"], "Ada");

    let (status, _) = app
        .send(json_request(
            "PUT",
            "/todo/99",
            Some(user.as_str()),
            json!({ "is_done": true }),
        ))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Only admins delete
    let delete = |token: &str| {
        Request::builder()
            .method("DELETE")
            .uri("/todo/1")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap()
    };
    let (status, _) = app.send(delete(user.as_str())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, removed) = app.send(delete(admin.as_str())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(removed["id"], 1);

    let (status, _) = app.send(get_request("/todo/1", Some(admin.as_str()))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unconfirmed_manager_can_update_but_not_read() {
    let app = spawn_app(100, Arc::new(DisabledImageStore)).await;
    let admin = app.login(ADMIN, ADMIN_PASSWORD).await;

    let (status, _) = app.register("pending@example.com", "password123").await;
    assert_eq!(status, StatusCode::CREATED);
    let manager = app.login("pending@example.com", "password123").await;

    let (status, promoted) = app
        .send(json_request(
            "PUT",
            "/users/pending@example.com/role",
            Some(admin.as_str()),
            json!({ "role": "Manager" }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(promoted["role"], "Manager");
    assert_eq!(promoted["confirmed"], false);

    let (status, _) = app
        .send(json_request("POST", "/todo", Some(admin.as_str()), todo_body(7)))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    // Manager-or-admin does not look at `confirmed`
    let (status, updated) = app
        .send(json_request(
            "PUT",
            "/todo/7",
            Some(manager.as_str()),
            json!({ "is_done": true }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["is_done"], true);

    // Reads need a confirmed account
    let (status, _) = app.send(get_request("/todo", Some(manager.as_str()))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.send(get_request("/todo/7", Some(manager.as_str()))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_admin_user_listing() {
    let app = spawn_app(100, Arc::new(DisabledImageStore)).await;
    let admin = app.login(ADMIN, ADMIN_PASSWORD).await;
    let user = app.confirmed_user("u3@example.com").await;

    let (status, _) = app.send(get_request("/users", Some(user.as_str()))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, users) = app.send(get_request("/users", Some(admin.as_str()))).await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = users
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|u| u["username"].as_str())
        .collect();
    assert!(names.contains(&ADMIN));
    assert!(names.contains(&"u3@example.com"));
}

#[tokio::test]
async fn test_send_email_is_queued() {
    let app = spawn_app(100, Arc::new(DisabledImageStore)).await;
    let admin = app.login(ADMIN, ADMIN_PASSWORD).await;

    let (status, _) = app
        .send(json_request(
            "POST",
            "/send-email",
            Some(admin.as_str()),
            json!({ "email": "friend@example.com" }),
        ))
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let mail = app.mailer.wait_for("friend@example.com").await;
    assert_eq!(mail.subject, "Hello");
}

fn upload_request(token: &str, field: &str) -> Request<Body> {
    let body = format!(
        "--BOUNDARY\r\n\
         Content-Disposition: form-data; name=\"{field}\"; filename=\"me.png\"\r\n\
         Content-Type: image/png\r\n\r\n\
         not-really-a-png\r\n\
         --BOUNDARY--\r\n"
    );
    Request::builder()
        .method("POST")
        .uri("/users/upload_image")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(header::CONTENT_TYPE, "multipart/form-data; boundary=BOUNDARY")
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn test_avatar_upload() {
    let app = spawn_app(100, Arc::new(StubImageStore)).await;
    let token = app.login(ADMIN, ADMIN_PASSWORD).await;

    let (status, user) = app.send(upload_request(&token, "file")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(user["image"], "https://img.example.com/me.png");

    let (status, _) = app.send(upload_request(&token, "picture")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_slow_upload_keeps_concurrent_account_changes() {
    let images = Arc::new(GatedImageStore::default());
    let app = spawn_app(100, images.clone()).await;
    let admin = app.login(ADMIN, ADMIN_PASSWORD).await;

    let (status, _) = app.register("slow@example.com", "password123").await;
    assert_eq!(status, StatusCode::CREATED);
    let otp = otp_from(&app.mailer.wait_for("slow@example.com").await);
    let token = app.login("slow@example.com", "password123").await;

    // The upload resolves the still-unconfirmed account, then waits on the store
    let upload = tokio::spawn(app.router.clone().oneshot(upload_request(&token, "file")));
    images.started.notified().await;

    let (status, body) = app
        .send(json_request(
            "POST",
            "/users/confirmed",
            None,
            json!({ "email": "slow@example.com", "otp": otp }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["confirmed"], true);

    let (status, _) = app
        .send(json_request(
            "PUT",
            "/users/slow@example.com/role",
            Some(admin.as_str()),
            json!({ "role": "Manager" }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);

    images.release.notify_one();
    let response = upload.await.unwrap().unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let uploaded: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(uploaded["image"], "https://img.example.com/me.png");
    assert_eq!(uploaded["confirmed"], true);
    assert_eq!(uploaded["role"], "Manager");

    let (status, me) = app
        .send(get_request("/users/protected-resource", Some(token.as_str())))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["confirmed"], true);
    assert_eq!(me["role"], "Manager");
    assert_eq!(me["image"], "https://img.example.com/me.png");
}

#[tokio::test]
async fn test_upload_failure_is_bad_gateway() {
    let app = spawn_app(100, Arc::new(DisabledImageStore)).await;
    let token = app.login(ADMIN, ADMIN_PASSWORD).await;

    let (status, body) = app.send(upload_request(&token, "file")).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["message"], "There was an error uploading the file");
}

#[tokio::test]
async fn test_credential_endpoints_are_rate_limited() {
    let app = spawn_app(3, Arc::new(DisabledImageStore)).await;

    for _ in 0..3 {
        let (status, _) = app
            .send(from_peer(
                login_request(ADMIN, "wrong-password"),
                "10.0.0.1:5000",
            ))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    let response = app
        .router
        .clone()
        .oneshot(from_peer(
            login_request(ADMIN, ADMIN_PASSWORD),
            "10.0.0.1:5001",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = response
        .headers()
        .get("Retry-After")
        .unwrap()
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!(retry_after > 0 && retry_after <= 120);

    // Other clients keep their own quota
    let (status, _) = app
        .send(from_peer(
            login_request(ADMIN, ADMIN_PASSWORD),
            "10.0.0.2:5000",
        ))
        .await;
    assert_eq!(status, StatusCode::OK);

    // Other routes are not limited
    let (status, _) = app
        .send(from_peer(get_request("/", None), "10.0.0.1:5002"))
        .await;
    assert_eq!(status, StatusCode::OK);
}

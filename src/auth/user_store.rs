//! User Storage
//! Mission: Persist user accounts in SQLite behind a repository trait

use crate::auth::models::{Role, User};
use crate::db::{is_constraint_violation, Database, StoreError};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Row, ToSql};
use tracing::info;
use uuid::Uuid;

/// Storage collaborator for user accounts. Usernames are unique.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;
    async fn create(&self, user: User) -> Result<User, StoreError>;
    async fn list(&self) -> Result<Vec<User>, StoreError>;

    // Updates write only their own column and return the row as stored
    // afterwards. `NotFound` when no account has `username`.

    /// Mark confirmed when `otp` matches the stored code; otherwise unchanged.
    async fn confirm(&self, username: &str, otp: &str) -> Result<User, StoreError>;
    async fn set_role(&self, username: &str, role: Role) -> Result<User, StoreError>;
    async fn set_image(&self, username: &str, url: &str) -> Result<User, StoreError>;
}

/// User storage with SQLite backend
#[derive(Clone)]
pub struct SqliteUserStore {
    db: Database,
}

const USER_COLUMNS: &str =
    "id, username, password_hash, role, confirmed, otp, image, created_at";

impl SqliteUserStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

fn row_to_user(row: &Row<'_>) -> rusqlite::Result<(String, User)> {
    let id: String = row.get(0)?;
    let role_str: String = row.get(3)?;
    let user = User {
        id: Uuid::nil(),
        username: row.get(1)?,
        password_hash: row.get(2)?,
        // Unknown roles degrade to the least privileged one
        role: Role::parse(&role_str).unwrap_or(Role::User),
        confirmed: row.get(4)?,
        otp: row.get(5)?,
        image: row.get(6)?,
        created_at: row.get(7)?,
    };
    Ok((id, user))
}

fn with_id((id, mut user): (String, User)) -> Result<User, StoreError> {
    user.id = Uuid::parse_str(&id).map_err(|_| StoreError::Corrupt(format!("user id {id}")))?;
    Ok(user)
}

fn select_by_username(conn: &Connection, username: &str) -> Result<Option<User>, StoreError> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1"),
        params![username],
        row_to_user,
    )
    .optional()?
    .map(with_id)
    .transpose()
}

/// Run one column-scoped `UPDATE` keyed by username (`?1`), then reload the row.
fn update_and_reload(
    conn: &Connection,
    sql: &str,
    username: &str,
    value: &dyn ToSql,
    require_match: bool,
) -> Result<User, StoreError> {
    let changed = conn.execute(sql, params![username, value])?;
    let user = select_by_username(conn, username)?
        .ok_or_else(|| StoreError::NotFound(format!("user {username}")))?;
    if require_match && changed == 0 {
        return Err(StoreError::NotFound(format!("user {username}")));
    }
    Ok(user)
}

#[async_trait]
impl UserRepository for SqliteUserStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let username = username.to_string();
        self.db
            .call(move |conn| select_by_username(conn, &username))
            .await
    }

    async fn create(&self, user: User) -> Result<User, StoreError> {
        self.db
            .call(move |conn| {
                let inserted = conn.execute(
                    &format!(
                        "INSERT INTO users ({USER_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
                    ),
                    params![
                        user.id.to_string(),
                        user.username,
                        user.password_hash,
                        user.role.as_str(),
                        user.confirmed,
                        user.otp,
                        user.image,
                        user.created_at,
                    ],
                );
                match inserted {
                    Ok(_) => {}
                    Err(e) if is_constraint_violation(&e) => {
                        return Err(StoreError::Conflict(format!("user {}", user.username)))
                    }
                    Err(e) => return Err(e.into()),
                }

                info!("✅ Created user: {} ({})", user.username, user.role.as_str());
                Ok(user)
            })
            .await
    }

    async fn list(&self) -> Result<Vec<User>, StoreError> {
        self.db
            .call(|conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {USER_COLUMNS} FROM users ORDER BY created_at, username"
                ))?;
                let rows = stmt
                    .query_map([], row_to_user)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows.into_iter().map(with_id).collect()
            })
            .await
    }

    async fn confirm(&self, username: &str, otp: &str) -> Result<User, StoreError> {
        let username = username.to_string();
        let otp = otp.to_string();
        self.db
            .call(move |conn| {
                update_and_reload(
                    conn,
                    "UPDATE users SET confirmed = 1 WHERE username = ?1 AND otp = ?2",
                    &username,
                    &otp,
                    false,
                )
            })
            .await
    }

    async fn set_role(&self, username: &str, role: Role) -> Result<User, StoreError> {
        let username = username.to_string();
        self.db
            .call(move |conn| {
                update_and_reload(
                    conn,
                    "UPDATE users SET role = ?2 WHERE username = ?1",
                    &username,
                    &role.as_str(),
                    true,
                )
            })
            .await
    }

    async fn set_image(&self, username: &str, url: &str) -> Result<User, StoreError> {
        let username = username.to_string();
        let url = url.to_string();
        self.db
            .call(move |conn| {
                update_and_reload(
                    conn,
                    "UPDATE users SET image = ?2 WHERE username = ?1",
                    &username,
                    &url,
                    true,
                )
            })
            .await
    }
}

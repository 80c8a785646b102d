//! Todo storage

use crate::db::{is_constraint_violation, Database, StoreError};
use crate::todos::models::{Todo, TodoCreate, TodoUpdate};
use async_trait::async_trait;
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Row};

const DATE_FORMAT: &str = "%Y-%m-%d";

#[async_trait]
pub trait TodoRepository: Send + Sync {
    async fn list(&self) -> Result<Vec<Todo>, StoreError>;
    async fn get(&self, id: i64) -> Result<Option<Todo>, StoreError>;
    async fn create(&self, item: TodoCreate) -> Result<Todo, StoreError>;
    /// `None` when no item has `id`.
    async fn update(&self, id: i64, changes: TodoUpdate) -> Result<Option<Todo>, StoreError>;
    /// Returns the removed item.
    async fn delete(&self, id: i64) -> Result<Option<Todo>, StoreError>;
}

#[derive(Clone)]
pub struct SqliteTodoStore {
    db: Database,
}

impl SqliteTodoStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

const TODO_COLUMNS: &str = "id, name, surname, email, phone, birthday, is_done, description";

fn row_to_todo(row: &Row<'_>) -> rusqlite::Result<(Todo, String)> {
    let birthday: String = row.get(5)?;
    let todo = Todo {
        id: row.get(0)?,
        name: row.get(1)?,
        surname: row.get(2)?,
        email: row.get(3)?,
        phone: row.get(4)?,
        birthday: NaiveDate::MIN,
        is_done: row.get(6)?,
        description: row.get(7)?,
    };
    Ok((todo, birthday))
}

fn with_birthday((mut todo, raw): (Todo, String)) -> Result<Todo, StoreError> {
    todo.birthday = NaiveDate::parse_from_str(&raw, DATE_FORMAT)
        .map_err(|_| StoreError::Corrupt(format!("todo {} birthday {raw}", todo.id)))?;
    Ok(todo)
}

fn select_one(conn: &Connection, id: i64) -> Result<Option<Todo>, StoreError> {
    conn.query_row(
        &format!("SELECT {TODO_COLUMNS} FROM todos WHERE id = ?1"),
        params![id],
        row_to_todo,
    )
    .optional()?
    .map(with_birthday)
    .transpose()
}

#[async_trait]
impl TodoRepository for SqliteTodoStore {
    async fn list(&self) -> Result<Vec<Todo>, StoreError> {
        self.db
            .call(|conn| {
                let mut stmt =
                    conn.prepare(&format!("SELECT {TODO_COLUMNS} FROM todos ORDER BY id"))?;
                let rows = stmt
                    .query_map([], row_to_todo)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows.into_iter().map(with_birthday).collect()
            })
            .await
    }

    async fn get(&self, id: i64) -> Result<Option<Todo>, StoreError> {
        self.db.call(move |conn| select_one(conn, id)).await
    }

    async fn create(&self, item: TodoCreate) -> Result<Todo, StoreError> {
        self.db
            .call(move |conn| {
                let inserted = conn.execute(
                    "INSERT INTO todos (id, name, surname, email, phone, birthday, is_done, description)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7)",
                    params![
                        item.id,
                        item.name,
                        item.surname,
                        item.email,
                        item.phone,
                        item.birthday.format(DATE_FORMAT).to_string(),
                        item.description,
                    ],
                );
                match inserted {
                    Ok(_) => {}
                    Err(e) if is_constraint_violation(&e) => {
                        return Err(StoreError::Conflict(format!(
                            "todo {}",
                            item.id.unwrap_or_default()
                        )))
                    }
                    Err(e) => return Err(e.into()),
                }

                let id = conn.last_insert_rowid();
                select_one(conn, id)?.ok_or_else(|| StoreError::NotFound(format!("todo {id}")))
            })
            .await
    }

    async fn update(&self, id: i64, changes: TodoUpdate) -> Result<Option<Todo>, StoreError> {
        self.db
            .call(move |conn| {
                let Some(mut todo) = select_one(conn, id)? else {
                    return Ok(None);
                };
                changes.apply(&mut todo);

                conn.execute(
                    "UPDATE todos
                     SET name = ?2, surname = ?3, email = ?4, phone = ?5, birthday = ?6, is_done = ?7, description = ?8
                     WHERE id = ?1",
                    params![
                        todo.id,
                        todo.name,
                        todo.surname,
                        todo.email,
                        todo.phone,
                        todo.birthday.format(DATE_FORMAT).to_string(),
                        todo.is_done,
                        todo.description,
                    ],
                )?;
                Ok(Some(todo))
            })
            .await
    }

    async fn delete(&self, id: i64) -> Result<Option<Todo>, StoreError> {
        self.db
            .call(move |conn| {
                let Some(todo) = select_one(conn, id)? else {
                    return Ok(None);
                };
                conn.execute("DELETE FROM todos WHERE id = ?1", params![id])?;
                Ok(Some(todo))
            })
            .await
    }
}

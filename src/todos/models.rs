//! Todo item models

use crate::auth::models::is_valid_email;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A stored todo item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Todo {
    pub id: i64,
    pub name: String,
    pub surname: String,
    pub email: String,
    pub phone: i64,
    pub birthday: NaiveDate,
    pub is_done: bool,
    pub description: Option<String>,
}

/// Create request body; `id` is assigned by the store when omitted
#[derive(Debug, Clone, Deserialize)]
pub struct TodoCreate {
    #[serde(default)]
    pub id: Option<i64>,
    pub name: String,
    pub surname: String,
    pub email: String,
    pub phone: i64,
    pub birthday: NaiveDate,
    #[serde(default)]
    pub description: Option<String>,
}

/// Partial update body; absent fields are left untouched
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TodoUpdate {
    pub name: Option<String>,
    pub surname: Option<String>,
    pub email: Option<String>,
    pub phone: Option<i64>,
    pub birthday: Option<NaiveDate>,
    pub is_done: Option<bool>,
    pub description: Option<String>,
}

impl TodoCreate {
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name must not be empty".to_string());
        }
        if self.surname.trim().is_empty() {
            return Err("surname must not be empty".to_string());
        }
        if !is_valid_email(&self.email) {
            return Err("email is not a valid address".to_string());
        }
        Ok(())
    }
}

impl TodoUpdate {
    pub fn validate(&self) -> Result<(), String> {
        if self.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err("name must not be empty".to_string());
        }
        if self.surname.as_deref().is_some_and(|s| s.trim().is_empty()) {
            return Err("surname must not be empty".to_string());
        }
        if self.email.as_deref().is_some_and(|e| !is_valid_email(e)) {
            return Err("email is not a valid address".to_string());
        }
        Ok(())
    }

    pub fn apply(self, todo: &mut Todo) {
        if let Some(name) = self.name {
            todo.name = name;
        }
        if let Some(surname) = self.surname {
            todo.surname = surname;
        }
        if let Some(email) = self.email {
            todo.email = email;
        }
        if let Some(phone) = self.phone {
            todo.phone = phone;
        }
        if let Some(birthday) = self.birthday {
            todo.birthday = birthday;
        }
        if let Some(is_done) = self.is_done {
            todo.is_done = is_done;
        }
        if let Some(description) = self.description {
            todo.description = Some(description);
        }
    }
}

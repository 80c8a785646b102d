//! Todo items
//! Mission: Store and serve the todo list behind role checks

pub mod api;
pub mod models;
pub mod store;

pub use models::{Todo, TodoCreate, TodoUpdate};
pub use store::{SqliteTodoStore, TodoRepository};

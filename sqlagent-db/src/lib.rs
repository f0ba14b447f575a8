//! Concrete database backend for the agent: SQLite through `sqlx`.

mod error;
mod sqlite;

pub use error::DatabaseError;
pub use sqlite::{SqliteDatabase, SqliteDatabaseBuilder};

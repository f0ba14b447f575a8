use std::fmt;

use serde::{Deserialize, Serialize};

use crate::SqlError;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => write!(f, "NULL"),
            SqlValue::Integer(value) => write!(f, "{value}"),
            SqlValue::Real(value) => write!(f, "{value:?}"),
            SqlValue::Text(value) => write!(f, "'{}'", value.replace('\'', "''")),
            SqlValue::Blob(bytes) => {
                write!(f, "X'")?;
                for byte in bytes {
                    write!(f, "{byte:02X}")?;
                }
                write!(f, "'")
            }
        }
    }
}

/// Rows returned by one statement.
///
/// `Display` renders the rows as a list of tuples, e.g. `[(42,)]` or
/// `[(1, 'Ada'), (2, NULL)]`; that rendering is what lands in
/// `AgentState::db_result` and in the answer prompt.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<SqlValue>>,
}

impl QueryResult {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<SqlValue>>) -> Self {
        Self { columns, rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl fmt::Display for QueryResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (row_index, row) in self.rows.iter().enumerate() {
            if row_index > 0 {
                write!(f, ", ")?;
            }
            write!(f, "(")?;
            for (col_index, value) in row.iter().enumerate() {
                if col_index > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{value}")?;
            }
            if row.len() == 1 {
                write!(f, ",")?;
            }
            write!(f, ")")?;
        }
        write!(f, "]")
    }
}

/// Describes the queryable tables and columns of the active schema.
#[async_trait::async_trait]
pub trait SchemaProvider: Send + Sync + 'static {
    async fn schema(&self) -> Result<String, SqlError>;
}

/// Runs one statement against the target database.
#[async_trait::async_trait]
pub trait SqlExecutor: Send + Sync + 'static {
    async fn execute(&self, sql: &str) -> Result<QueryResult, SqlError>;
}

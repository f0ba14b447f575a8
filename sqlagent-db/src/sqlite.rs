use std::str::FromStr;

use sqlagent_core::{QueryResult, SchemaProvider, SqlError, SqlExecutor, SqlValue};
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row, Sqlite, SqlitePool, TypeInfo, ValueRef};

use crate::error::{classify, DatabaseError};

const TABLES_SQL: &str = "SELECT name, sql FROM sqlite_master \
    WHERE type = 'table' AND name NOT LIKE 'sqlite_%' AND sql IS NOT NULL ORDER BY name";
const SAMPLE_CELL_CHARS: usize = 100;

/// SQLite database exposed to the agent as schema text and a query runner.
#[derive(Debug, Clone)]
pub struct SqliteDatabase {
    pool: SqlitePool,
    sample_rows: u32,
    include_tables: Vec<String>,
    init_statements: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SqliteDatabaseBuilder {
    database_url: String,
    max_connections: u32,
    sample_rows: u32,
    include_tables: Vec<String>,
    init_statements: Vec<String>,
    create_if_missing: bool,
}

impl SqliteDatabase {
    pub fn builder(database_url: impl Into<String>) -> SqliteDatabaseBuilder {
        SqliteDatabaseBuilder {
            database_url: database_url.into(),
            max_connections: 1,
            sample_rows: 3,
            include_tables: Vec::new(),
            init_statements: Vec::new(),
            create_if_missing: false,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Names of all user tables, sorted.
    pub async fn table_names(&self) -> Result<Vec<String>, DatabaseError> {
        let rows = sqlx::query(TABLES_SQL)
            .fetch_all(&self.pool)
            .await
            .map_err(DatabaseError::Query)?;
        rows.iter()
            .map(|row| row.try_get("name"))
            .collect::<Result<Vec<String>, _>>()
            .map_err(DatabaseError::Query)
    }

    fn is_included(&self, table: &str) -> bool {
        self.include_tables.is_empty() || self.include_tables.iter().any(|name| name == table)
    }

    async fn session(&self) -> Result<PoolConnection<Sqlite>, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        for statement in &self.init_statements {
            sqlx::query(statement.as_str()).execute(&mut *conn).await?;
        }
        Ok(conn)
    }

    async fn describe(&self) -> Result<String, sqlx::Error> {
        let mut conn = self.session().await?;
        let tables = sqlx::query(TABLES_SQL).fetch_all(&mut *conn).await?;

        let mut sections = Vec::new();
        for table in tables {
            let name: String = table.try_get("name")?;
            if !self.is_included(&name) {
                continue;
            }
            let create: String = table.try_get("sql")?;
            let mut section = create.trim().to_string();
            if self.sample_rows > 0 {
                section.push_str(&self.sample_block(&mut conn, &name).await?);
            }
            sections.push(section);
        }
        Ok(sections.join("\n\n"))
    }

    async fn sample_block(
        &self,
        conn: &mut PoolConnection<Sqlite>,
        table: &str,
    ) -> Result<String, sqlx::Error> {
        let quoted = quote_identifier(table);
        let columns = sqlx::query(&format!("PRAGMA table_info({quoted})"))
            .fetch_all(&mut **conn)
            .await?
            .iter()
            .map(|row| row.try_get::<String, _>("name"))
            .collect::<Result<Vec<_>, _>>()?;
        let rows = sqlx::query(&format!(
            "SELECT * FROM {quoted} LIMIT {}",
            self.sample_rows
        ))
        .fetch_all(&mut **conn)
        .await?;

        let mut block = format!(
            "\n\n/*\n{} rows from {table} table:\n{}\n",
            self.sample_rows,
            columns.join("\t")
        );
        for row in &rows {
            let cells = decode_row(row)?
                .iter()
                .map(sample_cell)
                .collect::<Vec<_>>();
            block.push_str(&cells.join("\t"));
            block.push('\n');
        }
        block.push_str("*/");
        Ok(block)
    }

    async fn run(&self, sql: &str) -> Result<QueryResult, sqlx::Error> {
        let mut conn = self.session().await?;
        let rows = sqlx::query(sql).fetch_all(&mut *conn).await?;

        let columns = rows
            .first()
            .map(|row| {
                row.columns()
                    .iter()
                    .map(|column| column.name().to_string())
                    .collect()
            })
            .unwrap_or_default();
        let rows = rows.iter().map(decode_row).collect::<Result<Vec<_>, _>>()?;
        Ok(QueryResult::new(columns, rows))
    }
}

impl SqliteDatabaseBuilder {
    pub fn max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }

    /// Rows shown under each table in the schema text; 0 disables samples.
    pub fn sample_rows(mut self, sample_rows: u32) -> Self {
        self.sample_rows = sample_rows;
        self
    }

    pub fn include_tables<I, T>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.include_tables = tables.into_iter().map(Into::into).collect();
        self
    }

    /// Statements run on the connection before every schema read and query.
    pub fn init_statements<I, T>(mut self, statements: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.init_statements = statements.into_iter().map(Into::into).collect();
        self
    }

    pub fn create_if_missing(mut self, create_if_missing: bool) -> Self {
        self.create_if_missing = create_if_missing;
        self
    }

    pub async fn build(self) -> Result<SqliteDatabase, DatabaseError> {
        let options = SqliteConnectOptions::from_str(&self.database_url)
            .map_err(DatabaseError::Connection)?
            .create_if_missing(self.create_if_missing);
        let pool = SqlitePoolOptions::new()
            .max_connections(self.max_connections.max(1))
            .connect_with(options)
            .await
            .map_err(DatabaseError::Connection)?;

        let database = SqliteDatabase {
            pool,
            sample_rows: self.sample_rows,
            include_tables: self.include_tables,
            init_statements: self.init_statements,
        };

        if !database.include_tables.is_empty() {
            let existing = database.table_names().await?;
            let missing: Vec<String> = database
                .include_tables
                .iter()
                .filter(|name| !existing.contains(name))
                .cloned()
                .collect();
            if !missing.is_empty() {
                return Err(DatabaseError::UnknownTables(missing));
            }
        }

        tracing::debug!(url = %self.database_url, "sqlite database ready");
        Ok(database)
    }
}

#[async_trait::async_trait]
impl SchemaProvider for SqliteDatabase {
    async fn schema(&self) -> Result<String, SqlError> {
        self.describe().await.map_err(classify)
    }
}

#[async_trait::async_trait]
impl SqlExecutor for SqliteDatabase {
    async fn execute(&self, sql: &str) -> Result<QueryResult, SqlError> {
        tracing::debug!(%sql, "executing query");
        self.run(sql).await.map_err(classify)
    }
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn decode_row(row: &SqliteRow) -> Result<Vec<SqlValue>, sqlx::Error> {
    (0..row.len()).map(|index| decode_value(row, index)).collect()
}

// Values are decoded by their runtime storage class, not the declared
// column type, since expressions like COUNT(*) carry no declaration.
fn decode_value(row: &SqliteRow, index: usize) -> Result<SqlValue, sqlx::Error> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(SqlValue::Null);
    }
    let type_name = raw.type_info().name().to_ascii_uppercase();
    let value = match type_name.as_str() {
        "INTEGER" | "BIGINT" | "INT8" | "BOOLEAN" => {
            SqlValue::Integer(row.try_get_unchecked::<i64, _>(index)?)
        }
        "REAL" | "FLOAT" | "DOUBLE" | "NUMERIC" => {
            SqlValue::Real(row.try_get_unchecked::<f64, _>(index)?)
        }
        "BLOB" => SqlValue::Blob(row.try_get_unchecked::<Vec<u8>, _>(index)?),
        _ => SqlValue::Text(row.try_get_unchecked::<String, _>(index)?),
    };
    Ok(value)
}

fn sample_cell(value: &SqlValue) -> String {
    match value {
        SqlValue::Text(text) => text.chars().take(SAMPLE_CELL_CHARS).collect(),
        SqlValue::Blob(bytes) => format!("<{} bytes>", bytes.len()),
        other => other.to_string(),
    }
}

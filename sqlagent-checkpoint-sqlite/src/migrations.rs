use sqlx::SqlitePool;

use crate::error::CheckpointSqlError;
use crate::schema::MIGRATION_STATEMENTS_SQL;

pub async fn run_migrations(pool: &SqlitePool) -> Result<(), CheckpointSqlError> {
    for statement in MIGRATION_STATEMENTS_SQL {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(CheckpointSqlError::Migration)?;
    }

    Ok(())
}

/// Schema creation for the message table
use tracing::{error, info};

use super::{DatabaseError, DatabaseResult, DbConnection};

/// Ordered schema statements; each one is safe to run against an existing schema
const SCHEMA: &[(&str, &str)] = &[
    (
        "create messages table",
        r#"
        CREATE TABLE IF NOT EXISTS messages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            topic TEXT NOT NULL,
            message TEXT NOT NULL
        )
        "#,
    ),
    (
        "index messages by topic",
        "CREATE INDEX IF NOT EXISTS idx_messages_topic ON messages (topic, id)",
    ),
];

/// Create the backing table if absent and return the number of statements applied
pub async fn run_migrations(conn: &mut DbConnection) -> DatabaseResult<usize> {
    info!("Running database migrations...");

    for (description, statement) in SCHEMA {
        sqlx::query(statement)
            .execute(&mut *conn)
            .await
            .map_err(|e| {
                error!("Migration '{}' failed: {}", description, e);
                DatabaseError::Migration(format!("{}: {}", description, e))
            })?;
    }

    info!("Database migrations completed successfully");
    Ok(SCHEMA.len())
}

/// Check if a table exists in the database
pub async fn table_exists(conn: &mut DbConnection, table_name: &str) -> DatabaseResult<bool> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
    )
    .bind(table_name)
    .fetch_one(&mut *conn)
    .await?;

    Ok(count > 0)
}

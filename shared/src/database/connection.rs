use std::str::FromStr;
use std::time::Duration;

use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteConnection},
    Connection,
};
use tracing::{debug, error, info};

use super::{DatabaseConfig, DatabaseError, DatabaseResult};

/// Type alias for the long-lived database connection
pub type DbConnection = SqliteConnection;

/// Open the single database connection used for the lifetime of the process
pub async fn open_connection(config: &DatabaseConfig) -> DatabaseResult<DbConnection> {
    info!("Opening database connection...");
    debug!("Database config: url={}", config.url);

    let options = SqliteConnectOptions::from_str(&config.url)
        .map_err(|e| DatabaseError::Config(format!("Invalid database URL {}: {}", config.url, e)))?
        .create_if_missing(config.create_if_missing)
        .busy_timeout(Duration::from_secs(config.busy_timeout_seconds));

    let conn = SqliteConnection::connect_with(&options).await.map_err(|e| {
        error!("Failed to open database {}: {}", config.url, e);
        DatabaseError::Connection(e)
    })?;

    info!("Database connection opened: {}", config.url);
    Ok(conn)
}

/// Test database connection
pub async fn test_connection(conn: &mut DbConnection) -> DatabaseResult<()> {
    let row: (i64,) = sqlx::query_as("SELECT 1")
        .fetch_one(&mut *conn)
        .await
        .map_err(DatabaseError::Connection)?;

    if row.0 != 1 {
        return Err(DatabaseError::Config(
            "Unexpected result from connection test".to_string(),
        ));
    }

    Ok(())
}

/// Close the database connection gracefully
pub async fn close_connection(conn: DbConnection) -> DatabaseResult<()> {
    info!("Closing database connection...");
    conn.close().await.map_err(DatabaseError::Connection)?;
    info!("Database connection closed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_in_memory_connection() {
        let mut conn = open_connection(&DatabaseConfig::in_memory()).await.unwrap();
        test_connection(&mut conn).await.unwrap();
        close_connection(conn).await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_file_without_create_fails() {
        let dir = tempfile::tempdir().unwrap();
        let config = DatabaseConfig {
            url: format!("sqlite://{}", dir.path().join("absent.db").display()),
            create_if_missing: false,
            ..Default::default()
        };

        let result = open_connection(&config).await;
        assert!(matches!(result, Err(DatabaseError::Connection(_))));
    }
}

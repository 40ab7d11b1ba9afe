pub mod connection;
pub mod migrations;

pub use connection::{close_connection, open_connection, test_connection, DbConnection};
pub use migrations::run_migrations;

// Database configuration structure
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// SQLite connection string, e.g. `sqlite://messages.db` or `sqlite::memory:`
    pub url: String,
    /// Create the database file when it does not exist yet
    pub create_if_missing: bool,
    /// How long a statement waits on a locked database file before failing
    pub busy_timeout_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://messages.db".to_string(),
            create_if_missing: true,
            busy_timeout_seconds: 5,
        }
    }
}

impl DatabaseConfig {
    /// Configuration for a private in-memory database, used by tests
    pub fn in_memory() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
            ..Default::default()
        }
    }
}

// Error types for database operations
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    Connection(#[source] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Query error: {0}")]
    Query(#[from] sqlx::Error),
}

pub type DatabaseResult<T> = Result<T, DatabaseError>;

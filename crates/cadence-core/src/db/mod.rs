//! SQLite database layer for the Cadence engine.
//!
//! Uses rusqlite with WAL mode for concurrent read performance.
//! All database operations are executed via `tokio::task::spawn_blocking`
//! to avoid blocking the async runtime.

use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::error::EngineError;

/// Thread-safe handle to the SQLite database.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) a SQLite database at the given path.
    pub fn open(db_path: &str) -> Result<Self, EngineError> {
        let path = Path::new(db_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let conn = Connection::open(db_path)
            .map_err(|e| EngineError::Database(format!("Failed to open database: {}", e)))?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .map_err(|e| EngineError::Database(format!("Failed to set pragmas: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.initialize_tables()?;

        tracing::info!("SQLite database opened at: {}", db_path);
        Ok(db)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self, EngineError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| EngineError::Database(format!("Failed to open in-memory db: {}", e)))?;

        conn.execute_batch("PRAGMA foreign_keys=ON;")
            .map_err(|e| EngineError::Database(format!("Failed to set pragmas: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.initialize_tables()?;
        Ok(db)
    }

    /// Execute a closure with access to the database connection.
    /// Automatically handles locking and error conversion.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, EngineError>
    where
        F: FnOnce(&Connection) -> Result<T, rusqlite::Error>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| EngineError::Database(format!("Lock poisoned: {}", e)))?;
        f(&conn).map_err(|e| EngineError::Database(e.to_string()))
    }

    /// Execute a closure with access to the database connection (async-friendly).
    pub async fn with_conn_async<F, T>(&self, f: F) -> Result<T, EngineError>
    where
        F: FnOnce(&Connection) -> Result<T, rusqlite::Error> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || db.with_conn(f))
            .await
            .map_err(|e| EngineError::Database(format!("Task join error: {}", e)))?
    }

    /// Create all tables if they don't exist.
    fn initialize_tables(&self) -> Result<(), EngineError> {
        self.with_conn(|conn| {
            conn.execute_batch(
                "
                CREATE TABLE IF NOT EXISTS sequence_executions (
                    id                  TEXT PRIMARY KEY,
                    sequence_key        TEXT NOT NULL,
                    organization_id     TEXT NOT NULL,
                    user_id             TEXT NOT NULL,
                    status              TEXT NOT NULL DEFAULT 'pending',
                    input_context       TEXT NOT NULL DEFAULT '{}',
                    is_simulation       INTEGER NOT NULL DEFAULT 0,
                    mock_data_used      TEXT,
                    step_results        TEXT NOT NULL DEFAULT '[]',
                    final_output        TEXT,
                    error_message       TEXT,
                    failed_step_index   INTEGER,
                    hitl_request_id     TEXT,
                    created_at          INTEGER NOT NULL,
                    completed_at        INTEGER
                );
                CREATE INDEX IF NOT EXISTS idx_executions_org ON sequence_executions(organization_id);
                CREATE INDEX IF NOT EXISTS idx_executions_status ON sequence_executions(status);

                CREATE TABLE IF NOT EXISTS hitl_requests (
                    id                  TEXT PRIMARY KEY,
                    execution_id        TEXT NOT NULL REFERENCES sequence_executions(id) ON DELETE CASCADE,
                    sequence_key        TEXT NOT NULL,
                    step_index          INTEGER NOT NULL,
                    position            TEXT NOT NULL DEFAULT 'before',
                    prompt              TEXT NOT NULL,
                    request_type        TEXT NOT NULL DEFAULT 'approval',
                    options             TEXT NOT NULL DEFAULT '[]',
                    default_value       TEXT,
                    status              TEXT NOT NULL DEFAULT 'pending',
                    response            TEXT,
                    execution_context   TEXT NOT NULL DEFAULT '{}',
                    expires_at          INTEGER NOT NULL,
                    created_at          INTEGER NOT NULL,
                    resolved_at         INTEGER
                );
                CREATE INDEX IF NOT EXISTS idx_hitl_execution ON hitl_requests(execution_id);
                CREATE INDEX IF NOT EXISTS idx_hitl_status ON hitl_requests(status);

                CREATE TABLE IF NOT EXISTS chat_messages (
                    id                  TEXT PRIMARY KEY,
                    conversation_id     TEXT NOT NULL,
                    role                TEXT NOT NULL,
                    content             TEXT NOT NULL,
                    tool_calls          TEXT NOT NULL DEFAULT '[]',
                    structured_response TEXT,
                    timestamp           INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_messages_conversation ON chat_messages(conversation_id);
                ",
            )
        })
    }
}

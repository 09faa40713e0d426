use rusqlite::Connection;
use std::path::Path;
use tokio::task;
use crate::error::{Result, TriplegraphError};

pub mod migrate;

/// Database connection wrapper for the embedded graph store
#[derive(Debug, Clone)]
pub struct Db {
    path: std::path::PathBuf,
}

/// WAL for concurrent readers during writes, foreign keys so relations can't
/// outlive their entities.
fn configure(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL; \
         PRAGMA synchronous = NORMAL; \
         PRAGMA foreign_keys = ON; \
         PRAGMA temp_store = MEMORY; \
         PRAGMA busy_timeout = 5000;"
    )?;
    Ok(())
}

impl Db {
    /// Create a new database connection manager
    pub fn new<P: AsRef<Path>>(db_path: P) -> Self {
        Self {
            path: db_path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open a new database connection with pragmas applied
    pub fn open_connection(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path)
            .map_err(TriplegraphError::Database)?;
        configure(&conn)?;
        Ok(conn)
    }

    /// Execute a closure with a database connection in a blocking task
    pub async fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.clone();
        task::spawn_blocking(move || {
            let mut conn = db.open_connection()?;
            f(&mut conn)
        })
        .await
        .map_err(|e| {
            TriplegraphError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("Database task failed: {}", e),
            ))
        })?
    }
}

mod credentials;

use crate::{DriveError, Result};
use directories::ProjectDirs;
use rusqlite::Connection;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

pub use credentials::{build_record, load_credentials, upsert_credentials, CredentialRecord};

pub(crate) const QUALIFIER: &str = "com";
pub(crate) const ORGANIZATION: &str = "alidrive";
pub(crate) const APPLICATION: &str = "alidrive-uploader";
const DB_FILE_NAME: &str = "credentials.db";

pub(crate) fn with_connection<T, F>(path: &Path, operation: F) -> Result<T>
where
    F: FnOnce(&Connection) -> Result<T>,
{
    let conn = open_connection(path)?;
    operation(&conn)
}

fn open_connection(path: &Path) -> Result<Connection> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(|e| {
            DriveError::Storage(format!("failed to create database directory {dir:?}: {e}"))
        })?;
    }

    let conn = Connection::open(path)
        .map_err(|e| DriveError::Storage(format!("failed to open SQLite database: {e}")))?;
    apply_migrations(&conn)?;
    Ok(conn)
}

fn apply_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(credentials::CREDENTIALS_TABLE_SCHEMA)
        .map_err(|e| DriveError::Storage(format!("failed to initialize database schema: {e}")))?;
    Ok(())
}

/// 应用数据目录下的默认数据库位置。
pub fn default_database_path() -> Result<PathBuf> {
    let dirs = ProjectDirs::from(QUALIFIER, ORGANIZATION, APPLICATION).ok_or_else(|| {
        DriveError::Storage("failed to resolve application data directory".to_string())
    })?;
    Ok(dirs.data_dir().join(DB_FILE_NAME))
}

pub(crate) fn current_timestamp_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis() as i64)
        .unwrap_or(0)
}

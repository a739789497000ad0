use rusqlite::{params, OptionalExtension};
use std::path::Path;

use super::{current_timestamp_millis, with_connection};
use crate::{DriveError, Result};

/// 刷新后的令牌按 drive_id 落库，下次启动优先于配置文件中的 refresh token。
pub(crate) const CREDENTIALS_TABLE_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS drive_credentials (
    drive_id TEXT PRIMARY KEY,
    refresh_token TEXT NOT NULL,
    access_token TEXT NOT NULL,
    updated_at_millis INTEGER NOT NULL
);";

#[derive(Debug, Clone)]
pub struct CredentialRecord {
    pub drive_id: String,
    pub refresh_token: String,
    pub access_token: String,
    pub updated_at_millis: i64,
}

pub fn upsert_credentials(path: &Path, record: &CredentialRecord) -> Result<()> {
    with_connection(path, |conn| {
        conn.execute(
            "INSERT INTO drive_credentials (
                drive_id,
                refresh_token,
                access_token,
                updated_at_millis
            )
            VALUES (?, ?, ?, ?)
            ON CONFLICT(drive_id) DO UPDATE SET
                refresh_token = excluded.refresh_token,
                access_token = excluded.access_token,
                updated_at_millis = excluded.updated_at_millis",
            params![
                record.drive_id,
                record.refresh_token,
                record.access_token,
                record.updated_at_millis,
            ],
        )
        .map_err(|e| DriveError::Storage(format!("failed to upsert credentials: {e}")))?;
        Ok(())
    })
}

pub fn load_credentials(path: &Path, drive_id: &str) -> Result<Option<CredentialRecord>> {
    with_connection(path, |conn| {
        conn.query_row(
            "SELECT
                drive_id,
                refresh_token,
                access_token,
                updated_at_millis
            FROM drive_credentials
            WHERE drive_id = ?",
            params![drive_id],
            |row| {
                Ok(CredentialRecord {
                    drive_id: row.get(0)?,
                    refresh_token: row.get(1)?,
                    access_token: row.get(2)?,
                    updated_at_millis: row.get(3)?,
                })
            },
        )
        .optional()
        .map_err(|e| DriveError::Storage(format!("failed to read credentials: {e}")))
    })
}

pub fn build_record(
    drive_id: String,
    refresh_token: String,
    access_token: String,
) -> CredentialRecord {
    CredentialRecord {
        drive_id,
        refresh_token,
        access_token,
        updated_at_millis: current_timestamp_millis(),
    }
}

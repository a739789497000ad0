//! 云盘上传客户端：预哈希探测、秒传、分片上传与令牌/地址过期恢复。

pub mod api;
pub mod db;
mod error;
pub mod settings;
pub mod upload_manager;

pub use api::auth::{CredentialStore, SqliteCredentialStore};
pub use api::drive::{DriveClient, DriveInstance, FileStream, UploadOutcome};
pub use error::{DriveError, Result};

use crate::api::drive::models::DriveInstance;
use crate::db::{self, CredentialRecord};
use crate::{DriveError, Result};
use std::path::PathBuf;

/// 令牌刷新后的持久化钩子。失败意味着磁盘上的凭据已过期，
/// 调用方不得在此之后继续上传。
pub trait CredentialStore: Send + Sync {
    fn persist(&self, instance: &DriveInstance) -> Result<()>;
}

/// 默认的 SQLite 实现，按 drive_id 保存最新的令牌对。
pub struct SqliteCredentialStore {
    path: PathBuf,
}

impl SqliteCredentialStore {
    pub fn new(path: PathBuf) -> Self {
        SqliteCredentialStore { path }
    }

    /// 使用应用数据目录下的默认数据库。
    pub fn open_default() -> Result<Self> {
        Ok(Self::new(db::default_database_path()?))
    }

    /// 读取指定云盘最近一次保存的凭据。
    pub fn load(&self, drive_id: &str) -> Result<Option<CredentialRecord>> {
        db::load_credentials(&self.path, drive_id)
    }
}

impl CredentialStore for SqliteCredentialStore {
    fn persist(&self, instance: &DriveInstance) -> Result<()> {
        let record = db::build_record(
            instance.drive_id.clone(),
            instance.refresh_token.clone(),
            instance.access_token.clone(),
        );
        db::upsert_credentials(&self.path, &record).map_err(|err| match err {
            DriveError::Storage(message) => DriveError::Persist(message),
            other => other,
        })
    }
}

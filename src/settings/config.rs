use crate::api::drive::DriveInstance;
use crate::db::{CredentialRecord, APPLICATION, ORGANIZATION, QUALIFIER};
use crate::{DriveError, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use url::Url;

pub const MIN_TRANSFERS: usize = 1;
pub const MAX_TRANSFERS: usize = 8;
const DEFAULT_TRANSFERS: usize = 1;
pub const DEFAULT_ROOT_FOLDER_ID: &str = "root";
const CONFIG_FILE_NAME: &str = "config.json";

/// 配置文件结构，字段与 JSON 键一一对应。
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub debug: bool,
    /// 外层多文件驱动的并发上限；本程序按顺序上传，仅做校验与记录。
    #[serde(default = "default_transfers")]
    pub transfers: usize,
    /// 所有请求目标都会加上该前缀。
    #[serde(default)]
    pub proxy: String,
    pub ali_drive: AliDriveConfig,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AliDriveConfig {
    pub drive_id: String,
    pub refresh_token: String,
    /// 远程根目录的 folder id。
    #[serde(default = "default_root_path")]
    pub root_path: String,
}

fn default_transfers() -> usize {
    DEFAULT_TRANSFERS
}

fn default_root_path() -> String {
    DEFAULT_ROOT_FOLDER_ID.to_string()
}

impl Config {
    /// 读取并校验配置文件。
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| {
            DriveError::Config(format!("failed to read config {}: {e}", path.display()))
        })?;
        let config: Config = serde_json::from_str(&raw).map_err(|e| {
            DriveError::Config(format!("failed to parse config {}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// 用户配置目录下的默认配置文件。
    pub fn default_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from(QUALIFIER, ORGANIZATION, APPLICATION).ok_or_else(|| {
            DriveError::Config("failed to resolve application config directory".to_string())
        })?;
        Ok(dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    pub fn validate(&self) -> Result<()> {
        if self.ali_drive.drive_id.trim().is_empty() {
            return Err(DriveError::Config("ali_drive.drive_id is required".to_string()));
        }
        if self.ali_drive.refresh_token.trim().is_empty() {
            return Err(DriveError::Config(
                "ali_drive.refresh_token is required".to_string(),
            ));
        }
        if !self.proxy.trim().is_empty() {
            Url::parse(self.proxy.trim())
                .map_err(|e| DriveError::Config(format!("invalid proxy url: {e}")))?;
        }
        Ok(())
    }

    /// 并发数限定在 [MIN, MAX] 区间。
    pub fn transfers(&self) -> usize {
        self.transfers.clamp(MIN_TRANSFERS, MAX_TRANSFERS)
    }

    /// 组装运行时实例；数据库里保存的新 refresh token 优先于配置文件。
    pub fn to_instance(&self, stored: Option<CredentialRecord>) -> DriveInstance {
        let (refresh_token, access_token) = match stored {
            Some(record) if record.drive_id == self.ali_drive.drive_id => {
                (record.refresh_token, record.access_token)
            }
            _ => (self.ali_drive.refresh_token.clone(), String::new()),
        };
        let root_folder_id = if self.ali_drive.root_path.trim().is_empty() {
            DEFAULT_ROOT_FOLDER_ID.to_string()
        } else {
            self.ali_drive.root_path.trim().to_string()
        };
        DriveInstance {
            drive_id: self.ali_drive.drive_id.clone(),
            refresh_token,
            access_token,
            root_folder_id,
            proxy: Some(self.proxy.clone()).filter(|p| !p.trim().is_empty()),
        }
    }
}

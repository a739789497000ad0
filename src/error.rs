//! 云盘客户端、token 管理与本地存储共用的错误类型。

use crate::api::drive::ACCESS_TOKEN_INVALID;
use thiserror::Error;

/// 上传、目录解析或 token 刷新可能遇到的所有失败。
#[derive(Debug, Error)]
pub enum DriveError {
    /// 网络层失败，核心流程不重试。
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// 本地文件读取失败。
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// token 接口拒绝了保存的 refresh token。
    #[error("token refresh failed: {0}")]
    AuthRefreshFailed(String),

    /// 会话无法重新认证。
    #[error("access token expired and could not be renewed: {0}")]
    AuthExpired(String),

    /// 服务端返回了无法恢复的错误码。
    #[error("remote rejected request ({code}): {message}")]
    RemoteRejected { code: String, message: String },

    /// 服务端分片列表与本地计算的分片数不一致。
    #[error("inconsistent upload session: expected {expected} parts, server returned {actual}")]
    InconsistentSession { expected: u64, actual: usize },

    /// 完成接口返回了不同的 file id。
    #[error("upload completion mismatch: expected file id {expected:?}, got {actual:?}")]
    CompletionMismatch { expected: String, actual: String },

    /// 目录创建失败；parent_id 是最后一个已解析的父目录。
    #[error("failed to create folder under {parent_id}: {message}")]
    FolderCreateFailed {
        parent_id: String,
        code: String,
        message: String,
    },

    /// 分片反复失败且没有可用的恢复手段。
    #[error("part {part_number} rejected with HTTP {status} ({code}): {message}")]
    PartRejected {
        part_number: u64,
        status: u16,
        code: String,
        message: String,
    },

    /// 刷新后的凭据无法写回。
    #[error("failed to persist credentials: {0}")]
    Persist(String),

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl DriveError {
    /// 出现后同一进程内不应再继续任何上传。
    pub fn is_fatal(&self) -> bool {
        matches!(self, DriveError::Persist(_))
    }

    /// 目录创建因 access token 失效被拒绝，刷新后可以重试。
    pub fn is_access_token_invalid(&self) -> bool {
        matches!(self, DriveError::FolderCreateFailed { code, .. } if code == ACCESS_TOKEN_INVALID)
    }
}

pub type Result<T> = std::result::Result<T, DriveError>;

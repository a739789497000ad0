use serde::{Deserialize, Serialize};
use std::fmt;

/// 一个云盘账号的运行时凭据与根目录信息。
/// 刷新 token 后原地更新，调用方负责持久化。
#[derive(Clone, Default)]
pub struct DriveInstance {
    pub drive_id: String,
    pub refresh_token: String,
    pub access_token: String,
    pub root_folder_id: String,
    pub proxy: Option<String>,
}

impl fmt::Debug for DriveInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriveInstance")
            .field("drive_id", &self.drive_id)
            .field("refresh_token", &redact(&self.refresh_token))
            .field("access_token", &redact(&self.access_token))
            .field("root_folder_id", &self.root_folder_id)
            .field("proxy", &self.proxy)
            .finish()
    }
}

fn redact(token: &str) -> &'static str {
    if token.is_empty() {
        "<empty>"
    } else {
        "<redacted>"
    }
}

/// 分片描述：part_number 从 1 开始，upload_url 由服务端下发，可能中途被替换。
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartInfo {
    pub part_number: u64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub upload_url: String,
}

/// 服务端统一的错误体；code 为空代表成功。
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct ApiError {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }
}

/// 分片 PUT 返回 403 时使用的 XML 错误文档。
#[derive(Debug, Default, Deserialize)]
#[serde(rename = "Error")]
pub(crate) struct ObjectStoreError {
    #[serde(rename = "Code", default)]
    pub code: String,
    #[serde(rename = "Message", default)]
    pub message: String,
}

impl From<ObjectStoreError> for ApiError {
    fn from(value: ObjectStoreError) -> Self {
        ApiError {
            code: value.code,
            message: value.message,
        }
    }
}

/// 每次远程调用的结果：要么是成功的载荷，要么是填充了的 ApiError。
#[derive(Debug)]
pub enum Reply<T> {
    Success(T),
    Failure(ApiError),
}

impl<T> Reply<T> {
    /// 把失败折叠为 RemoteRejected，适用于没有本地恢复手段的调用。
    pub fn into_result(self) -> crate::Result<T> {
        match self {
            Reply::Success(value) => Ok(value),
            Reply::Failure(err) => Err(crate::DriveError::RemoteRejected {
                code: err.code,
                message: err.message,
            }),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct TokenResponse {
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct CreateWithFoldersResponse {
    #[serde(default)]
    pub file_id: String,
    #[serde(default)]
    pub upload_id: String,
    #[serde(default)]
    pub rapid_upload: bool,
    #[serde(default)]
    pub part_info_list: Vec<PartInfo>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct GetUploadUrlResponse {
    #[serde(default)]
    pub part_info_list: Vec<PartInfo>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct CompleteResponse {
    #[serde(default)]
    pub file_id: String,
}

/// 上传结束后的结果，区分秒传与真实分片传输。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UploadOutcome {
    Rapid { file_id: String },
    Transferred { file_id: String, parts: u64 },
}

impl UploadOutcome {
    pub fn file_id(&self) -> &str {
        match self {
            UploadOutcome::Rapid { file_id } | UploadOutcome::Transferred { file_id, .. } => {
                file_id
            }
        }
    }
}

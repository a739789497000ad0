mod client;
mod folders;
pub mod models;
pub mod progress;
pub mod proof;
mod upload;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{DriveClient, RawResponse, ReqwestTransport, Transport, DEFAULT_TIMEOUT};
pub use models::{ApiError, DriveInstance, PartInfo, Reply, UploadOutcome};
pub use progress::{format_file_size, ProgressEvent, ProgressSink};
pub use proof::{FileProofProvider, ProofCode, ProofProvider};
pub use upload::{
    part_count, FileStream, ReadSeek, MAX_AUTH_REFRESHES, MAX_SESSION_ATTEMPTS,
    MAX_UNRECOGNIZED_PART_RETRIES, MAX_URL_RENEWALS,
};

pub(crate) const API_BASE: &str = "https://api.aliyundrive.com";
pub(crate) const AUTH_BASE: &str = "https://auth.aliyundrive.com";
pub(crate) const CREATE_WITH_FOLDERS_PATH: &str = "adrive/v2/file/createWithFolders";
/// access token 失效时服务端返回的错误码。
pub(crate) const ACCESS_TOKEN_INVALID: &str = "AccessTokenInvalid";

/// 分片大小固定为 10MB。
pub const CHUNK_SIZE: u64 = 10 * 1024 * 1024;

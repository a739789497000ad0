use super::{
    client::{DriveClient, RawResponse},
    models::{
        ApiError, CompleteResponse, CreateWithFoldersResponse, GetUploadUrlResponse,
        ObjectStoreError, PartInfo, Reply, UploadOutcome,
    },
    progress::{format_file_size, Milestones, ProgressEvent, ProgressSink},
    proof::pre_hash,
    ACCESS_TOKEN_INVALID, API_BASE, CREATE_WITH_FOLDERS_PATH,
};
use crate::{DriveError, Result};
use serde_json::{json, Map, Value};
use std::fs::File;
use std::io::{Cursor, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

const GET_UPLOAD_URL_PATH: &str = "v2/file/get_upload_url";
const COMPLETE_PATH: &str = "v2/file/complete";

const PRE_HASH_MATCHED: &str = "PreHashMatched";
/// 分片地址过期时对象存储返回的 Message。
const REQUEST_EXPIRED: &str = "Request has expired.";

/// 会话创建阶段因 token 失效而重新开始的最大次数。
pub const MAX_SESSION_ATTEMPTS: u32 = 3;
/// 分片传输中没有任何进展时允许的连续刷新次数。
pub const MAX_AUTH_REFRESHES: u32 = 3;
/// 无法识别的分片失败（非 403 或未知 403）对同一分片的重试次数。
pub const MAX_UNRECOGNIZED_PART_RETRIES: u32 = 3;
/// 同一分片连续遇到地址过期时允许续签的次数。
pub const MAX_URL_RENEWALS: u32 = 3;

/// 可读可定位的本地数据源。
pub trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

/// 单个待上传文件。读取位置只由上传流程使用，进入分片阶段前会重置到开头。
pub struct FileStream {
    pub name: String,
    pub size: u64,
    pub parent_id: String,
    /// 交给秒传校验器自行读取的本地路径。
    pub local_path: PathBuf,
    pub source: Box<dyn ReadSeek>,
    pub progress: Option<Arc<dyn ProgressSink>>,
}

impl FileStream {
    pub fn new(
        name: impl Into<String>,
        size: u64,
        parent_id: impl Into<String>,
        local_path: impl Into<PathBuf>,
        source: Box<dyn ReadSeek>,
    ) -> Self {
        Self {
            name: name.into(),
            size,
            parent_id: parent_id.into(),
            local_path: local_path.into(),
            source,
            progress: None,
        }
    }

    /// 打开本地文件，名称取自文件名，大小取自元数据。
    pub fn open(path: &Path, parent_id: impl Into<String>) -> Result<Self> {
        let file = File::open(path)?;
        let size = file.metadata()?.len();
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| DriveError::Config(format!("{} has no file name", path.display())))?;
        Ok(Self::new(name, size, parent_id, path, Box::new(file)))
    }

    pub fn with_progress(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress = Some(sink);
        self
    }
}

/// 服务端上传会话，只在一次 upload 调用内存在。
#[derive(Debug, Default)]
struct UploadSession {
    file_id: String,
    upload_id: String,
    parts: Vec<PartInfo>,
}

impl From<CreateWithFoldersResponse> for UploadSession {
    fn from(value: CreateWithFoldersResponse) -> Self {
        UploadSession {
            file_id: value.file_id,
            upload_id: value.upload_id,
            parts: value.part_info_list,
        }
    }
}

enum SessionStart {
    Ready(UploadSession),
    Rapid(String),
    TokenRejected,
}

enum PartOutcome {
    Advance,
    RetryAfterRefresh,
    RetryAfterRenewal(ApiError),
    RetryUnrecognized { status: u16, error: ApiError },
}

/// 分片数：ceil(size / chunk)，空文件也至少一个分片。
pub fn part_count(size: u64, chunk_size: u64) -> u64 {
    size.div_ceil(chunk_size).max(1)
}

fn part_len(size: u64, chunk_size: u64, index: u64) -> u64 {
    size.saturating_sub(index * chunk_size).min(chunk_size)
}

fn remote_rejected(err: ApiError) -> DriveError {
    DriveError::RemoteRejected {
        code: err.code,
        message: err.message,
    }
}

impl DriveClient {
    /// 上传单个文件：预哈希探测、秒传、分片传输与完成确认。
    /// 只有服务端确认完成（含秒传）才返回 Ok。
    pub fn upload(&mut self, file: &mut FileStream) -> Result<UploadOutcome> {
        let total = part_count(file.size, self.chunk_size);

        let mut attempt = 0;
        let mut session = loop {
            attempt += 1;
            match self.open_session(file, total)? {
                SessionStart::Ready(session) => break session,
                SessionStart::Rapid(file_id) => {
                    tracing::info!(file = %file.name, "rapid upload succeeded");
                    return Ok(UploadOutcome::Rapid { file_id });
                }
                SessionStart::TokenRejected => {
                    if attempt >= MAX_SESSION_ATTEMPTS {
                        return Err(DriveError::AuthExpired(format!(
                            "access token rejected {attempt} times while creating upload session"
                        )));
                    }
                    tracing::debug!(file = %file.name, attempt, "access token invalid, refreshing");
                    self.refresh_token().map_err(|err| {
                        if err.is_fatal() {
                            err
                        } else {
                            DriveError::AuthExpired(err.to_string())
                        }
                    })?;
                }
            }
        };

        if session.parts.len() as u64 != total {
            return Err(DriveError::InconsistentSession {
                expected: total,
                actual: session.parts.len(),
            });
        }
        file.source.seek(SeekFrom::Start(0))?;

        self.transfer_parts(file, &mut session, total)?;
        self.complete(&session)?;
        tracing::info!(file = %file.name, parts = total, "upload completed");
        Ok(UploadOutcome::Transferred {
            file_id: session.file_id,
            parts: total,
        })
    }

    fn session_body(&self, file: &FileStream, total: u64) -> Map<String, Value> {
        let part_info_list: Vec<PartInfo> = (1..=total)
            .map(|part_number| PartInfo {
                part_number,
                upload_url: String::new(),
            })
            .collect();
        let mut body = Map::new();
        body.insert("drive_id".into(), json!(self.instance.drive_id));
        body.insert("part_info_list".into(), json!(part_info_list));
        body.insert("parent_file_id".into(), json!(file.parent_id));
        body.insert("name".into(), json!(file.name));
        body.insert("type".into(), json!("file"));
        body.insert("check_name_mode".into(), json!("overwrite"));
        body.insert("size".into(), json!(file.size));
        body
    }

    fn open_session(&self, file: &mut FileStream, total: u64) -> Result<SessionStart> {
        file.source.seek(SeekFrom::Start(0))?;
        let hash = pre_hash(&mut file.source)?;

        let mut body = self.session_body(file, total);
        body.insert("pre_hash".into(), json!(hash));
        let url = format!("{API_BASE}/{CREATE_WITH_FOLDERS_PATH}");
        let reply: Reply<CreateWithFoldersResponse> = self.post(&url, &Value::Object(body))?;

        match reply {
            Reply::Success(created) => Ok(SessionStart::Ready(created.into())),
            Reply::Failure(err) if err.code == ACCESS_TOKEN_INVALID => Ok(SessionStart::TokenRejected),
            Reply::Failure(err) if err.code == PRE_HASH_MATCHED => self.try_rapid_upload(file, total),
            Reply::Failure(err) => Err(remote_rejected(err)),
        }
    }

    fn try_rapid_upload(&self, file: &FileStream, total: u64) -> Result<SessionStart> {
        tracing::debug!(file = %file.name, "pre-hash matched, trying rapid upload");
        let proof = self
            .proof
            .compute_proof(&self.instance.access_token, &file.local_path)?;

        let mut body = self.session_body(file, total);
        body.insert("content_hash_name".into(), json!("sha1"));
        body.insert("content_hash".into(), json!(proof.content_hash));
        body.insert("proof_code".into(), json!(proof.proof_code));
        body.insert("proof_version".into(), json!("v1"));
        let url = format!("{API_BASE}/{CREATE_WITH_FOLDERS_PATH}");
        let reply: Reply<CreateWithFoldersResponse> = self.post(&url, &Value::Object(body))?;

        match reply {
            Reply::Success(created) if created.rapid_upload => Ok(SessionStart::Rapid(created.file_id)),
            Reply::Success(created) => Ok(SessionStart::Ready(created.into())),
            // 仍然只匹配预哈希：没有分片地址可用，交给分片数校验处理
            Reply::Failure(err) if err.code == PRE_HASH_MATCHED => {
                Ok(SessionStart::Ready(UploadSession::default()))
            }
            Reply::Failure(err) => Err(remote_rejected(err)),
        }
    }

    fn transfer_parts(
        &mut self,
        file: &mut FileStream,
        session: &mut UploadSession,
        total: u64,
    ) -> Result<()> {
        let mut milestones = Milestones::new();
        let mut index: u64 = 0;
        let mut refreshes = 0;
        let mut unrecognized = 0;
        let mut renewals = 0;

        while index < total {
            let started = Instant::now();
            let len = part_len(file.size, self.chunk_size, index);
            // 重试同一分片时必须重新读取同一段字节
            file.source.seek(SeekFrom::Start(index * self.chunk_size))?;
            let mut chunk = Vec::with_capacity(len as usize);
            (&mut file.source).take(len).read_to_end(&mut chunk)?;
            if chunk.len() as u64 != len {
                return Err(DriveError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!("{} shrank during upload", file.name),
                )));
            }

            let upload_url = session.parts[index as usize].upload_url.clone();
            let response = self.put_part(&upload_url, Box::new(Cursor::new(chunk)), len)?;
            let part_number = index + 1;

            match classify_part_response(&response) {
                PartOutcome::Advance => {
                    index += 1;
                    refreshes = 0;
                    unrecognized = 0;
                    renewals = 0;
                    // 只统计服务端已确认的分片，重试不会重复计数
                    if let Some(sink) = file.progress.as_ref() {
                        sink.on_bytes(len);
                    }
                    self.report_milestones(file, &mut milestones, index, total, len, started);
                }
                PartOutcome::RetryAfterRefresh => {
                    tracing::debug!(file = %file.name, part = part_number, "access token invalid during part upload");
                    self.refresh_within_budget(&mut refreshes)?;
                }
                PartOutcome::RetryAfterRenewal(error) => {
                    renewals += 1;
                    if renewals > MAX_URL_RENEWALS {
                        return Err(DriveError::PartRejected {
                            part_number,
                            status: response.status,
                            code: error.code,
                            message: error.message,
                        });
                    }
                    tracing::debug!(file = %file.name, part = part_number, renewal = renewals, "upload url expired, renewing");
                    let renewed = self.renew_upload_urls(session, &mut refreshes)?;
                    if renewed.len() as u64 != total {
                        return Err(DriveError::InconsistentSession {
                            expected: total,
                            actual: renewed.len(),
                        });
                    }
                    session.parts = renewed;
                }
                PartOutcome::RetryUnrecognized { status, error } => {
                    unrecognized += 1;
                    if unrecognized > MAX_UNRECOGNIZED_PART_RETRIES {
                        return Err(DriveError::PartRejected {
                            part_number,
                            status,
                            code: error.code,
                            message: error.message,
                        });
                    }
                    tracing::warn!(
                        file = %file.name,
                        part = part_number,
                        status,
                        code = %error.code,
                        retry = unrecognized,
                        "part upload failed, retrying"
                    );
                }
            }
        }
        Ok(())
    }

    fn refresh_within_budget(&mut self, refreshes: &mut u32) -> Result<()> {
        if *refreshes >= MAX_AUTH_REFRESHES {
            return Err(DriveError::AuthExpired(format!(
                "access token still rejected after {MAX_AUTH_REFRESHES} refreshes"
            )));
        }
        *refreshes += 1;
        self.refresh_token()
    }

    fn renew_upload_urls(
        &mut self,
        session: &UploadSession,
        refreshes: &mut u32,
    ) -> Result<Vec<PartInfo>> {
        let url = format!("{API_BASE}/{GET_UPLOAD_URL_PATH}");
        // 只提交分片序号，旧地址已经失效
        let part_info_list: Vec<PartInfo> = session
            .parts
            .iter()
            .map(|part| PartInfo {
                part_number: part.part_number,
                upload_url: String::new(),
            })
            .collect();
        loop {
            let body = json!({
                "drive_id": self.instance.drive_id,
                "file_id": session.file_id,
                "upload_id": session.upload_id,
                "part_info_list": part_info_list,
            });
            let reply: Reply<GetUploadUrlResponse> = self.post(&url, &body)?;
            match reply {
                Reply::Success(renewed) => return Ok(renewed.part_info_list),
                Reply::Failure(err) if err.code == ACCESS_TOKEN_INVALID => {
                    self.refresh_within_budget(refreshes)?;
                }
                Reply::Failure(err) => return Err(remote_rejected(err)),
            }
        }
    }

    fn report_milestones(
        &self,
        file: &FileStream,
        milestones: &mut Milestones,
        completed: u64,
        total: u64,
        part_bytes: u64,
        started: Instant,
    ) {
        let fired = milestones.advance(completed, total);
        if fired.is_empty() {
            return;
        }
        let elapsed = started.elapsed();
        let throughput = part_bytes as f64 / elapsed.as_secs_f64().max(f64::EPSILON);
        let bytes_transferred = (completed * self.chunk_size).min(file.size);
        let percent = completed as f64 / total as f64 * 100.0;
        for _ in fired {
            let event = ProgressEvent {
                file_name: file.name.clone(),
                bytes_transferred,
                part_throughput: throughput,
                part_elapsed: elapsed,
                percent,
            };
            tracing::info!(
                "[{}] uploaded {}, speed {}/s, part took {:?}, {:.0}%",
                event.file_name,
                format_file_size(bytes_transferred as f64),
                format_file_size(throughput),
                elapsed,
                percent
            );
            if let Some(sink) = file.progress.as_ref() {
                sink.on_milestone(&event);
            }
        }
    }

    fn complete(&self, session: &UploadSession) -> Result<()> {
        let url = format!("{API_BASE}/{COMPLETE_PATH}");
        let body = json!({
            "drive_id": self.instance.drive_id,
            "file_id": session.file_id,
            "upload_id": session.upload_id,
        });
        let completed = self.post::<CompleteResponse>(&url, &body)?.into_result()?;
        if completed.file_id != session.file_id {
            return Err(DriveError::CompletionMismatch {
                expected: session.file_id.clone(),
                actual: completed.file_id,
            });
        }
        Ok(())
    }
}

fn classify_part_response(response: &RawResponse) -> PartOutcome {
    if response.is_success() {
        return PartOutcome::Advance;
    }
    let body_text = || String::from_utf8_lossy(&response.body).trim().to_string();
    if response.status != 403 {
        return PartOutcome::RetryUnrecognized {
            status: response.status,
            error: ApiError::new(format!("HTTP{}", response.status), body_text()),
        };
    }

    let error = std::str::from_utf8(&response.body)
        .ok()
        .and_then(|text| quick_xml::de::from_str::<ObjectStoreError>(text).ok())
        .map(ApiError::from)
        .unwrap_or_else(|| ApiError::new("HTTP403", body_text()));
    if error.code == ACCESS_TOKEN_INVALID {
        PartOutcome::RetryAfterRefresh
    } else if error.message == REQUEST_EXPIRED {
        PartOutcome::RetryAfterRenewal(error)
    } else {
        PartOutcome::RetryUnrecognized { status: 403, error }
    }
}

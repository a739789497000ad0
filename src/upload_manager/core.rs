use super::scanner::{join_remote, scan_local, LocalEntry};
use crate::api::drive::{DriveClient, FileStream, ProgressSink, UploadOutcome};
use crate::Result;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UploadStatus {
    Completed,
    Rapid,
    Failed,
}

#[derive(Clone, Debug)]
pub struct UploadTask {
    pub file_name: String,
    pub local_path: PathBuf,
    pub remote_dir: String,
    pub size: u64,
    pub remote_id: Option<String>,
    pub status: UploadStatus,
    pub started_at: i64,
    pub completed_at: i64,
    pub error_message: Option<String>,
}

/// 一次批量上传结束后的队列快照。
#[derive(Clone, Debug, Default)]
pub struct UploadQueueState {
    pub completed: Vec<UploadTask>,
    pub failed: Vec<UploadTask>,
}

/// 顺序上传一批本地文件：解析远程目录、逐个上传、记录成功与失败。
/// 单个文件失败不会中断批次，只有致命错误（凭据无法落盘）才会提前返回。
pub struct UploadManager {
    state: UploadQueueState,
    folder_cache: HashMap<String, String>,
    progress: Option<Arc<dyn ProgressSink>>,
}

impl UploadManager {
    pub fn new() -> Self {
        Self {
            state: UploadQueueState::default(),
            folder_cache: HashMap::new(),
            progress: None,
        }
    }

    pub fn with_progress(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress = Some(sink);
        self
    }

    /// 上传 `local` 下的所有文件到远程根目录下的 `remote` 路径。
    pub fn run(
        &mut self,
        drive: &mut DriveClient,
        local: &Path,
        remote: &str,
    ) -> Result<UploadQueueState> {
        let entries = scan_local(local)?;
        tracing::info!(files = entries.len(), local = %local.display(), remote, "starting upload batch");

        for entry in entries {
            let remote_dir = join_remote(remote, &entry.remote_dir);
            let started_at = current_timestamp();
            match self.upload_entry(drive, &entry, &remote_dir) {
                Ok(outcome) => self.mark_success(&entry, remote_dir, outcome, started_at),
                Err(err) if err.is_fatal() => {
                    tracing::error!(file = %entry.path.display(), error = %err, "aborting batch");
                    return Err(err);
                }
                Err(err) => {
                    tracing::warn!(file = %entry.path.display(), error = %err, "upload failed");
                    self.mark_failure(&entry, remote_dir, err.to_string(), started_at);
                }
            }
        }
        Ok(self.snapshot())
    }

    fn upload_entry(
        &mut self,
        drive: &mut DriveClient,
        entry: &LocalEntry,
        remote_dir: &str,
    ) -> Result<UploadOutcome> {
        let parent_id = self.resolve_folder(drive, remote_dir)?;
        let mut stream = FileStream::open(&entry.path, parent_id)?;
        if let Some(sink) = self.progress.as_ref() {
            stream = stream.with_progress(sink.clone());
        }
        tracing::debug!(file = %stream.name, size = stream.size, remote_dir, "uploading");
        drive.upload(&mut stream)
    }

    /// 逐级解析远程目录，已解析过的前缀直接复用。
    fn resolve_folder(&mut self, drive: &mut DriveClient, remote_dir: &str) -> Result<String> {
        let mut parent_id = drive.instance().root_folder_id.clone();
        let mut prefix = String::new();
        for segment in remote_dir.split('/').filter(|s| !s.is_empty()) {
            prefix = join_remote(&prefix, segment);
            parent_id = match self.folder_cache.get(&prefix) {
                Some(id) => id.clone(),
                None => {
                    let id = create_folder(drive, segment, &parent_id)?;
                    self.folder_cache.insert(prefix.clone(), id.clone());
                    id
                }
            };
        }
        Ok(parent_id)
    }

    fn mark_success(
        &mut self,
        entry: &LocalEntry,
        remote_dir: String,
        outcome: UploadOutcome,
        started_at: i64,
    ) {
        let status = match outcome {
            UploadOutcome::Rapid { .. } => UploadStatus::Rapid,
            UploadOutcome::Transferred { .. } => UploadStatus::Completed,
        };
        let mut task = build_task(entry, remote_dir, status, started_at);
        task.remote_id = Some(outcome.file_id().to_string());
        self.state.completed.push(task);
    }

    fn mark_failure(&mut self, entry: &LocalEntry, remote_dir: String, err: String, started_at: i64) {
        let mut task = build_task(entry, remote_dir, UploadStatus::Failed, started_at);
        task.error_message = Some(err);
        self.state.failed.push(task);
    }

    pub fn snapshot(&self) -> UploadQueueState {
        self.state.clone()
    }
}

impl Default for UploadManager {
    fn default() -> Self {
        Self::new()
    }
}

/// 批次中途 access token 可能过期，目录创建被拒时刷新一次再重试该级。
fn create_folder(drive: &mut DriveClient, segment: &str, parent_id: &str) -> Result<String> {
    match drive.ensure_path(segment, parent_id) {
        Err(err) if err.is_access_token_invalid() => {
            tracing::debug!(folder = segment, "access token invalid while creating folder, refreshing");
            drive.refresh_token()?;
            drive.ensure_path(segment, parent_id)
        }
        other => other,
    }
}

fn build_task(entry: &LocalEntry, remote_dir: String, status: UploadStatus, started_at: i64) -> UploadTask {
    UploadTask {
        file_name: entry
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default(),
        local_path: entry.path.clone(),
        remote_dir,
        size: entry.size,
        remote_id: None,
        status,
        started_at,
        completed_at: current_timestamp(),
        error_message: None,
    }
}

fn current_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis() as i64)
        .unwrap_or_default()
}

use super::{
    client::DriveClient,
    models::{CreateWithFoldersResponse, Reply},
    API_BASE, CREATE_WITH_FOLDERS_PATH,
};
use crate::{DriveError, Result};
use serde_json::json;

impl DriveClient {
    /// 逐级确保远程目录存在，返回最末一级的 folder id。
    /// 同名目录依赖服务端 refuse 模式的幂等性，直接返回已有目录，不做预检查。
    pub fn ensure_path(&self, path: &str, root_folder_id: &str) -> Result<String> {
        let normalized = path.replace('\\', "/");
        let url = format!("{API_BASE}/{CREATE_WITH_FOLDERS_PATH}");
        let mut parent_id = root_folder_id.to_string();

        for segment in normalized.split('/').filter(|s| !s.is_empty()) {
            let body = json!({
                "drive_id": self.instance.drive_id,
                "parent_file_id": parent_id,
                "name": segment,
                "check_name_mode": "refuse",
                "type": "folder",
            });
            let reply: Reply<CreateWithFoldersResponse> = self.post(&url, &body)?;
            match reply {
                Reply::Success(folder) if folder.file_id.is_empty() => {
                    return Err(DriveError::FolderCreateFailed {
                        parent_id,
                        code: String::new(),
                        message: format!("no folder id returned for {segment}"),
                    });
                }
                Reply::Success(folder) => {
                    tracing::debug!(name = segment, file_id = %folder.file_id, "folder resolved");
                    parent_id = folder.file_id;
                }
                Reply::Failure(err) => {
                    return Err(DriveError::FolderCreateFailed {
                        parent_id,
                        code: err.code,
                        message: err.message,
                    });
                }
            }
        }
        Ok(parent_id)
    }
}

#[cfg(test)]
mod tests {
    use crate::api::drive::testing::{client, FakeTransport, MemoryStore};
    use crate::DriveError;
    use serde_json::json;

    #[test]
    fn resolves_each_segment_under_previous_parent() {
        let transport = FakeTransport::default();
        transport
            .json(201, json!({ "file_id": "id-a" }))
            .json(201, json!({ "file_id": "id-b" }));
        let drive = client(&transport, &MemoryStore::default());

        let leaf = drive.ensure_path("/a/b", "root").unwrap();

        assert_eq!(leaf, "id-b");
        let requests = transport.requests();
        assert_eq!(requests.len(), 2);
        let first = requests[0].json.as_ref().unwrap();
        assert_eq!(first["name"], "a");
        assert_eq!(first["parent_file_id"], "root");
        assert_eq!(first["check_name_mode"], "refuse");
        assert_eq!(first["type"], "folder");
        let second = requests[1].json.as_ref().unwrap();
        assert_eq!(second["name"], "b");
        assert_eq!(second["parent_file_id"], "id-a");
        assert!(requests[0]
            .url
            .ends_with("/adrive/v2/file/createWithFolders"));
    }

    #[test]
    fn backslashes_and_empty_segments_are_normalized() {
        let transport = FakeTransport::default();
        transport
            .json(200, json!({ "file_id": "id-x" }))
            .json(200, json!({ "file_id": "id-y" }));
        let drive = client(&transport, &MemoryStore::default());

        let leaf = drive.ensure_path("x\\\\y//", "root").unwrap();

        assert_eq!(leaf, "id-y");
        assert_eq!(transport.requests().len(), 2);
    }

    #[test]
    fn empty_path_returns_root_without_requests() {
        let transport = FakeTransport::default();
        let drive = client(&transport, &MemoryStore::default());

        assert_eq!(drive.ensure_path("///", "root").unwrap(), "root");
        assert!(transport.requests().is_empty());
    }

    #[test]
    fn failure_reports_last_resolved_parent() {
        let transport = FakeTransport::default();
        transport
            .json(201, json!({ "file_id": "id-a" }))
            .json(400, json!({ "code": "InvalidResource.Name", "message": "bad name" }));
        let drive = client(&transport, &MemoryStore::default());

        let err = drive.ensure_path("a/b/c", "root").unwrap_err();

        match err {
            DriveError::FolderCreateFailed {
                parent_id,
                code,
                message,
            } => {
                assert_eq!(parent_id, "id-a");
                assert_eq!(code, "InvalidResource.Name");
                assert_eq!(message, "bad name");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(transport.requests().len(), 2);
    }

    #[test]
    fn success_without_folder_id_is_failure() {
        let transport = FakeTransport::default();
        transport
            .json(201, json!({ "file_id": "id-a" }))
            .json(201, json!({ "file_name": "b" }));
        let drive = client(&transport, &MemoryStore::default());

        let err = drive.ensure_path("a/b/c", "root").unwrap_err();

        assert!(matches!(
            err,
            DriveError::FolderCreateFailed { ref parent_id, .. } if parent_id == "id-a"
        ));
        assert_eq!(transport.requests().len(), 2);
    }
}

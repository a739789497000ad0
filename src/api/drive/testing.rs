//! 单测用的脚本化传输层、内存凭据存储与固定秒传证明。

use super::{
    client::{DriveClient, RawResponse, Transport},
    models::DriveInstance,
    proof::{ProofCode, ProofProvider},
};
use crate::api::auth::CredentialStore;
use crate::{DriveError, Result};
use serde_json::Value;
use std::collections::VecDeque;
use std::io::Read;
use std::path::Path;
use std::sync::{Arc, Mutex};

#[derive(Clone, Debug)]
pub(crate) struct Recorded {
    pub method: &'static str,
    pub url: String,
    pub bearer: Option<String>,
    pub json: Option<Value>,
    pub body: Vec<u8>,
}

pub(crate) enum Scripted {
    Respond(RawResponse),
    Fail(String),
}

#[derive(Default)]
struct FakeState {
    queue: VecDeque<Scripted>,
    requests: Vec<Recorded>,
}

/// 按顺序回放预置响应，并记录每一次请求。
#[derive(Clone, Default)]
pub(crate) struct FakeTransport {
    state: Arc<Mutex<FakeState>>,
}

impl FakeTransport {
    pub fn push(&self, scripted: Scripted) -> &Self {
        self.state.lock().unwrap().queue.push_back(scripted);
        self
    }

    pub fn json(&self, status: u16, value: Value) -> &Self {
        self.push(Scripted::Respond(RawResponse {
            status,
            body: serde_json::to_vec(&value).unwrap(),
        }))
    }

    pub fn ok(&self) -> &Self {
        self.push(Scripted::Respond(RawResponse {
            status: 200,
            body: Vec::new(),
        }))
    }

    pub fn xml_error(&self, status: u16, code: &str, message: &str) -> &Self {
        let body = format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<Error><Code>{code}</Code><Message>{message}</Message></Error>"
        );
        self.push(Scripted::Respond(RawResponse {
            status,
            body: body.into_bytes(),
        }))
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn remaining(&self) -> usize {
        self.state.lock().unwrap().queue.len()
    }

    fn next(&self, recorded: Recorded) -> Result<RawResponse> {
        let mut state = self.state.lock().unwrap();
        let url = recorded.url.clone();
        state.requests.push(recorded);
        match state.queue.pop_front() {
            Some(Scripted::Respond(response)) => Ok(response),
            Some(Scripted::Fail(message)) => Err(DriveError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                message,
            ))),
            None => panic!("no scripted response left for {url}"),
        }
    }
}

impl Transport for FakeTransport {
    fn post_json(&self, url: &str, bearer: Option<&str>, body: &Value) -> Result<RawResponse> {
        self.next(Recorded {
            method: "POST",
            url: url.to_string(),
            bearer: bearer.map(str::to_string),
            json: Some(body.clone()),
            body: Vec::new(),
        })
    }

    fn put_body(&self, url: &str, mut body: Box<dyn Read + Send>, len: u64) -> Result<RawResponse> {
        let mut bytes = Vec::new();
        body.read_to_end(&mut bytes)?;
        assert_eq!(bytes.len() as u64, len, "declared length must match body");
        self.next(Recorded {
            method: "PUT",
            url: url.to_string(),
            bearer: None,
            json: None,
            body: bytes,
        })
    }
}

/// 记录每次持久化时的凭据快照。
#[derive(Clone, Default)]
pub(crate) struct MemoryStore {
    pub saved: Arc<Mutex<Vec<DriveInstance>>>,
    pub fail: bool,
}

impl CredentialStore for MemoryStore {
    fn persist(&self, instance: &DriveInstance) -> Result<()> {
        if self.fail {
            return Err(DriveError::Persist("read-only store".to_string()));
        }
        self.saved.lock().unwrap().push(instance.clone());
        Ok(())
    }
}

pub(crate) struct FixedProof;

impl ProofProvider for FixedProof {
    fn compute_proof(&self, access_token: &str, _local_path: &Path) -> Result<ProofCode> {
        Ok(ProofCode {
            content_hash: "ABCDEF".to_string(),
            proof_code: format!("proof-for-{access_token}"),
        })
    }
}

pub(crate) fn instance() -> DriveInstance {
    DriveInstance {
        drive_id: "drive-1".to_string(),
        refresh_token: "refresh-0".to_string(),
        access_token: "access-0".to_string(),
        root_folder_id: "root".to_string(),
        proxy: None,
    }
}

pub(crate) fn client(transport: &FakeTransport, store: &MemoryStore) -> DriveClient {
    DriveClient::new(
        instance(),
        Box::new(transport.clone()),
        Box::new(store.clone()),
    )
    .with_proof_provider(Box::new(FixedProof))
}

pub(crate) fn token_reply(transport: &FakeTransport, n: u32) {
    transport.json(
        200,
        serde_json::json!({
            "access_token": format!("access-{n}"),
            "refresh_token": format!("refresh-{n}"),
        }),
    );
}

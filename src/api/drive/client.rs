use super::{
    models::{ApiError, DriveInstance, Reply},
    proof::{FileProofProvider, ProofProvider},
    CHUNK_SIZE,
};
use crate::api::auth::CredentialStore;
use crate::{DriveError, Result};
use reqwest::{blocking::Client, redirect::Policy};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::io::Read;
use std::time::Duration;

/// 分片上传单次请求的默认超时；10MB 分片在慢速链路上也需要留足时间。
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// 一次 HTTP 往返的原始结果，由上层按接口解释。
#[derive(Clone, Debug, Default)]
pub struct RawResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP 传输层抽象，方便在单测中替换为脚本化实现。
pub trait Transport: Send + Sync {
    fn post_json(&self, url: &str, bearer: Option<&str>, body: &Value) -> Result<RawResponse>;
    fn put_body(&self, url: &str, body: Box<dyn Read + Send>, len: u64) -> Result<RawResponse>;
}

/// 构建一个带有统一超时与重定向策略的阻塞式 HTTP 客户端。
pub(crate) fn build_blocking_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .redirect(Policy::limited(10))
        .build()
        .map_err(DriveError::from)
}

/// 基于 reqwest blocking 的默认传输实现。
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_blocking_client(timeout)?,
        })
    }
}

impl Transport for ReqwestTransport {
    fn post_json(&self, url: &str, bearer: Option<&str>, body: &Value) -> Result<RawResponse> {
        let mut request = self
            .client
            .post(url)
            .header("Accept", "application/json")
            .json(body);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }
        let response = request.send()?;
        let status = response.status().as_u16();
        let body = response.bytes()?.to_vec();
        Ok(RawResponse { status, body })
    }

    fn put_body(&self, url: &str, body: Box<dyn Read + Send>, len: u64) -> Result<RawResponse> {
        let response = self
            .client
            .put(url)
            .body(reqwest::blocking::Body::sized(body, len))
            .send()?;
        let status = response.status().as_u16();
        let body = response.bytes()?.to_vec();
        Ok(RawResponse { status, body })
    }
}

/// 绑定单个云盘账号的客户端：持有凭据、传输层、持久化钩子与秒传校验器。
/// access token 只存在于实例内部，不同实例之间互不干扰。
pub struct DriveClient {
    pub(crate) instance: DriveInstance,
    pub(crate) transport: Box<dyn Transport>,
    pub(crate) store: Box<dyn CredentialStore>,
    pub(crate) proof: Box<dyn ProofProvider>,
    pub(crate) chunk_size: u64,
}

impl DriveClient {
    pub fn new(
        mut instance: DriveInstance,
        transport: Box<dyn Transport>,
        store: Box<dyn CredentialStore>,
    ) -> Self {
        instance.proxy = normalize_proxy(instance.proxy.take());
        Self {
            instance,
            transport,
            store,
            proof: Box::new(FileProofProvider),
            chunk_size: CHUNK_SIZE,
        }
    }

    pub fn with_proof_provider(mut self, proof: Box<dyn ProofProvider>) -> Self {
        self.proof = proof;
        self
    }

    #[cfg(test)]
    pub(crate) fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn instance(&self) -> &DriveInstance {
        &self.instance
    }

    /// 所有出站请求都经过代理前缀改写。
    pub(crate) fn endpoint(&self, url: &str) -> String {
        match self.instance.proxy.as_deref() {
            Some(prefix) => format!("{prefix}{url}"),
            None => url.to_string(),
        }
    }

    /// 以当前 access token 调用 JSON 接口。
    pub(crate) fn post<T>(&self, url: &str, body: &Value) -> Result<Reply<T>>
    where
        T: DeserializeOwned + Default,
    {
        let bearer = Some(self.instance.access_token.as_str()).filter(|token| !token.is_empty());
        self.post_with(url, bearer, body)
    }

    pub(crate) fn post_with<T>(&self, url: &str, bearer: Option<&str>, body: &Value) -> Result<Reply<T>>
    where
        T: DeserializeOwned + Default,
    {
        let target = self.endpoint(url);
        tracing::debug!(url = %target, "POST");
        let response = self.transport.post_json(&target, bearer, body)?;
        let reply = decode_reply(&response)?;
        if let Reply::Failure(err) = &reply {
            tracing::debug!(
                url = %target,
                status = response.status,
                code = %err.code,
                message = %err.message,
                "api returned error"
            );
        }
        Ok(reply)
    }

    pub(crate) fn put_part(
        &self,
        upload_url: &str,
        body: Box<dyn Read + Send>,
        len: u64,
    ) -> Result<RawResponse> {
        let target = self.endpoint(upload_url);
        let response = self.transport.put_body(&target, body, len)?;
        tracing::debug!(status = response.status, len, "PUT part");
        Ok(response)
    }
}

/// 代理前缀统一为以单个 `/` 结尾，空字符串视为未配置。
pub(crate) fn normalize_proxy(proxy: Option<String>) -> Option<String> {
    proxy
        .map(|value| value.trim().trim_end_matches('/').to_string())
        .filter(|value| !value.is_empty())
        .map(|value| format!("{value}/"))
}

fn decode_reply<T>(response: &RawResponse) -> Result<Reply<T>>
where
    T: DeserializeOwned + Default,
{
    if response.is_success() {
        if response.body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Reply::Success(T::default()));
        }
        return serde_json::from_slice(&response.body)
            .map(Reply::Success)
            .map_err(|e| DriveError::Decode(format!("invalid response body: {e}")));
    }

    let mut err: ApiError = serde_json::from_slice(&response.body).unwrap_or_default();
    if err.code.is_empty() {
        // 非 2xx 却没有可识别的错误码时，仍需保证 code 非空
        err.code = format!("HTTP{}", response.status);
        if err.message.is_empty() {
            err.message = String::from_utf8_lossy(&response.body).trim().to_string();
        }
    }
    Ok(Reply::Failure(err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::drive::models::CompleteResponse;

    #[test]
    fn proxy_prefix_is_normalized() {
        assert_eq!(
            normalize_proxy(Some("https://proxy.example.com//".into())).as_deref(),
            Some("https://proxy.example.com/")
        );
        assert_eq!(normalize_proxy(Some("   ".into())), None);
        assert_eq!(normalize_proxy(None), None);
    }

    #[test]
    fn failure_without_code_gets_status_code() {
        let response = RawResponse {
            status: 502,
            body: b"bad gateway".to_vec(),
        };
        match decode_reply::<CompleteResponse>(&response).unwrap() {
            Reply::Failure(err) => {
                assert_eq!(err.code, "HTTP502");
                assert_eq!(err.message, "bad gateway");
            }
            Reply::Success(_) => panic!("expected failure"),
        }
    }

    #[test]
    fn structured_failure_keeps_remote_code() {
        let response = RawResponse {
            status: 401,
            body: br#"{"code":"AccessTokenInvalid","message":"token expired"}"#.to_vec(),
        };
        match decode_reply::<CompleteResponse>(&response).unwrap() {
            Reply::Failure(err) => assert_eq!(err.code, "AccessTokenInvalid"),
            Reply::Success(_) => panic!("expected failure"),
        }
    }

    #[test]
    fn empty_success_body_yields_default() {
        let response = RawResponse {
            status: 204,
            body: Vec::new(),
        };
        match decode_reply::<CompleteResponse>(&response).unwrap() {
            Reply::Success(value) => assert!(value.file_id.is_empty()),
            Reply::Failure(_) => panic!("expected success"),
        }
    }
}

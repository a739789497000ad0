use crate::api::drive::{
    models::{Reply, TokenResponse},
    DriveClient, AUTH_BASE,
};
use crate::{DriveError, Result};
use serde_json::json;

const TOKEN_PATH: &str = "v2/account/token";

impl DriveClient {
    /// 用保存的 refresh token 换取新的令牌对，写回实例并立即持久化。
    /// 自身不做任何重试，何时刷新由上传流程决定。
    pub fn refresh_token(&mut self) -> Result<()> {
        let body = json!({
            "refresh_token": self.instance.refresh_token,
            "grant_type": "refresh_token",
        });
        let token_url = format!("{AUTH_BASE}/{TOKEN_PATH}");
        let reply: Reply<TokenResponse> = self.post_with(&token_url, None, &body)?;

        let payload = match reply {
            Reply::Success(payload) => payload,
            Reply::Failure(err) => {
                let message = if err.message.is_empty() {
                    err.code
                } else {
                    err.message
                };
                return Err(DriveError::AuthRefreshFailed(message));
            }
        };
        if payload.access_token.is_empty() {
            return Err(DriveError::AuthRefreshFailed(
                "missing access_token in response".to_string(),
            ));
        }

        self.instance.access_token = payload.access_token;
        if !payload.refresh_token.is_empty() {
            self.instance.refresh_token = payload.refresh_token;
        }
        self.store.persist(&self.instance)?;
        tracing::info!(drive_id = %self.instance.drive_id, "access token refreshed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::api::drive::testing::{client, token_reply, FakeTransport, MemoryStore};
    use crate::DriveError;
    use serde_json::json;

    #[test]
    fn refresh_updates_instance_and_persists() {
        let transport = FakeTransport::default();
        let store = MemoryStore::default();
        token_reply(&transport, 1);
        let mut drive = client(&transport, &store);

        drive.refresh_token().unwrap();

        assert_eq!(drive.instance().access_token, "access-1");
        assert_eq!(drive.instance().refresh_token, "refresh-1");
        let saved = store.saved.lock().unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].refresh_token, "refresh-1");

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(
            requests[0].url,
            "https://auth.aliyundrive.com/v2/account/token"
        );
        assert_eq!(
            requests[0].json,
            Some(json!({ "refresh_token": "refresh-0", "grant_type": "refresh_token" }))
        );
        assert_eq!(requests[0].bearer, None);
    }

    #[test]
    fn new_token_becomes_bearer_for_next_call() {
        let transport = FakeTransport::default();
        let store = MemoryStore::default();
        token_reply(&transport, 7);
        transport.json(200, json!({ "file_id": "folder-a" }));
        let mut drive = client(&transport, &store);

        drive.refresh_token().unwrap();
        drive.ensure_path("a", "root").unwrap();

        let requests = transport.requests();
        assert_eq!(requests[1].bearer.as_deref(), Some("access-7"));
    }

    #[test]
    fn rejected_refresh_reports_message_and_keeps_tokens() {
        let transport = FakeTransport::default();
        let store = MemoryStore::default();
        transport.json(
            400,
            json!({ "code": "InvalidParameter.RefreshToken", "message": "refresh token is invalid" }),
        );
        let mut drive = client(&transport, &store);

        let err = drive.refresh_token().unwrap_err();

        assert!(
            matches!(err, DriveError::AuthRefreshFailed(ref msg) if msg == "refresh token is invalid")
        );
        assert_eq!(drive.instance().access_token, "access-0");
        assert!(store.saved.lock().unwrap().is_empty());
    }

    #[test]
    fn persist_failure_is_fatal() {
        let transport = FakeTransport::default();
        let store = MemoryStore {
            fail: true,
            ..MemoryStore::default()
        };
        token_reply(&transport, 1);
        let mut drive = client(&transport, &store);

        let err = drive.refresh_token().unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn proxy_prefixes_token_endpoint() {
        let transport = FakeTransport::default();
        let store = MemoryStore::default();
        token_reply(&transport, 1);
        let mut instance = crate::api::drive::testing::instance();
        instance.proxy = Some("https://relay.example.com".to_string());
        let mut drive = crate::api::drive::DriveClient::new(
            instance,
            Box::new(transport.clone()),
            Box::new(store.clone()),
        );

        drive.refresh_token().unwrap();

        assert_eq!(
            transport.requests()[0].url,
            "https://relay.example.com/https://auth.aliyundrive.com/v2/account/token"
        );
    }
}

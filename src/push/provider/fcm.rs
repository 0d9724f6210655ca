use crate::error::{PushError, Result};
use crate::push::credential::FcmCredential;
use crate::push::payload::{self, PayloadDefaults, WirePayload};
use crate::push::provider::provider_trait::PushProvider;
use crate::push::types::{NotificationIntent, PushVendor};
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use tracing::{error, info};
use uuid::Uuid;

/// FCM legacy HTTP 接口地址
pub const FCM_LEGACY_ENDPOINT: &str = "https://fcm.googleapis.com/fcm/send";

/// FCM (Firebase Cloud Messaging) Provider
///
/// 使用 FCM legacy HTTP API，以 server key 认证
pub struct FcmProvider {
    client: Client,
    credential: FcmCredential,
    endpoint: String,
    defaults: PayloadDefaults,
}

impl FcmProvider {
    /// 创建新的 FCM Provider
    ///
    /// # 参数
    /// - client: 共享的 HTTP 客户端
    /// - credential: server key / sender id / 默认 tag
    pub fn new(client: Client, credential: FcmCredential) -> Self {
        Self::with_endpoint(client, credential, FCM_LEGACY_ENDPOINT)
    }

    /// 指定接口地址（代理或测试）
    pub fn with_endpoint(client: Client, credential: FcmCredential, endpoint: impl Into<String>) -> Self {
        let defaults = PayloadDefaults {
            alarm_tag: Some(credential.alarm_tag().to_string()).filter(|tag| !tag.is_empty()),
        };
        Self {
            client,
            credential,
            endpoint: endpoint.into(),
            defaults,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl PushProvider for FcmProvider {
    fn build_payload(&self, intent: &NotificationIntent) -> WirePayload {
        payload::build(PushVendor::Fcm, intent, &self.defaults)
    }

    async fn send(&self, intent: &NotificationIntent, payload: &WirePayload) -> Result<()> {
        let request_id = Uuid::new_v4();
        let body = payload.to_json()?;

        info!(
            "[FCM] Sending push: request_id={}, target_kind={}, priority={}",
            request_id,
            intent.target.kind(),
            intent.priority.as_str()
        );

        let response = self
            .client
            .post(&self.endpoint)
            .header(AUTHORIZATION, format!("key={}", self.credential.server_key()))
            .header("Sender", format!("id={}", self.credential.sender_id()))
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| {
                error!("[FCM] Request failed: request_id={}, error={}", request_id, e);
                PushError::from(e)
            })?;

        let status = response.status();
        if status.is_success() {
            info!("[FCM] Push sent successfully: request_id={}", request_id);
            Ok(())
        } else {
            let error_text = response.text().await.unwrap_or_default();
            error!(
                "[FCM] Push failed: request_id={}, status={}, error={}",
                request_id, status, error_text
            );
            Err(PushError::Rejected {
                status: status.to_string(),
                reason: None,
            })
        }
    }

    fn vendor(&self) -> PushVendor {
        PushVendor::Fcm
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alarm_tag_applied_to_payload() {
        let provider = FcmProvider::new(Client::new(), FcmCredential::new("key", "sender", "alarm"));
        let payload = provider.build_payload(&NotificationIntent::to_device("tok-123"));
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["notification"]["tag"], "alarm");
        assert_eq!(provider.endpoint(), FCM_LEGACY_ENDPOINT);
    }

    #[test]
    fn test_empty_alarm_tag_omitted() {
        let provider = FcmProvider::new(Client::new(), FcmCredential::new("key", "sender", ""));
        let payload = provider.build_payload(&NotificationIntent::to_device("tok-123"));
        let value = serde_json::to_value(&payload).unwrap();
        assert!(value["notification"].get("tag").is_none());
    }
}

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use std::sync::Arc;
use tracing::{error, info};
use url::Url;
use uuid::Uuid;

use crate::error::{PushError, Result};
use crate::push::payload::{self, PayloadDefaults, WirePayload};
use crate::push::provider::provider_trait::PushProvider;
use crate::push::token::TokenProvider;
use crate::push::types::{ApnsEnvironment, NotificationIntent, PushVendor};

/// APNs 默认端口，2197 为备用端口
pub const APNS_DEFAULT_PORT: u16 = 443;

/// APNs (Apple Push Notification service) Provider
///
/// 使用 APNs HTTP/2 API，以 provider token (JWT) 认证
pub struct ApnsProvider {
    client: Client,
    tokens: Arc<TokenProvider>,
    base_url: String,
}

impl ApnsProvider {
    /// 创建新的 APNs Provider
    ///
    /// 接口地址由凭据中的环境决定：
    /// - 生产环境: https://api.push.apple.com
    /// - 开发环境: https://api.sandbox.push.apple.com
    pub fn new(client: Client, tokens: Arc<TokenProvider>, port: u16) -> Self {
        let base_url = Self::default_base_url(tokens.credential().environment(), port);
        Self::with_base_url(client, tokens, base_url)
    }

    /// 指定接口地址（代理或测试）
    pub fn with_base_url(client: Client, tokens: Arc<TokenProvider>, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client,
            tokens,
            base_url,
        }
    }

    pub fn default_base_url(environment: ApnsEnvironment, port: u16) -> String {
        format!("https://{}:{}", environment.host(), port)
    }

    pub fn tokens(&self) -> &Arc<TokenProvider> {
        &self.tokens
    }

    /// `<base>/3/device/<target>`，target 作为单个路径段编码
    fn device_url(&self, intent: &NotificationIntent) -> Result<Url> {
        let mut url = Url::parse(&self.base_url).map_err(|e| {
            PushError::Configuration(format!("invalid APNs base url '{}': {}", self.base_url, e))
        })?;
        url.path_segments_mut()
            .map_err(|_| {
                PushError::Configuration(format!("APNs base url cannot carry a path: {}", self.base_url))
            })?
            .pop_if_empty()
            .extend(["3", "device", intent.target.as_str()]);
        Ok(url)
    }
}

/// 解析 APNs 错误响应中的 `reason`
fn parse_reason(body: &str) -> Option<String> {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()?
        .get("reason")?
        .as_str()
        .map(str::to_string)
}

#[async_trait]
impl PushProvider for ApnsProvider {
    fn build_payload(&self, intent: &NotificationIntent) -> WirePayload {
        payload::build(PushVendor::Apns, intent, &PayloadDefaults::default())
    }

    async fn send(&self, intent: &NotificationIntent, payload: &WirePayload) -> Result<()> {
        let body = payload.to_json()?;

        // 1. 获取 provider token（缓存未命中时才签发）
        let jwt_token = self.tokens.get_token().await?;

        // 2. 构建 APNs URL
        let url = self.device_url(intent)?;
        let apns_id = Uuid::new_v4();
        let credential = self.tokens.credential();

        info!(
            "[APNs] Sending push: apns_id={}, environment={}, target_kind={}, priority={}",
            apns_id,
            credential.environment().as_str(),
            intent.target.kind(),
            intent.priority.as_str()
        );

        // 3. 发送 HTTP/2 请求
        let mut request = self
            .client
            .post(url)
            .header(AUTHORIZATION, format!("bearer {}", jwt_token))
            .header("apns-topic", credential.bundle_id())
            .header("apns-push-type", "alert")
            .header("apns-priority", intent.priority.apns_priority())
            .header("apns-id", apns_id.to_string())
            .header(CONTENT_TYPE, "application/json");
        if let Some(collapse_key) = &intent.collapse_key {
            request = request.header("apns-collapse-id", collapse_key);
        }

        let response = request.body(body).send().await.map_err(|e| {
            error!("[APNs] Request failed: apns_id={}, error={}", apns_id, e);
            PushError::from(e)
        })?;

        let status = response.status();
        if status.is_success() {
            info!("[APNs] Push sent successfully: apns_id={}", apns_id);
            Ok(())
        } else {
            let error_text = response.text().await.unwrap_or_default();
            let reason = parse_reason(&error_text);
            error!(
                "[APNs] Push failed: apns_id={}, status={}, reason={:?}",
                apns_id, status, reason
            );
            Err(PushError::Rejected {
                status: status.to_string(),
                reason,
            })
        }
    }

    fn vendor(&self) -> PushVendor {
        PushVendor::Apns
    }
}

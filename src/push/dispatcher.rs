use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tracing::{debug, error, info, warn};

use crate::config::{PushConfig, SectionStatus};
use crate::error::{PushError, Result};
use crate::push::payload::PayloadDefaults;
use crate::push::provider::apns::ApnsProvider;
use crate::push::provider::fcm::FcmProvider;
use crate::push::provider::{MockProvider, PushProvider};
use crate::push::token::TokenProvider;
use crate::push::types::{DispatchResult, NotificationIntent, PushVendor};

/// 推送分发器
///
/// 每次 `send` 独立执行：构建 payload、（APNs）获取 token、发送一次请求、
/// 归一化结果。任何失败都通过 `DispatchResult` 返回，不会向上抛出。
/// 可在多个任务间共享并发调用
#[derive(Clone, Default)]
pub struct Dispatcher {
    fcm: Option<Arc<dyn PushProvider>>,
    apns: Option<Arc<dyn PushProvider>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// 使用指定的 Provider 创建
    pub fn with_providers(
        fcm: Option<Arc<dyn PushProvider>>,
        apns: Option<Arc<dyn PushProvider>>,
    ) -> Self {
        Self { fcm, apns }
    }

    pub fn with_fcm(mut self, provider: Arc<dyn PushProvider>) -> Self {
        self.fcm = Some(provider);
        self
    }

    pub fn with_apns(mut self, provider: Arc<dyn PushProvider>) -> Self {
        self.apns = Some(provider);
        self
    }

    /// 根据配置创建，两个 Provider 共享同一个 HTTP 客户端
    ///
    /// 未配置的平台跳过；配置不完整或私钥无效返回错误
    pub fn from_config(config: &PushConfig) -> Result<Self> {
        let client = build_http_client(config)?;
        let mut dispatcher = Self::new();

        match config.fcm.status() {
            SectionStatus::Ready(credential) => {
                let provider = match &config.fcm.endpoint {
                    Some(endpoint) => FcmProvider::with_endpoint(client.clone(), credential, endpoint),
                    None => FcmProvider::new(client.clone(), credential),
                };
                info!("[DISPATCH] FCM provider enabled: endpoint={}", provider.endpoint());
                dispatcher.fcm = Some(Arc::new(provider));
            }
            SectionStatus::Missing => debug!("[DISPATCH] FCM provider not configured"),
            SectionStatus::Incomplete(missing) => {
                return Err(PushError::Configuration(format!(
                    "incomplete [fcm] configuration, missing: {}",
                    missing.join(", ")
                )));
            }
        }

        match config.apns.status()? {
            SectionStatus::Ready(credential) => {
                let environment = credential.environment();
                let tokens = Arc::new(TokenProvider::new(credential));
                let provider = match &config.apns.endpoint {
                    Some(endpoint) => ApnsProvider::with_base_url(client, tokens, endpoint),
                    None => ApnsProvider::new(client, tokens, config.apns.port),
                };
                info!(
                    "[DISPATCH] APNs provider enabled: environment={}, token_ttl_minutes={}",
                    environment.as_str(),
                    config.apns.token_ttl_minutes
                );
                dispatcher.apns = Some(Arc::new(provider));
            }
            SectionStatus::Missing => debug!("[DISPATCH] APNs provider not configured"),
            SectionStatus::Incomplete(missing) => {
                return Err(PushError::Configuration(format!(
                    "incomplete [apns] configuration, missing: {}",
                    missing.join(", ")
                )));
            }
        }

        Ok(dispatcher)
    }

    /// 所有平台都使用 MockProvider，只打印 payload
    pub fn dry_run(config: &PushConfig) -> Self {
        let fcm_defaults = PayloadDefaults {
            alarm_tag: Some(config.fcm.alarm_tag.clone()).filter(|tag| !tag.is_empty()),
        };
        Self::with_providers(
            Some(Arc::new(MockProvider::new(PushVendor::Fcm, fcm_defaults))),
            Some(Arc::new(MockProvider::new(PushVendor::Apns, PayloadDefaults::default()))),
        )
    }

    pub fn provider(&self, platform: PushVendor) -> Option<&Arc<dyn PushProvider>> {
        match platform {
            PushVendor::Fcm => self.fcm.as_ref(),
            PushVendor::Apns => self.apns.as_ref(),
        }
    }

    /// 发送一条推送，单次尝试，不重试
    pub async fn send(&self, platform: PushVendor, intent: &NotificationIntent) -> DispatchResult {
        let result = match self.provider(platform) {
            Some(provider) => {
                let payload = provider.build_payload(intent);
                provider.send(intent, &payload).await
            }
            None => Err(PushError::Configuration(format!(
                "{} provider is not configured",
                platform
            ))),
        };

        classify(platform, result)
    }

    /// 带超时的发送；超时视为失败
    pub async fn send_with_timeout(
        &self,
        platform: PushVendor,
        intent: &NotificationIntent,
        timeout: Duration,
    ) -> DispatchResult {
        match tokio::time::timeout(timeout, self.send(platform, intent)).await {
            Ok(result) => result,
            Err(elapsed) => {
                warn!(
                    "[DISPATCH] Send abandoned after {:?}: platform={}",
                    timeout, platform
                );
                DispatchResult::failure(PushError::from(elapsed).detail())
            }
        }
    }
}

fn classify(platform: PushVendor, result: Result<()>) -> DispatchResult {
    match result {
        Ok(()) => DispatchResult::success(),
        Err(e) => {
            if e.is_rejection() {
                warn!("[DISPATCH] Provider rejected push: platform={}, {}", platform, e);
            } else {
                error!("[DISPATCH] Push failed: platform={}, {}", platform, e);
            }
            DispatchResult::failure(e.detail())
        }
    }
}

fn build_http_client(config: &PushConfig) -> Result<Client> {
    Client::builder()
        .timeout(config.http.request_timeout())
        .connect_timeout(config.http.connect_timeout())
        .build()
        .map_err(|e| PushError::Configuration(format!("failed to build HTTP client: {}", e)))
}

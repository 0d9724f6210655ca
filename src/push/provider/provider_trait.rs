use crate::error::Result;
use crate::push::payload::WirePayload;
use crate::push::types::{NotificationIntent, PushVendor};
use async_trait::async_trait;

/// Push Provider Trait（推送提供者接口）
#[async_trait]
pub trait PushProvider: Send + Sync {
    /// 根据 intent 构建该平台的 payload
    fn build_payload(&self, intent: &NotificationIntent) -> WirePayload;

    /// 发送推送，单次请求，不重试
    ///
    /// 非成功状态返回 `PushError::Rejected`
    async fn send(&self, intent: &NotificationIntent, payload: &WirePayload) -> Result<()>;

    /// 获取 Provider 对应的 Vendor
    fn vendor(&self) -> PushVendor;
}

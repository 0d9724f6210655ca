use async_trait::async_trait;
use tracing::info;
use crate::push::payload::{self, PayloadDefaults, WirePayload};
use crate::push::provider::provider_trait::PushProvider;
use crate::push::types::{NotificationIntent, PushVendor};
use crate::error::Result;

/// Mock Provider（dry run）
///
/// 不调用真实 API，只打印 payload
pub struct MockProvider {
    vendor: PushVendor,
    defaults: PayloadDefaults,
}

impl MockProvider {
    pub fn new(vendor: PushVendor, defaults: PayloadDefaults) -> Self {
        Self { vendor, defaults }
    }
}

#[async_trait]
impl PushProvider for MockProvider {
    fn build_payload(&self, intent: &NotificationIntent) -> WirePayload {
        payload::build(self.vendor, intent, &self.defaults)
    }

    async fn send(&self, intent: &NotificationIntent, payload: &WirePayload) -> Result<()> {
        info!(
            "[MOCK PUSH] Sending push: vendor={}, target_kind={}, priority={}",
            self.vendor,
            intent.target.kind(),
            intent.priority.as_str()
        );
        info!("[MOCK PUSH] Payload: {}", payload.to_json()?);
        Ok(())
    }

    fn vendor(&self) -> PushVendor {
        self.vendor
    }
}

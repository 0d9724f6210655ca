pub mod apns;
pub mod fcm;
pub mod mock;
pub mod provider_trait;

pub use apns::ApnsProvider;
pub use fcm::FcmProvider;
pub use mock::MockProvider;
pub use provider_trait::PushProvider;

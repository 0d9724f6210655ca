pub mod credential;
pub mod dispatcher;
pub mod payload;
pub mod provider;
pub mod token;
pub mod types;

pub use credential::{ApnsCredential, FcmCredential, KeySource};
pub use dispatcher::Dispatcher;
pub use payload::{PayloadDefaults, WirePayload};
pub use token::{CachedToken, Clock, SystemClock, TokenProvider};
pub use types::{
    ApnsEnvironment, DispatchResult, Localization, NotificationIntent, Priority, PushVendor, Target,
};

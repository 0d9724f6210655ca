pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod push;

pub use config::PushConfig;
pub use error::{PushError, Result};
pub use push::{
    ApnsCredential, ApnsEnvironment, DispatchResult, Dispatcher, FcmCredential, NotificationIntent,
    Priority, PushVendor, Target, TokenProvider,
};

#![doc = include_str!("../README.md")]

pub(crate) mod internal_prelude {
    #![allow(unused_imports)]
    pub use tracing::{debug, error, info, trace, warn};
}

pub mod client;
pub mod command;
pub mod error;
#[cfg(feature = "ffi")]
pub mod ffi;
pub mod identity;
pub mod logging;
pub mod reply;
#[cfg(feature = "settings")]
mod setting_defaults;
#[cfg(feature = "settings")]
pub mod settings;
pub mod stat;
pub mod transport;

pub use client::{CollectAgent, Operation};
pub use command::{Command, Registration};
pub use error::Error;
pub use identity::JobIdentity;
pub use logging::{Logger, Priority, TracingLogger};
pub use reply::{ConnectionId, Reply};
#[cfg(feature = "settings")]
pub use settings::Settings;
pub use stat::StatRecord;
pub use transport::{Transport, UdpTransport, RELAY_PORT};

pub mod prelude {
    pub use super::client::{CollectAgent, Operation};
    pub use super::command::{Command, Registration};
    pub use super::error::{Error, ProtocolError, TransportError};
    pub use super::identity::JobIdentity;
    pub use super::logging::{Logger, Priority};
    pub use super::reply::{ConnectionId, Reply};
    #[cfg(feature = "settings")]
    pub use super::settings::Settings;
    pub use super::stat::StatRecord;
    pub use super::transport::{Transport, UdpTransport};
}

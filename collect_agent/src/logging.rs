//! The logging collaborator used by the client for its diagnostics.
//!
//! Jobs use the same interface to emit their own messages, see
//! [`CollectAgent::send_log`](crate::CollectAgent::send_log).
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, FromRepr};

use crate::identity::JobIdentity;

/// Message severities, numbered like their syslog counterparts.
#[derive(
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Clone,
    Copy,
    Debug,
    Display,
    EnumString,
    FromRepr,
    Deserialize,
    Serialize,
)]
#[strum(serialize_all = "lowercase")]
#[strum(ascii_case_insensitive)]
#[repr(u8)]
pub enum Priority {
    Emergency = 0,
    Alert = 1,
    Critical = 2,
    Error = 3,
    Warning = 4,
    Notice = 5,
    Info = 6,
    Debug = 7,
}

impl Priority {
    /// Map a raw syslog priority. Values outside of `0..=7` are mapped to [Priority::Debug].
    pub fn from_syslog(priority: i32) -> Self {
        u8::try_from(priority)
            .ok()
            .and_then(Priority::from_repr)
            .unwrap_or(Priority::Debug)
    }
}

/// Receiver for already formatted log messages.
pub trait Logger: Send + Sync {
    fn emit(&self, priority: Priority, message: &str);
}

impl<T: Logger + ?Sized> Logger for std::sync::Arc<T> {
    fn emit(&self, priority: Priority, message: &str) {
        (**self).emit(priority, message)
    }
}

/// Forwards messages to [`tracing`], tagged with the job's scenario and instance ids.
#[derive(Clone, Debug)]
pub struct TracingLogger {
    prefix: String,
}

impl TracingLogger {
    pub fn new(identity: &JobIdentity) -> Self {
        TracingLogger {
            prefix: format!(
                "SCENARIO_INSTANCE_ID {}, JOB_INSTANCE_ID {}, ",
                identity.scenario_instance_id, identity.job_instance_id
            ),
        }
    }
}

impl Logger for TracingLogger {
    fn emit(&self, priority: Priority, message: &str) {
        let prefix = &self.prefix;
        match priority {
            Priority::Emergency | Priority::Alert | Priority::Critical | Priority::Error => {
                tracing::error!(%priority, "{prefix}{message}")
            }
            Priority::Warning => tracing::warn!(%priority, "{prefix}{message}"),
            Priority::Notice | Priority::Info => tracing::info!(%priority, "{prefix}{message}"),
            Priority::Debug => tracing::debug!(%priority, "{prefix}{message}"),
        }
    }
}

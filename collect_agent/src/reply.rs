//! Parsing of the single line replies sent back by the relay.
use std::fmt;
use std::num::NonZeroU32;

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// Status word of a successful reply.
pub const STATUS_OK: &str = "OK";
/// Status word of a refused request.
pub const STATUS_KO: &str = "KO";

/// Relay-assigned identity of a registered job.
///
/// `0` means "unregistered" on the wire and can't be represented by this type.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, Debug, Deserialize, Serialize)]
#[serde(transparent)]
pub struct ConnectionId(NonZeroU32);

impl ConnectionId {
    pub fn new(id: u32) -> Option<Self> {
        NonZeroU32::new(id).map(ConnectionId)
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The outcome of one exchange with the relay.
#[derive(PartialEq, Eq, Clone, Debug, Deserialize, Serialize)]
pub enum Reply {
    /// The relay accepted a registration and assigned this id.
    Registered(ConnectionId),
    /// Any other accepted request. Holds the raw reply, its content is up to the caller.
    /// The reply is cut at the first NUL byte and trailing line breaks are removed.
    Success(String),
    /// The relay refused the request. Holds everything after the status word.
    Failure(String),
    /// The reply couldn't be understood. Holds the raw reply.
    Malformed(String),
}

impl Reply {
    /// Parse the reply to a registration, which has to carry the new connection id.
    pub fn parse_registration(raw: &str) -> Reply {
        let mut tokens = raw.split_whitespace();
        match tokens.next() {
            Some(STATUS_OK) => match tokens.next().map(str::parse::<u32>) {
                Some(Ok(id)) => match ConnectionId::new(id) {
                    Some(id) => Reply::Registered(id),
                    None => Reply::Malformed(raw.to_string()),
                },
                _ => Reply::Malformed(raw.to_string()),
            },
            Some(STATUS_KO) => Reply::Failure(failure_detail(raw)),
            _ => Reply::Malformed(raw.to_string()),
        }
    }

    /// Parse the reply to any request but a registration.
    ///
    /// Accepted replies are passed through verbatim, except for an `OK 0`, which is
    /// the relay's way of handing out an invalid id and thus never a valid answer.
    pub fn parse(raw: &str) -> Reply {
        let mut tokens = raw.split_whitespace();
        match tokens.next() {
            Some(STATUS_OK) => match tokens.next().map(str::parse::<u32>) {
                Some(Ok(0)) => Reply::Malformed(raw.to_string()),
                _ => Reply::Success(raw.to_string()),
            },
            Some(STATUS_KO) => Reply::Failure(failure_detail(raw)),
            _ => Reply::Malformed(raw.to_string()),
        }
    }

    pub fn success(&self) -> bool {
        matches!(self, Reply::Registered(_) | Reply::Success(_))
    }

    /// Split refused and malformed replies off as errors.
    pub fn into_result(self) -> Result<Reply, ProtocolError> {
        match self {
            Reply::Failure(detail) => Err(ProtocolError::Failure(detail)),
            Reply::Malformed(raw) => Err(ProtocolError::Malformed(raw)),
            reply => Ok(reply),
        }
    }
}

/// Renders the reply the way the relay would have sent it.
/// That's what callers crossing a language boundary get to see.
impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Registered(id) => write!(f, "{STATUS_OK} {id}"),
            Reply::Success(raw) | Reply::Malformed(raw) => f.write_str(raw),
            Reply::Failure(detail) if detail.is_empty() => f.write_str(STATUS_KO),
            Reply::Failure(detail) => write!(f, "{STATUS_KO} {detail}"),
        }
    }
}

fn failure_detail(raw: &str) -> String {
    raw.trim_start()
        .strip_prefix(STATUS_KO)
        .unwrap_or_default()
        .trim()
        .to_string()
}

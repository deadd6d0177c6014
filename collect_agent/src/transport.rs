//! Datagram exchange with the relay.
//!
//! Every exchange opens its own socket, sends the whole command in a single datagram and
//! waits for exactly one reply datagram. There's no session, no fragmentation and no retry.
//! The socket is closed when the exchange returns, whatever the outcome.
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::Duration;

use crate::{error::TransportError, internal_prelude::*};

/// The relay always listens on this port.
pub const RELAY_PORT: u16 = 1111;

/// Replies larger than this are truncated.
pub const REPLY_BUFFER_SIZE: usize = 2048;

/// Windows reports truncated datagrams as an error instead of silently cutting them.
const WSAEMSGSIZE: i32 = 10040;

/// One request/reply round trip with the relay.
///
/// The client only talks through this trait, which allows to drive it without a network.
pub trait Transport: Send + Sync {
    /// Send `message` and block until the reply arrives.
    /// With `timeout` set, give up with [TransportError::Timeout] once it expires.
    fn exchange(&self, message: &str, timeout: Option<Duration>) -> Result<String, TransportError>;
}

impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    fn exchange(&self, message: &str, timeout: Option<Duration>) -> Result<String, TransportError> {
        (**self).exchange(message, timeout)
    }
}

/// UDP transport towards a relay address resolved once, at creation time.
#[derive(Clone, Debug)]
pub struct UdpTransport {
    address: SocketAddr,
}

impl UdpTransport {
    /// Resolve the relay on `host` and the fixed [RELAY_PORT].
    /// IPv4 addresses are preferred, an empty host means the loopback interface.
    pub fn new(host: &str) -> Result<Self, TransportError> {
        if host.is_empty() {
            return Ok(Self::with_address((Ipv4Addr::LOCALHOST, RELAY_PORT).into()));
        }

        let addresses: Vec<SocketAddr> = (host, RELAY_PORT)
            .to_socket_addrs()
            .map_err(|err| TransportError::Resolve(format!("{host}:{RELAY_PORT} ({err})")))?
            .collect();

        let address = addresses
            .iter()
            .find(|address| address.is_ipv4())
            .or_else(|| addresses.first())
            .copied()
            .ok_or_else(|| TransportError::Resolve(format!("{host}:{RELAY_PORT}")))?;
        debug!("Resolved rstats relay to {address}");

        Ok(Self::with_address(address))
    }

    /// Talk to a relay on an explicit address.
    pub fn with_address(address: SocketAddr) -> Self {
        UdpTransport { address }
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    fn open_socket(&self) -> Result<UdpSocket, TransportError> {
        let local: SocketAddr = if self.address.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };

        let socket = UdpSocket::bind(local)
            .map_err(|err| TransportError::Io("opening socket", err))?;
        // A connected socket gets ICMP errors reported, i.e. a refused connection
        // surfaces as an error instead of an endless wait.
        socket
            .connect(self.address)
            .map_err(|err| TransportError::Io("connecting to rstats", err))?;

        Ok(socket)
    }
}

impl Transport for UdpTransport {
    fn exchange(&self, message: &str, timeout: Option<Duration>) -> Result<String, TransportError> {
        // A zero duration isn't a valid socket timeout.
        let timeout = timeout.filter(|timeout| !timeout.is_zero());

        let socket = self.open_socket()?;
        socket
            .set_read_timeout(timeout)
            .map_err(|err| TransportError::Io("setting reply timeout", err))?;

        trace!("Sending to {}: {message}", self.address);
        let sent = socket
            .send(message.as_bytes())
            .map_err(|err| TransportError::Io("sending command to rstats", err))?;
        if sent != message.len() {
            return Err(TransportError::ShortSend {
                sent,
                expected: message.len(),
            });
        }

        let mut buffer = [0u8; REPLY_BUFFER_SIZE];
        let received = match socket.recv(&mut buffer) {
            Ok(received) => received,
            Err(err) if is_truncation(&err) => {
                warn!("Reply from rstats exceeded {REPLY_BUFFER_SIZE} bytes and was truncated");
                buffer.len()
            }
            Err(err) if matches!(err.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                return Err(TransportError::Timeout(timeout.unwrap_or_default()));
            }
            Err(err) => return Err(TransportError::Io("receiving answer from rstats", err)),
        };

        let reply = decode_reply(&buffer[..received]);
        trace!("Received from {}: {reply}", self.address);

        Ok(reply)
    }
}

fn is_truncation(err: &io::Error) -> bool {
    cfg!(windows) && err.raw_os_error() == Some(WSAEMSGSIZE)
}

/// Replies are text terminated by the end of the datagram, a NUL byte or a line break.
fn decode_reply(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|byte| *byte == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end])
        .trim_end_matches(['\r', '\n'])
        .to_string()
}

use std::net::{SocketAddr, UdpSocket};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use collect_agent::{CollectAgent, JobIdentity, UdpTransport};

/// A relay stand-in that answers each incoming datagram with the next scripted reply.
/// Once all replies are sent, the thread returns every command it received.
pub fn spawn_relay(replies: &[&str]) -> (SocketAddr, JoinHandle<Vec<String>>) {
    let socket = UdpSocket::bind("127.0.0.1:0").expect("Failed to bind fake relay");
    let address = socket.local_addr().unwrap();
    let replies: Vec<String> = replies.iter().map(|reply| reply.to_string()).collect();

    let handle = thread::spawn(move || {
        let mut received = Vec::new();
        let mut buffer = [0u8; 2048];
        for reply in replies {
            let (size, peer) = socket.recv_from(&mut buffer).unwrap();
            received.push(String::from_utf8_lossy(&buffer[..size]).into_owned());
            socket.send_to(reply.as_bytes(), peer).unwrap();
        }
        received
    });

    (address, handle)
}

/// A client talking to the relay on `address`.
/// The timeout keeps a broken test from hanging forever.
pub fn agent(address: SocketAddr) -> CollectAgent {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    CollectAgent::with_transport(
        UdpTransport::with_address(address),
        JobIdentity::new("jobA", 1, 2),
    )
    .with_reply_timeout(Some(Duration::from_secs(5)))
}

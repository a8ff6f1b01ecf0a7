//! Events pushed from a session or scan to its host.
//!
//! Both sets are closed: the host matches them exhaustively.  Each component
//! emits its events in generation order on a single channel, and exactly one
//! terminal event ends every stream.

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

/// Transport a liveness probe travelled over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    #[default]
    Udp,
    Tcp,
}

impl Transport {
    /// Single-letter tag used in progress displays (`u` / `t`).
    pub fn tag(self) -> char {
        match self {
            Transport::Udp => 'u',
            Transport::Tcp => 't',
        }
    }
}

/// An application frame received by a multicast session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Address the datagram came from (the sender's send socket).
    pub source: SocketAddr,
    /// Frame payload with the magic tag stripped.
    pub payload: Vec<u8>,
}

/// Events produced by a multicast session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// An application frame arrived.
    Message(InboundMessage),
    /// The session was closed on request and both sockets are released.
    /// Terminal.
    Closed,
    /// The receive loop hit a non-timeout socket error and tore the session
    /// down.  Terminal.
    Failed { reason: String },
}

/// Events produced by a subnet scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    /// The candidate with this last octet has been probed.
    Step { index: u8, transport: Transport },
    /// A candidate answered with a well-formed pong.
    Peer { addr: SocketAddr, transport: Transport },
    /// The sweep finished or was cancelled.  Terminal.
    Done,
}

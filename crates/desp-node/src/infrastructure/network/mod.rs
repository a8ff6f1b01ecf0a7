//! Network infrastructure.
//!
//! # Sub-modules
//!
//! - **`interface`** – Picks the local address and interface a multicast
//!   group is joined on.
//!
//! - **`multicast`** – A joined multicast group with a paired send socket and
//!   a background receive loop that answers pings and forwards messages.
//!
//! - **`probe`** – One ping/pong round trip against a single address, over
//!   UDP or TCP.
//!
//! - **`ranger`** – Sequential /24 sweep built on `probe`, reporting progress
//!   and discovered peers.

pub mod interface;
pub mod multicast;
pub mod probe;
pub mod ranger;

pub use multicast::{MulticastSession, SessionConfig, SessionError};
pub use probe::{Prober, TcpProber, UdpProber};
pub use ranger::{RangeScan, ScanConfig, ScanError};

use std::time::Duration;

/// Default UDP port shared by sessions and scans.
pub const DEFAULT_PORT: u16 = 11332;

/// Capacity of every event channel.  Producers block when it is full.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Returns `true` for OS timeout / would-block errors that should be retried.
pub(crate) fn is_timeout_error(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
    )
}

/// Checks a close/cancel signal without blocking.
///
/// A signal counts as raised when the handle set it to `true` or was dropped.
pub(crate) fn close_requested(signal: &tokio::sync::watch::Receiver<bool>) -> bool {
    signal.has_changed().is_err() || *signal.borrow()
}

/// Default probe timeout for subnet scans.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(100);

//! # desp-core
//!
//! Shared library for DESP containing the datagram frame codec and the
//! domain types exchanged between the network components and their host.
//!
//! This crate is used by `desp-node` and by anything embedding the
//! session/scanner.  It has no dependencies on sockets, threads or OS APIs.
//!
//! # Architecture overview
//!
//! DESP is a small LAN peer-discovery and messaging protocol.  Peers share a
//! multicast group and exchange framed UDP datagrams; peers outside the group
//! can be found by sweeping a /24 with unicast liveness probes.
//!
//! - **`protocol`** – How bytes travel over the network.  Every datagram is a
//!   4-byte `DESP` tag followed by either a 5-byte control command
//!   (`!ping` / `!pong`) or arbitrary application bytes.
//!
//! - **`domain`** – Plain data: the events a session or scan hands to its
//!   host, the probe transport kind, and the /24 subnet a scan walks.

pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `desp_core::ScanEvent` instead of `desp_core::domain::events::ScanEvent`.
pub use domain::events::{InboundMessage, ScanEvent, SessionEvent, Transport};
pub use domain::subnet::Subnet24;
pub use protocol::frame::{decode_frame, encode_frame, Control, Frame, FrameError};

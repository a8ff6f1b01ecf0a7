//! desp-node library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does desp-node do?
//!
//! It owns every socket in DESP.  A host (the `desp` binary, or any other
//! embedding) never touches the network directly; it:
//!
//! 1. Opens a [`MulticastSession`] to chat with peers in a multicast group,
//!    or starts a [`RangeScan`] to find peers on a /24 by unicast ping.
//! 2. Drains the event channel returned alongside the handle.
//! 3. Calls the handle's small control surface (`send`, `close`).
//!
//! [`MulticastSession`]: infrastructure::network::MulticastSession
//! [`RangeScan`]: infrastructure::network::RangeScan

/// Infrastructure layer: sockets, interface discovery, and configuration.
pub mod infrastructure;

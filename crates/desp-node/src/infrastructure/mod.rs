//! Infrastructure layer for desp-node.
//!
//! # Sub-modules
//!
//! - **`network`** – The multicast session, the subnet ranger and its probes,
//!   and host interface selection.  Each session or scan runs one dedicated
//!   thread that owns its blocking socket I/O.
//!
//! - **`storage`** – TOML configuration persisted in the platform config
//!   directory, plus address parsing helpers.

pub mod network;
pub mod storage;

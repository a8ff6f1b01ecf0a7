//! Persistent storage for desp-node.
//!
//! - **`config`** – TOML application configuration stored in the platform
//!   config directory, and the address parsing used to turn it into session
//!   and scan configs.

pub mod config;

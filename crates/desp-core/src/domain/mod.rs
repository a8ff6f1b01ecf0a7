//! Domain types shared by the network components and their host.
//!
//! - **`events`** – The closed set of events a multicast session or a subnet
//!   scan pushes to its host.
//! - **`subnet`** – The /24 range a scan sweeps, derived from a base address.

pub mod events;
pub mod subnet;

pub use events::{InboundMessage, ScanEvent, SessionEvent, Transport};
pub use subnet::Subnet24;

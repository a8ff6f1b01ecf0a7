//! Sequential /24 sweep for peers outside the multicast group.
//!
//! Starting from a base address, the ranger probes `.1` through `.254` of its
//! /24, one candidate at a time, in ascending order.  After every probe it
//! reports a [`ScanEvent::Step`] so the host can show progress, preceded by a
//! [`ScanEvent::Peer`] when the candidate answered.  Exactly one
//! [`ScanEvent::Done`] ends the sweep.
//!
//! # Cancellation
//!
//! [`RangeScan::close`] raises a signal that the loop checks once, at the top
//! of each iteration, before the next probe.  A probe already in flight runs
//! to its own timeout, so cancellation takes effect within one probe timeout.
//! On seeing the signal the loop emits `Done` and probes nothing further.

use std::io;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Duration;

use desp_core::{ScanEvent, Subnet24, Transport};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use super::probe::{prober_for, Prober};
use super::{close_requested, DEFAULT_PORT, DEFAULT_PROBE_TIMEOUT, EVENT_CHANNEL_CAPACITY};

/// Error type for starting a scan.
#[derive(Debug, Error)]
pub enum ScanError {
    /// A zero timeout would make every probe block forever.
    #[error("probe timeout must be greater than zero")]
    InvalidTimeout,

    /// The scan thread could not be started.
    #[error("failed to spawn scan thread: {0}")]
    Spawn(#[source] io::Error),
}

/// Parameters of one sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanConfig {
    /// Any address inside the /24 to sweep.
    pub base: Ipv4Addr,
    /// Port every candidate is probed on.
    pub port: u16,
    pub transport: Transport,
    /// Write and read deadline of each probe.
    pub probe_timeout: Duration,
}

impl ScanConfig {
    /// UDP sweep of the /24 around `base` on the default port.
    pub fn new(base: Ipv4Addr) -> Self {
        Self {
            base,
            port: DEFAULT_PORT,
            transport: Transport::Udp,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }
}

/// Handle to a running sweep.
///
/// Dropping the handle cancels the sweep.
pub struct RangeScan {
    subnet: Subnet24,
    cancel_tx: watch::Sender<bool>,
    finished_rx: watch::Receiver<()>,
}

impl RangeScan {
    /// Starts sweeping the /24 around `config.base`.
    ///
    /// Returns the scan handle and the receiver the host must drain.
    ///
    /// # Errors
    ///
    /// [`ScanError::InvalidTimeout`] for a zero probe timeout and
    /// [`ScanError::Spawn`] if the thread cannot start.
    pub fn start(config: ScanConfig) -> Result<(Self, mpsc::Receiver<ScanEvent>), ScanError> {
        if config.probe_timeout.is_zero() {
            return Err(ScanError::InvalidTimeout);
        }
        let prober = prober_for(config.transport, config.probe_timeout);
        Self::start_with(config, prober)
    }

    fn start_with(
        config: ScanConfig,
        prober: Box<dyn Prober>,
    ) -> Result<(Self, mpsc::Receiver<ScanEvent>), ScanError> {
        let subnet = Subnet24::containing(config.base);
        let port = config.port;

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (finished_tx, finished_rx) = watch::channel(());

        std::thread::Builder::new()
            .name("desp-ranger".to_string())
            .spawn(move || {
                scan_loop(prober.as_ref(), subnet, port, &tx, &cancel_rx);
                drop(finished_tx);
            })
            .map_err(ScanError::Spawn)?;

        info!(
            "scanning {subnet} on port {port} over {:?} ({:?} per probe)",
            config.transport, config.probe_timeout
        );
        Ok((
            Self {
                subnet,
                cancel_tx,
                finished_rx,
            },
            rx,
        ))
    }

    /// Asks the sweep to stop before its next probe.  Returns immediately.
    pub fn close(&self) {
        self.cancel_tx.send_replace(true);
        debug!("cancel requested for scan of {}", self.subnet);
    }

    /// `true` once the scan thread has emitted `Done` and exited.
    pub fn is_finished(&self) -> bool {
        self.finished_rx.has_changed().is_err()
    }

    /// Resolves once the scan thread has exited.
    pub async fn finished(&self) {
        let mut rx = self.finished_rx.clone();
        while rx.changed().await.is_ok() {}
    }

    /// The /24 being swept.
    pub fn subnet(&self) -> Subnet24 {
        self.subnet
    }
}

/// The loop executed on the scan thread.
///
/// Emits one `Step` per probed candidate, a `Peer` before the `Step` of each
/// responder, and a final `Done` unless the host has dropped the receiver.
fn scan_loop(
    prober: &dyn Prober,
    subnet: Subnet24,
    port: u16,
    events: &mpsc::Sender<ScanEvent>,
    cancel: &watch::Receiver<bool>,
) {
    let transport = prober.transport();

    for (index, host) in subnet.candidates() {
        if close_requested(cancel) {
            debug!("scan of {subnet} cancelled before .{index}");
            break;
        }

        if let Some(addr) = prober.probe(SocketAddrV4::new(host, port)) {
            debug!("peer found at {addr}");
            if events
                .blocking_send(ScanEvent::Peer { addr, transport })
                .is_err()
            {
                return;
            }
        }

        if events
            .blocking_send(ScanEvent::Step { index, transport })
            .is_err()
        {
            // Receiver dropped – host is gone.
            return;
        }
    }

    let _ = events.blocking_send(ScanEvent::Done);
    info!("scan of {subnet} finished");
}

// ── Tests ─────────────────────────────────────────────────────────────────────

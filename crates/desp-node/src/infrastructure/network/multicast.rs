//! Multicast group session.
//!
//! A session joins a multicast group on one receive socket and talks to the
//! group through a second, dedicated send socket bound to the local source
//! address.  A background thread owns the receive socket, shares the send
//! socket with the handle, and:
//!
//! 1. Answers every `!ping` frame with a `!pong` sent straight back to the
//!    pinger, without telling the host.
//! 2. Drops `!pong` frames and anything that is not a frame at all.
//! 3. Forwards every application frame to the host as
//!    [`SessionEvent::Message`].
//!
//! # Read timeout
//!
//! The receive socket has a 1-second read timeout.  Each timeout is a chance
//! to check the close signal, so a close request takes effect within one
//! timeout.  The loop exits after releasing both sockets and emits
//! exactly one terminal event: [`SessionEvent::Closed`] on request, or
//! [`SessionEvent::Failed`] if the socket reported a non-timeout error.
//!
//! # Loopback
//!
//! Multicast loopback is forced on so a session hears its own messages.  The
//! host uses that to echo its own lines and to confirm the group works.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use desp_core::protocol::{decode_frame, encode_frame, Control, Frame, CONTROL_FRAME_LEN, MAGIC};
use desp_core::{InboundMessage, SessionEvent};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, trace, warn};

use super::interface::{self, MulticastInterface};
use super::{close_requested, is_timeout_error, DEFAULT_PORT, EVENT_CHANNEL_CAPACITY};

/// Default multicast group.
pub const DEFAULT_GROUP: Ipv4Addr = Ipv4Addr::new(239, 0, 0, 0);

/// Receive buffer size; also the largest datagram the loop reads whole.
pub const RECV_BUFFER_SIZE: usize = 8192;

/// Largest application payload that fits in one received datagram.
pub const MAX_PAYLOAD: usize = RECV_BUFFER_SIZE - MAGIC.len();

/// Upper bound on how long a blocked read delays a close request.
pub const READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Error type for multicast session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The group address is not in 224.0.0.0/4.
    #[error("{0} is not an IPv4 multicast address")]
    NotMulticast(Ipv4Addr),

    /// The primary outbound address could not be determined.
    #[error("could not determine primary outbound address: {0}")]
    SourceDiscovery(#[source] io::Error),

    /// Local interfaces could not be listed.
    #[error("failed to enumerate network interfaces: {0}")]
    InterfaceEnumeration(#[source] io::Error),

    /// No non-loopback interface carries the source address.
    #[error("no multicast-capable interface has address {0}")]
    NoMulticastInterface(Ipv4Addr),

    /// A socket could not be bound.
    #[error("failed to bind {addr}: {source}")]
    BindFailed {
        addr: SocketAddrV4,
        #[source]
        source: io::Error,
    },

    /// Group membership could not be added.
    #[error("failed to join {group} on {interface}: {source}")]
    JoinFailed {
        group: Ipv4Addr,
        interface: Ipv4Addr,
        #[source]
        source: io::Error,
    },

    /// Creating or configuring a socket failed.
    #[error("socket setup failed: {0}")]
    SocketSetup(#[source] io::Error),

    /// The receive thread could not be started.
    #[error("failed to spawn receive thread: {0}")]
    Spawn(#[source] io::Error),

    /// The session has been closed, explicitly or by a receive failure.
    #[error("session is closed")]
    Closed,

    /// The payload would be truncated by receivers.
    #[error("payload of {len} bytes exceeds the {max}-byte limit")]
    PayloadTooLarge { len: usize, max: usize },

    /// Writing to the send socket failed.
    #[error("send failed: {0}")]
    Send(#[source] io::Error),
}

/// Addresses a session is opened with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Multicast group and port.
    pub group: SocketAddrV4,
    /// Local address to send from and join on.  `None` uses the address of
    /// the default route.
    pub source: Option<Ipv4Addr>,
    /// Address the receive socket binds to.  `None` binds the group address
    /// (the unspecified address on Windows, which cannot bind a group).
    pub bind: Option<Ipv4Addr>,
}

impl SessionConfig {
    /// Config for `group` with automatic source and bind addresses.
    pub fn new(group: SocketAddrV4) -> Self {
        Self {
            group,
            source: None,
            bind: None,
        }
    }

    fn bind_addr(&self) -> SocketAddrV4 {
        let ip = self.bind.unwrap_or(if cfg!(windows) {
            Ipv4Addr::UNSPECIFIED
        } else {
            *self.group.ip()
        });
        SocketAddrV4::new(ip, self.group.port())
    }
}

impl Default for SessionConfig {
    /// `239.0.0.0:11332` with automatic source and bind addresses.
    fn default() -> Self {
        Self::new(SocketAddrV4::new(DEFAULT_GROUP, DEFAULT_PORT))
    }
}

/// Handle to an open multicast session.
///
/// Dropping the handle closes the session.
pub struct MulticastSession {
    group: SocketAddrV4,
    recv_addr: SocketAddr,
    send_addr: SocketAddr,
    // Emptied by the receive thread just before it reports closed.
    send_socket: SharedSocket,
    close_tx: watch::Sender<bool>,
    // The receive thread owns the sender and drops it on exit.
    closed_rx: watch::Receiver<()>,
}

impl MulticastSession {
    /// Joins the group described by `config` and starts the receive thread.
    ///
    /// Returns the session handle and the receiver the host must drain.
    ///
    /// # Errors
    ///
    /// Every setup failure is returned here and leaves nothing running.
    pub fn open(
        config: SessionConfig,
    ) -> Result<(Self, mpsc::Receiver<SessionEvent>), SessionError> {
        let group_ip = *config.group.ip();
        if !group_ip.is_multicast() {
            return Err(SessionError::NotMulticast(group_ip));
        }

        let source = match config.source {
            Some(ip) => ip,
            None => interface::primary_outbound_addr().map_err(SessionError::SourceDiscovery)?,
        };
        let interfaces =
            interface::local_interfaces().map_err(SessionError::InterfaceEnumeration)?;
        let iface = interface::select_multicast_interface(&interfaces, source)
            .ok_or(SessionError::NoMulticastInterface(source))?;
        debug!("joining {} on {} ({})", group_ip, iface.name, iface.addr);

        let recv_socket = bind_receive_socket(&config, &iface)?;
        let send_socket = connect_send_socket(config.group, source)?;

        Self::start(config.group, recv_socket, send_socket)
    }

    /// Wires already-configured sockets to a new receive thread.
    fn start(
        group: SocketAddrV4,
        recv_socket: UdpSocket,
        send_socket: UdpSocket,
    ) -> Result<(Self, mpsc::Receiver<SessionEvent>), SessionError> {
        recv_socket
            .set_read_timeout(Some(READ_TIMEOUT))
            .map_err(SessionError::SocketSetup)?;
        let recv_addr = recv_socket.local_addr().map_err(SessionError::SocketSetup)?;
        let send_addr = send_socket.local_addr().map_err(SessionError::SocketSetup)?;

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (close_tx, close_rx) = watch::channel(false);
        let (closed_tx, closed_rx) = watch::channel(());

        let send_socket: SharedSocket = Arc::new(Mutex::new(Some(send_socket)));
        let loop_send_socket = Arc::clone(&send_socket);

        std::thread::Builder::new()
            .name("desp-multicast".to_string())
            .spawn(move || receive_loop(recv_socket, loop_send_socket, tx, close_rx, closed_tx))
            .map_err(SessionError::Spawn)?;

        info!("multicast session on {group}: recv {recv_addr}, send {send_addr}");
        Ok((
            Self {
                group,
                recv_addr,
                send_addr,
                send_socket,
                close_tx,
                closed_rx,
            },
            rx,
        ))
    }

    /// Frames `payload` and sends it to the group.
    ///
    /// # Errors
    ///
    /// [`SessionError::Closed`] once the session is closed,
    /// [`SessionError::PayloadTooLarge`] for payloads over [`MAX_PAYLOAD`],
    /// and [`SessionError::Send`] if the socket write fails.
    pub fn send(&self, payload: &[u8]) -> Result<(), SessionError> {
        if *self.close_tx.borrow() {
            return Err(SessionError::Closed);
        }
        let guard = lock_socket(&self.send_socket);
        let socket = guard.as_ref().ok_or(SessionError::Closed)?;
        if payload.len() > MAX_PAYLOAD {
            return Err(SessionError::PayloadTooLarge {
                len: payload.len(),
                max: MAX_PAYLOAD,
            });
        }
        socket
            .send(&encode_frame(payload))
            .map_err(SessionError::Send)?;
        trace!("sent {} bytes to {}", payload.len(), self.group);
        Ok(())
    }

    /// Asks the receive thread to stop.  Sends are refused from now on.
    ///
    /// Returns immediately.  Both sockets are released within
    /// [`READ_TIMEOUT`]; watch [`is_closed`](Self::is_closed) or the
    /// terminal event to know when.
    pub fn close(&mut self) {
        self.close_tx.send_replace(true);
        debug!("close requested for session on {}", self.group);
    }

    /// `true` once the receive thread has released both sockets and exited.
    pub fn is_closed(&self) -> bool {
        self.closed_rx.has_changed().is_err()
    }

    /// Resolves once the receive thread has exited.
    pub async fn closed(&self) {
        let mut rx = self.closed_rx.clone();
        while rx.changed().await.is_ok() {}
    }

    /// Local address of the receive socket.
    pub fn recv_addr(&self) -> SocketAddr {
        self.recv_addr
    }

    /// Local address of the send socket; peers see messages from here.
    pub fn send_addr(&self) -> SocketAddr {
        self.send_addr
    }

    /// The group this session joined.
    pub fn group(&self) -> SocketAddrV4 {
        self.group
    }
}

// ── Socket setup ──────────────────────────────────────────────────────────────

/// Send socket slot shared by the handle and the receive thread.
type SharedSocket = Arc<Mutex<Option<UdpSocket>>>;

fn lock_socket(slot: &SharedSocket) -> MutexGuard<'_, Option<UdpSocket>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Socket options ───────────────────────────────────────────────────────────

fn udp_socket() -> Result<Socket, SessionError> {
    Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)).map_err(SessionError::SocketSetup)
}

/// Binds the group port with address reuse so several sessions (and other
/// programs) can share it, then joins the group on `iface`.
fn bind_receive_socket(
    config: &SessionConfig,
    iface: &MulticastInterface,
) -> Result<UdpSocket, SessionError> {
    let socket = udp_socket()?;
    socket
        .set_reuse_address(true)
        .map_err(SessionError::SocketSetup)?;
    #[cfg(any(
        target_os = "linux",
        target_os = "android",
        target_os = "macos",
        target_os = "ios",
        target_os = "freebsd"
    ))]
    socket
        .set_reuse_port(true)
        .map_err(SessionError::SocketSetup)?;

    let addr = config.bind_addr();
    socket
        .bind(&SockAddr::from(addr))
        .map_err(|source| SessionError::BindFailed { addr, source })?;

    let group = *config.group.ip();
    socket
        .join_multicast_v4(&group, &iface.addr)
        .map_err(|source| SessionError::JoinFailed {
            group,
            interface: iface.addr,
            source,
        })?;
    ensure_multicast_loop(&socket)?;
    socket
        .set_recv_buffer_size(RECV_BUFFER_SIZE)
        .map_err(SessionError::SocketSetup)?;

    Ok(socket.into())
}

/// Binds `source:0`, routes multicast out of the source interface, and
/// connects to the group so plain `send` reaches it.
fn connect_send_socket(group: SocketAddrV4, local: Ipv4Addr) -> Result<UdpSocket, SessionError> {
    let socket = udp_socket()?;
    let addr = SocketAddrV4::new(local, 0);
    socket
        .bind(&SockAddr::from(addr))
        .map_err(|source| SessionError::BindFailed { addr, source })?;
    socket
        .set_multicast_if_v4(&local)
        .map_err(SessionError::SocketSetup)?;
    // Loopback is a sender-side option on most stacks.
    ensure_multicast_loop(&socket)?;
    socket
        .connect(&SockAddr::from(group))
        .map_err(SessionError::SocketSetup)?;
    Ok(socket.into())
}

/// Turns multicast loopback on if the socket reports it off.
///
/// A socket that cannot report the option is left as is.
fn ensure_multicast_loop(socket: &Socket) -> Result<(), SessionError> {
    match socket.multicast_loop_v4() {
        Ok(true) => Ok(()),
        Ok(false) => socket
            .set_multicast_loop_v4(true)
            .map_err(SessionError::SocketSetup),
        Err(e) => {
            debug!("could not query multicast loopback: {e}");
            Ok(())
        }
    }
}

// ── Receive loop ──────────────────────────────────────────────────────────────

/// What the receive loop does with one datagram.
#[derive(Debug, PartialEq, Eq)]
enum Disposition {
    /// Send this frame back to the datagram's source.
    Reply([u8; CONTROL_FRAME_LEN]),
    /// Hand this message to the host.
    Deliver(InboundMessage),
    /// Drop it.
    Discard,
}

fn dispose(datagram: &[u8], source: SocketAddr) -> Disposition {
    match decode_frame(datagram) {
        Ok(Frame::Control(Control::Ping)) => {
            debug!("ping from {source}");
            Disposition::Reply(Control::Pong.to_frame())
        }
        Ok(Frame::Control(Control::Pong)) => Disposition::Discard,
        Ok(Frame::Message(payload)) => Disposition::Deliver(InboundMessage {
            source,
            payload: payload.to_vec(),
        }),
        Err(e) => {
            trace!("discarding datagram from {source}: {e}");
            Disposition::Discard
        }
    }
}

/// Windows `WSAEMSGSIZE`: the datagram was larger than the buffer.
#[cfg(windows)]
const WSAEMSGSIZE: i32 = 10040;

/// Receive errors caused by one datagram, not by the socket.
///
/// Windows reports an ICMP port-unreachable for an earlier reply as
/// `ConnectionReset` on the next read, and an oversized datagram as
/// `WSAEMSGSIZE`.  Neither means the socket is unusable.
fn is_discardable_recv_error(e: &io::Error) -> bool {
    if e.kind() == io::ErrorKind::ConnectionReset {
        return true;
    }
    #[cfg(windows)]
    if e.raw_os_error() == Some(WSAEMSGSIZE) {
        return true;
    }
    false
}

/// The loop executed on the session thread.
fn receive_loop(
    socket: UdpSocket,
    send_socket: SharedSocket,
    events: mpsc::Sender<SessionEvent>,
    close: watch::Receiver<bool>,
    closed: watch::Sender<()>,
) {
    let mut buf = vec![0u8; RECV_BUFFER_SIZE];

    let terminal = loop {
        if close_requested(&close) {
            break Some(SessionEvent::Closed);
        }

        let (len, src) = match socket.recv_from(&mut buf) {
            Ok(pair) => pair,
            Err(e) if is_timeout_error(&e) || e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) if is_discardable_recv_error(&e) => {
                trace!("discarding unreadable datagram: {e}");
                continue;
            }
            Err(e) => {
                error!("multicast recv error: {e}");
                break Some(SessionEvent::Failed {
                    reason: e.to_string(),
                });
            }
        };

        match dispose(&buf[..len], src) {
            Disposition::Reply(frame) => {
                if let Err(e) = socket.send_to(&frame, src) {
                    warn!("failed to answer ping from {src}: {e}");
                }
            }
            Disposition::Deliver(message) => {
                if events.blocking_send(SessionEvent::Message(message)).is_err() {
                    // Receiver dropped – host is gone.
                    break None;
                }
            }
            Disposition::Discard => {}
        }
    };

    lock_socket(&send_socket).take();
    drop(socket);
    drop(closed);
    if let Some(event) = terminal {
        let _ = events.blocking_send(event);
    }
    info!("multicast session stopped");
}

// ── Tests ─────────────────────────────────────────────────────────────────────

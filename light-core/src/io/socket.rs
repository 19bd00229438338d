//! Socket backends
//!
//! [`SocketSender`] plays the client side of a daemon source: stream kinds open
//! a fresh connection per write, datagram kinds send exactly one datagram.
//!
//! [`SocketListener`] plays the server side of a daemon destination. It binds
//! synchronously in [`SocketListener::start`], so the endpoint exists before
//! the daemon is launched, then hands every received chunk to the consumer
//! through a channel.

use std::fmt;
use std::io::{ErrorKind, Read, Write};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener, TcpStream, UdpSocket};
use std::os::unix::net::{UnixDatagram, UnixListener, UnixStream};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam::channel::{unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use super::{DriverIo, IoStats};
use crate::error::{LightError, Result};
use crate::timing::Poller;

const RECV_BUFFER: usize = 64 * 1024;

/// Socket family and transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SocketKind {
    Tcp,
    Tcp6,
    Udp,
    Udp6,
    UnixStream,
    UnixDgram,
}

impl SocketKind {
    pub fn name(&self) -> &'static str {
        match self {
            SocketKind::Tcp => "tcp",
            SocketKind::Tcp6 => "tcp6",
            SocketKind::Udp => "udp",
            SocketKind::Udp6 => "udp6",
            SocketKind::UnixStream => "unix-stream",
            SocketKind::UnixDgram => "unix-dgram",
        }
    }

    pub fn is_stream(&self) -> bool {
        matches!(self, SocketKind::Tcp | SocketKind::Tcp6 | SocketKind::UnixStream)
    }

    pub fn is_unix(&self) -> bool {
        matches!(self, SocketKind::UnixStream | SocketKind::UnixDgram)
    }

    pub fn is_ipv6(&self) -> bool {
        matches!(self, SocketKind::Tcp6 | SocketKind::Udp6)
    }

    /// `transport()` option value of the `network()` driver
    pub fn transport(&self) -> &'static str {
        if self.is_stream() { "tcp" } else { "udp" }
    }

    /// Loopback address of the matching family
    pub fn loopback(&self, port: u16) -> SocketAddr {
        if self.is_ipv6() {
            SocketAddr::from((Ipv6Addr::LOCALHOST, port))
        } else {
            SocketAddr::from((Ipv4Addr::LOCALHOST, port))
        }
    }
}

impl fmt::Display for SocketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where a socket lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SocketAddress {
    Inet(SocketAddr),
    Unix(PathBuf),
}

impl fmt::Display for SocketAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SocketAddress::Inet(addr) => write!(f, "{addr}"),
            SocketAddress::Unix(path) => write!(f, "{}", path.display()),
        }
    }
}

fn check_address(kind: SocketKind, address: &SocketAddress) -> Result<()> {
    let matches = match address {
        SocketAddress::Inet(addr) => !kind.is_unix() && addr.is_ipv6() == kind.is_ipv6(),
        SocketAddress::Unix(_) => kind.is_unix(),
    };
    if matches {
        Ok(())
    } else {
        Err(LightError::transport(
            address.to_string(),
            format!("address does not fit a {kind} socket"),
        ))
    }
}

// ============================================================================
// Sender
// ============================================================================

/// Client side of a socket source
#[derive(Debug)]
pub struct SocketSender {
    kind: SocketKind,
    address: SocketAddress,
    poller: Poller,
    send_delay: Option<Duration>,
    stats: IoStats,
}

impl SocketSender {
    pub fn new(kind: SocketKind, address: SocketAddress, poller: Poller) -> Result<Self> {
        check_address(kind, &address)?;
        Ok(Self {
            kind,
            address,
            poller,
            send_delay: None,
            stats: IoStats::default(),
        })
    }

    /// Sleep this long after every write
    pub fn with_send_delay(mut self, delay: Duration) -> Self {
        self.send_delay = Some(delay);
        self
    }

    pub fn kind(&self) -> SocketKind {
        self.kind
    }

    pub fn address(&self) -> &SocketAddress {
        &self.address
    }

    fn endpoint(&self) -> String {
        format!("{}://{}", self.kind, self.address)
    }

    fn connect_stream(&self) -> std::io::Result<Box<dyn Write>> {
        match &self.address {
            SocketAddress::Inet(addr) => Ok(Box::new(TcpStream::connect(addr)?)),
            SocketAddress::Unix(path) => Ok(Box::new(UnixStream::connect(path)?)),
        }
    }

    fn send_datagram(&self, content: &[u8]) -> std::io::Result<usize> {
        match &self.address {
            SocketAddress::Inet(addr) => {
                let local: SocketAddr = if addr.is_ipv6() {
                    (Ipv6Addr::UNSPECIFIED, 0).into()
                } else {
                    (Ipv4Addr::UNSPECIFIED, 0).into()
                };
                UdpSocket::bind(local)?.send_to(content, addr)
            }
            SocketAddress::Unix(path) => UnixDatagram::unbound()?.send_to(content, path),
        }
    }
}

impl DriverIo for SocketSender {
    fn name(&self) -> &str {
        self.kind.name()
    }

    fn write(&mut self, content: &[u8]) -> Result<()> {
        if self.kind.is_stream() {
            let mut stream = self
                .connect_stream()
                .map_err(|e| LightError::transport(self.endpoint(), e))?;
            stream
                .write_all(content)
                .and_then(|_| stream.flush())
                .map_err(|e| LightError::transport(self.endpoint(), e))?;
        } else {
            let sent = self
                .send_datagram(content)
                .map_err(|e| LightError::transport(self.endpoint(), e))?;
            if sent != content.len() {
                return Err(LightError::transport(
                    self.endpoint(),
                    format!("datagram truncated: {sent} of {} bytes sent", content.len()),
                ));
            }
        }
        trace!(endpoint = %self.endpoint(), bytes = content.len(), "sent");
        self.stats.record_write(content.len());
        if let Some(delay) = self.send_delay {
            std::thread::sleep(delay);
        }
        Ok(())
    }

    /// Stream kinds poll until a connection is accepted; datagrams have no
    /// creation concept
    ///
    /// Every successful check opens and closes a real connection, which the
    /// daemon counts in its connection statistics.
    fn wait_for_creation(&mut self) -> bool {
        if !self.kind.is_stream() {
            return true;
        }
        let connected = self.poller.wait_until_true(|| self.connect_stream().is_ok());
        if !connected {
            debug!(endpoint = %self.endpoint(), "socket never accepted a connection");
        }
        connected
    }

    fn get_stats(&self) -> IoStats {
        self.stats
    }
}

// ============================================================================
// Listener
// ============================================================================

/// Cloneable handle that stops a running listener
#[derive(Debug, Clone)]
pub struct ListenerStop(Arc<AtomicBool>);

impl ListenerStop {
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Server side of a socket destination
#[derive(Debug)]
pub struct SocketListener {
    kind: SocketKind,
    address: SocketAddress,
    chunks: Receiver<Vec<u8>>,
    stop: ListenerStop,
    worker: Option<JoinHandle<()>>,
    stats: IoStats,
}

impl SocketListener {
    /// Bind `address` and start receiving in the background
    pub fn start(kind: SocketKind, address: SocketAddress, poller: Poller) -> Result<Self> {
        check_address(kind, &address)?;
        let endpoint = format!("{kind}://{address}");
        let (tx, rx) = unbounded();
        let stop = ListenerStop(Arc::new(AtomicBool::new(false)));
        let interval = poller.interval().max(Duration::from_millis(1));

        if let SocketAddress::Unix(path) = &address {
            // stale socket file from an earlier run would make bind fail
            if path.exists() {
                std::fs::remove_file(path)?;
            }
        }

        let bind_err = |e: std::io::Error| LightError::transport(endpoint.clone(), e);
        let flag = stop.clone();
        let worker = match (&address, kind.is_stream()) {
            (SocketAddress::Inet(addr), true) => {
                let listener = TcpListener::bind(addr).map_err(bind_err)?;
                listener.set_nonblocking(true)?;
                spawn_named(&endpoint, move || {
                    accept_loop(|| listener.accept().map(|(s, _)| s), tx, flag, interval, |s: &TcpStream| {
                        s.set_nonblocking(false)?;
                        s.set_read_timeout(Some(interval))
                    })
                })?
            }
            (SocketAddress::Unix(path), true) => {
                let listener = UnixListener::bind(path).map_err(bind_err)?;
                listener.set_nonblocking(true)?;
                spawn_named(&endpoint, move || {
                    accept_loop(|| listener.accept().map(|(s, _)| s), tx, flag, interval, |s: &UnixStream| {
                        s.set_nonblocking(false)?;
                        s.set_read_timeout(Some(interval))
                    })
                })?
            }
            (SocketAddress::Inet(addr), false) => {
                let socket = UdpSocket::bind(addr).map_err(bind_err)?;
                socket.set_read_timeout(Some(interval))?;
                spawn_named(&endpoint, move || receive_loop(|buf| socket.recv(buf), tx, flag))?
            }
            (SocketAddress::Unix(path), false) => {
                let socket = UnixDatagram::bind(path).map_err(bind_err)?;
                socket.set_read_timeout(Some(interval))?;
                spawn_named(&endpoint, move || receive_loop(|buf| socket.recv(buf), tx, flag))?
            }
        };
        debug!(%endpoint, "listener bound");

        Ok(Self {
            kind,
            address,
            chunks: rx,
            stop,
            worker: Some(worker),
            stats: IoStats::default(),
        })
    }

    pub fn kind(&self) -> SocketKind {
        self.kind
    }

    pub fn address(&self) -> &SocketAddress {
        &self.address
    }

    pub fn stop_handle(&self) -> ListenerStop {
        self.stop.clone()
    }

    /// Stop receiving and release the endpoint
    ///
    /// Chunks that already arrived stay readable.
    pub fn stop(&mut self) {
        self.stop.stop();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!(address = %self.address, "listener thread panicked");
            }
        }
        if let SocketAddress::Unix(path) = &self.address {
            let _ = std::fs::remove_file(path);
        }
    }
}

impl DriverIo for SocketListener {
    fn name(&self) -> &str {
        self.kind.name()
    }

    fn read(&mut self) -> Result<Vec<u8>> {
        let mut content = Vec::new();
        for chunk in self.chunks.try_iter() {
            content.extend_from_slice(&chunk);
        }
        if !content.is_empty() {
            self.stats.record_read(content.len());
        }
        Ok(content)
    }

    fn get_stats(&self) -> IoStats {
        self.stats
    }
}

impl Drop for SocketListener {
    fn drop(&mut self) {
        self.stop();
    }
}

fn spawn_named(endpoint: &str, body: impl FnOnce() + Send + 'static) -> Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name(format!("listener {endpoint}"))
        .spawn(body)
        .map_err(Into::into)
}

fn is_timeout(e: &std::io::Error) -> bool {
    matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted)
}

/// Accept connections until stopped
///
/// Each connection is read to EOF before the next one is accepted, so chunks
/// reach the channel in connection order. Pending peers wait in the backlog.
fn accept_loop<S: Read>(
    mut accept: impl FnMut() -> std::io::Result<S>,
    tx: Sender<Vec<u8>>,
    stop: ListenerStop,
    interval: Duration,
    prepare: impl Fn(&S) -> std::io::Result<()>,
) {
    while !stop.is_stopped() {
        match accept() {
            Ok(stream) => {
                if let Err(e) = prepare(&stream) {
                    warn!(error = %e, "cannot configure accepted connection");
                    continue;
                }
                trace!("connection accepted");
                if !stream_loop(stream, &tx, &stop) {
                    break;
                }
            }
            Err(e) if is_timeout(&e) => std::thread::sleep(interval),
            Err(e) => {
                warn!(error = %e, "accept failed");
                std::thread::sleep(interval);
            }
        }
    }
}

/// Forward one connection; false once the consumer is gone
fn stream_loop(mut stream: impl Read, tx: &Sender<Vec<u8>>, stop: &ListenerStop) -> bool {
    let mut buf = vec![0u8; RECV_BUFFER];
    while !stop.is_stopped() {
        match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                if tx.send(buf[..n].to_vec()).is_err() {
                    return false;
                }
            }
            Err(e) if is_timeout(&e) => continue,
            Err(e) => {
                debug!(error = %e, "connection closed with error");
                break;
            }
        }
    }
    true
}

fn receive_loop(
    mut recv: impl FnMut(&mut [u8]) -> std::io::Result<usize>,
    tx: Sender<Vec<u8>>,
    stop: ListenerStop,
) {
    let mut buf = vec![0u8; RECV_BUFFER];
    while !stop.is_stopped() {
        match recv(&mut buf) {
            Ok(n) => {
                if tx.send(buf[..n].to_vec()).is_err() {
                    break;
                }
            }
            Err(e) if is_timeout(&e) => continue,
            Err(e) => {
                warn!(error = %e, "receive failed");
                break;
            }
        }
    }
}

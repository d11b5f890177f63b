//! APRS-IS forwarding client.
//!
//! [`AprsIsClient`] owns the TCP connection to an APRS-IS server.  A single
//! background task (the *worker*) logs in, drains the outbound frame queue
//! one frame at a time, reads inbound lines, and reconnects after failures.
//!
//! # State machine
//!
//! ```text
//!              connect + banner + login + ack OK
//! Disconnected ─────────────────────────────────▶ Connected
//!      ▲  │                                            │
//!      │  └─ any handshake failure:                    │ read/write failure
//!      │     close socket, schedule reconnect          │
//!      └───────────────────────────────────────────────┘
//! ```
//!
//! The first connection attempt happens immediately.  Every failure starts
//! the reconnect timer (1, 2, … 10 minutes); the next attempt happens once
//! that timer has been clocked down to zero.
//!
//! # Threading model
//!
//! The rest of the process talks to the worker only through:
//!
//! - the [`FrameQueue`] (frames in),
//! - an atomic tick accumulator fed by [`AprsIsClient::clock`],
//! - atomic status fields read by [`AprsIsClient::status`],
//! - the registered [`LineSink`], invoked on the worker for each inbound line.
//!
//! All connection state lives inside the worker and is never touched from
//! the producer side.
//!
//! # Delivery guarantees
//!
//! At most once.  A frame that was dequeued when the write failed is lost,
//! and frames offered while the link is down are refused by
//! [`AprsIsClient::write`].

use std::io;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use aprs_core::protocol::{dump_frame, is_server_comment, rtrim, terminate};
use aprs_core::queue::DEFAULT_QUEUE_CAPACITY;
use aprs_core::{Credentials, CredentialsError, FrameQueue, LoginRequest, ReconnectScheduler};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, error, info, warn};

use super::line_codec::{LineCodec, ReadOutcome};
use crate::application::relay::Uplink;

/// Timeout for connecting and for each handshake read.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// How long a connected worker waits for an inbound line per iteration.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(10);

/// Sleep between iterations when there is nothing to do.
pub const IDLE_SLICE: Duration = Duration::from_millis(20);

/// Default APRS-IS user-defined filter port.
pub const DEFAULT_APRS_IS_PORT: u16 = 14580;

/// Software name announced in the login line.
pub const DEFAULT_CLIENT_NAME: &str = "APRSGateway";

// ── Errors ────────────────────────────────────────────────────────────────────

/// Rejected construction arguments.  Never retried.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClientConfigError {
    #[error("invalid credentials: {0}")]
    Credentials(#[from] CredentialsError),
    #[error("server address must not be empty")]
    EmptyServer,
    #[error("server port must be non-zero")]
    InvalidPort,
    #[error("client name must not be empty")]
    EmptyClientName,
}

/// Which handshake line was being awaited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeStage {
    Banner,
    Acknowledgement,
}

impl std::fmt::Display for HandshakeStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Banner => f.write_str("login banner"),
            Self::Acknowledgement => f.write_str("login acknowledgement"),
        }
    }
}

/// Link failures.  All of them are recovered by the reconnect schedule.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("could not connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("connecting to {addr} timed out after {timeout:?}")]
    ConnectTimeout { addr: String, timeout: Duration },
    #[error("no {stage} from the APRS-IS server after {timeout:?}")]
    NoReply {
        stage: HandshakeStage,
        timeout: Duration,
    },
    #[error("error reading the {stage} from the APRS-IS server: {source}")]
    HandshakeRead {
        stage: HandshakeStage,
        #[source]
        source: io::Error,
    },
    #[error("error sending the login line: {0}")]
    HandshakeWrite(#[source] io::Error),
    #[error("connection to the APRS-IS server failed: {0}")]
    Transport(#[source] io::Error),
}

// ── Configuration ─────────────────────────────────────────────────────────────

/// Construction inputs for [`AprsIsClient`].
#[derive(Debug, Clone)]
pub struct AprsIsConfig {
    /// APRS-IS server host name or IP address.
    pub server: String,
    /// APRS-IS server TCP port.
    pub port: u16,
    /// Station callsign; normalised to upper case, at most 8 characters.
    pub callsign: String,
    /// APRS-IS passcode (`-1` for receive-only).
    pub passcode: String,
    /// Software name announced after `vers`.
    pub client_name: String,
    /// Software version announced after the client name.
    pub version: String,
    /// Optional server-side filter appended to the login line.
    pub filter: Option<String>,
    /// Dump every outbound frame to the debug log.
    pub debug: bool,
    /// Timeout for connecting and for each handshake read.
    pub read_timeout: Duration,
    /// Inbound wait per connected iteration.
    pub poll_timeout: Duration,
    /// Outbound queue byte budget.
    pub queue_capacity: usize,
}

impl AprsIsConfig {
    /// Creates a config with default timeouts, client name, and queue size.
    pub fn new(
        server: impl Into<String>,
        port: u16,
        callsign: impl Into<String>,
        passcode: impl Into<String>,
    ) -> Self {
        Self {
            server: server.into(),
            port,
            callsign: callsign.into(),
            passcode: passcode.into(),
            client_name: DEFAULT_CLIENT_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            filter: None,
            debug: false,
            read_timeout: DEFAULT_READ_TIMEOUT,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }

    fn validate(self) -> Result<Settings, ClientConfigError> {
        let credentials = Credentials::new(&self.callsign, &self.passcode)?;
        let server = self.server.trim();
        if server.is_empty() {
            return Err(ClientConfigError::EmptyServer);
        }
        if self.port == 0 {
            return Err(ClientConfigError::InvalidPort);
        }
        if self.client_name.trim().is_empty() {
            return Err(ClientConfigError::EmptyClientName);
        }

        Ok(Settings {
            address: format!("{server}:{}", self.port),
            login: LoginRequest {
                credentials,
                client_name: self.client_name.trim().to_string(),
                version: self.version,
                filter: self.filter,
            },
            debug: self.debug,
            read_timeout: self.read_timeout,
            poll_timeout: self.poll_timeout,
        })
    }
}

/// Validated, immutable worker settings.
#[derive(Debug)]
struct Settings {
    address: String,
    login: LoginRequest,
    debug: bool,
    read_timeout: Duration,
    poll_timeout: Duration,
}

// ── Inbound sink ──────────────────────────────────────────────────────────────

/// Receives inbound APRS-IS lines (server comments already filtered out).
///
/// Called on the worker task; implementations must return promptly because
/// the next socket read waits for them.
pub trait LineSink: Send {
    fn deliver(&mut self, line: &str);
}

impl<F> LineSink for F
where
    F: FnMut(&str) + Send,
{
    fn deliver(&mut self, line: &str) {
        self(line)
    }
}

// ── Shared state ──────────────────────────────────────────────────────────────

/// Point-in-time view of the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkStatus {
    /// `true` after a completed handshake, until the next failure.
    pub connected: bool,
    /// Consecutive failed attempts (0 while connected).
    pub attempts: u32,
    /// Delay of the pending reconnect, zero when none is scheduled.
    pub reconnect_delay: Duration,
    /// Frames waiting in the outbound queue.
    pub queued_frames: usize,
}

struct Shared {
    queue: FrameQueue,
    /// Wakes the worker early: a frame was queued or stop was requested.
    wake: Notify,
    running: AtomicBool,
    connected: AtomicBool,
    attempts: AtomicU32,
    reconnect_delay_ms: AtomicU64,
    /// Milliseconds clocked by the driving loop, not yet applied to the timer.
    pending_ms: AtomicU64,
    sink: Mutex<Option<Box<dyn LineSink>>>,
}

impl Shared {
    fn new(queue_capacity: usize) -> Self {
        Self {
            queue: FrameQueue::new(queue_capacity),
            wake: Notify::new(),
            running: AtomicBool::new(false),
            connected: AtomicBool::new(false),
            attempts: AtomicU32::new(0),
            reconnect_delay_ms: AtomicU64::new(0),
            pending_ms: AtomicU64::new(0),
            sink: Mutex::new(None),
        }
    }
}

// ── Public client ─────────────────────────────────────────────────────────────

/// Handle to the APRS-IS forwarding client.
///
/// # Example
///
/// ```no_run
/// use aprs_gateway::infrastructure::network::{AprsIsClient, AprsIsConfig};
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = AprsIsConfig::new("euro.aprs2.net", 14580, "N0CALL", "12345");
/// let mut client = AprsIsClient::new(config)?;
/// client.set_read_callback(|line: &str| println!("{line}"));
/// client.start();
///
/// client.clock(20);
/// let accepted = client.write(b"N0CALL>APRS:>hello\r\n");
///
/// client.stop().await;
/// # let _ = accepted;
/// # Ok(())
/// # }
/// ```
pub struct AprsIsClient {
    settings: Arc<Settings>,
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl AprsIsClient {
    /// Validates `config` and creates a stopped client.
    ///
    /// # Errors
    ///
    /// Returns [`ClientConfigError`] for an empty callsign, passcode, server
    /// or client name, or a zero port.
    pub fn new(config: AprsIsConfig) -> Result<Self, ClientConfigError> {
        let queue_capacity = config.queue_capacity;
        let settings = config.validate()?;
        Ok(Self {
            settings: Arc::new(settings),
            shared: Arc::new(Shared::new(queue_capacity)),
            worker: None,
        })
    }

    /// Spawns the worker task.  Must be called inside a Tokio runtime.
    /// Calling it again while the worker runs has no effect.
    pub fn start(&mut self) {
        if self.worker.is_some() {
            return;
        }
        self.shared.running.store(true, Ordering::Release);
        let worker = Worker::new(Arc::clone(&self.settings), Arc::clone(&self.shared));
        self.worker = Some(tokio::spawn(worker.run()));
    }

    /// Requests shutdown and waits for the worker to exit.
    ///
    /// The worker closes the socket and discards queued frames.
    pub async fn stop(&mut self) {
        self.shared.running.store(false, Ordering::Release);
        self.shared.wake.notify_one();

        if let Some(handle) = self.worker.take() {
            if let Err(e) = handle.await {
                error!("APRS-IS writer task ended abnormally: {e}");
            }
        }
    }

    /// Queues one binary frame for transmission.
    ///
    /// Returns `false` without queueing when the link is down, the frame is
    /// empty or too large, or the queue lacks room.
    pub fn write(&self, data: &[u8]) -> bool {
        if !self.is_connected() {
            return false;
        }
        match self.shared.queue.enqueue(data) {
            Ok(()) => {
                self.shared.wake.notify_one();
                true
            }
            Err(e) => {
                debug!("outbound frame refused: {e}");
                false
            }
        }
    }

    /// Queues one text message, adding a CR LF terminator when missing.
    pub fn write_message(&self, message: &str) -> bool {
        self.write(terminate(message).as_bytes())
    }

    /// Registers the inbound line sink, replacing any previous one.
    pub fn set_read_callback(&self, sink: impl LineSink + 'static) {
        let mut slot = self.shared.sink.lock().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(Box::new(sink));
    }

    /// Advances the reconnect timer by `elapsed_ms`.
    ///
    /// Call roughly every 20–30 ms.  Calling less often only delays
    /// reconnection.
    pub fn clock(&self, elapsed_ms: u64) {
        self.shared.pending_ms.fetch_add(elapsed_ms, Ordering::AcqRel);
    }

    /// Returns `true` while the link is logged in.
    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Acquire)
    }

    /// Returns a snapshot of the link state.
    pub fn status(&self) -> LinkStatus {
        LinkStatus {
            connected: self.is_connected(),
            attempts: self.shared.attempts.load(Ordering::Acquire),
            reconnect_delay: Duration::from_millis(
                self.shared.reconnect_delay_ms.load(Ordering::Acquire),
            ),
            queued_frames: self.shared.queue.len(),
        }
    }

    #[cfg(test)]
    fn worker(&self) -> Worker {
        Worker::new(Arc::clone(&self.settings), Arc::clone(&self.shared))
    }
}

impl Uplink for AprsIsClient {
    fn write(&self, frame: &[u8]) -> bool {
        AprsIsClient::write(self, frame)
    }

    fn clock(&self, elapsed_ms: u64) {
        AprsIsClient::clock(self, elapsed_ms)
    }
}

impl Drop for AprsIsClient {
    fn drop(&mut self) {
        // Let a detached worker wind down on its next iteration.
        self.shared.running.store(false, Ordering::Release);
        self.shared.wake.notify_one();
    }
}

impl std::fmt::Debug for AprsIsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AprsIsClient")
            .field("address", &self.settings.address)
            .field("status", &self.status())
            .finish()
    }
}

// ── Worker ────────────────────────────────────────────────────────────────────

/// Byte stream carrying the line protocol.  A `TcpStream` in production.
trait LinkStream: AsyncRead + AsyncWrite + Unpin + Send + Sync {}

impl<T> LinkStream for T where T: AsyncRead + AsyncWrite + Unpin + Send + Sync {}

type Link = LineCodec<Box<dyn LinkStream>>;

/// Connection state owned by the worker task.
struct Worker {
    settings: Arc<Settings>,
    shared: Arc<Shared>,
    scheduler: ReconnectScheduler,
    /// `Some` exactly while connected.
    link: Option<Link>,
    attempted: bool,
}

impl Worker {
    fn new(settings: Arc<Settings>, shared: Arc<Shared>) -> Self {
        Self {
            settings,
            shared,
            scheduler: ReconnectScheduler::new(),
            link: None,
            attempted: false,
        }
    }

    async fn run(mut self) {
        info!("starting the APRS-IS writer for {}", self.settings.address);

        while self.shared.running.load(Ordering::Acquire) {
            self.step().await;
        }

        self.shutdown().await;
        info!("stopped the APRS-IS writer");
    }

    /// One iteration of the state machine.
    async fn step(&mut self) {
        let elapsed = self.shared.pending_ms.swap(0, Ordering::AcqRel);
        self.scheduler.clock(elapsed);

        if self.link.is_some() {
            self.step_connected().await;
        } else {
            self.step_disconnected().await;
        }
    }

    async fn step_disconnected(&mut self) {
        let due = if !self.attempted {
            true
        } else if self.scheduler.has_expired() {
            self.scheduler.stop();
            true
        } else {
            false
        };

        if !due {
            self.idle().await;
            return;
        }

        self.attempted = true;
        let Some(result) = self.connect_unless_stopped().await else {
            info!("connect attempt abandoned on shutdown");
            return;
        };
        match result {
            Ok(link) => {
                self.link = Some(link);
                self.scheduler.reset();
                self.shared.attempts.store(0, Ordering::Release);
                self.shared.reconnect_delay_ms.store(0, Ordering::Release);
                self.shared.connected.store(true, Ordering::Release);
                info!("connected to the APRS-IS server {}", self.settings.address);
            }
            Err(e) => {
                error!("connect attempt to the APRS-IS server failed: {e}");
                self.schedule_reconnect();
            }
        }
    }

    async fn step_connected(&mut self) {
        let Some(link) = self.link.as_mut() else {
            return;
        };

        if let Some(frame) = self.shared.queue.dequeue() {
            if self.settings.debug {
                dump_frame("APRS-IS frame", frame.as_bytes());
            }
            if let Err(e) = link.write_frame(frame.as_bytes()).await {
                self.drop_link(LinkError::Transport(e)).await;
                return;
            }
        }

        // Don't sit on queued frames waiting for the server to talk.
        let wait = if self.shared.queue.is_empty() {
            self.settings.poll_timeout
        } else {
            Duration::ZERO
        };

        let outcome = tokio::select! {
            outcome = link.read_line(wait) => outcome,
            _ = self.shared.wake.notified() => ReadOutcome::TimedOut,
        };

        match outcome {
            ReadOutcome::Line(raw) => {
                let line = rtrim(&raw);
                if line.is_empty() {
                    return;
                }
                if is_server_comment(line) {
                    debug!("APRS-IS server: {line}");
                } else {
                    self.deliver(line);
                }
            }
            ReadOutcome::TimedOut => {}
            ReadOutcome::Failed(e) => self.drop_link(LinkError::Transport(e)).await,
        }
    }

    /// Runs [`Worker::connect`] but gives up as soon as stop is requested.
    /// Returns `None` when the attempt was abandoned.
    async fn connect_unless_stopped(&self) -> Option<Result<Link, LinkError>> {
        let attempt = self.connect();
        tokio::pin!(attempt);

        loop {
            tokio::select! {
                result = &mut attempt => return Some(result),
                _ = self.shared.wake.notified() => {
                    if !self.shared.running.load(Ordering::Acquire) {
                        return None;
                    }
                }
            }
        }
    }

    async fn connect(&self) -> Result<Link, LinkError> {
        let addr = &self.settings.address;
        let timeout = self.settings.read_timeout;

        let stream = match time::timeout(timeout, TcpStream::connect(addr.as_str())).await {
            Err(_) => {
                return Err(LinkError::ConnectTimeout {
                    addr: addr.clone(),
                    timeout,
                })
            }
            Ok(Err(source)) => {
                return Err(LinkError::Connect {
                    addr: addr.clone(),
                    source,
                })
            }
            Ok(Ok(stream)) => stream,
        };
        if let Err(e) = stream.set_nodelay(true) {
            debug!("could not disable Nagle on the APRS-IS socket: {e}");
        }

        let mut link: Link = LineCodec::new(Box::new(stream));
        if let Err(e) = self.handshake(&mut link).await {
            link.close().await;
            return Err(e);
        }
        Ok(link)
    }

    /// Banner, login line, acknowledgement, in that order.
    async fn handshake(&self, link: &mut Link) -> Result<(), LinkError> {
        let banner = self.expect_line(link, HandshakeStage::Banner).await?;
        info!("received login banner: {}", rtrim(&banner));

        link.write_line(&self.settings.login.to_line())
            .await
            .map_err(LinkError::HandshakeWrite)?;

        let ack = self.expect_line(link, HandshakeStage::Acknowledgement).await?;
        let ack = rtrim(&ack);
        info!("response from the APRS-IS server: {ack}");
        if ack.contains("unverified") {
            warn!("APRS-IS login is unverified; frames will not be gated by the server");
        }
        Ok(())
    }

    async fn expect_line(
        &self,
        link: &mut Link,
        stage: HandshakeStage,
    ) -> Result<String, LinkError> {
        let timeout = self.settings.read_timeout;
        match link.read_line(timeout).await {
            ReadOutcome::Line(line) => Ok(line),
            ReadOutcome::TimedOut => Err(LinkError::NoReply { stage, timeout }),
            ReadOutcome::Failed(source) => Err(LinkError::HandshakeRead { stage, source }),
        }
    }

    /// Connected → Disconnected: close, publish, schedule one reconnect.
    async fn drop_link(&mut self, reason: LinkError) {
        error!("{reason}");
        if let Some(mut link) = self.link.take() {
            link.close().await;
        }
        self.shared.connected.store(false, Ordering::Release);
        self.schedule_reconnect();
    }

    fn schedule_reconnect(&mut self) {
        // The new timer counts from now; ticks clocked during the failed
        // attempt belong to no timer.
        self.shared.pending_ms.store(0, Ordering::Release);
        let delay = self.scheduler.start_reconnection_timer();
        self.shared
            .attempts
            .store(self.scheduler.attempts(), Ordering::Release);
        self.shared.reconnect_delay_ms.store(
            u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            Ordering::Release,
        );
    }

    /// Hands one line to the registered sink.  A panicking sink is logged
    /// and the worker carries on.
    fn deliver(&self, line: &str) {
        let mut slot = self.shared.sink.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(sink) = slot.as_mut() else {
            return;
        };
        if catch_unwind(AssertUnwindSafe(|| sink.deliver(line))).is_err() {
            error!("read callback panicked while handling: {line}");
        }
    }

    async fn idle(&self) {
        tokio::select! {
            _ = time::sleep(IDLE_SLICE) => {}
            _ = self.shared.wake.notified() => {}
        }
    }

    async fn shutdown(&mut self) {
        if let Some(mut link) = self.link.take() {
            link.close().await;
        }
        self.shared.connected.store(false, Ordering::Release);

        let dropped = self.shared.queue.drain();
        if dropped > 0 {
            info!("discarded {dropped} queued frame(s) on shutdown");
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;
    use tokio::sync::{mpsc, oneshot};

    const BANNER: &[u8] = b"# aprsc 2.1.4\r\n";
    const ACK: &[u8] = b"# logresp N0CALL verified, server T2TEST\r\n";

    fn config(port: u16) -> AprsIsConfig {
        AprsIsConfig {
            version: "1.0.0".to_string(),
            read_timeout: Duration::from_millis(500),
            poll_timeout: Duration::from_millis(50),
            ..AprsIsConfig::new("127.0.0.1", port, "n0call", "12345")
        }
    }

    /// A port with nothing listening on it.
    async fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    /// Fake server: banner, read login, ack, then forward every received
    /// line to `lines_tx` and send `inbound` to the client.
    async fn spawn_server(
        inbound: &'static [u8],
    ) -> (u16, oneshot::Receiver<String>, mpsc::UnboundedReceiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (login_tx, login_rx) = oneshot::channel();
        let (lines_tx, lines_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = stream.into_split();
            let mut reader = BufReader::new(read_half);

            write_half.write_all(BANNER).await.unwrap();
            let mut login = String::new();
            reader.read_line(&mut login).await.unwrap();
            let _ = login_tx.send(login);
            write_half.write_all(ACK).await.unwrap();
            write_half.write_all(inbound).await.unwrap();

            loop {
                let mut line = String::new();
                match reader.read_line(&mut line).await {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {
                        if lines_tx.send(line).is_err() {
                            break;
                        }
                    }
                }
            }
        });

        (port, login_rx, lines_rx)
    }

    // ── Construction ──────────────────────────────────────────────────────────

    #[test]
    fn test_new_rejects_empty_callsign() {
        let cfg = AprsIsConfig::new("rotate.aprs2.net", 14580, "", "123");
        assert_eq!(
            AprsIsClient::new(cfg).unwrap_err(),
            ClientConfigError::Credentials(CredentialsError::EmptyCallsign)
        );
    }

    #[test]
    fn test_new_rejects_empty_passcode() {
        let cfg = AprsIsConfig::new("rotate.aprs2.net", 14580, "N0CALL", "");
        assert_eq!(
            AprsIsClient::new(cfg).unwrap_err(),
            ClientConfigError::Credentials(CredentialsError::EmptyPasscode)
        );
    }

    #[test]
    fn test_new_rejects_empty_server_and_zero_port() {
        let no_server = AprsIsConfig::new("  ", 14580, "N0CALL", "1");
        let no_port = AprsIsConfig::new("rotate.aprs2.net", 0, "N0CALL", "1");

        assert_eq!(
            AprsIsClient::new(no_server).unwrap_err(),
            ClientConfigError::EmptyServer
        );
        assert_eq!(
            AprsIsClient::new(no_port).unwrap_err(),
            ClientConfigError::InvalidPort
        );
    }

    #[test]
    fn test_write_is_refused_while_disconnected() {
        let client = AprsIsClient::new(config(14580)).unwrap();

        assert!(!client.write(b"N0CALL>APRS:>hi\r\n"));
        assert_eq!(client.status().queued_frames, 0);
    }

    #[test]
    fn test_new_client_status_is_idle() {
        let client = AprsIsClient::new(config(14580)).unwrap();
        assert_eq!(
            client.status(),
            LinkStatus {
                connected: false,
                attempts: 0,
                reconnect_delay: Duration::ZERO,
                queued_frames: 0,
            }
        );
    }

    // ── Handshake ─────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_successful_handshake_connects_and_resets_attempts() {
        // Arrange
        let (port, login_rx, _lines) = spawn_server(b"").await;
        let client = AprsIsClient::new(config(port)).unwrap();
        let mut worker = client.worker();

        // Act
        worker.step().await;

        // Assert
        assert!(worker.link.is_some());
        assert_eq!(worker.scheduler.attempts(), 0);
        assert!(client.is_connected());
        assert_eq!(client.status().attempts, 0);
        assert_eq!(
            login_rx.await.unwrap(),
            "user N0CALL pass 12345 vers APRSGateway 1.0.0\r\n"
        );
    }

    #[tokio::test]
    async fn test_login_line_carries_filter() {
        let (port, login_rx, _lines) = spawn_server(b"").await;
        let cfg = AprsIsConfig {
            filter: Some("r/51.5/-0.1/50".to_string()),
            ..config(port)
        };
        let client = AprsIsClient::new(cfg).unwrap();
        let mut worker = client.worker();

        worker.step().await;

        assert!(login_rx.await.unwrap().ends_with(" filter r/51.5/-0.1/50\r\n"));
    }

    #[tokio::test]
    async fn test_server_closing_after_banner_schedules_first_reconnect() {
        // Arrange: banner, then hang up before the acknowledgement.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            stream.write_all(BANNER).await.unwrap();
        });
        let client = AprsIsClient::new(config(port)).unwrap();
        let mut worker = client.worker();

        // Act
        worker.step().await;

        // Assert
        assert!(worker.link.is_none());
        assert!(!client.is_connected());
        assert_eq!(worker.scheduler.attempts(), 1);
        assert!(worker.scheduler.is_running());
        assert_eq!(client.status().reconnect_delay, Duration::from_millis(60_000));
    }

    #[tokio::test]
    async fn test_silent_server_is_a_no_reply_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            time::sleep(Duration::from_secs(5)).await;
        });
        let cfg = AprsIsConfig {
            read_timeout: Duration::from_millis(100),
            ..config(port)
        };
        let client = AprsIsClient::new(cfg).unwrap();
        let worker = client.worker();

        let result = worker.connect().await;

        assert!(matches!(
            result,
            Err(LinkError::NoReply {
                stage: HandshakeStage::Banner,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_three_refused_connections_back_off_linearly() {
        // Arrange
        let port = closed_port().await;
        let client = AprsIsClient::new(config(port)).unwrap();
        let mut worker = client.worker();
        let mut observed = Vec::new();

        // Act: first attempt is immediate; later ones wait for the timer.
        worker.step().await;
        observed.push(client.status());

        for minutes in 1..=2u64 {
            worker.step().await;
            assert_eq!(
                client.status().attempts,
                minutes as u32,
                "no attempt may happen before the timer expires"
            );
            client.clock(minutes * 60_000);
            worker.step().await;
            observed.push(client.status());
        }

        // Assert
        let attempts: Vec<u32> = observed.iter().map(|s| s.attempts).collect();
        let delays: Vec<Duration> = observed.iter().map(|s| s.reconnect_delay).collect();
        assert_eq!(attempts, vec![1, 2, 3]);
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(60_000),
                Duration::from_millis(120_000),
                Duration::from_millis(180_000),
            ]
        );
    }

    // ── Connected state ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_frames_are_sent_one_per_iteration_in_order() {
        // Arrange
        let (port, _login, mut lines) = spawn_server(b"").await;
        let client = AprsIsClient::new(config(port)).unwrap();
        let mut worker = client.worker();
        worker.step().await;
        assert!(client.is_connected());

        for n in 1..=3 {
            assert!(client.write_message(&format!("N0CALL>APRS:>frame {n}")));
        }

        // Act
        worker.step().await;
        assert_eq!(client.status().queued_frames, 2);
        worker.step().await;
        worker.step().await;

        // Assert
        let mut received = Vec::new();
        for _ in 0..3 {
            received.push(lines.recv().await.unwrap());
        }
        assert_eq!(
            received,
            vec![
                "N0CALL>APRS:>frame 1\r\n",
                "N0CALL>APRS:>frame 2\r\n",
                "N0CALL>APRS:>frame 3\r\n",
            ]
        );
    }

    #[tokio::test]
    async fn test_inbound_comments_are_dropped_and_data_is_delivered() {
        // Arrange
        let (port, _login, _lines) =
            spawn_server(b"# aprsc keepalive\r\n\r\nG4KLX>APRS,TCPIP*:>hello\r\n").await;
        let client = AprsIsClient::new(config(port)).unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        client.set_read_callback(move |line: &str| {
            let _ = tx.send(line.to_string());
        });
        let mut worker = client.worker();

        // Act
        for _ in 0..5 {
            worker.step().await;
        }

        // Assert
        assert_eq!(rx.recv().await.unwrap(), "G4KLX>APRS,TCPIP*:>hello");
        assert!(rx.try_recv().is_err(), "comments and blank lines must be dropped");
    }

    #[tokio::test]
    async fn test_replacing_callback_routes_lines_to_new_sink() {
        let (port, _login, _lines) = spawn_server(b"G4KLX>APRS:>one\r\n").await;
        let client = AprsIsClient::new(config(port)).unwrap();
        let (old_tx, mut old_rx) = mpsc::unbounded_channel::<String>();
        let (new_tx, mut new_rx) = mpsc::unbounded_channel::<String>();
        client.set_read_callback(move |line: &str| {
            let _ = old_tx.send(line.to_string());
        });
        client.set_read_callback(move |line: &str| {
            let _ = new_tx.send(line.to_string());
        });
        let mut worker = client.worker();

        for _ in 0..3 {
            worker.step().await;
        }

        assert_eq!(new_rx.recv().await.unwrap(), "G4KLX>APRS:>one");
        assert!(old_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_panicking_callback_does_not_stop_the_worker() {
        let (port, _login, _lines) =
            spawn_server(b"G4KLX>APRS:>boom\r\nG4KLX>APRS:>ok\r\n").await;
        let client = AprsIsClient::new(config(port)).unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        client.set_read_callback(move |line: &str| {
            if line.ends_with("boom") {
                panic!("sink failure");
            }
            let _ = tx.send(line.to_string());
        });
        let mut worker = client.worker();

        for _ in 0..4 {
            worker.step().await;
        }

        assert_eq!(rx.recv().await.unwrap(), "G4KLX>APRS:>ok");
        assert!(client.is_connected());
    }

    #[tokio::test]
    async fn test_server_hangup_disconnects_once_with_one_timer() {
        // Arrange: complete the handshake, then hang up.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = stream.into_split();
            let mut reader = BufReader::new(read_half);
            write_half.write_all(BANNER).await.unwrap();
            let mut login = String::new();
            reader.read_line(&mut login).await.unwrap();
            write_half.write_all(ACK).await.unwrap();
        });
        let client = AprsIsClient::new(config(port)).unwrap();
        let mut worker = client.worker();
        worker.step().await;
        assert!(client.is_connected());

        // Act
        let mut steps = 0;
        while client.is_connected() && steps < 20 {
            worker.step().await;
            steps += 1;
        }
        worker.step().await;
        worker.step().await;

        // Assert
        assert!(!client.is_connected());
        assert!(worker.link.is_none());
        assert_eq!(client.status().attempts, 1);
        assert_eq!(client.status().reconnect_delay, Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_write_failure_disconnects_once_and_drops_only_the_in_flight_frame() {
        // Arrange: a logged-in link over an in-memory pipe whose peer is gone.
        let client = AprsIsClient::new(config(14580)).unwrap();
        let mut worker = client.worker();
        let (local, peer) = tokio::io::duplex(1024);
        let stream: Box<dyn LinkStream> = Box::new(local);
        worker.link = Some(LineCodec::new(stream));
        worker.attempted = true;
        client.shared.connected.store(true, Ordering::Release);
        for n in 1..=3 {
            assert!(client.write_message(&format!("N0CALL>APRS:>frame {n}")));
        }
        drop(peer);

        // Act
        worker.step().await;
        worker.step().await;

        // Assert
        let status = client.status();
        assert!(worker.link.is_none());
        assert!(!status.connected);
        assert_eq!(status.attempts, 1);
        assert_eq!(status.reconnect_delay, Duration::from_secs(60));
        assert!(worker.scheduler.is_running());
        assert_eq!(status.queued_frames, 2);
        let next = client.shared.queue.dequeue().unwrap();
        assert_eq!(next.as_bytes(), b"N0CALL>APRS:>frame 2\r\n");
    }

    #[tokio::test]
    async fn test_ticks_clocked_during_a_failed_attempt_do_not_shorten_the_backoff() {
        // Arrange: a server that never sends its banner, and a driving loop
        // clocking 20 ms every 20 ms while the worker waits for it.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            time::sleep(Duration::from_secs(5)).await;
        });
        let cfg = AprsIsConfig {
            read_timeout: Duration::from_millis(300),
            ..config(port)
        };
        let client = AprsIsClient::new(cfg).unwrap();
        let mut worker = client.worker();
        let shared = Arc::clone(&client.shared);
        let ticker = tokio::spawn(async move {
            loop {
                time::sleep(Duration::from_millis(20)).await;
                shared.pending_ms.fetch_add(20, Ordering::AcqRel);
            }
        });

        // Act
        worker.step().await;
        ticker.abort();
        let _ = ticker.await;
        worker.step().await;

        // Assert
        let remaining = worker.scheduler.remaining();
        assert_eq!(client.status().attempts, 1);
        assert!(
            remaining >= Duration::from_millis(59_900),
            "backoff started at 60s but only {remaining:?} remain"
        );
    }

    #[tokio::test]
    async fn test_reconnect_after_expiry_resets_attempts() {
        // Arrange: first server is absent; then a real one appears.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let client = AprsIsClient::new(config(port)).unwrap();
        let mut worker = client.worker();
        worker.step().await;
        assert_eq!(client.status().attempts, 1);

        let listener = TcpListener::bind(("127.0.0.1", port)).await.unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = stream.into_split();
            let mut reader = BufReader::new(read_half);
            write_half.write_all(BANNER).await.unwrap();
            let mut login = String::new();
            reader.read_line(&mut login).await.unwrap();
            write_half.write_all(ACK).await.unwrap();
            time::sleep(Duration::from_secs(5)).await;
        });

        // Act
        client.clock(60_000);
        worker.step().await;

        // Assert
        assert!(client.is_connected());
        assert_eq!(client.status().attempts, 0);
        assert_eq!(client.status().reconnect_delay, Duration::ZERO);
        assert!(!worker.scheduler.is_running());
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_shutdown_drains_queue_without_sending() {
        let (port, _login, mut lines) = spawn_server(b"").await;
        let client = AprsIsClient::new(config(port)).unwrap();
        let mut worker = client.worker();
        worker.step().await;
        assert!(client.write_message("N0CALL>APRS:>never sent"));

        worker.shutdown().await;

        assert_eq!(client.status().queued_frames, 0);
        assert!(!client.is_connected());
        assert!(lines.recv().await.is_none(), "no frame may reach the server");
    }

    #[tokio::test]
    async fn test_stop_interrupts_a_handshake_in_progress() {
        // Arrange: the server accepts and then stays silent.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (accepted_tx, accepted_rx) = oneshot::channel();
        tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            let _ = accepted_tx.send(());
            time::sleep(Duration::from_secs(30)).await;
        });
        let cfg = AprsIsConfig {
            read_timeout: Duration::from_secs(10),
            ..config(port)
        };
        let mut client = AprsIsClient::new(cfg).unwrap();
        client.start();
        accepted_rx.await.unwrap();

        // Act
        time::timeout(Duration::from_secs(1), client.stop())
            .await
            .expect("stop must not wait for the banner timeout");

        // Assert: the abandoned attempt is not counted as a failure.
        assert_eq!(client.status().attempts, 0);
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_stop_joins_a_worker_that_never_connected() {
        let port = closed_port().await;
        let mut client = AprsIsClient::new(config(port)).unwrap();
        client.start();
        time::sleep(Duration::from_millis(50)).await;

        time::timeout(Duration::from_secs(2), client.stop())
            .await
            .expect("stop must return promptly");

        assert_eq!(client.status().attempts, 1);
    }
}

//! Streaming session: one connection, one subscription, one listener.
//!
//! ```text
//! Disconnected --connect ok--> Connected --close()/fatal--> Closing --cleanup--> Disconnected
//! ```
//!
//! The network thread only pushes raw frames onto the inbound queue. The
//! `stream-listener` thread drains it, decodes, calls the handler, and runs
//! reconnects when the connection is lost.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use super::codec::{StreamMessage, decode_message, subscription_message};
use super::queue::InboundQueue;
use super::reconnect::ReconnectPolicy;
use super::state::ConnectionState;
use super::transport::{Transport, TransportEvents, TransportHandle};
use super::types::{StreamError, Subscription};
use super::websocket::WsTransport;
use crate::config::StreamConfig;
use crate::error::panic_message;

/// Receives every decoded inbound message on the listener thread.
pub trait MessageHandler: Send + Sync {
    /// Handle one message. Panics are caught and logged.
    fn handle(&self, message: &StreamMessage);
}

impl<F> MessageHandler for F
where
    F: Fn(&StreamMessage) + Send + Sync,
{
    fn handle(&self, message: &StreamMessage) {
        self(message);
    }
}

/// Connection state guarded by one lock. The handle is `Some` only while
/// `Connected` or `Closing`.
#[derive(Default)]
struct Link {
    state: ConnectionState,
    generation: u64,
    handle: Option<Arc<dyn TransportHandle>>,
    /// `on_open` arrived before `open` returned the handle.
    opened: bool,
    /// A live connection dropped; the listener should recover.
    lost: bool,
    /// Why the current attempt failed.
    error: Option<String>,
}

impl Link {
    /// Move to `Disconnected` and invalidate callbacks of the current attempt.
    fn reset(&mut self, generation: &AtomicU64) -> Option<Arc<dyn TransportHandle>> {
        self.state = ConnectionState::Disconnected;
        self.opened = false;
        self.generation += 1;
        generation.store(self.generation, Ordering::Release);
        self.handle.take()
    }
}

struct SessionCore {
    config: StreamConfig,
    transport: Arc<dyn Transport>,
    link: Mutex<Link>,
    /// Mirror of `Link::generation` for the lock-free message path.
    generation: AtomicU64,
    inbound: InboundQueue,
    handler: RwLock<Option<Arc<dyn MessageHandler>>>,
    should_run: AtomicBool,
    running: AtomicBool,
    listener_epoch: AtomicU64,
    endpoint: Mutex<Option<(String, u16)>>,
    subscription: Mutex<Option<Subscription>>,
    reconnect: Mutex<ReconnectPolicy>,
    last_failure: Mutex<Option<StreamError>>,
    next_request_id: AtomicU64,
}

/// Callbacks for one connection attempt.
struct LinkEvents {
    core: Weak<SessionCore>,
    generation: u64,
}

impl TransportEvents for LinkEvents {
    fn on_open(&self) {
        let Some(core) = self.core.upgrade() else {
            return;
        };
        let mut link = core.link.lock();
        if link.generation != self.generation || link.state != ConnectionState::Connecting {
            return;
        }
        if link.handle.is_some() {
            link.state = ConnectionState::Connected;
        } else {
            link.opened = true;
        }
    }

    fn on_message(&self, text: String) {
        let Some(core) = self.core.upgrade() else {
            return;
        };
        if core.generation.load(Ordering::Acquire) == self.generation {
            core.inbound.push(text);
        }
    }

    fn on_close(&self, reason: Option<String>) {
        self.on_terminated(reason.unwrap_or_else(|| "closed".to_string()));
    }

    fn on_error(&self, message: String) {
        self.on_terminated(message);
    }
}

impl LinkEvents {
    fn on_terminated(&self, reason: String) {
        let Some(core) = self.core.upgrade() else {
            return;
        };

        let dropped = {
            let mut link = core.link.lock();
            if link.generation != self.generation {
                return;
            }
            match link.state {
                ConnectionState::Connecting => {
                    link.error = Some(reason.clone());
                    link.reset(&core.generation)
                }
                ConnectionState::Connected => {
                    warn!(reason = %reason, "Stream connection lost");
                    link.lost = true;
                    link.error = Some(reason.clone());
                    link.reset(&core.generation)
                }
                ConnectionState::Closing => link.reset(&core.generation),
                ConnectionState::Disconnected => None,
            }
        };

        if let Some(handle) = dropped {
            handle.close();
        }
        core.inbound.wake();
    }
}

impl SessionCore {
    fn state(&self) -> ConnectionState {
        self.link.lock().state
    }

    /// Open a connection and wait until it is `Connected` or the timeout
    /// passes. Leaves the link `Disconnected` on any failure.
    fn open_connection(self: &Arc<Self>, host: &str, port: u16) -> Result<(), StreamError> {
        let url = self.config.url_for(host, port);

        let generation = {
            let mut link = self.link.lock();
            if link.state.is_active() {
                return Err(StreamError::AlreadyConnected);
            }
            let _ = link.reset(&self.generation);
            link.state = ConnectionState::Connecting;
            link.lost = false;
            link.error = None;
            link.generation
        };

        info!(url = %url, "Connecting stream");

        let events = Arc::new(LinkEvents {
            core: Arc::downgrade(self),
            generation,
        });

        let handle = match self.transport.open(&url, events) {
            Ok(handle) => handle,
            Err(e) => {
                self.abandon(generation);
                return Err(StreamError::ConnectFailure {
                    message: e.to_string(),
                });
            }
        };

        {
            let mut link = self.link.lock();
            if link.generation == generation && link.state == ConnectionState::Connecting {
                link.handle = Some(Arc::clone(&handle));
                if link.opened {
                    link.state = ConnectionState::Connected;
                }
            }
        }

        let timeout = self.config.connect_timeout();
        let poll = self.config.connect_poll_interval();
        let deadline = Instant::now() + timeout;

        loop {
            let (state, current, failure) = {
                let link = self.link.lock();
                (link.state, link.generation == generation, link.error.clone())
            };

            if !current {
                handle.close();
                return Err(StreamError::ConnectFailure {
                    message: failure.unwrap_or_else(|| "connection attempt cancelled".to_string()),
                });
            }

            if state == ConnectionState::Connected {
                info!(url = %url, "Stream connected");
                return Ok(());
            }

            let now = Instant::now();
            if now >= deadline {
                self.abandon(generation);
                handle.close();
                warn!(url = %url, timeout_ms = timeout.as_millis() as u64, "Stream connect timed out");
                return Err(StreamError::ConnectFailure {
                    message: format!("timed out after {}ms", timeout.as_millis()),
                });
            }

            thread::sleep(poll.min(deadline - now));
        }
    }

    fn abandon(&self, generation: u64) {
        let mut link = self.link.lock();
        if link.generation == generation {
            let _ = link.reset(&self.generation);
        }
    }

    fn send_subscription(&self, subscription: &Subscription) -> Result<(), StreamError> {
        let handle = {
            let link = self.link.lock();
            if !link.state.is_connected() {
                return Err(StreamError::NotConnected);
            }
            link.handle.clone().ok_or(StreamError::NotConnected)?
        };

        let id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        handle
            .send_text(subscription_message(id, subscription))
            .map_err(|e| StreamError::SendFailure {
                message: e.to_string(),
            })?;

        info!(channel = %subscription.channel, id, "Subscription sent");
        Ok(())
    }

    /// Close the current connection, waiting a bounded time for the
    /// transport to confirm.
    fn shutdown_link(&self) {
        let (handle, wait) = {
            let mut link = self.link.lock();
            match link.state {
                ConnectionState::Connected => {
                    link.state = ConnectionState::Closing;
                    (link.handle.clone(), true)
                }
                ConnectionState::Connecting => (link.reset(&self.generation), false),
                ConnectionState::Closing | ConnectionState::Disconnected => (None, false),
            }
        };

        let Some(handle) = handle else {
            return;
        };
        handle.close();
        if !wait {
            return;
        }

        let deadline = Instant::now() + self.config.connect_timeout();
        while self.state() == ConnectionState::Closing && Instant::now() < deadline {
            thread::sleep(self.config.listener_poll_interval());
        }

        let mut link = self.link.lock();
        if link.state == ConnectionState::Closing {
            debug!("Transport did not confirm close, forcing disconnect");
            let _ = link.reset(&self.generation);
        }
    }

    fn take_lost(&self) -> bool {
        std::mem::take(&mut self.link.lock().lost)
    }

    fn is_current_listener(&self, epoch: u64) -> bool {
        self.should_run.load(Ordering::Acquire)
            && self.listener_epoch.load(Ordering::Acquire) == epoch
    }

    fn dispatch(&self, raw: String) {
        let message = match decode_message(raw) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "Dropping undecodable stream message");
                return;
            }
        };

        if let Some(delay) = message.propagation_delay_ms {
            debug!(
                channel = message.channel().unwrap_or_default(),
                propagation_delay_ms = delay,
                "Stream message received"
            );
        }

        let handler = self.handler.read().clone();
        let Some(handler) = handler else {
            return;
        };

        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| handler.handle(&message))) {
            warn!(panic = %panic_message(payload.as_ref()), "Message handler panicked");
        }
    }

    /// Sleep in short slices; returns false if the session was stopped.
    fn sleep_while_running(&self, delay: Duration) -> bool {
        let deadline = Instant::now() + delay;
        let slice = self.config.listener_poll_interval();
        loop {
            if !self.should_run.load(Ordering::Acquire) {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep(slice.min(deadline - now));
        }
    }

    /// Reconnect after a lost connection with the fixed backoff.
    fn recover(self: &Arc<Self>) {
        let Some((host, port)) = self.endpoint.lock().clone() else {
            return;
        };

        loop {
            if !self.should_run.load(Ordering::Acquire) {
                return;
            }

            let (next, attempt, max_attempts) = {
                let mut policy = self.reconnect.lock();
                let next = policy.next_delay();
                (next, policy.current_attempt(), policy.max_attempts())
            };

            let Some(delay) = next else {
                error!(attempts = attempt, "Stream reconnect attempts exhausted, stopping session");
                *self.last_failure.lock() = Some(StreamError::ReconnectExhausted { attempts: attempt });
                self.should_run.store(false, Ordering::Release);
                self.running.store(false, Ordering::Release);
                return;
            };

            info!(
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                "Reconnecting stream"
            );

            if !self.sleep_while_running(delay) {
                return;
            }

            match self.open_connection(&host, port) {
                Ok(()) => {
                    if !self.should_run.load(Ordering::Acquire) {
                        self.shutdown_link();
                        return;
                    }
                    self.reconnect.lock().reset();
                    info!(attempt, "Stream reconnected");
                    self.resubscribe();
                    return;
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Stream reconnect attempt failed");
                    *self.last_failure.lock() = Some(e);
                }
            }
        }
    }

    fn resubscribe(&self) {
        let subscription = self.subscription.lock().clone();
        let Some(subscription) = subscription else {
            return;
        };
        if let Err(e) = self.send_subscription(&subscription) {
            warn!(channel = %subscription.channel, error = %e, "Resubscription failed");
            *self.last_failure.lock() = Some(e);
        }
    }
}

fn listen(core: &Arc<SessionCore>, epoch: u64) {
    info!("Stream listener started");
    let poll = core.config.listener_poll_interval();

    while core.is_current_listener(epoch) {
        if let Some(raw) = core.inbound.pop_timeout(poll) {
            core.dispatch(raw);
            continue;
        }
        if core.take_lost() {
            core.recover();
        }
    }

    if core.listener_epoch.load(Ordering::Acquire) == epoch {
        core.running.store(false, Ordering::Release);
    }
    info!("Stream listener stopped");
}

/// Long-lived streaming session with automatic reconnect.
pub struct StreamSession {
    core: Arc<SessionCore>,
    listener: Mutex<Option<JoinHandle<()>>>,
    /// Held for the whole of `connect`.
    starting: Mutex<()>,
}

impl StreamSession {
    /// Create a session over the websocket transport.
    #[must_use]
    pub fn new(config: StreamConfig) -> Self {
        let transport = Arc::new(WsTransport::new(&config));
        Self::with_transport(config, transport)
    }

    /// Create a session over any transport.
    #[must_use]
    pub fn with_transport(config: StreamConfig, transport: Arc<dyn Transport>) -> Self {
        let reconnect = ReconnectPolicy::new(&config);
        Self {
            core: Arc::new(SessionCore {
                config,
                transport,
                link: Mutex::new(Link::default()),
                generation: AtomicU64::new(0),
                inbound: InboundQueue::new(),
                handler: RwLock::new(None),
                should_run: AtomicBool::new(false),
                running: AtomicBool::new(false),
                listener_epoch: AtomicU64::new(0),
                endpoint: Mutex::new(None),
                subscription: Mutex::new(None),
                reconnect: Mutex::new(reconnect),
                last_failure: Mutex::new(None),
                next_request_id: AtomicU64::new(1),
            }),
            listener: Mutex::new(None),
            starting: Mutex::new(()),
        }
    }

    /// Connect to `host:port` and start the listener.
    ///
    /// A `close()` that lands while the connect is in flight wins: the
    /// connection is torn down and this returns `ConnectFailure`.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyConnected` while a connection or listener is active,
    /// `ConnectFailure` when `Connected` is not reached in time, and `Spawn`
    /// if the listener thread cannot start.
    pub fn connect(&self, host: &str, port: u16) -> Result<(), StreamError> {
        let Some(_starting) = self.starting.try_lock() else {
            return Err(StreamError::AlreadyConnected);
        };
        if self.is_running() {
            return Err(StreamError::AlreadyConnected);
        }

        self.reap_listener();
        *self.core.endpoint.lock() = Some((host.to_string(), port));

        // Retire any detached listener before re-arming the run flag.
        let epoch = self.core.listener_epoch.fetch_add(1, Ordering::AcqRel) + 1;
        self.core.should_run.store(true, Ordering::Release);

        let started = self
            .core
            .open_connection(host, port)
            .and_then(|()| {
                self.core.reconnect.lock().reset();
                *self.core.last_failure.lock() = None;
                self.start_listener(epoch)
            });

        started.map_err(|e| {
            self.core.should_run.store(false, Ordering::Release);
            self.core.shutdown_link();
            *self.core.last_failure.lock() = Some(e.clone());
            e
        })
    }

    /// Join a listener left over from an earlier run.
    fn reap_listener(&self) {
        let previous = self.listener.lock().take();
        if let Some(previous) = previous {
            if previous.thread().id() != thread::current().id() && previous.join().is_err() {
                warn!("Previous stream listener panicked");
            }
        }
    }

    /// Spawn the listener for `epoch`. Checked against `should_run` under
    /// the slot lock, which `close()` also takes.
    fn start_listener(&self, epoch: u64) -> Result<(), StreamError> {
        let mut slot = self.listener.lock();

        if !self.core.should_run.load(Ordering::Acquire) {
            return Err(StreamError::ConnectFailure {
                message: "session closed during connect".to_string(),
            });
        }

        self.core.running.store(true, Ordering::Release);

        let core = Arc::clone(&self.core);
        let spawned = thread::Builder::new()
            .name("stream-listener".to_string())
            .spawn(move || listen(&core, epoch));

        match spawned {
            Ok(handle) => {
                *slot = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.core.running.store(false, Ordering::Release);
                Err(StreamError::Spawn {
                    message: e.to_string(),
                })
            }
        }
    }

    /// Send one subscription request. Remembered for resubscription after
    /// reconnect only when the send succeeds.
    ///
    /// # Errors
    ///
    /// Returns `NotConnected` unless `Connected`, and `SendFailure` if the
    /// transport refuses the frame. Never retries.
    pub fn subscribe(&self, channel: &str, access_token: &str) -> Result<(), StreamError> {
        let subscription = Subscription::new(channel, access_token);
        self.core.send_subscription(&subscription)?;
        *self.core.subscription.lock() = Some(subscription);
        Ok(())
    }

    /// Install the handler that receives decoded messages.
    pub fn set_message_handler<H: MessageHandler + 'static>(&self, handler: H) {
        *self.core.handler.write() = Some(Arc::new(handler));
    }

    /// Stop the session: no more reconnects, close the connection, join the
    /// listener. Idempotent and safe from the handler itself.
    pub fn close(&self) {
        let was_running = self.core.should_run.swap(false, Ordering::AcqRel);
        self.core.running.store(false, Ordering::Release);

        self.core.shutdown_link();
        self.core.inbound.wake();

        let listener = self.listener.lock().take();
        if let Some(listener) = listener {
            if listener.thread().id() == thread::current().id() {
                debug!("Close called from listener thread, detaching");
            } else if listener.join().is_err() {
                warn!("Stream listener panicked");
            }
        }

        if was_running {
            info!("Stream session closed");
        }
    }

    /// Whether the connection is open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.core.state().is_connected()
    }

    /// Whether the listener is active and the session has not been stopped.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.core.should_run.load(Ordering::Acquire) && self.core.running.load(Ordering::Acquire)
    }

    /// Current connection state.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.core.state()
    }

    /// Consecutive reconnect attempts since the last successful connection.
    #[must_use]
    pub fn reconnect_attempts(&self) -> u32 {
        self.core.reconnect.lock().current_attempt()
    }

    /// Most recent failure, e.g. `ReconnectExhausted` after giving up.
    #[must_use]
    pub fn last_failure(&self) -> Option<StreamError> {
        self.core.last_failure.lock().clone()
    }

    /// The remembered subscription, if any.
    #[must_use]
    pub fn subscription(&self) -> Option<Subscription> {
        self.core.subscription.lock().clone()
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for StreamSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSession")
            .field("state", &self.connection_state())
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

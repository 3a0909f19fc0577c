//! Stream Session Integration Tests
//!
//! Drives the session through a scripted in-memory transport to check
//! connect timeouts, subscription sends, ordering, and reconnect limits.

// Allow unwrap in tests - tests should panic on unexpected errors
#![allow(clippy::unwrap_used)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use serde_json::{Value, json};

use exchange_client::config::StreamConfig;
use exchange_client::{
    ConnectionState, StreamError, StreamMessage, StreamSession, Transport, TransportError,
    TransportEvents, TransportHandle,
};

// =============================================================================
// Scripted transport
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// `on_open` fires before `open` returns.
    Accept,
    /// `on_open` fires later from another thread.
    AcceptLater,
    /// `on_error` fires immediately.
    Refuse,
    /// Nothing ever fires.
    Silent,
}

struct MockState {
    mode: Mutex<Mode>,
    opens: AtomicUsize,
    closes: AtomicUsize,
    sent: Mutex<Vec<String>>,
    current: Mutex<Option<Arc<dyn TransportEvents>>>,
}

#[derive(Clone)]
struct MockTransport {
    state: Arc<MockState>,
}

impl MockTransport {
    fn new(mode: Mode) -> Self {
        Self {
            state: Arc::new(MockState {
                mode: Mutex::new(mode),
                opens: AtomicUsize::new(0),
                closes: AtomicUsize::new(0),
                sent: Mutex::new(Vec::new()),
                current: Mutex::new(None),
            }),
        }
    }

    fn set_mode(&self, mode: Mode) {
        *self.state.mode.lock().unwrap() = mode;
    }

    fn opens(&self) -> usize {
        self.state.opens.load(Ordering::SeqCst)
    }

    fn sent(&self) -> Vec<String> {
        self.state.sent.lock().unwrap().clone()
    }

    fn inject(&self, text: &str) {
        let events = self.state.current.lock().unwrap().clone().unwrap();
        events.on_message(text.to_string());
    }

    /// Simulate the peer dropping the connection.
    fn drop_connection(&self) {
        let events = self.state.current.lock().unwrap().take().unwrap();
        events.on_close(Some("connection reset".to_string()));
    }
}

impl Transport for MockTransport {
    fn open(
        &self,
        _url: &str,
        events: Arc<dyn TransportEvents>,
    ) -> Result<Arc<dyn TransportHandle>, TransportError> {
        self.state.opens.fetch_add(1, Ordering::SeqCst);
        let mode = *self.state.mode.lock().unwrap();

        match mode {
            Mode::Accept => {
                *self.state.current.lock().unwrap() = Some(Arc::clone(&events));
                events.on_open();
            }
            Mode::AcceptLater => {
                *self.state.current.lock().unwrap() = Some(Arc::clone(&events));
                let later = Arc::clone(&events);
                thread::spawn(move || {
                    thread::sleep(Duration::from_millis(30));
                    later.on_open();
                });
            }
            Mode::Refuse => events.on_error("connection refused".to_string()),
            Mode::Silent => {}
        }

        Ok(Arc::new(MockHandle {
            state: Arc::clone(&self.state),
            events,
            closed: AtomicBool::new(false),
        }))
    }
}

struct MockHandle {
    state: Arc<MockState>,
    events: Arc<dyn TransportEvents>,
    closed: AtomicBool,
}

impl TransportHandle for MockHandle {
    fn send_text(&self, text: String) -> Result<(), TransportError> {
        self.state.sent.lock().unwrap().push(text);
        Ok(())
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.state.closes.fetch_add(1, Ordering::SeqCst);
        self.events.on_close(None);
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn config() -> StreamConfig {
    StreamConfig {
        host: "mock.local".to_string(),
        port: 9443,
        secure: false,
        connect_timeout_ms: 200,
        connect_poll_interval_ms: 10,
        listener_poll_interval_ms: 5,
        reconnect_delay_ms: 20,
        max_reconnect_attempts: 3,
        ..StreamConfig::default()
    }
}

fn session(transport: &MockTransport) -> StreamSession {
    StreamSession::with_transport(config(), Arc::new(transport.clone()))
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

fn collector() -> (Arc<Mutex<Vec<Value>>>, impl Fn(&StreamMessage) + Send + Sync) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    (seen, move |message: &StreamMessage| {
        sink.lock().unwrap().push(message.payload.clone());
    })
}

// =============================================================================
// Connect
// =============================================================================

#[test]
fn connect_timeout_leaves_session_disconnected() {
    let transport = MockTransport::new(Mode::Silent);
    let session = session(&transport);

    let start = Instant::now();
    let err = session.connect("mock.local", 9443).unwrap_err();

    assert!(matches!(err, StreamError::ConnectFailure { .. }));
    assert!(start.elapsed() >= Duration::from_millis(200));
    assert!(!session.is_connected());
    assert!(!session.is_running());
    assert_eq!(session.connection_state(), ConnectionState::Disconnected);
    assert_eq!(session.last_failure(), Some(err));
}

#[test]
fn refused_connect_fails_before_timeout() {
    let transport = MockTransport::new(Mode::Refuse);
    let session = session(&transport);

    let start = Instant::now();
    let err = session.connect("mock.local", 9443).unwrap_err();

    assert_eq!(
        err,
        StreamError::ConnectFailure {
            message: "connection refused".to_string()
        }
    );
    assert!(start.elapsed() < Duration::from_millis(150));
    assert!(!session.is_connected());
}

#[test]
fn delayed_open_connects() {
    let transport = MockTransport::new(Mode::AcceptLater);
    let session = session(&transport);

    session.connect("mock.local", 9443).unwrap();
    assert!(session.is_connected());
    assert!(session.is_running());
}

#[test]
fn second_connect_is_rejected() {
    let transport = MockTransport::new(Mode::Accept);
    let session = session(&transport);

    session.connect("mock.local", 9443).unwrap();
    assert_eq!(
        session.connect("mock.local", 9443),
        Err(StreamError::AlreadyConnected)
    );
    assert_eq!(transport.opens(), 1);
}

// =============================================================================
// Subscribe
// =============================================================================

#[test]
fn subscribe_before_connect_sends_nothing() {
    let transport = MockTransport::new(Mode::Accept);
    let session = session(&transport);

    assert_eq!(
        session.subscribe("book.BTC-PERPETUAL.100ms", "tok"),
        Err(StreamError::NotConnected)
    );
    assert!(transport.sent().is_empty());
    assert!(session.subscription().is_none());
}

#[test]
fn subscribe_sends_exactly_one_request() {
    let transport = MockTransport::new(Mode::Accept);
    let session = session(&transport);

    session.connect("mock.local", 9443).unwrap();
    session.subscribe("book.BTC-PERPETUAL.100ms", "tok").unwrap();

    let sent = transport.sent();
    assert_eq!(sent.len(), 1);

    let request: Value = serde_json::from_str(&sent[0]).unwrap();
    assert_eq!(request["jsonrpc"], "2.0");
    assert_eq!(request["method"], "private/subscribe");
    assert_eq!(request["params"]["access_token"], "tok");
    assert_eq!(
        request["params"]["channels"],
        json!(["book.BTC-PERPETUAL.100ms"])
    );
}

// =============================================================================
// Inbound path
// =============================================================================

#[test]
fn messages_reach_handler_in_order() {
    let transport = MockTransport::new(Mode::Accept);
    let session = session(&transport);
    let (seen, handler) = collector();
    session.set_message_handler(handler);
    session.connect("mock.local", 9443).unwrap();

    for tag in ["A", "B", "C"] {
        transport.inject(&json!({ "params": { "data": { "tag": tag } } }).to_string());
    }

    assert!(wait_until(Duration::from_secs(2), || seen.lock().unwrap().len() == 3));
    let tags: Vec<_> = seen
        .lock()
        .unwrap()
        .iter()
        .map(|v| v["params"]["data"]["tag"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(tags, ["A", "B", "C"]);
}

#[test]
fn handler_panic_and_bad_json_do_not_stop_listener() {
    let transport = MockTransport::new(Mode::Accept);
    let session = session(&transport);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    session.set_message_handler(move |message: &StreamMessage| {
        if message.payload["boom"] == json!(true) {
            panic!("handler exploded");
        }
        sink.lock().unwrap().push(message.payload.clone());
    });
    session.connect("mock.local", 9443).unwrap();

    transport.inject(r#"{"boom":true}"#);
    transport.inject("{not json");
    transport.inject(r#"{"ok":1}"#);

    assert!(wait_until(Duration::from_secs(2), || seen.lock().unwrap().len() == 1));
    assert_eq!(seen.lock().unwrap()[0], json!({"ok": 1}));
    assert!(session.is_running());
}

#[test]
fn propagation_delay_is_computed() {
    let transport = MockTransport::new(Mode::Accept);
    let session = session(&transport);
    let delays = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&delays);
    session.set_message_handler(move |message: &StreamMessage| {
        sink.lock().unwrap().push(message.propagation_delay_ms);
    });
    session.connect("mock.local", 9443).unwrap();

    let ts = chrono::Utc::now().timestamp_millis() - 25;
    transport.inject(&json!({ "params": { "data": { "timestamp": ts } } }).to_string());
    transport.inject(r#"{"params":{"data":{}}}"#);

    assert!(wait_until(Duration::from_secs(2), || delays.lock().unwrap().len() == 2));
    let delays = delays.lock().unwrap();
    assert!(delays[0].unwrap() >= 25);
    assert_eq!(delays[1], None);
}

// =============================================================================
// Reconnect
// =============================================================================

#[test]
fn reconnect_resubscribes_exactly_once() {
    let transport = MockTransport::new(Mode::Accept);
    let session = session(&transport);
    session.connect("mock.local", 9443).unwrap();
    session.subscribe("book.ETH-PERPETUAL.raw", "tok").unwrap();

    transport.drop_connection();

    assert!(wait_until(Duration::from_secs(2), || transport.sent().len() == 2));
    assert!(session.is_connected());
    assert!(session.is_running());

    // No further sends after the single resubscription.
    thread::sleep(Duration::from_millis(100));
    let sent = transport.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(transport.opens(), 2);
    assert_eq!(session.reconnect_attempts(), 0);

    let first: Value = serde_json::from_str(&sent[0]).unwrap();
    let second: Value = serde_json::from_str(&sent[1]).unwrap();
    assert_eq!(first["params"], second["params"]);
}

#[test]
fn each_reconnect_resubscribes_once() {
    let transport = MockTransport::new(Mode::Accept);
    let session = session(&transport);
    session.connect("mock.local", 9443).unwrap();
    session.subscribe("book.BTC-PERPETUAL.agg2", "tok").unwrap();

    for round in 2..=4 {
        assert!(wait_until(Duration::from_secs(2), || session.is_connected()));
        transport.drop_connection();
        assert!(wait_until(Duration::from_secs(2), || transport.sent().len() == round));
    }

    thread::sleep(Duration::from_millis(50));
    assert_eq!(transport.sent().len(), 4);
    assert_eq!(transport.opens(), 4);
}

#[test]
fn reconnect_exhaustion_stops_session() {
    let transport = MockTransport::new(Mode::Accept);
    let session = session(&transport);
    session.connect("mock.local", 9443).unwrap();
    session.subscribe("book.BTC-PERPETUAL.100ms", "tok").unwrap();

    transport.set_mode(Mode::Refuse);
    transport.drop_connection();

    assert!(wait_until(Duration::from_secs(3), || !session.is_running()));
    assert_eq!(transport.opens(), 1 + 3);
    assert_eq!(
        session.last_failure(),
        Some(StreamError::ReconnectExhausted { attempts: 3 })
    );

    // Stopped for good.
    thread::sleep(Duration::from_millis(150));
    assert_eq!(transport.opens(), 4);
    assert!(!session.is_connected());
    assert_eq!(transport.sent().len(), 1);
}

#[test]
fn reconnect_counter_resets_after_success() {
    let transport = MockTransport::new(Mode::Accept);
    let session = session(&transport);
    session.connect("mock.local", 9443).unwrap();

    // Two failures, then success: still within the budget of three.
    transport.set_mode(Mode::Refuse);
    transport.drop_connection();
    assert!(wait_until(Duration::from_secs(2), || session.reconnect_attempts() >= 2));
    transport.set_mode(Mode::Accept);

    assert!(wait_until(Duration::from_secs(2), || session.is_connected()));
    assert_eq!(session.reconnect_attempts(), 0);
    assert!(session.is_running());
}

// =============================================================================
// Close
// =============================================================================

#[test]
fn close_is_idempotent_and_stops_reconnects() {
    let transport = MockTransport::new(Mode::Accept);
    let session = session(&transport);
    session.connect("mock.local", 9443).unwrap();

    session.close();
    session.close();

    assert!(!session.is_running());
    assert_eq!(session.connection_state(), ConnectionState::Disconnected);
    assert_eq!(transport.state.closes.load(Ordering::SeqCst), 1);

    let opens = transport.opens();
    thread::sleep(Duration::from_millis(100));
    assert_eq!(transport.opens(), opens);
}

#[test]
fn close_from_handler_does_not_deadlock() {
    let transport = MockTransport::new(Mode::Accept);
    let session = Arc::new(session(&transport));
    let weak = Arc::downgrade(&session);
    session.set_message_handler(move |_: &StreamMessage| {
        if let Some(session) = weak.upgrade() {
            session.close();
        }
    });
    session.connect("mock.local", 9443).unwrap();

    transport.inject(r#"{"stop":true}"#);

    assert!(wait_until(Duration::from_secs(2), || !session.is_running()));
    assert!(!session.is_connected());
    session.close();
}

#[test]
fn session_can_reconnect_after_close() {
    let transport = MockTransport::new(Mode::Accept);
    let session = session(&transport);

    session.connect("mock.local", 9443).unwrap();
    session.close();
    session.connect("mock.local", 9443).unwrap();

    assert!(session.is_connected());
    assert!(session.is_running());
    assert_eq!(transport.opens(), 2);
}

#[test]
fn close_during_connect_stops_session() {
    let transport = MockTransport::new(Mode::AcceptLater);
    let session = Arc::new(session(&transport));

    let connecting = {
        let session = Arc::clone(&session);
        thread::spawn(move || session.connect("mock.local", 9443))
    };
    assert!(wait_until(Duration::from_secs(1), || {
        session.connection_state() == ConnectionState::Connecting
    }));

    session.close();

    assert!(matches!(
        connecting.join().unwrap(),
        Err(StreamError::ConnectFailure { .. })
    ));
    thread::sleep(Duration::from_millis(100));
    assert!(!session.is_running());
    assert!(!session.is_connected());
    assert_eq!(session.connection_state(), ConnectionState::Disconnected);
    assert_eq!(transport.opens(), 1);
}

#[test]
fn racing_close_never_leaves_session_running_disconnected() {
    let transport = MockTransport::new(Mode::Accept);

    for round in 0..40u64 {
        let session = Arc::new(session(&transport));
        let connecting = {
            let session = Arc::clone(&session);
            thread::spawn(move || session.connect("mock.local", 9443))
        };
        thread::sleep(Duration::from_micros(round * 25));
        session.close();
        let connected = connecting.join().unwrap().is_ok();

        thread::sleep(Duration::from_millis(20));
        assert_eq!(
            session.is_running(),
            session.is_connected(),
            "round {round}: connect ok = {connected}"
        );
        session.close();
        assert!(!session.is_running());
    }
}

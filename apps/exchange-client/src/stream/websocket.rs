//! Websocket transport over tokio-tungstenite.
//!
//! Each connection gets its own `stream-network` OS thread running a
//! current-thread tokio runtime. The session talks to it through an
//! unbounded command channel; inbound frames go out through
//! [`TransportEvents`].

use std::sync::{Arc, Once, mpsc as std_mpsc};
use std::thread;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use super::transport::{Transport, TransportError, TransportEvents, TransportHandle};
use crate::config::StreamConfig;

/// Maximum wait for the network thread to acknowledge a send.
const SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Maximum wait for the peer's close frame after we sent ours.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

enum Command {
    Send {
        text: String,
        ack: std_mpsc::SyncSender<Result<(), String>>,
    },
    Close,
}

/// Websocket [`Transport`] (`ws://` or `wss://`).
#[derive(Debug, Clone)]
pub struct WsTransport {
    connect_timeout: Duration,
}

impl WsTransport {
    /// Create a transport using the configured connect timeout.
    #[must_use]
    pub const fn new(config: &StreamConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout(),
        }
    }
}

impl Default for WsTransport {
    fn default() -> Self {
        Self::new(&StreamConfig::default())
    }
}

impl Transport for WsTransport {
    fn open(
        &self,
        url: &str,
        events: Arc<dyn TransportEvents>,
    ) -> Result<Arc<dyn TransportHandle>, TransportError> {
        install_crypto_provider();

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let url = url.to_string();
        let connect_timeout = self.connect_timeout;

        thread::Builder::new()
            .name("stream-network".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        events.on_error(format!("failed to build network runtime: {e}"));
                        return;
                    }
                };
                runtime.block_on(run_connection(url, connect_timeout, events, commands_rx));
            })
            .map_err(|e| TransportError::Connect {
                message: e.to_string(),
            })?;

        Ok(Arc::new(WsHandle {
            commands: commands_tx,
        }))
    }
}

struct WsHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl TransportHandle for WsHandle {
    fn send_text(&self, text: String) -> Result<(), TransportError> {
        let (ack_tx, ack_rx) = std_mpsc::sync_channel(1);
        self.commands
            .send(Command::Send { text, ack: ack_tx })
            .map_err(|_| TransportError::Closed)?;

        match ack_rx.recv_timeout(SEND_TIMEOUT) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(message)) => Err(TransportError::Send { message }),
            Err(std_mpsc::RecvTimeoutError::Disconnected) => Err(TransportError::Closed),
            Err(std_mpsc::RecvTimeoutError::Timeout) => Err(TransportError::Send {
                message: format!("no acknowledgement within {}ms", SEND_TIMEOUT.as_millis()),
            }),
        }
    }

    fn close(&self) {
        // Already gone if the network thread exited.
        let _ = self.commands.send(Command::Close);
    }
}

async fn run_connection(
    url: String,
    connect_timeout: Duration,
    events: Arc<dyn TransportEvents>,
    mut commands: mpsc::UnboundedReceiver<Command>,
) {
    let stream = match timeout(connect_timeout, connect_async(url.as_str())).await {
        Ok(Ok((stream, _response))) => stream,
        Ok(Err(e)) => {
            events.on_error(e.to_string());
            return;
        }
        Err(_) => {
            events.on_error(format!(
                "handshake timed out after {}ms",
                connect_timeout.as_millis()
            ));
            return;
        }
    };

    info!(url = %url, "Websocket connected");
    events.on_open();

    let (mut write, mut read) = stream.split();

    let reason = loop {
        tokio::select! {
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => events.on_message(text.to_string()),
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => events.on_message(text),
                    Err(_) => debug!("Ignoring non-UTF-8 binary frame"),
                },
                Some(Ok(Message::Ping(payload))) => {
                    if let Err(e) = write.send(Message::Pong(payload)).await {
                        events.on_error(e.to_string());
                        break Some(e.to_string());
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    break Some(frame.map_or_else(
                        || "closed by peer".to_string(),
                        |f| format!("closed by peer ({}): {}", f.code, f.reason.as_str()),
                    ));
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    events.on_error(e.to_string());
                    break Some(e.to_string());
                }
                None => break Some("stream ended".to_string()),
            },
            command = commands.recv() => match command {
                Some(Command::Send { text, ack }) => {
                    let sent = write
                        .send(Message::Text(text.into()))
                        .await
                        .map_err(|e| e.to_string());
                    let _ = ack.send(sent);
                }
                Some(Command::Close) | None => {
                    if let Err(e) = write.send(Message::Close(None)).await {
                        debug!(error = %e, "Close frame not sent");
                    }
                    let drained = timeout(CLOSE_GRACE, async {
                        while let Some(Ok(frame)) = read.next().await {
                            if frame.is_close() {
                                break;
                            }
                        }
                    })
                    .await;
                    if drained.is_err() {
                        warn!("Peer did not acknowledge close in time");
                    }
                    break None;
                }
            },
        }
    };

    info!(url = %url, reason = reason.as_deref().unwrap_or("local close"), "Websocket closed");
    events.on_close(reason);
}

fn install_crypto_provider() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        // Another provider may already be installed by the host binary.
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

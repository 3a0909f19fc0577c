//! Top-level client.
//!
//! Owns one [`TaskPool`] behind a [`BatchDispatcher`] and at most one
//! [`StreamSession`]. The two share nothing but the configuration.

use std::sync::Arc;

use serde_json::Value;
use tracing::info;

use crate::config::ClientConfig;
use crate::dispatch::request::AUTH;
use crate::dispatch::{
    BatchDispatcher, BatchResult, BuyOrder, CancelOrder, EditOrder, IntoRemoteRequest,
    SellOrder,
};
use crate::error::ClientError;
use crate::pool::TaskPool;
use crate::remote::{HttpRemoteCall, Params, RemoteCall};
use crate::stream::{MessageHandler, StreamSession, Transport, WsTransport};

/// Exchange client built from an explicit [`ClientConfig`].
pub struct ExchangeClient<C: RemoteCall + 'static = HttpRemoteCall> {
    config: ClientConfig,
    dispatcher: BatchDispatcher<C>,
    stream: Option<StreamSession>,
}

impl ExchangeClient<HttpRemoteCall> {
    /// Build a client that talks HTTP to `config.api.base_url`.
    ///
    /// Creates a blocking HTTP client, so call it outside async worker
    /// threads.
    pub fn from_config(config: ClientConfig) -> Result<Self, ClientError> {
        let remote = HttpRemoteCall::new(&config.api)?;
        Self::with_remote(config, Arc::new(remote))
    }
}

impl<C: RemoteCall + 'static> ExchangeClient<C> {
    /// Build a client over any remote call implementation.
    pub fn with_remote(config: ClientConfig, remote: Arc<C>) -> Result<Self, ClientError> {
        let pool = Arc::new(TaskPool::new(config.pool.worker_count)?);
        Ok(Self {
            dispatcher: BatchDispatcher::new(pool, remote),
            config,
            stream: None,
        })
    }

    /// Client configuration.
    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Batch dispatcher over the client's pool.
    #[must_use]
    pub const fn dispatcher(&self) -> &BatchDispatcher<C> {
        &self.dispatcher
    }

    /// The task pool.
    #[must_use]
    pub fn pool(&self) -> &Arc<TaskPool> {
        self.dispatcher.pool()
    }

    /// Exchange client credentials for an access token.
    ///
    /// # Errors
    ///
    /// Returns the call failure, or `MissingAccessToken` when the response
    /// has no `result.access_token`.
    pub fn authenticate(&self) -> Result<String, ClientError> {
        let params: Params = [
            ("client_id", self.config.api.client_id.as_str()),
            ("client_secret", self.config.api.client_secret.as_str()),
            ("grant_type", "client_credentials"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let response = self.dispatcher.remote().invoke(AUTH, &params, None)?;
        let token = response
            .pointer("/result/access_token")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .ok_or(ClientError::MissingAccessToken)?;

        info!("Authenticated");
        Ok(token.to_string())
    }

    /// Run one request on the calling thread.
    ///
    /// Blocks on the HTTP call, so call it outside async worker threads.
    pub fn call<R: IntoRemoteRequest>(&self, token: &str, item: R) -> Result<Value, ClientError> {
        let request = item.into_request();
        let token = Some(token).filter(|_| request.is_authenticated());
        Ok(self
            .dispatcher
            .remote()
            .invoke(request.endpoint(), request.params(), token)?)
    }

    /// Run any requests concurrently; results come back in input order.
    ///
    /// Blocks the calling thread until every item finishes. Calling it from
    /// an async worker thread panics; use `spawn_blocking` there.
    pub fn run_batch<I, R>(&self, token: &str, items: I) -> BatchResult
    where
        I: IntoIterator<Item = R>,
        R: IntoRemoteRequest,
    {
        self.dispatcher.run_batch(Some(token), items)
    }

    /// Place buy orders concurrently. Blocks like [`Self::run_batch`].
    pub fn place_orders(&self, token: &str, orders: Vec<BuyOrder>) -> BatchResult {
        self.run_batch(token, orders)
    }

    /// Place sell orders concurrently. Blocks like [`Self::run_batch`].
    pub fn sell_orders(&self, token: &str, orders: Vec<SellOrder>) -> BatchResult {
        self.run_batch(token, orders)
    }

    /// Modify orders concurrently. Blocks like [`Self::run_batch`].
    pub fn edit_orders(&self, token: &str, edits: Vec<EditOrder>) -> BatchResult {
        self.run_batch(token, edits)
    }

    /// Cancel orders concurrently. Blocks like [`Self::run_batch`].
    pub fn cancel_orders(&self, token: &str, cancels: Vec<CancelOrder>) -> BatchResult {
        self.run_batch(token, cancels)
    }

    /// Connect to the configured stream endpoint and subscribe in one step.
    ///
    /// Replaces any running session.
    pub fn start_stream<H>(
        &mut self,
        channel: &str,
        access_token: &str,
        handler: H,
    ) -> Result<(), ClientError>
    where
        H: MessageHandler + 'static,
    {
        let transport = Arc::new(WsTransport::new(&self.config.stream));
        self.start_stream_with_transport(transport, channel, access_token, handler)
    }

    /// Like [`Self::start_stream`] over an explicit transport.
    pub fn start_stream_with_transport<H>(
        &mut self,
        transport: Arc<dyn Transport>,
        channel: &str,
        access_token: &str,
        handler: H,
    ) -> Result<(), ClientError>
    where
        H: MessageHandler + 'static,
    {
        self.stop_stream();

        let session = StreamSession::with_transport(self.config.stream.clone(), transport);
        session.set_message_handler(handler);
        session.connect(&self.config.stream.host, self.config.stream.port)?;
        session.subscribe(channel, access_token)?;

        info!(channel, "Stream started");
        self.stream = Some(session);
        Ok(())
    }

    /// The streaming session, if started.
    #[must_use]
    pub const fn stream(&self) -> Option<&StreamSession> {
        self.stream.as_ref()
    }

    /// Close the streaming session if one is running.
    pub fn stop_stream(&mut self) {
        if let Some(session) = self.stream.take() {
            session.close();
        }
    }

    /// Close the stream and drain the pool.
    pub fn shutdown(&mut self) {
        self.stop_stream();
        self.dispatcher.pool().shutdown();
        info!("Exchange client shut down");
    }
}

impl<C: RemoteCall + 'static> std::fmt::Debug for ExchangeClient<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeClient")
            .field("pool", self.dispatcher.pool())
            .field("stream", &self.stream)
            .finish_non_exhaustive()
    }
}

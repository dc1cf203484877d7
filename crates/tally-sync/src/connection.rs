//! A replaceable connection to a single relay.
//!
//! Reconnecting never repairs a socket in place. It discards the current
//! sink and reader, bumps the connection generation and opens a fresh pair.
//! Frames are forwarded to the owner tagged with the generation they were
//! read on, so completions from a replaced connection are recognised and
//! dropped in [`RelayConnection::handle_inbound`].
//!
//! Every successful (re)connect re-issues the active subscription, because
//! relays forget subscriptions when a connection closes.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use url::Url;

use tally_core::Event;

use crate::error::{Result, SyncError};
use crate::health::{ConnectionHealth, ConnectionState, HealthTracker};
use crate::messages::{ClientMessage, Filter, RelayMessage, SubscriptionId};
use crate::transport::{Connector, FrameSink, FrameStream};

/// Upper bound on a polite close of a connection being replaced.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// One item read from a connection.
#[derive(Debug)]
pub struct Inbound {
    /// Generation of the connection this was read on.
    pub generation: u64,
    pub kind: InboundKind,
}

#[derive(Debug)]
pub enum InboundKind {
    Frame(String),
    Failed(String),
    Closed,
}

#[derive(Debug, Clone)]
struct Subscription {
    id: SubscriptionId,
    filters: Vec<Filter>,
}

impl Subscription {
    fn request(&self) -> Result<String> {
        ClientMessage::Req {
            id: self.id.clone(),
            filters: self.filters.clone(),
        }
        .to_json()
    }
}

/// Connection to one relay, owned by a single task.
pub struct RelayConnection {
    url: Url,
    connector: Arc<dyn Connector>,
    connect_timeout: Duration,
    generation: u64,
    sink: Option<Box<dyn FrameSink>>,
    reader: Option<JoinHandle<()>>,
    inbound_tx: mpsc::UnboundedSender<Inbound>,
    subscription: Option<Subscription>,
    state: watch::Sender<ConnectionState>,
    health: HealthTracker,
    health_change: Option<ConnectionHealth>,
}

impl RelayConnection {
    /// Create an idle connection. Nothing is opened until the first
    /// [`connect`](Self::connect), [`subscribe`](Self::subscribe) or [`send`](Self::send).
    ///
    /// Returns the receiver on which read frames arrive.
    pub fn new(
        url: Url,
        connector: Arc<dyn Connector>,
        connect_timeout: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<Inbound>) {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let connection = Self {
            url,
            connector,
            connect_timeout,
            generation: 0,
            sink: None,
            reader: None,
            inbound_tx,
            subscription: None,
            state,
            health: HealthTracker::new(),
            health_change: None,
        };
        (connection, inbound_rx)
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Generation of the current connection. Starts at 0 and increases on every attempt.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_open(&self) -> bool {
        self.sink.is_some()
    }

    /// Watch the connection lifecycle.
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn health(&self) -> ConnectionHealth {
        self.health.current()
    }

    /// Health transition since the last call, if any.
    pub fn take_health_change(&mut self) -> Option<ConnectionHealth> {
        self.health_change.take()
    }

    /// Id of the active subscription.
    pub fn subscription_id(&self) -> Option<&SubscriptionId> {
        self.subscription.as_ref().map(|s| &s.id)
    }

    /// Open a new connection, replacing any current one, then re-issue the
    /// active subscription on it.
    pub async fn connect(&mut self) -> Result<()> {
        self.teardown().await;
        self.generation += 1;
        let generation = self.generation;
        self.state.send_replace(ConnectionState::Connecting);
        debug!(relay = %self.url, generation, "connecting");

        let opened = match timeout(self.connect_timeout, self.connector.connect(&self.url)).await {
            Ok(result) => result,
            Err(_) => Err(SyncError::Timeout(self.connect_timeout)),
        };
        let (sink, stream) = match opened {
            Ok(halves) => halves,
            Err(e) => {
                warn!(relay = %self.url, generation, error = %e, "connect failed");
                self.fault(e.to_string());
                return Err(e);
            }
        };

        self.sink = Some(sink);
        self.reader = Some(spawn_reader(generation, stream, self.inbound_tx.clone()));
        self.state.send_replace(ConnectionState::Connected);
        self.record(true);
        info!(relay = %self.url, generation, "connected");

        let request = self.subscription.as_ref().map(Subscription::request).transpose()?;
        if let Some(frame) = request {
            self.send_frame(frame).await?;
            debug!(generation, subscription = ?self.subscription_id(), "subscription re-issued");
        }
        Ok(())
    }

    /// Replace the current connection. Same as [`connect`](Self::connect),
    /// named for call sites reacting to a failure or a network change.
    pub async fn reconnect(&mut self) -> Result<()> {
        info!(relay = %self.url, previous = self.generation, "reconnecting");
        self.connect().await
    }

    /// Send a message, reconnecting first if the connection is not open.
    ///
    /// A failed send triggers one reconnect and one retry.
    pub async fn send(&mut self, message: &ClientMessage) -> Result<()> {
        let frame = message.to_json()?;

        if !self.is_open() {
            self.reconnect().await?;
        }

        match self.send_frame(frame.clone()).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(error = %e, "send failed, retrying on a new connection");
                self.reconnect().await?;
                self.send_frame(frame).await
            }
        }
    }

    /// Replace the active subscription with a new one over `filters`.
    ///
    /// The subscription is remembered even if it cannot be sent now; the
    /// next successful connect issues it.
    pub async fn subscribe(&mut self, filters: Vec<Filter>) -> Result<SubscriptionId> {
        let subscription = Subscription {
            id: SubscriptionId::random(),
            filters,
        };
        let id = subscription.id.clone();
        let request = subscription.request()?;
        self.subscription = Some(subscription);

        if !self.is_open() {
            // Connecting issues the request.
            self.reconnect().await?;
        } else if self.send_frame(request).await.is_err() {
            self.reconnect().await?;
        }
        Ok(id)
    }

    /// Close the active subscription. A closed connection has none to close.
    pub async fn unsubscribe(&mut self) -> Result<()> {
        let Some(subscription) = self.subscription.take() else {
            return Ok(());
        };
        if self.is_open() {
            let frame = ClientMessage::Close(subscription.id).to_json()?;
            self.send_frame(frame).await?;
        }
        Ok(())
    }

    /// Process one item from the inbound receiver, returning an event
    /// delivered on the active subscription.
    pub fn handle_inbound(&mut self, inbound: Inbound) -> Option<Event> {
        if inbound.generation != self.generation {
            debug!(
                stale = inbound.generation,
                current = self.generation,
                "ignoring completion from a replaced connection"
            );
            return None;
        }

        match inbound.kind {
            InboundKind::Frame(text) => {
                self.record(true);
                match RelayMessage::parse(&text) {
                    Ok(Some(RelayMessage::Event {
                        subscription,
                        event,
                    })) => {
                        if self.subscription_id() == Some(&subscription) {
                            Some(*event)
                        } else {
                            debug!(%subscription, "event for an inactive subscription");
                            None
                        }
                    }
                    Ok(_) => None,
                    Err(e) => {
                        warn!(error = %e, "dropping malformed frame");
                        None
                    }
                }
            }
            InboundKind::Failed(reason) => {
                warn!(generation = inbound.generation, %reason, "receive failed");
                self.fault(reason);
                None
            }
            InboundKind::Closed => {
                info!(generation = inbound.generation, "relay closed the connection");
                self.fault("connection closed".into());
                None
            }
        }
    }

    /// Feed the OS network-reachability signal into the health tracker.
    pub fn set_reachable(&mut self, reachable: bool) {
        if let Some(change) = self.health.set_reachable(reachable) {
            self.health_change = Some(change);
        }
    }

    async fn send_frame(&mut self, frame: String) -> Result<()> {
        let Some(sink) = self.sink.as_mut() else {
            return Err(SyncError::Transport("not connected".into()));
        };
        let result = match timeout(self.connect_timeout, sink.send(frame)).await {
            Ok(result) => result,
            Err(_) => Err(SyncError::Timeout(self.connect_timeout)),
        };
        match result {
            Ok(()) => {
                self.record(true);
                Ok(())
            }
            Err(e) => {
                self.fault(e.to_string());
                Err(e)
            }
        }
    }

    /// Drop the current connection without waiting for the reader.
    fn fault(&mut self, reason: String) {
        self.sink = None;
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        self.state.send_replace(ConnectionState::Degraded(reason));
        self.record(false);
    }

    async fn teardown(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        if let Some(mut sink) = self.sink.take() {
            if timeout(CLOSE_GRACE, sink.close()).await.is_err() {
                debug!(generation = self.generation, "close timed out");
            }
        }
    }

    fn record(&mut self, ok: bool) {
        let change = if ok {
            self.health.record_success()
        } else {
            self.health.record_failure()
        };
        if let Some(change) = change {
            self.health_change = Some(change);
        }
    }
}

impl Drop for RelayConnection {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

/// Read until the stream ends or fails, forwarding everything tagged with `generation`.
fn spawn_reader(
    generation: u64,
    mut stream: Box<dyn FrameStream>,
    inbound: mpsc::UnboundedSender<Inbound>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let (kind, last) = match stream.next_frame().await {
                Some(Ok(frame)) => (InboundKind::Frame(frame), false),
                Some(Err(e)) => (InboundKind::Failed(e.to_string()), true),
                None => (InboundKind::Closed, true),
            };
            if inbound.send(Inbound { generation, kind }).is_err() || last {
                break;
            }
        }
    })
}

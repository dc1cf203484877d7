//! Transport abstraction for the relay connection.
//!
//! A [`Connector`] opens one duplex text-frame connection and hands back its
//! two halves. The connection layer owns reconnect policy; transports only
//! move frames.

use async_trait::async_trait;
use url::Url;

use crate::error::Result;

/// Outbound half of a connection.
#[async_trait]
pub trait FrameSink: Send {
    /// Send one text frame.
    async fn send(&mut self, frame: String) -> Result<()>;

    /// Close the connection politely.
    async fn close(&mut self) -> Result<()>;
}

/// Inbound half of a connection.
#[async_trait]
pub trait FrameStream: Send {
    /// Wait for the next text frame.
    ///
    /// Returns `None` once the connection has closed. Non-text frames are
    /// skipped by implementations.
    async fn next_frame(&mut self) -> Option<Result<String>>;
}

/// Opens connections to a relay.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &Url) -> Result<(Box<dyn FrameSink>, Box<dyn FrameStream>)>;
}

/// WebSocket transport over tokio-tungstenite.
pub mod websocket {
    use super::*;
    use futures_util::stream::{SplitSink, SplitStream};
    use futures_util::{SinkExt, StreamExt};
    use tokio::net::TcpStream;
    use tokio_tungstenite::tungstenite::Message;
    use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

    use crate::error::SyncError;

    type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

    fn transport_error(e: tokio_tungstenite::tungstenite::Error) -> SyncError {
        SyncError::Transport(e.to_string())
    }

    /// Connects to `ws://` and `wss://` relays.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct WsConnector;

    #[async_trait]
    impl Connector for WsConnector {
        async fn connect(&self, url: &Url) -> Result<(Box<dyn FrameSink>, Box<dyn FrameStream>)> {
            let (socket, _response) = connect_async(url.as_str()).await.map_err(transport_error)?;
            let (sink, stream) = socket.split();
            Ok((Box::new(WsSink(sink)), Box::new(WsStream(stream))))
        }
    }

    struct WsSink(SplitSink<Socket, Message>);

    #[async_trait]
    impl FrameSink for WsSink {
        async fn send(&mut self, frame: String) -> Result<()> {
            self.0.send(Message::text(frame)).await.map_err(transport_error)
        }

        async fn close(&mut self) -> Result<()> {
            self.0.close().await.map_err(transport_error)
        }
    }

    struct WsStream(SplitStream<Socket>);

    #[async_trait]
    impl FrameStream for WsStream {
        async fn next_frame(&mut self) -> Option<Result<String>> {
            loop {
                match self.0.next().await? {
                    Ok(Message::Text(text)) => return Some(Ok(text.as_str().to_owned())),
                    Ok(Message::Close(_)) => return None,
                    // Pings are answered by tungstenite itself.
                    Ok(_) => continue,
                    Err(e) => return Some(Err(transport_error(e))),
                }
            }
        }
    }
}

/// An in-memory relay for testing.
///
/// Implements the relay side of the protocol closely enough to exercise
/// reconnects and multi-device convergence: it stores published events,
/// answers `REQ` with stored matches followed by `EOSE`, fans new events out
/// to live subscriptions and records every client frame.
pub mod memory {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::sync::{mpsc, Mutex};

    use tally_core::Event;

    use crate::error::SyncError;
    use crate::messages::{ClientMessage, Filter, RelayMessage, SubscriptionId};

    struct Peer {
        outbox: mpsc::UnboundedSender<String>,
        subscriptions: HashMap<SubscriptionId, Vec<Filter>>,
    }

    #[derive(Default)]
    struct RelayState {
        events: Vec<Event>,
        peers: HashMap<u64, Peer>,
        next_peer: u64,
        connects: usize,
        frames: Vec<String>,
        offline: bool,
    }

    impl RelayState {
        fn deliver(&self, peer: u64, message: &RelayMessage) {
            let (Some(peer), Ok(frame)) = (self.peers.get(&peer), message.to_json()) else {
                return;
            };
            // A dropped receiver just means that client went away.
            let _ = peer.outbox.send(frame);
        }

        /// Newest first, each filter's limit applied separately.
        fn query(&self, filters: &[Filter]) -> Vec<Event> {
            let mut sorted: Vec<&Event> = self.events.iter().collect();
            sorted.sort_by(|a, b| b.created_at.cmp(&a.created_at));

            let mut out: Vec<Event> = Vec::new();
            for filter in filters {
                let matching = sorted.iter().filter(|e| filter.matches(e));
                for event in matching.take(filter.limit.unwrap_or(usize::MAX)) {
                    if !out.iter().any(|seen| seen.id == event.id) {
                        out.push((*event).clone());
                    }
                }
            }
            out
        }

        fn publish(&mut self, event: Event) {
            if self.events.iter().any(|e| e.id == event.id) {
                return;
            }

            for (peer_id, peer) in &self.peers {
                for (subscription, filters) in &peer.subscriptions {
                    if filters.iter().any(|f| f.matches(&event)) {
                        self.deliver(
                            *peer_id,
                            &RelayMessage::Event {
                                subscription: subscription.clone(),
                                event: Box::new(event.clone()),
                            },
                        );
                    }
                }
            }
            self.events.push(event);
        }
    }

    /// Shared handle to one in-memory relay. Clones talk to the same relay.
    #[derive(Clone, Default)]
    pub struct MemoryRelay {
        state: Arc<Mutex<RelayState>>,
    }

    impl MemoryRelay {
        /// Create an empty relay.
        pub fn new() -> Self {
            Self::default()
        }

        /// Refuse (or accept again) new connections.
        pub async fn set_offline(&self, offline: bool) {
            self.state.lock().await.offline = offline;
        }

        /// Drop every live connection, as a relay restart or network loss would.
        pub async fn drop_connections(&self) {
            self.state.lock().await.peers.clear();
        }

        /// Total connections ever accepted.
        pub async fn connect_count(&self) -> usize {
            self.state.lock().await.connects
        }

        /// Connections currently open.
        pub async fn live_connections(&self) -> usize {
            self.state.lock().await.peers.len()
        }

        /// Every frame received from clients, in arrival order.
        pub async fn frames(&self) -> Vec<String> {
            self.state.lock().await.frames.clone()
        }

        /// Number of received client frames with the given tag (`"REQ"`, `"EVENT"`, ...).
        pub async fn count_frames(&self, tag: &str) -> usize {
            let prefix = format!("[\"{tag}\"");
            self.state
                .lock()
                .await
                .frames
                .iter()
                .filter(|f| f.starts_with(&prefix))
                .count()
        }

        /// Events the relay has stored.
        pub async fn stored_events(&self) -> Vec<Event> {
            self.state.lock().await.events.clone()
        }

        /// Store and fan out an event without any client connection, as if
        /// another relay user had published it.
        pub async fn inject(&self, event: Event) {
            self.state.lock().await.publish(event);
        }

        async fn handle_frame(&self, peer: u64, frame: String) -> Result<()> {
            let mut state = self.state.lock().await;
            if !state.peers.contains_key(&peer) {
                return Err(SyncError::Transport("connection closed".into()));
            }
            state.frames.push(frame.clone());

            let message = match ClientMessage::from_json(&frame) {
                Ok(message) => message,
                Err(e) => {
                    state.deliver(peer, &RelayMessage::Notice(format!("invalid: {e}")));
                    return Ok(());
                }
            };

            match message {
                ClientMessage::Event(event) => {
                    let verdict = event.verify();
                    let reply = RelayMessage::Ok {
                        event_id: event.id,
                        accepted: verdict.is_ok(),
                        message: verdict.err().map(|e| format!("invalid: {e}")).unwrap_or_default(),
                    };
                    if matches!(reply, RelayMessage::Ok { accepted: true, .. }) {
                        state.publish(*event);
                    }
                    state.deliver(peer, &reply);
                }
                ClientMessage::Req { id, filters } => {
                    for event in state.query(&filters) {
                        state.deliver(
                            peer,
                            &RelayMessage::Event {
                                subscription: id.clone(),
                                event: Box::new(event),
                            },
                        );
                    }
                    state.deliver(peer, &RelayMessage::EndOfStoredEvents(id.clone()));
                    if let Some(p) = state.peers.get_mut(&peer) {
                        p.subscriptions.insert(id, filters);
                    }
                }
                ClientMessage::Close(id) => {
                    if let Some(p) = state.peers.get_mut(&peer) {
                        p.subscriptions.remove(&id);
                    }
                }
            }
            Ok(())
        }

        async fn disconnect(&self, peer: u64) {
            self.state.lock().await.peers.remove(&peer);
        }
    }

    #[async_trait]
    impl Connector for MemoryRelay {
        async fn connect(&self, _url: &Url) -> Result<(Box<dyn FrameSink>, Box<dyn FrameStream>)> {
            let mut state = self.state.lock().await;
            if state.offline {
                return Err(SyncError::Transport("relay unreachable".into()));
            }

            let (outbox, inbox) = mpsc::unbounded_channel();
            let id = state.next_peer;
            state.next_peer += 1;
            state.connects += 1;
            state.peers.insert(
                id,
                Peer {
                    outbox,
                    subscriptions: HashMap::new(),
                },
            );

            Ok((
                Box::new(MemorySink {
                    relay: self.clone(),
                    peer: id,
                }),
                Box::new(MemoryStream { inbox }),
            ))
        }
    }

    struct MemorySink {
        relay: MemoryRelay,
        peer: u64,
    }

    #[async_trait]
    impl FrameSink for MemorySink {
        async fn send(&mut self, frame: String) -> Result<()> {
            self.relay.handle_frame(self.peer, frame).await
        }

        async fn close(&mut self) -> Result<()> {
            self.relay.disconnect(self.peer).await;
            Ok(())
        }
    }

    struct MemoryStream {
        inbox: mpsc::UnboundedReceiver<String>,
    }

    #[async_trait]
    impl FrameStream for MemoryStream {
        async fn next_frame(&mut self) -> Option<Result<String>> {
            self.inbox.recv().await.map(Ok)
        }
    }
}

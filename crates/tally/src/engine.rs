//! The sync engine: one task that owns the coordinator and the relay connection.
//!
//! Everything that can change the counter or the connection is funnelled
//! through this task's `select!` loop, so no state is shared or locked.
//! The loop waits on four things:
//!
//! - commands from [`EngineHandle`],
//! - frames read from the relay,
//! - the edit-lock deadline,
//! - a pending reconnect after the relay dropped us.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};

use tally_core::{Event, Identity};
use tally_sync::{
    ClientId, ClientMessage, ConnectionState, Connector, Coordinator, Decision, Inbound,
    RelayConnection, SyncConfig, SyncObserver,
};

use crate::error::{Result, TallyError};

#[derive(Debug)]
enum Command {
    CounterChanged { value: u64, running: bool },
    NetworkChanged { reachable: bool },
    Wake,
    RotateIdentity,
    Shutdown,
}

/// Cloneable handle for feeding the engine.
///
/// Every method is fire-and-forget. It fails only with
/// [`TallyError::EngineStopped`] once the engine has exited.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
}

impl EngineHandle {
    /// The external timer's value or running flag changed.
    pub fn counter_changed(&self, value: u64, running: bool) -> Result<()> {
        self.send(Command::CounterChanged { value, running })
    }

    /// OS network reachability changed. Becoming reachable forces a reconnect.
    pub fn network_changed(&self, reachable: bool) -> Result<()> {
        self.send(Command::NetworkChanged { reachable })
    }

    /// The machine woke from sleep. Forces a reconnect.
    pub fn wake(&self) -> Result<()> {
        self.send(Command::Wake)
    }

    /// Replace the sync identity with a fresh one.
    ///
    /// The new secret is reported through [`SyncObserver::on_identity_changed`].
    pub fn rotate_identity(&self) -> Result<()> {
        self.send(Command::RotateIdentity)
    }

    /// Stop the engine after closing the subscription.
    pub fn shutdown(&self) -> Result<()> {
        self.send(Command::Shutdown)
    }

    /// Watch the relay connection lifecycle.
    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands.send(command).map_err(|_| TallyError::EngineStopped)
    }
}

/// The engine task state.
pub struct Engine {
    coordinator: Coordinator,
    connection: RelayConnection,
    inbound: mpsc::UnboundedReceiver<Inbound>,
    commands: mpsc::UnboundedReceiver<Command>,
    observer: Arc<dyn SyncObserver>,
    lock_window: Duration,
    reconnect_delay: Duration,
    reconnect_at: Option<Instant>,
    reachable: bool,
}

impl Engine {
    /// Start an engine on the current tokio runtime.
    ///
    /// The engine subscribes to the identity's mailbox immediately. A relay
    /// that cannot be reached is retried in the background; it is not an error here.
    pub fn spawn(
        identity: Identity,
        client_id: ClientId,
        config: SyncConfig,
        connector: Arc<dyn Connector>,
        observer: Arc<dyn SyncObserver>,
    ) -> Result<(EngineHandle, JoinHandle<()>)> {
        let coordinator = Coordinator::new(identity, client_id, &config)?;
        let (connection, inbound) =
            RelayConnection::new(config.relay_url.clone(), connector, config.connect_timeout);
        let (commands_tx, commands) = mpsc::unbounded_channel();

        let handle = EngineHandle {
            commands: commands_tx,
            state: connection.state(),
        };
        let engine = Self {
            coordinator,
            connection,
            inbound,
            commands,
            observer,
            lock_window: config.lock_window,
            reconnect_delay: config.reconnect_delay,
            reconnect_at: None,
            reachable: true,
        };

        Ok((handle, tokio::spawn(engine.run())))
    }

    async fn run(mut self) {
        info!(
            relay = %self.connection.url(),
            pubkey = %self.coordinator.public_key(),
            client_id = %self.coordinator.client_id(),
            "sync engine started"
        );
        self.subscribe_mailbox().await;
        self.after_step();

        loop {
            let lock_deadline = self.coordinator.lock_deadline();
            let reconnect_at = self.reconnect_at;

            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command).await,
                },
                Some(inbound) = self.inbound.recv() => self.handle_inbound(inbound),
                _ = wait_until(lock_deadline) => self.handle_lock_expiry(),
                _ = wait_until(reconnect_at) => {
                    self.reconnect_at = None;
                    self.reconnect("retrying after disconnect").await;
                }
            }

            self.after_step();
        }

        if let Err(e) = self.connection.unsubscribe().await {
            debug!(error = %e, "could not close subscription on shutdown");
        }
        info!("sync engine stopped");
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Handlers
    // ─────────────────────────────────────────────────────────────────────────

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::CounterChanged { value, running } => {
                match self.coordinator.local_changed(value, running, Instant::now()) {
                    Ok(Some(event)) => self.publish(event).await,
                    Ok(None) => {}
                    Err(e) => warn!(value, error = %e, "could not build state event"),
                }
            }
            Command::NetworkChanged { reachable } => {
                let regained = reachable && !self.reachable;
                self.reachable = reachable;
                self.connection.set_reachable(reachable);
                if regained {
                    self.reconnect("network path changed").await;
                }
            }
            Command::Wake => self.reconnect("woke from sleep").await,
            Command::RotateIdentity => self.rotate_identity().await,
            Command::Shutdown => {}
        }
    }

    fn handle_inbound(&mut self, inbound: Inbound) {
        let Some(event) = self.connection.handle_inbound(inbound) else {
            return;
        };

        if let Decision::Applied {
            value,
            locked_until,
        } = self.coordinator.inbound(&event, Instant::now())
        {
            self.observer.on_state_applied(value);
            if locked_until.is_some() {
                self.observer.on_ui_should_lock(self.lock_window);
            }
        }
    }

    fn handle_lock_expiry(&mut self) {
        if self.coordinator.expire_lock(Instant::now()) {
            debug!("edit lock released");
            self.observer.on_ui_unlocked();
        }
    }

    async fn rotate_identity(&mut self) {
        let identity = match Identity::generate() {
            Ok(identity) => identity,
            Err(e) => {
                error!(error = %e, "could not generate a new identity, keeping the current one");
                return;
            }
        };
        let secret = identity.secret_hex();

        let seed = match self.coordinator.rotate(identity) {
            Ok(seed) => seed,
            Err(e) => {
                error!(error = %e, "could not switch to the new identity, keeping the current one");
                return;
            }
        };
        self.observer.on_identity_changed(&secret);

        if let Err(e) = self.connection.unsubscribe().await {
            warn!(error = %e, "could not close the old mailbox subscription");
        }

        self.subscribe_mailbox().await;
        if let Some(event) = seed {
            self.publish(event).await;
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Connection plumbing
    // ─────────────────────────────────────────────────────────────────────────

    async fn subscribe_mailbox(&mut self) {
        match self.connection.subscribe(vec![self.coordinator.mailbox()]).await {
            Ok(id) => debug!(subscription = %id, "mailbox subscribed"),
            Err(e) => warn!(error = %e, "mailbox subscription pending until the relay is reachable"),
        }
    }

    async fn publish(&mut self, event: Event) {
        let event_id = event.id;
        match self.connection.send(&ClientMessage::Event(Box::new(event))).await {
            Ok(()) => debug!(%event_id, "published state"),
            Err(e) => warn!(%event_id, error = %e, "publish failed"),
        }
    }

    async fn reconnect(&mut self, reason: &str) {
        info!(reason, "forcing reconnect");
        if let Err(e) = self.connection.reconnect().await {
            warn!(reason, error = %e, "reconnect failed");
        }
    }

    /// Bookkeeping after every loop step: report health transitions and keep
    /// exactly one reconnect pending while the connection is down.
    fn after_step(&mut self) {
        if let Some(health) = self.connection.take_health_change() {
            self.observer.on_connection_health_changed(health);
        }

        if self.connection.is_open() {
            self.reconnect_at = None;
        } else if self.reconnect_at.is_none() {
            let at = Instant::now() + self.reconnect_delay;
            debug!(delay = ?self.reconnect_delay, "reconnect scheduled");
            self.reconnect_at = Some(at);
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

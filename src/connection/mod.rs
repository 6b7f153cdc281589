//! Connection manager for the realtime update channel.
//!
//! A [`ConnectionManager`] keeps at most one WebSocket open to the backend's
//! realtime route and turns its traffic into [`Event`]s for the
//! [`EventDispatcher`].
//!
//! # Architecture
//!
//! ```text
//! ConnectionManager (handle) ──commands──► actor task ──spawns──► Link task
//!        ▲                                   │    ▲                  │
//!        │ watch: state, last event          │    └──LinkEvent───────┘
//!        └───────────────────────────────────┘
//! ```
//!
//! The handle is cheap to call from any thread. Configuration lives in a
//! shared cell the actor reads fresh on every attempt, so a reconnect always
//! uses the latest identity and token.
//!
//! # Reconnect Cancellation
//!
//! `connect()`, `disconnect()` and dropping the manager bump a shared epoch
//! before their command is even queued. A reconnect timer remembers the epoch
//! it was scheduled under and does nothing if it has changed by the time it
//! fires.
//!
//! # Example
//!
//! ```no_run
//! use hireq_realtime::{ConnectionConfig, ConnectionManager, Endpoint};
//!
//! # async fn run() {
//! let manager = ConnectionManager::builder()
//!     .endpoint(Endpoint::with_ws_url("ws://localhost:8000/api/realtime/ws"))
//!     .config(ConnectionConfig {
//!         user_id: "u1".to_string(),
//!         ..ConnectionConfig::default()
//!     })
//!     .on_connection_change(|connected| println!("connected: {connected}"))
//!     .build();
//!
//! manager.on_event(|event| println!("{}", event.kind()));
//! # }
//! ```

mod actor;
mod backoff;
mod link;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::{mpsc, watch};

pub use backoff::{reconnect_delay, Backoff};

use crate::config::ConnectionConfig;
use crate::constants::KEEPALIVE_INTERVAL;
use crate::dispatcher::{EventDispatcher, EventObserver, NotificationListener, ObserverId};
use crate::endpoint::Endpoint;
use crate::env::Platform;
use crate::events::Event;
use crate::notifications::Notification;
use actor::{Actor, ActorParts};

/// Callback receiving `true` when the transport opens and `false` when it
/// closes.
pub type ConnectionCallback = Arc<dyn Fn(bool) + Send + Sync>;

/// Lifecycle of the realtime connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// No transport exists, or the last one closed.
    #[default]
    Disconnected,
    /// A transport is opening.
    Connecting,
    /// The transport is open and frames are flowing.
    Connected,
}

impl ConnectionState {
    /// Whether the transport is open.
    #[must_use]
    pub fn is_connected(self) -> bool {
        self == Self::Connected
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
        }
    }
}

/// Requests from the handle to the actor.
#[derive(Debug)]
pub(crate) enum Command {
    Connect,
    Disconnect,
    /// User id or token changed while enabled.
    IdentityChanged,
    Shutdown,
}

/// State shared between the handle and the actor.
#[derive(Debug)]
pub(crate) struct Shared {
    config: RwLock<ConnectionConfig>,
    epoch: AtomicU64,
}

impl Shared {
    fn new(config: ConnectionConfig) -> Self {
        Self {
            config: RwLock::new(config),
            epoch: AtomicU64::new(0),
        }
    }

    pub(crate) fn config(&self) -> ConnectionConfig {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn replace_config(&self, config: ConnectionConfig) -> ConnectionConfig {
        let mut current = self.config.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *current, config)
    }

    pub(crate) fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    fn bump_epoch(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
    }
}

/// Handle to a running connection manager.
///
/// Dropping the handle cancels any pending reconnect and closes the
/// transport.
pub struct ConnectionManager {
    commands: mpsc::UnboundedSender<Command>,
    shared: Arc<Shared>,
    dispatcher: Arc<EventDispatcher>,
    state_rx: watch::Receiver<ConnectionState>,
    last_event_rx: watch::Receiver<Option<Event>>,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("state", &self.state())
            .field("epoch", &self.shared.epoch())
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

impl ConnectionManager {
    /// Start building a manager.
    #[must_use]
    pub fn builder() -> ConnectionManagerBuilder {
        ConnectionManagerBuilder::default()
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            log::warn!("[Realtime] Manager task is gone, command dropped");
        }
    }

    /// Open a transport if enabled, replacing any live one.
    ///
    /// Cancels a pending reconnect. A no-op on [`Platform::Server`].
    pub fn connect(&self) {
        self.shared.bump_epoch();
        self.send(Command::Connect);
    }

    /// Close the transport with a normal closure and cancel any pending
    /// reconnect. Idempotent.
    pub fn disconnect(&self) {
        self.shared.bump_epoch();
        self.send(Command::Disconnect);
    }

    /// Replace the connection inputs.
    ///
    /// Enabling connects, disabling disconnects. A changed user id or token
    /// while enabled closes the current transport and reconnects shortly
    /// after with the new values.
    pub fn update_config(&self, config: ConnectionConfig) {
        let previous = self.shared.replace_config(config.clone());

        match (previous.enabled, config.enabled) {
            (false, true) => self.connect(),
            (true, false) => self.disconnect(),
            (false, false) => {}
            (true, true) => {
                if previous.identity_differs(&config) {
                    self.send(Command::IdentityChanged);
                }
            }
        }
    }

    /// Toggle the master switch.
    pub fn set_enabled(&self, enabled: bool) {
        let mut config = self.config();
        config.enabled = enabled;
        self.update_config(config);
    }

    /// Replace the user id and token.
    pub fn set_credentials(&self, user_id: impl Into<String>, token: Option<String>) {
        let mut config = self.config();
        config.user_id = user_id.into();
        config.token = token.filter(|t| !t.is_empty());
        self.update_config(config);
    }

    /// Current connection inputs.
    #[must_use]
    pub fn config(&self) -> ConnectionConfig {
        self.shared.config()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Whether the transport is open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Watch lifecycle changes.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Wait until the manager reaches `state`.
    ///
    /// Returns `false` if the manager task ended first.
    pub async fn wait_for_state(&self, state: ConnectionState) -> bool {
        let mut rx = self.state_rx.clone();
        // Release the watch guard before `rx` goes out of scope
        rx.wait_for(|current| *current == state)
            .await
            .map(|_| ())
            .is_ok()
    }

    /// Most recently received event, lifecycle events included.
    #[must_use]
    pub fn last_event(&self) -> Option<Event> {
        self.last_event_rx.borrow().clone()
    }

    /// Watch the most recent event.
    #[must_use]
    pub fn subscribe_last_event(&self) -> watch::Receiver<Option<Event>> {
        self.last_event_rx.clone()
    }

    /// Register an event observer.
    pub fn on_event<F>(&self, observer: F) -> ObserverId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.dispatcher.on_event(observer)
    }

    /// Register a listener for each notification added to the feed.
    pub fn on_notification<F>(&self, listener: F) -> ObserverId
    where
        F: Fn(&Notification) + Send + Sync + 'static,
    {
        self.dispatcher.on_notification(listener)
    }

    /// Unregister an event observer or notification listener.
    pub fn remove_observer(&self, id: ObserverId) -> bool {
        self.dispatcher.remove_observer(id)
    }

    /// Notification feed snapshot, newest first.
    #[must_use]
    pub fn notifications(&self) -> Vec<Notification> {
        self.dispatcher.notifications()
    }

    /// Remove one notification by id.
    pub fn dismiss_notification(&self, id: &str) -> bool {
        self.dispatcher.dismiss_notification(id)
    }

    /// Remove all notifications.
    pub fn clear_notifications(&self) {
        self.dispatcher.clear_notifications();
    }

    /// The dispatcher fed by this manager.
    #[must_use]
    pub fn dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.dispatcher
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.shared.bump_epoch();
        let _ = self.commands.send(Command::Shutdown);
    }
}

/// Builder for [`ConnectionManager`].
pub struct ConnectionManagerBuilder {
    endpoint: Endpoint,
    config: ConnectionConfig,
    platform: Platform,
    keepalive_interval: Duration,
    dispatcher: Option<Arc<EventDispatcher>>,
    on_connection_change: Option<ConnectionCallback>,
    observers: Vec<EventObserver>,
    listeners: Vec<NotificationListener>,
}

impl Default for ConnectionManagerBuilder {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::default(),
            config: ConnectionConfig::default(),
            platform: Platform::default(),
            keepalive_interval: KEEPALIVE_INTERVAL,
            dispatcher: None,
            on_connection_change: None,
            observers: Vec::new(),
            listeners: Vec::new(),
        }
    }
}

impl std::fmt::Debug for ConnectionManagerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManagerBuilder")
            .field("endpoint", &self.endpoint)
            .field("config", &self.config)
            .field("platform", &self.platform)
            .field("keepalive_interval", &self.keepalive_interval)
            .field("observers", &self.observers.len())
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}

impl ConnectionManagerBuilder {
    /// Where to connect.
    #[must_use]
    pub fn endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoint = endpoint;
        self
    }

    /// Initial connection inputs.
    #[must_use]
    pub fn config(mut self, config: ConnectionConfig) -> Self {
        self.config = config;
        self
    }

    /// Runtime platform. [`Platform::Server`] never opens a transport.
    #[must_use]
    pub fn platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    /// Period between keepalive pings.
    #[must_use]
    pub fn keepalive_interval(mut self, interval: Duration) -> Self {
        self.keepalive_interval = interval;
        self
    }

    /// Share an existing dispatcher (and its feed).
    #[must_use]
    pub fn dispatcher(mut self, dispatcher: Arc<EventDispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Called with `true` on open and `false` on close.
    #[must_use]
    pub fn on_connection_change<F>(mut self, callback: F) -> Self
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        self.on_connection_change = Some(Arc::new(callback));
        self
    }

    /// Register an observer before the first connection attempt.
    #[must_use]
    pub fn on_event<F>(mut self, observer: F) -> Self
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.observers.push(Arc::new(observer));
        self
    }

    /// Register a notification listener before the first connection attempt.
    #[must_use]
    pub fn on_notification<F>(mut self, listener: F) -> Self
    where
        F: Fn(&Notification) + Send + Sync + 'static,
    {
        self.listeners.push(Arc::new(listener));
        self
    }

    /// Spawn the manager task and connect if enabled.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    #[must_use]
    pub fn build(self) -> ConnectionManager {
        let dispatcher = self.dispatcher.unwrap_or_default();
        for observer in self.observers {
            dispatcher.add_observer(observer);
        }
        for listener in self.listeners {
            dispatcher.add_notification_listener(listener);
        }

        let enabled = self.config.enabled;
        let shared = Arc::new(Shared::new(self.config));
        let (commands, commands_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (last_event_tx, last_event_rx) = watch::channel(None);

        let actor = Actor::new(ActorParts {
            shared: Arc::clone(&shared),
            endpoint: self.endpoint,
            platform: self.platform,
            keepalive_interval: self.keepalive_interval,
            dispatcher: Arc::clone(&dispatcher),
            on_connection_change: self.on_connection_change,
            state_tx,
            last_event_tx,
            commands: commands_rx,
        });
        tokio::spawn(actor.run());

        let manager = ConnectionManager {
            commands,
            shared,
            dispatcher,
            state_rx,
            last_event_rx,
        };
        if enabled {
            manager.connect();
        }
        manager
    }
}

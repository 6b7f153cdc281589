//! Background task that owns the connection lifecycle.
//!
//! All transitions happen on this task, driven by one `tokio::select!` loop
//! over four sources:
//!
//! ```text
//!   commands (handle) ──┐
//!   link events ────────┤
//!   reconnect timer ────┼──► Actor ──► state watch, last-event watch,
//!   keepalive interval ─┘              dispatcher, connection callback
//! ```
//!
//! At most one [`Link`] exists at a time, and at most one reconnect timer is
//! pending: scheduling a new one replaces the old.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::{Interval, MissedTickBehavior, Sleep};

use super::backoff::Backoff;
use super::link::{Link, LinkEvent};
use super::{Command, ConnectionCallback, ConnectionState, Shared};
use crate::constants::{IDENTITY_SETTLE_DELAY, NORMAL_CLOSURE, PING_FRAME, PONG_FRAME};
use crate::dispatcher::EventDispatcher;
use crate::endpoint::Endpoint;
use crate::env::Platform;
use crate::events::Event;

/// A scheduled reconnect, valid only while the shared epoch is unchanged.
struct PendingReconnect {
    sleep: Pin<Box<Sleep>>,
    epoch: u64,
}

/// Everything the actor needs, assembled by the builder.
pub(crate) struct ActorParts {
    pub(crate) shared: Arc<Shared>,
    pub(crate) endpoint: Endpoint,
    pub(crate) platform: Platform,
    pub(crate) keepalive_interval: Duration,
    pub(crate) dispatcher: Arc<EventDispatcher>,
    pub(crate) on_connection_change: Option<ConnectionCallback>,
    pub(crate) state_tx: watch::Sender<ConnectionState>,
    pub(crate) last_event_tx: watch::Sender<Option<Event>>,
    pub(crate) commands: mpsc::UnboundedReceiver<Command>,
}

pub(crate) struct Actor {
    parts: ActorParts,
    link_tx: mpsc::UnboundedSender<LinkEvent>,
    link_rx: mpsc::UnboundedReceiver<LinkEvent>,
    link: Option<Link>,
    next_link_id: u64,
    backoff: Backoff,
    reconnect: Option<PendingReconnect>,
    keepalive: Option<Interval>,
}

impl Actor {
    pub(crate) fn new(parts: ActorParts) -> Self {
        let (link_tx, link_rx) = mpsc::unbounded_channel();
        Self {
            parts,
            link_tx,
            link_rx,
            link: None,
            next_link_id: 0,
            backoff: Backoff::default(),
            reconnect: None,
            keepalive: None,
        }
    }

    pub(crate) async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.parts.commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },

                Some(event) = self.link_rx.recv() => self.handle_link_event(event),

                epoch = reconnect_due(&mut self.reconnect) => self.on_reconnect_due(epoch),

                () = keepalive_tick(&mut self.keepalive) => self.send_keepalive(),
            }
        }

        log::debug!("[Realtime] Manager dropped, shutting down");
        self.reconnect = None;
        self.teardown_link();
        self.set_state(ConnectionState::Disconnected);
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect => self.start_connection(),
            Command::Disconnect => self.disconnect(),
            Command::IdentityChanged => self.reconnect_with_new_identity(),
            Command::Shutdown => {}
        }
    }

    fn start_connection(&mut self) {
        self.reconnect = None;

        if !self.parts.platform.supports_transport() {
            log::debug!("[Realtime] No network transport on this platform, not connecting");
            return;
        }

        let config = self.parts.shared.config();
        if !config.enabled {
            log::debug!("[Realtime] Connect ignored while disabled");
            return;
        }

        if self.teardown_link() {
            log::debug!("[Realtime] Replacing live transport");
        }

        let url = self.parts.endpoint.channel_url(
            self.parts.platform,
            &config.user_id,
            config.token.as_deref(),
        );
        self.next_link_id += 1;
        self.link = Some(Link::spawn(self.next_link_id, url, self.link_tx.clone()));
        self.set_state(ConnectionState::Connecting);
    }

    fn disconnect(&mut self) {
        self.reconnect = None;
        let was_open = self.teardown_link();
        self.set_state(ConnectionState::Disconnected);
        if was_open {
            log::info!("[Realtime] Disconnected");
            self.notify_connection(false);
        }
    }

    fn reconnect_with_new_identity(&mut self) {
        if self.link.is_none() {
            // A pending backoff timer reads the new values when it fires
            log::debug!("[Realtime] Identity changed while not connected");
            return;
        }

        log::info!("[Realtime] Identity changed, reconnecting");
        self.disconnect();
        self.schedule_reconnect(IDENTITY_SETTLE_DELAY);
    }

    fn on_reconnect_due(&mut self, epoch: u64) {
        self.reconnect = None;

        if epoch != self.parts.shared.epoch() {
            log::debug!("[Realtime] Stale reconnect timer ignored");
            return;
        }
        if !self.parts.shared.config().enabled {
            return;
        }

        log::info!(
            "[Realtime] Reconnecting (attempt {})",
            self.backoff.attempts()
        );
        self.start_connection();
    }

    fn schedule_reconnect(&mut self, delay: Duration) {
        self.reconnect = Some(PendingReconnect {
            sleep: Box::pin(tokio::time::sleep(delay)),
            epoch: self.parts.shared.epoch(),
        });
    }

    fn handle_link_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Opened { link_id } => {
                if !self.is_current(link_id) {
                    log::debug!("[Realtime] Ignoring open from stale link {}", link_id);
                    return;
                }
                self.on_opened();
            }
            LinkEvent::Frame { link_id, text } => {
                if !self.is_current(link_id) {
                    log::trace!("[Realtime] Ignoring frame from stale link {}", link_id);
                    return;
                }
                self.handle_frame(&text);
            }
            LinkEvent::Closed {
                link_id,
                code,
                reason,
            } => {
                if !self.is_current(link_id) {
                    log::debug!("[Realtime] Ignoring close from stale link {}", link_id);
                    return;
                }
                self.on_closed(code, &reason);
            }
        }
    }

    fn is_current(&self, link_id: u64) -> bool {
        self.link.as_ref().is_some_and(|link| link.id() == link_id)
    }

    fn on_opened(&mut self) {
        if let Some(link) = self.link.as_mut() {
            link.mark_open();
        }
        self.backoff.reset();

        let period = self.parts.keepalive_interval;
        let mut keepalive = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.keepalive = Some(keepalive);

        log::info!("[Realtime] Connected");
        self.set_state(ConnectionState::Connected);
        self.notify_connection(true);
    }

    fn handle_frame(&mut self, text: &str) {
        if text == PONG_FRAME {
            return;
        }

        match Event::parse(text) {
            Ok(event) => {
                log::debug!("[Realtime] Event {}", event.kind());
                self.parts.last_event_tx.send_replace(Some(event.clone()));
                self.parts.dispatcher.dispatch(&event);
            }
            Err(e) => {
                let preview: String = text.chars().take(100).collect();
                log::warn!("[Realtime] Dropping frame: {} ({})", e, preview);
            }
        }
    }

    fn on_closed(&mut self, code: u16, reason: &str) {
        self.link = None;
        self.keepalive = None;
        self.set_state(ConnectionState::Disconnected);
        self.notify_connection(false);

        if code == NORMAL_CLOSURE {
            log::info!("[Realtime] Connection closed normally");
            return;
        }

        let config = self.parts.shared.config();
        if !(config.auto_reconnect && config.enabled) {
            log::info!(
                "[Realtime] Connection lost (code {}: {}), auto-reconnect off",
                code,
                reason
            );
            return;
        }

        let delay = self.backoff.next_delay(config.reconnect_base_delay);
        log::info!(
            "[Realtime] Connection lost (code {}: {}), reconnecting in {:.1}s",
            code,
            reason,
            delay.as_secs_f32()
        );
        self.schedule_reconnect(delay);
    }

    fn send_keepalive(&mut self) {
        match self.link.as_ref() {
            Some(link) if link.is_open() => {
                log::debug!("[Realtime] Keepalive ping");
                link.send_text(PING_FRAME);
            }
            _ => self.keepalive = None,
        }
    }

    /// Close the current link, if any. Returns whether it was open.
    fn teardown_link(&mut self) -> bool {
        self.keepalive = None;
        match self.link.take() {
            Some(link) => {
                let was_open = link.is_open();
                link.close();
                was_open
            }
            None => false,
        }
    }

    fn set_state(&self, state: ConnectionState) {
        self.parts.state_tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                log::debug!("[Realtime] State {} -> {}", current, state);
                *current = state;
                true
            }
        });
    }

    fn notify_connection(&self, connected: bool) {
        if let Some(callback) = &self.parts.on_connection_change {
            callback(connected);
        }
    }
}

async fn reconnect_due(pending: &mut Option<PendingReconnect>) -> u64 {
    match pending {
        Some(pending) => {
            pending.sleep.as_mut().await;
            pending.epoch
        }
        None => std::future::pending().await,
    }
}

async fn keepalive_tick(keepalive: &mut Option<Interval>) {
    match keepalive {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

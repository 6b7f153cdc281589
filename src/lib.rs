//! HireQ Realtime - push-update client for the recruiting dashboard.
//!
//! Keeps one WebSocket open to the backend's realtime route, recovers from
//! network drops with exponential backoff, and turns server frames into
//! typed events and a short, dismissible notification feed.
//!
//! # Architecture
//!
//! - **Connection** - lifecycle owner: connect, keepalive, reconnect
//! - **Dispatcher** - fans events out to observers and the feed
//! - **Notifications** - bounded newest-first feed with rendered messages
//! - **Endpoint** - resolves the channel URI from configuration
//!
//! # Modules
//!
//! - [`connection`] - [`ConnectionManager`] and its background task
//! - [`events`] - wire frame parsing and typed payloads
//! - [`config`] - configuration loading/saving

pub mod config;
pub mod connection;
pub mod constants;
pub mod dispatcher;
pub mod endpoint;
pub mod env;
pub mod events;
pub mod notifications;
pub mod ws;

// Re-export commonly used types
pub use config::{Config, ConnectionConfig};
pub use connection::{ConnectionManager, ConnectionManagerBuilder, ConnectionState};
pub use dispatcher::{EventDispatcher, NotificationListener, ObserverId};
pub use endpoint::Endpoint;
pub use env::Platform;
pub use events::{Event, EventKind, EventPayload, FrameError};
pub use notifications::{Notification, NotificationFeed};

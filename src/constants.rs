//! Protocol constants and timing defaults for the realtime client.
//!
//! Centralizes the magic numbers shared by the connection manager, the
//! endpoint resolver and the notification feed.
//!
//! # Categories
//!
//! - **Wire**: keepalive sentinels and close codes
//! - **Timing**: keepalive, backoff and settling delays
//! - **Endpoint**: default server address and realtime path
//! - **Feed**: notification buffer capacity

use std::time::Duration;

// ============================================================================
// Wire
// ============================================================================

/// Outbound keepalive text frame.
pub const PING_FRAME: &str = "ping";

/// Inbound keepalive acknowledgement. Discarded without surfacing an event.
pub const PONG_FRAME: &str = "pong";

/// WebSocket close code for an intentional shutdown. Never triggers reconnect.
pub const NORMAL_CLOSURE: u16 = 1000;

/// Close code reported when the transport drops without a close frame or
/// fails to open at all.
pub const ABNORMAL_CLOSURE: u16 = 1006;

// ============================================================================
// Timing
// ============================================================================

/// Interval between keepalive pings while connected.
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Default base delay for the first reconnect attempt.
pub const DEFAULT_RECONNECT_BASE_DELAY_MS: u64 = 3000;

/// Upper bound for any single reconnect delay.
pub const MAX_RECONNECT_DELAY: Duration = Duration::from_millis(30_000);

/// Growth factor applied per consecutive failed attempt.
pub const BACKOFF_FACTOR: f64 = 1.5;

/// Pause between closing the old socket and opening a new one after the
/// user identity or token changes.
pub const IDENTITY_SETTLE_DELAY: Duration = Duration::from_millis(100);

// ============================================================================
// Endpoint
// ============================================================================

/// Default backend port.
pub const DEFAULT_PORT: u16 = 8000;

/// Path of the realtime WebSocket route on the backend.
pub const REALTIME_PATH: &str = "/api/realtime/ws";

/// User id sent when the session has no authenticated user.
pub const ANONYMOUS_USER: &str = "anonymous";

// ============================================================================
// Feed
// ============================================================================

/// Maximum number of notifications retained, newest first.
pub const NOTIFICATION_CAPACITY: usize = 10;

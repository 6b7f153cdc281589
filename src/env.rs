//! Runtime environment detection and platform capability.
//!
//! [`Environment`] is derived from the `HIREQ_ENV` environment variable and
//! only influences where configuration is stored. [`Platform`] is never
//! sniffed: callers choose it when building a
//! [`ConnectionManager`](crate::connection::ConnectionManager).
//!
//! # Environment Variable
//!
//! Set `HIREQ_ENV` to one of:
//! - `test` - Test mode (config lives under the repo's `tmp/`)
//! - `development` or `dev` - Development mode (CLI logs at `debug`)
//! - (anything else or unset) - Production mode

/// Runtime environment for the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Production environment (default).
    Production,
    /// Development environment.
    Development,
    /// Test environment.
    Test,
}

impl Environment {
    /// Detect current environment from `HIREQ_ENV`.
    #[must_use]
    pub fn current() -> Self {
        match std::env::var("HIREQ_ENV").as_deref() {
            Ok("test") => Self::Test,
            Ok("development" | "dev") => Self::Development,
            _ => Self::Production,
        }
    }

    /// Returns `true` if this is the test environment.
    #[must_use]
    pub fn is_test(self) -> bool {
        self == Self::Test
    }

    /// Returns `true` if this is the development environment.
    #[must_use]
    pub fn is_development(self) -> bool {
        self == Self::Development
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Production => write!(f, "production"),
            Self::Development => write!(f, "development"),
            Self::Test => write!(f, "test"),
        }
    }
}

/// Convenience function to check if running in test mode.
#[must_use]
pub fn is_test_mode() -> bool {
    Environment::current().is_test()
}

/// Host capability injected at construction time.
///
/// A `Server` build (pre-rendering, batch jobs) has no network transport:
/// the manager resolves a deterministic placeholder URI and never opens a
/// socket, so initialization code can run unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Platform {
    /// Interactive client with network transport available.
    #[default]
    Client,
    /// Server-side context without network transport.
    Server,
}

impl Platform {
    /// Whether the host can open WebSocket transports.
    #[must_use]
    pub fn supports_transport(self) -> bool {
        matches!(self, Self::Client)
    }
}

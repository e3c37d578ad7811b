//! fedpresence — activity oracle for chat-federation clients.
//!
//! Answers one question: "is this remote user currently active?" The
//! [`ActivityOracle`] fuses three indirect signals in strict priority order,
//! short-circuiting on the first conclusive one:
//!
//! 1. a local in-memory recency cache, fed by [`ActivityOracle::record_activity`];
//! 2. the homeserver's presence API;
//! 3. the privileged who-is endpoint, whose availability is detected once at
//!    runtime via a capability probe.
//!
//! The verdict carries a staleness measurement in milliseconds, with `-1`
//! reserved for "no conclusive signal; the configured default applies".
//!
//! The crate is a library with no CLI and no background tasks; every lookup
//! happens on demand inside [`ActivityOracle::is_online`]. Network access
//! goes through the [`DirectoryClient`] trait, so hosts and tests can swap
//! the HTTP implementation out.
//!
//! ```no_run
//! use fedpresence::{ActivityOracle, OracleConfig};
//!
//! # async fn demo() -> Result<(), fedpresence::OracleError> {
//! let oracle = ActivityOracle::new(OracleConfig::new(
//!     "https://matrix.example.org",
//!     "syt_access_token",
//!     "example.org",
//! ))?;
//!
//! oracle.record_activity("@alice:example.org").await;
//! let verdict = oracle.is_online("@alice:example.org", 60_000, None).await?;
//! assert!(verdict.online);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod directory;
pub mod error;
pub mod oracle;

pub use config::OracleConfig;
pub use directory::{
    ActivityState, DirectoryClient, HttpDirectoryClient, PresenceSnapshot, WhoisConnection,
    WhoisDevice, WhoisRecord, WhoisSession,
};
pub use error::{DirectoryError, OracleError};
pub use oracle::{ActivityOracle, CapabilityState, Verdict, UNKNOWN_INACTIVE_MS};

// HTTP method for the generic request primitive, re-exported so callers and
// stub implementations don't need a direct reqwest dependency.
pub use reqwest::Method;

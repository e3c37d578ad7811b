//! Oracle configuration.
//!
//! Plain data with serde defaults; the hosting application decides where the
//! values come from (its own config file, environment, hardcoded).

use serde::{Deserialize, Serialize};

/// Default verdict polarity when no signal is conclusive.
pub const DEFAULT_ONLINE: bool = false;

/// Presence lookups are attempted unless explicitly disabled.
pub const DEFAULT_USE_PRESENCE: bool = true;

fn default_online() -> bool {
    DEFAULT_ONLINE
}

fn default_use_presence() -> bool {
    DEFAULT_USE_PRESENCE
}

/// Configuration for an [`ActivityOracle`](crate::ActivityOracle).
///
/// All fields are fixed for the oracle's lifetime once it is constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    /// Base URL of the homeserver, e.g. `https://matrix.example.org`.
    pub homeserver_url: String,

    /// Access token passed through to the directory client. Opaque to the
    /// oracle itself.
    pub access_token: String,

    /// Domain of the local server, used to classify a user identifier as
    /// local or remote. Only local users can be inspected through the
    /// privileged who-is endpoint.
    pub local_domain: String,

    /// Verdict to return when no signal is conclusive (overridable per call).
    #[serde(default = "default_online")]
    pub default_online: bool,

    /// Set to `false` for homeservers known to have presence turned off; the
    /// presence step of the cascade is then skipped entirely.
    #[serde(default = "default_use_presence")]
    pub use_presence: bool,

    /// Upper bound on distinct users tracked by the recency cache. When the
    /// bound would be exceeded, the entry with the oldest activity is
    /// evicted. `None` means the cache grows without bound.
    #[serde(default)]
    pub cache_capacity: Option<usize>,
}

impl OracleConfig {
    /// Config with required fields set and everything else defaulted.
    pub fn new(
        homeserver_url: impl Into<String>,
        access_token: impl Into<String>,
        local_domain: impl Into<String>,
    ) -> Self {
        Self {
            homeserver_url: homeserver_url.into(),
            access_token: access_token.into(),
            local_domain: local_domain.into(),
            default_online: DEFAULT_ONLINE,
            use_presence: DEFAULT_USE_PRESENCE,
            cache_capacity: None,
        }
    }
}

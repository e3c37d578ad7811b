//! The activity oracle: fuses local activity history, presence and the
//! privileged who-is lookup into one online/offline verdict.

use crate::config::OracleConfig;
use crate::directory::{ActivityState, DirectoryClient, HttpDirectoryClient};
use crate::error::OracleError;
use reqwest::Method;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;
use tracing::debug;

/// Sentinel staleness meaning "no conclusive signal found; the verdict
/// reflects the configured default".
pub const UNKNOWN_INACTIVE_MS: i64 = -1;

/// Privileged dry-run used to detect admin rights. With an empty body the
/// endpoint fails on input shape for admins and with the authorization
/// rejection for everyone else; the probe only looks at which of the two it
/// gets.
const CAPABILITY_PROBE_PATH: &str = "/_synapse/admin/v1/send_server_notice";

/// Outcome of a verdict request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub online: bool,

    /// Milliseconds since the signal that decided the verdict, or
    /// [`UNKNOWN_INACTIVE_MS`] when no signal was conclusive.
    pub inactive_ms: i64,
}

/// Whether the privileged who-is endpoint is open to this session.
///
/// Resolved at most once per oracle lifetime; authorization changes after
/// that are not picked up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityState {
    Unknown,
    Usable,
    Unusable,
}

/// Answers "is this user currently active?" on demand.
///
/// Signals are consulted in strict priority order, short-circuiting on the
/// first conclusive one: the local recency cache, then presence, then the
/// privileged who-is lookup. The cache is authoritative; nothing overrides a
/// sufficiently-recent entry.
pub struct ActivityOracle {
    client: Arc<dyn DirectoryClient>,
    local_domain: String,
    default_online: bool,
    use_presence: bool,
    cache_capacity: Option<usize>,

    /// Last known local activity per user id.
    last_active: RwLock<HashMap<String, Instant>>,

    whois_capability: RwLock<CapabilityState>,
}

impl ActivityOracle {
    /// Build an oracle talking HTTP to the configured homeserver.
    pub fn new(config: OracleConfig) -> Result<Self, OracleError> {
        let client = HttpDirectoryClient::new(&config.homeserver_url, &config.access_token)
            .map_err(|e| OracleError::Config(e.to_string()))?;
        Ok(Self::with_client(Arc::new(client), config))
    }

    /// Build an oracle around a caller-supplied directory client. The
    /// endpoint and credential in `config` are ignored; the remaining fields
    /// apply as usual.
    pub fn with_client(client: Arc<dyn DirectoryClient>, config: OracleConfig) -> Self {
        Self {
            client,
            local_domain: config.local_domain,
            default_online: config.default_online,
            use_presence: config.use_presence,
            cache_capacity: config.cache_capacity,
            last_active: RwLock::new(HashMap::new()),
            whois_capability: RwLock::new(CapabilityState::Unknown),
        }
    }

    /// Record local activity for a user as of now.
    pub async fn record_activity(&self, user_id: &str) {
        self.record_activity_at(user_id, Instant::now()).await;
    }

    /// Record local activity for a user at an explicit instant, for
    /// backfilling. Last write wins.
    pub async fn record_activity_at(&self, user_id: &str, at: Instant) {
        let mut cache = self.last_active.write().await;
        if let Some(capacity) = self.cache_capacity {
            if !cache.contains_key(user_id) && cache.len() >= capacity {
                let stalest = cache
                    .iter()
                    .min_by_key(|(_, seen)| **seen)
                    .map(|(user, _)| user.clone());
                if let Some(user) = stalest {
                    debug!(evicted = %user, "recency cache full, evicting stalest entry");
                    cache.remove(&user);
                }
            }
        }
        cache.insert(user_id.to_string(), at);
    }

    /// Last recorded local activity for a user, if any.
    pub async fn last_activity(&self, user_id: &str) -> Option<Instant> {
        self.last_active.read().await.get(user_id).copied()
    }

    /// Decide whether `user_id` is online, treating any signal older than
    /// `max_inactivity_ms` as stale. `default_override`, when given, replaces
    /// the configured default polarity for the no-conclusive-signal branch of
    /// this call only.
    ///
    /// Fails only when the who-is lookup fails; every earlier signal failure
    /// is a normal branch of the cascade.
    pub async fn is_online(
        &self,
        user_id: &str,
        max_inactivity_ms: u64,
        default_override: Option<bool>,
    ) -> Result<Verdict, OracleError> {
        let whois_usable = self.resolve_whois_capability().await;

        // The cache is authoritative: a fresh enough entry wins outright.
        if let Some(last) = self.last_activity(user_id).await {
            let elapsed = duration_ms(last);
            if elapsed < max_inactivity_ms {
                return Ok(Verdict {
                    online: true,
                    inactive_ms: clamp_ms(elapsed),
                });
            }
        }

        if self.use_presence {
            match self.client.presence(user_id).await {
                Ok(snapshot) => {
                    if snapshot.currently_active || snapshot.state == ActivityState::Online {
                        return Ok(Verdict {
                            online: true,
                            inactive_ms: clamp_ms(snapshot.last_active_ago.unwrap_or(0)),
                        });
                    }
                    if let Some(ago) = snapshot.last_active_ago {
                        if ago > max_inactivity_ms {
                            return Ok(Verdict {
                                online: false,
                                inactive_ms: clamp_ms(ago),
                            });
                        }
                    }
                    // Offline or unavailable but not provably stale:
                    // inconclusive, keep going.
                }
                Err(err) => {
                    debug!(user_id, error = %err, "presence lookup failed, continuing down the cascade");
                }
            }
        }

        let defaulted = Verdict {
            online: default_override.unwrap_or(self.default_online),
            inactive_ms: UNKNOWN_INACTIVE_MS,
        };

        // Remote users cannot be inspected through this server's privileged
        // endpoint, and without admin rights nobody can.
        if !whois_usable || !self.is_local(user_id) {
            return Ok(defaulted);
        }

        let record = self.client.whois(user_id).await?;
        match record.latest_seen() {
            Some(last_seen) => {
                let inactive = now_ms().saturating_sub(last_seen);
                Ok(Verdict {
                    online: inactive < max_inactivity_ms,
                    inactive_ms: clamp_ms(inactive),
                })
            }
            None => {
                debug!(user_id, "who-is returned no connections, using default verdict");
                Ok(defaulted)
            }
        }
    }

    /// Current capability state, mostly useful for diagnostics.
    pub async fn whois_capability(&self) -> CapabilityState {
        *self.whois_capability.read().await
    }

    /// Resolve the who-is capability, probing the homeserver on first use.
    async fn resolve_whois_capability(&self) -> bool {
        match *self.whois_capability.read().await {
            CapabilityState::Usable => return true,
            CapabilityState::Unusable => return false,
            CapabilityState::Unknown => {}
        }

        // Racing callers may both reach the probe before either writes the
        // flag; both arrive at the same answer, so the duplicate request is
        // harmless.
        let usable = match self
            .client
            .authed_request(Method::POST, CAPABILITY_PROBE_PATH)
            .await
        {
            Err(err) if err.is_admin_rejection() => {
                debug!("capability probe rejected, who-is lookups disabled for this session");
                false
            }
            Err(err) => {
                debug!(error = %err, "capability probe failed with a non-authorization shape, treating who-is as usable");
                true
            }
            Ok(_) => true,
        };

        *self.whois_capability.write().await = if usable {
            CapabilityState::Usable
        } else {
            CapabilityState::Unusable
        };
        usable
    }

    fn is_local(&self, user_id: &str) -> bool {
        user_domain(user_id) == Some(self.local_domain.as_str())
    }
}

/// Domain segment of a user identifier: everything after the first `:`.
/// Identifiers with no domain segment are treated as non-local.
fn user_domain(user_id: &str) -> Option<&str> {
    user_id.split_once(':').map(|(_, domain)| domain)
}

fn duration_ms(since: Instant) -> u64 {
    let elapsed = Instant::now().saturating_duration_since(since);
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

fn clamp_ms(ms: u64) -> i64 {
    i64::try_from(ms).unwrap_or(i64::MAX)
}

//! Directory client boundary.
//!
//! The oracle consumes three operations from the homeserver: a generic
//! authenticated request (used as a capability probe), a presence lookup, and
//! the privileged who-is lookup. [`DirectoryClient`] is the seam; the crate
//! ships [`HttpDirectoryClient`] speaking the Matrix client-server and
//! Synapse admin HTTP APIs, and hosts (or tests) can plug in their own.

use crate::error::DirectoryError;
use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Path of the presence endpoint; the user id slots in between.
const PRESENCE_PATH_PREFIX: &str = "/_matrix/client/v3/presence/";
const PRESENCE_PATH_SUFFIX: &str = "/status";

/// Path of the privileged who-is endpoint.
const WHOIS_PATH_PREFIX: &str = "/_synapse/admin/v1/whois/";

/// Server-reported activity state of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityState {
    Online,
    Offline,
    /// Also covers any state string this crate does not know about.
    Unavailable,
}

fn activity_state_from_wire<'de, D>(deserializer: D) -> Result<ActivityState, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Ok(match raw.as_str() {
        "online" => ActivityState::Online,
        "offline" => ActivityState::Offline,
        _ => ActivityState::Unavailable,
    })
}

/// Point-in-time presence read for one user. Used once per verdict and
/// discarded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceSnapshot {
    /// Wire field is named `presence`.
    #[serde(rename = "presence", deserialize_with = "activity_state_from_wire")]
    pub state: ActivityState,

    /// Whether the server considers the user active right now. Absent on the
    /// wire when false.
    #[serde(default)]
    pub currently_active: bool,

    /// Milliseconds since the server last saw activity, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_active_ago: Option<u64>,
}

/// Privileged who-is result: every known session of a user, grouped by
/// device. Used once per verdict and discarded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhoisRecord {
    pub user_id: String,

    /// Keyed by device id on the wire.
    #[serde(default)]
    pub devices: HashMap<String, WhoisDevice>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WhoisDevice {
    #[serde(default)]
    pub sessions: Vec<WhoisSession>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WhoisSession {
    #[serde(default)]
    pub connections: Vec<WhoisConnection>,
}

/// One network connection of one session, stamped with when it was last seen.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhoisConnection {
    #[serde(default)]
    pub ip: Option<String>,

    #[serde(default)]
    pub user_agent: Option<String>,

    /// Epoch milliseconds.
    pub last_seen: u64,
}

impl WhoisRecord {
    /// Most recent `last_seen` across every connection of every session of
    /// every device, or `None` when the record has no connections at all.
    pub fn latest_seen(&self) -> Option<u64> {
        self.devices
            .values()
            .flat_map(|device| device.sessions.iter())
            .flat_map(|session| session.connections.iter())
            .map(|conn| conn.last_seen)
            .max()
    }
}

/// The three homeserver operations the oracle consumes.
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    /// Issue an authenticated request with an empty body and return whatever
    /// JSON the server answers with. The oracle uses this as its capability
    /// probe; the interesting signal is the error shape, not the body.
    async fn authed_request(
        &self,
        method: Method,
        path: &str,
    ) -> Result<serde_json::Value, DirectoryError>;

    /// Presence snapshot for a user.
    async fn presence(&self, user_id: &str) -> Result<PresenceSnapshot, DirectoryError>;

    /// Privileged who-is lookup for a user. Requires admin rights on the
    /// homeserver.
    async fn whois(&self, user_id: &str) -> Result<WhoisRecord, DirectoryError>;
}

/// `reqwest`-backed [`DirectoryClient`] using bearer-token authentication.
///
/// Request signing, retries and transport tuning are left to `reqwest`; this
/// type only shapes paths and decodes responses.
pub struct HttpDirectoryClient {
    client: Client,
    base_url: String,
    access_token: String,
}

/// Standard Matrix error body, `{"errcode": "...", "error": "..."}`.
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    errcode: Option<String>,
    error: Option<String>,
}

impl HttpDirectoryClient {
    pub fn new(homeserver_url: &str, access_token: &str) -> Result<Self, DirectoryError> {
        let client = Client::builder()
            .build()
            .map_err(|e| DirectoryError::Transport(format!("client build failed: {}", e)))?;
        Ok(Self {
            client,
            base_url: homeserver_url.trim_end_matches('/').to_string(),
            access_token: access_token.to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn user_path(prefix: &str, user_id: &str, suffix: &str) -> String {
        format!("{}{}{}", prefix, urlencoding::encode(user_id), suffix)
    }

    /// Send a request and decode either the success body or the standard
    /// error body.
    async fn send(&self, method: Method, path: &str) -> Result<String, DirectoryError> {
        let url = self.url(path);
        debug!(%method, %url, "directory request");

        let response = self
            .client
            .request(method, &url)
            .header("Authorization", format!("Bearer {}", self.access_token))
            .send()
            .await
            .map_err(|e| DirectoryError::Transport(format!("request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| DirectoryError::Transport(format!("body read failed: {}", e)))?;

        if status.is_success() {
            return Ok(body);
        }

        let parsed: Option<ApiErrorBody> = serde_json::from_str(&body).ok();
        let (errcode, message) = match parsed {
            Some(err) => (err.errcode, err.error.unwrap_or_else(|| body.clone())),
            None => (None, body),
        };
        Err(DirectoryError::Api {
            status: status.as_u16(),
            errcode,
            message,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, DirectoryError> {
        let body = self.send(Method::GET, path).await?;
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl DirectoryClient for HttpDirectoryClient {
    async fn authed_request(
        &self,
        method: Method,
        path: &str,
    ) -> Result<serde_json::Value, DirectoryError> {
        let body = self.send(method, path).await?;
        // Some admin endpoints answer 200 with an empty body.
        Ok(serde_json::from_str(&body).unwrap_or(serde_json::Value::Null))
    }

    async fn presence(&self, user_id: &str) -> Result<PresenceSnapshot, DirectoryError> {
        let path = Self::user_path(PRESENCE_PATH_PREFIX, user_id, PRESENCE_PATH_SUFFIX);
        self.get_json(&path).await
    }

    async fn whois(&self, user_id: &str) -> Result<WhoisRecord, DirectoryError> {
        let path = Self::user_path(WHOIS_PATH_PREFIX, user_id, "");
        self.get_json(&path).await
    }
}

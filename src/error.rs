//! Error types for the oracle and its directory boundary.

use thiserror::Error;

/// HTTP status returned by the homeserver for privileged requests made
/// without admin rights.
const STATUS_FORBIDDEN: u16 = 403;

/// Matrix error code carried in the rejection body for the same case.
const ERRCODE_FORBIDDEN: &str = "M_FORBIDDEN";

/// Failures surfaced by a [`DirectoryClient`](crate::DirectoryClient)
/// implementation.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// The request never produced a server response (connection, DNS, TLS).
    #[error("transport error: {0}")]
    Transport(String),

    /// The server answered with a non-success status.
    #[error("api error {status}: {message}")]
    Api {
        status: u16,
        /// Machine-readable `errcode` from the standard error body, if any.
        errcode: Option<String>,
        message: String,
    },

    /// The response body did not match the expected shape.
    #[error("response decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

impl DirectoryError {
    /// Whether this failure is the specific "not an admin" rejection the
    /// capability probe looks for.
    ///
    /// This is a protocol-specific heuristic, not a general pattern: the
    /// protocol has no direct "am I an admin" query, so the probe issues a
    /// deliberately-malformed privileged request and classifies the caller by
    /// its failure mode. A 403 / `M_FORBIDDEN` means the privileged surface
    /// is closed to this session; every other outcome, including failures of
    /// any other shape, means it is not provably closed and is treated as
    /// open.
    pub fn is_admin_rejection(&self) -> bool {
        match self {
            Self::Api {
                status, errcode, ..
            } => *status == STATUS_FORBIDDEN || errcode.as_deref() == Some(ERRCODE_FORBIDDEN),
            _ => false,
        }
    }
}

/// Failures surfaced by [`ActivityOracle`](crate::ActivityOracle) operations.
#[derive(Debug, Error)]
pub enum OracleError {
    /// A directory lookup with no further fallback failed.
    #[error("directory lookup failed: {0}")]
    Directory(#[from] DirectoryError),

    /// The oracle could not be constructed from its configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

//! Blocking HTTP transport for the latest-state snapshot endpoint.
//!
//! - Uses `ureq` (no async); one call per snapshot request.
//! - The caller's deadline is handed to the agent as-is, nothing is computed here.
//! - Cancellation is cooperative: the token is checked around the call and a
//!   canceled request reports `FetchError::Canceled` even if bytes arrived.

use std::io::Read;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use log::warn;

use crate::filter::{DEVICE_IDS_PARAM, DeviceFilter};
use crate::models::snapshot::SensorView;

#[derive(Debug)]
pub enum FetchError {
    /// The request was superseded or its consumer went away.
    Canceled,
    Transport(String),
    Http { status: u16 },
    Json(serde_json::Error),
    /// Valid JSON that does not match the snapshot shape; carries the path.
    Decode(String),
}

impl core::fmt::Display for FetchError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            FetchError::Canceled => write!(f, "request canceled"),
            FetchError::Transport(s) => write!(f, "transport error: {}", s),
            FetchError::Http { status } => write!(f, "API responded with {}", status),
            FetchError::Json(e) => write!(f, "json error: {}", e),
            FetchError::Decode(e) => write!(f, "unexpected payload: {}", e),
        }
    }
}

impl std::error::Error for FetchError {}

impl From<serde_json::Error> for FetchError {
    fn from(value: serde_json::Error) -> Self {
        FetchError::Json(value)
    }
}

/// Per-request cancellation flag shared between the issuer and the worker.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Anything that can fetch a snapshot for a filter.
pub trait SnapshotTransport: Send + Sync {
    fn fetch(&self, filter: &DeviceFilter, cancel: &CancelToken) -> Result<Vec<SensorView>, FetchError>;
}

pub struct HttpTransport {
    agent: ureq::Agent,
    url: String,
}

impl HttpTransport {
    /// `url` is the full endpoint, e.g. `http://host:8080/api/sensors/latest`.
    pub fn new(url: impl Into<String>, timeout: Option<Duration>) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(timeout)
            .http_status_as_error(false)
            .build();
        HttpTransport {
            agent: ureq::Agent::new_with_config(config),
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl SnapshotTransport for HttpTransport {
    fn fetch(&self, filter: &DeviceFilter, cancel: &CancelToken) -> Result<Vec<SensorView>, FetchError> {
        if cancel.is_cancelled() {
            return Err(FetchError::Canceled);
        }

        let mut req = self.agent.get(self.url.as_str()).header("Accept", "application/json");
        if let Some(ids) = filter.to_query_value() {
            req = req.query(DEVICE_IDS_PARAM, ids);
        }

        let result = req.call();
        if cancel.is_cancelled() {
            return Err(FetchError::Canceled);
        }
        let mut res = result.map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = res.status();
        if !status.is_success() {
            return Err(FetchError::Http {
                status: status.as_u16(),
            });
        }

        // Streamed without ureq's default in-memory cap; fleet size bounds the body.
        let reader = res.body_mut().with_config().limit(u64::MAX).reader();
        let views = decode_snapshot_from(reader);
        if cancel.is_cancelled() {
            return Err(FetchError::Canceled);
        }
        views
    }
}

/// Decode a snapshot body. A JSON document that is not an array is read as
/// an empty fleet rather than an error.
pub fn decode_snapshot(body: &str) -> Result<Vec<SensorView>, FetchError> {
    decode_snapshot_from(body.as_bytes())
}

/// Same as `decode_snapshot`, reading straight from the response stream.
/// I/O failures mid-body are transport errors, not JSON errors.
pub fn decode_snapshot_from<R: Read>(reader: R) -> Result<Vec<SensorView>, FetchError> {
    let value: serde_json::Value = serde_json::from_reader(reader).map_err(|e| {
        if e.is_io() {
            FetchError::Transport(e.to_string())
        } else {
            FetchError::Json(e)
        }
    })?;
    if !value.is_array() {
        warn!("Snapshot payload is not a JSON array; treating it as empty");
        return Ok(Vec::new());
    }
    serde_path_to_error::deserialize(value).map_err(|e| FetchError::Decode(e.to_string()))
}

//! Status payload sent to the Voyager Application Server
//!
//! The server speaks CRLF-delimited JSON lines. The polling message carries
//! the event name, a fractional epoch timestamp captured at construction,
//! and the fixed host/instance identity of this client.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::LinkError;

/// One outbound status record. Immutable once constructed; never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusMessage {
    #[serde(rename = "Event")]
    pub event: String,
    /// Seconds since the Unix epoch, fractional.
    #[serde(rename = "Timestamp")]
    pub timestamp: f64,
    #[serde(rename = "Host")]
    pub host: String,
    #[serde(rename = "Inst")]
    pub instance: u32,
}

impl StatusMessage {
    /// Build a `Polling` message stamped with the current time.
    pub fn polling(host: &str, instance: u32) -> Self {
        Self {
            event: "Polling".to_string(),
            timestamp: epoch_seconds(),
            host: host.to_string(),
            instance,
        }
    }

    /// Serialize as one CRLF-terminated JSON line.
    pub fn encode(&self) -> Result<String, LinkError> {
        let json = serde_json::to_string(self)
            .map_err(|e| LinkError::Internal(format!("failed to encode status message: {}", e)))?;
        Ok(format!("{}\r\n", json))
    }
}

/// Current time as fractional seconds since the Unix epoch.
fn epoch_seconds() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

//! Activity records: one immutable audit entry per inbound request.

use std::net::IpAddr;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Origin recorded when the caller's network address is not available.
pub const UNKNOWN_ORIGIN: &str = "unknown";

/// Instant a request arrived, captured on both clocks.
///
/// The monotonic reading orders records produced by one process; the wall
/// clock reading is what gets displayed and persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arrival {
    wall: DateTime<Utc>,
    monotonic: Instant,
}

impl Arrival {
    #[must_use]
    pub fn now() -> Self {
        Self {
            wall: Utc::now(),
            monotonic: Instant::now(),
        }
    }

    #[must_use]
    pub fn monotonic(&self) -> Instant {
        self.monotonic
    }
}

/// Immutable audit entry describing one request.
///
/// Serializes to the activity-log wire shape:
/// `{"timestamp", "service", "action", "details"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityRecord {
    timestamp: DateTime<Utc>,
    #[serde(skip)]
    received_at: Instant,
    service: String,
    action: String,
    details: String,
}

impl ActivityRecord {
    /// Wall-clock arrival time.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Monotonic arrival time, for ordering records within this process.
    #[must_use]
    pub fn received_at(&self) -> Instant {
        self.received_at
    }

    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Normalized request path.
    #[must_use]
    pub fn action(&self) -> &str {
        &self.action
    }

    #[must_use]
    pub fn details(&self) -> &str {
        &self.details
    }
}

/// Reduces a request target to its path: query string and fragment are
/// dropped, a trailing slash is trimmed, and an empty path becomes `/`.
#[must_use]
pub fn normalize_action(target: &str) -> String {
    let end = target.find(['?', '#']).unwrap_or(target.len());
    let path = target[..end].trim_end_matches('/');
    if path.is_empty() {
        "/".to_string()
    } else if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

/// Builds the activity record for a request.
///
/// Total: a missing origin is recorded as [`UNKNOWN_ORIGIN`]. Only request
/// metadata is read; bodies never reach the audit trail. `outcome`, when
/// given, is appended to the details (e.g. `denied: forbidden`).
#[must_use]
pub fn build_activity_record(
    service: &str,
    target: &str,
    origin: Option<IpAddr>,
    arrival: Arrival,
    outcome: Option<&str>,
) -> ActivityRecord {
    let origin = origin.map_or_else(|| UNKNOWN_ORIGIN.to_string(), |ip| ip.to_string());
    let details = match outcome {
        Some(outcome) => format!("Request from {origin}; {outcome}"),
        None => format!("Request from {origin}"),
    };

    ActivityRecord {
        timestamp: arrival.wall,
        received_at: arrival.monotonic,
        service: service.to_string(),
        action: normalize_action(target),
        details,
    }
}

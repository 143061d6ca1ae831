use std::time::SystemTime;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

/// Health check payloads.
pub mod health;
/// Match setup, actions and sync payloads.
pub mod matches;
/// Server-sent event payloads.
pub mod sse;
/// Derived statistics payloads.
pub mod stats;
/// Custom validators shared by request payloads.
pub mod validation;

pub(crate) fn format_system_time(time: SystemTime) -> String {
    OffsetDateTime::from(time)
        .format(&Rfc3339)
        .unwrap_or_else(|_| "invalid-timestamp".into())
}

//! Error types for the PaperScope client core
//!
//! Provides the typed error taxonomy surfaced to the presentation layer:
//! - Distinct error types for transport, server, and validation failures
//! - Best-effort extraction of structured server error payloads
//! - Non-fatal integrity warnings emitted by the index builder

use serde::Deserialize;
use std::fmt;
use thiserror::Error;

/// Result type alias using ClientError
pub type Result<T> = std::result::Result<T, ClientError>;

/// Client-core error taxonomy
///
/// Every failure crossing the presentation boundary is one of these three.
/// Transport and mutation failures propagate unchanged; nothing is retried
/// automatically.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Transport unreachable or timed out. Always recoverable; retrying is
    /// the caller's choice.
    #[error("Network error: {message}")]
    Network { message: String },

    /// Non-2xx response from the backend, surfaced verbatim.
    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// Rejected input, shown to the user distinctly from server failures.
    #[error("Validation failed: {message}")]
    Validation { message: String },
}

/// Structured error body emitted by the backend (`{"detail": "..."}`).
#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: serde_json::Value,
}

impl ClientError {
    /// Build an error from a non-2xx response.
    ///
    /// Message extraction priority: structured `detail` field, then the raw
    /// body text, then the canonical status reason.
    pub fn from_response(status: u16, reason: Option<&str>, body: &str) -> Self {
        let message = match serde_json::from_str::<ErrorBody>(body) {
            Ok(parsed) => match parsed.detail {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            },
            Err(_) => {
                let trimmed = body.trim();
                if trimmed.is_empty() {
                    reason.unwrap_or("unknown server error").to_string()
                } else {
                    trimmed.to_string()
                }
            }
        };

        // 400/422 carry rejected-input semantics on this backend
        if status == 400 || status == 422 {
            ClientError::Validation { message }
        } else {
            ClientError::Server { status, message }
        }
    }

    /// Build a transport-level error from a failed request.
    pub fn network(message: impl Into<String>) -> Self {
        ClientError::Network {
            message: message.into(),
        }
    }

    /// Build a validation error for locally rejected input.
    pub fn validation(message: impl Into<String>) -> Self {
        ClientError::Validation {
            message: message.into(),
        }
    }

    /// Whether a retry could plausibly succeed without operator action.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ClientError::Network { .. })
    }

    /// Whether this failure should be shown as a user mistake rather than a
    /// system fault.
    pub fn is_user_error(&self) -> bool {
        matches!(self, ClientError::Validation { .. })
    }
}

/// Non-fatal inconsistency detected while rebuilding the entity index.
///
/// Warnings are logged and carried on the built index; they never abort a
/// rebuild. A best-effort index is always produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityWarning {
    /// Two occurrence links for the same (entity, paper) pair arrived in one
    /// feed. The later link wins; counts are never summed across duplicates.
    DuplicateOccurrence {
        entity_id: i64,
        paper_id: i64,
        kept_count: u64,
        discarded_count: u64,
    },

    /// An entity arrived with no linked papers. It is kept in the index so
    /// the inconsistency stays visible instead of silently corrupting counts.
    OrphanEntity { entity_id: i64, entity_name: String },
}

impl fmt::Display for IntegrityWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntegrityWarning::DuplicateOccurrence {
                entity_id,
                paper_id,
                kept_count,
                discarded_count,
            } => write!(
                f,
                "duplicate occurrence link for entity {} in paper {} (kept count {}, discarded {})",
                entity_id, paper_id, kept_count, discarded_count
            ),
            IntegrityWarning::OrphanEntity {
                entity_id,
                entity_name,
            } => write!(
                f,
                "entity {} ({:?}) has no linked papers",
                entity_id, entity_name
            ),
        }
    }
}

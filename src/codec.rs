//! JSON envelope codec for persisted auth state.

use serde_json::Value;
use thiserror::Error;

use crate::storage::models::{AuthState, EnvelopeMetadata, StoredEnvelope};

/// Schema version stamped on every envelope written by this build.
pub const ENVELOPE_VERSION: &str = "1.0.0";

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Invalid envelope JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Envelope is not a JSON object")]
    NotAnObject,
    #[error("Envelope is missing `{0}`")]
    MissingField(&'static str),
    #[error("Envelope field `{0}` is not a number")]
    NotANumber(&'static str),
}

/// Wrap `state` in an envelope stamped at `now` (ms since epoch).
///
/// `previous` is the envelope currently stored, if it could be read; its
/// `createdAt` is carried over so the entry keeps its original birth time.
pub fn encode(
    state: &AuthState,
    previous: Option<&StoredEnvelope>,
    now: i64,
) -> Result<String, CodecError> {
    let envelope = StoredEnvelope {
        version: ENVELOPE_VERSION.to_string(),
        state: state.clone(),
        metadata: EnvelopeMetadata {
            created_at: previous.map(|p| p.metadata.created_at).unwrap_or(now),
            updated_at: now,
            source: state.source().as_str().to_string(),
        },
    };

    Ok(serde_json::to_string(&envelope)?)
}

/// Parse a stored envelope.
///
/// Only the wrapper is checked: `state` must be present and non-null and
/// `metadata.updatedAt` must be a number. The state itself is carried
/// through untouched, whatever its shape.
pub fn decode(raw: &str) -> Result<StoredEnvelope, CodecError> {
    let value: Value = serde_json::from_str(raw)?;
    let Value::Object(mut envelope) = value else {
        return Err(CodecError::NotAnObject);
    };

    let state = match envelope.remove("state") {
        Some(Value::Null) | None => return Err(CodecError::MissingField("state")),
        Some(state) => AuthState::from_value(state),
    };

    let metadata = envelope.get("metadata");
    let updated_at = match metadata.and_then(|m| m.get("updatedAt")) {
        Some(Value::Null) | None => return Err(CodecError::MissingField("metadata.updatedAt")),
        Some(updated_at) => {
            as_millis(updated_at).ok_or(CodecError::NotANumber("metadata.updatedAt"))?
        }
    };
    let created_at = metadata
        .and_then(|m| m.get("createdAt"))
        .and_then(as_millis)
        .unwrap_or(updated_at);
    let source = metadata
        .and_then(|m| m.get("source"))
        .map(lossy_string)
        .unwrap_or_default();

    Ok(StoredEnvelope {
        version: envelope.get("version").map(lossy_string).unwrap_or_default(),
        state,
        metadata: EnvelopeMetadata {
            created_at,
            updated_at,
            source,
        },
    })
}

fn as_millis(value: &Value) -> Option<i64> {
    value.as_i64().or_else(|| value.as_f64().map(|ms| ms as i64))
}

/// Informational fields are kept even when a peer wrote them with another type.
fn lossy_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Authentication status reported by the login/logout flow
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthStatus {
    Authenticated,
    Unauthenticated,
    /// Any value written by a peer that this build does not recognize
    Other(String),
}

impl AuthStatus {
    pub fn as_str(&self) -> &str {
        match self {
            AuthStatus::Authenticated => "authenticated",
            AuthStatus::Unauthenticated => "unauthenticated",
            AuthStatus::Other(value) => value.as_str(),
        }
    }
}

impl From<String> for AuthStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "authenticated" => AuthStatus::Authenticated,
            "unauthenticated" => AuthStatus::Unauthenticated,
            _ => AuthStatus::Other(value),
        }
    }
}

/// Where a state change originated
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StateSource {
    #[default]
    Internal,
    ExternalApp,
    Other(String),
}

impl StateSource {
    pub fn as_str(&self) -> &str {
        match self {
            StateSource::Internal => "internal",
            StateSource::ExternalApp => "external_app",
            StateSource::Other(value) => value.as_str(),
        }
    }
}

impl From<String> for StateSource {
    fn from(value: String) -> Self {
        match value.as_str() {
            "internal" => StateSource::Internal,
            "external_app" => StateSource::ExternalApp,
            _ => StateSource::Other(value),
        }
    }
}

/// The logical authentication record shared between contexts.
///
/// Held as the JSON the writer produced, so whatever a peer stored comes
/// back unchanged: unknown fields, unexpected types and unrecognized enum
/// values included. The accessors interpret the well-known fields and
/// return `None` when a field is missing or not of the expected type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthState(Value);

impl AuthState {
    /// A signed-in state for `user_id`
    pub fn authenticated(
        user_id: impl Into<String>,
        session_token: impl Into<String>,
        timestamp: i64,
    ) -> Self {
        Self(json!({
            "status": AuthStatus::Authenticated.as_str(),
            "timestamp": timestamp,
            "userId": user_id.into(),
            "sessionToken": session_token.into(),
            "source": StateSource::Internal.as_str(),
        }))
    }

    /// A signed-out state
    pub fn unauthenticated(timestamp: i64) -> Self {
        Self(json!({
            "status": AuthStatus::Unauthenticated.as_str(),
            "timestamp": timestamp,
            "source": StateSource::Internal.as_str(),
        }))
    }

    /// Wrap an arbitrary JSON record as written by the login flow
    pub fn from_value(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    /// Set `source`. No-op when the record is not a JSON object.
    pub fn with_source(self, source: StateSource) -> Self {
        self.with_field("source", Value::from(source.as_str()))
    }

    /// Set an arbitrary field. No-op when the record is not a JSON object.
    pub fn with_field(mut self, name: &str, value: Value) -> Self {
        if let Some(fields) = self.0.as_object_mut() {
            fields.insert(name.to_string(), value);
        }
        self
    }

    /// Raw access to any field
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn fields(&self) -> Option<&Map<String, Value>> {
        self.0.as_object()
    }

    pub fn status(&self) -> Option<AuthStatus> {
        self.str_field("status").map(|s| AuthStatus::from(s.to_string()))
    }

    /// Milliseconds since the Unix epoch, as supplied by the writer
    pub fn timestamp(&self) -> Option<i64> {
        let value = self.field("timestamp")?;
        value.as_i64().or_else(|| value.as_f64().map(|ms| ms as i64))
    }

    pub fn user_id(&self) -> Option<&str> {
        self.str_field("userId")
    }

    pub fn session_token(&self) -> Option<&str> {
        self.str_field("sessionToken")
    }

    /// Missing or non-string values read as `Internal`
    pub fn source(&self) -> StateSource {
        self.str_field("source")
            .map(|s| StateSource::from(s.to_string()))
            .unwrap_or_default()
    }

    pub fn is_authenticated(&self) -> bool {
        self.status() == Some(AuthStatus::Authenticated)
    }

    fn str_field(&self, name: &str) -> Option<&str> {
        self.field(name).and_then(Value::as_str)
    }
}

/// Bookkeeping persisted next to the state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeMetadata {
    /// When the entry was first written (ms since epoch)
    pub created_at: i64,
    /// When the entry was last written (ms since epoch); the only staleness reference
    pub updated_at: i64,
    /// Copy of `state.source` at write time
    pub source: String,
}

/// The versioned wrapper persisted under the storage key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEnvelope {
    pub version: String,
    pub state: AuthState,
    pub metadata: EnvelopeMetadata,
}

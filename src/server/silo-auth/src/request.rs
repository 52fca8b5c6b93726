//! Credential descriptor.
//!
//! [`AuthenticationRequest`] captures every signal a remote silo needs to
//! authenticate a request, independent of the transport that produced it.

use std::collections::HashMap;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

/// Header carrying the relay identifier.
pub const RELAY_ID_HEADER: &str = "x-relay-id";

/// Header carrying the relay signature.
pub const RELAY_SIGNATURE_HEADER: &str = "x-relay-signature";

/// Header carrying the raw credentials.
pub const AUTHORIZATION_HEADER: &str = "authorization";

/// Session keys copied into a descriptor, by descriptor field.
pub const SESSION_KEYS: [(SessionField, &str); 4] = [
    (SessionField::Backend, "_auth_user_backend"),
    (SessionField::UserId, "_auth_user_id"),
    (SessionField::UserHash, "_auth_user_hash"),
    (SessionField::Nonce, "_nonce"),
];

/// Descriptor fields populated from the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionField {
    /// Authentication backend that logged the user in.
    Backend,
    /// Session user id.
    UserId,
    /// Session auth hash.
    UserHash,
    /// Session nonce.
    Nonce,
}

/// Session data as seen by the descriptor builder.
///
/// Reads through [`Session::get`] mark the session as accessed, the same
/// way a web framework session does.
pub trait Session {
    /// Reads a key, marking the session as accessed.
    fn get(&mut self, key: &str) -> Option<String>;

    /// Whether the session has been read during this request.
    fn accessed(&self) -> bool;

    /// Overrides the accessed flag.
    fn set_accessed(&mut self, accessed: bool);
}

/// Read-only view of an inbound transport request.
pub trait TransportRequest {
    /// Raw header value, if present.
    fn header(&self, name: &str) -> Option<&[u8]>;

    /// Address of the connecting peer.
    fn remote_addr(&self) -> Option<String>;

    /// Link signature attached to the URL, if any.
    fn signature(&self) -> Option<String>;

    /// Absolute URI for `location`, or for the request itself when `None`.
    fn build_absolute_uri(&self, location: Option<&str>) -> String;

    /// Request path.
    fn path(&self) -> &str;

    /// Session attached to the request, if any.
    fn session(&mut self) -> Option<&mut dyn Session>;
}

/// Normalizes a raw header value to base64 text.
///
/// Text and bytes with the same content produce the same output.
pub fn normalize_to_b64<T: AsRef<[u8]>>(input: Option<T>) -> Option<String> {
    input.map(|value| STANDARD.encode(value.as_ref()))
}

/// Transport-independent snapshot of the signals needed for authentication.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthenticationRequest {
    /// Relay identifier header.
    pub relay_id: Option<String>,
    /// Relay signature header.
    pub relay_signature: Option<String>,
    /// Session authentication backend.
    pub backend: Option<String>,
    /// Session user id.
    pub user_id: Option<String>,
    /// Session auth hash.
    pub user_hash: Option<String>,
    /// Session nonce.
    pub nonce: Option<String>,

    /// Remote peer address.
    pub remote_addr: Option<String>,
    /// URL link signature.
    pub signature: Option<String>,
    /// Absolute URL of the request.
    pub absolute_url: String,
    /// Absolute URL of the site root.
    pub absolute_url_root: String,
    /// Request path.
    pub path: String,
    /// Authorization header, base64 encoded.
    pub authorization_b64: Option<String>,
}

impl AuthenticationRequest {
    /// Builds a descriptor from a live transport request.
    ///
    /// Missing values become `None`; this never fails.
    pub fn from_transport<R: TransportRequest + ?Sized>(request: &mut R) -> Self {
        let mut descriptor = Self {
            relay_id: header_text(request, RELAY_ID_HEADER),
            relay_signature: header_text(request, RELAY_SIGNATURE_HEADER),
            remote_addr: request.remote_addr(),
            signature: request.signature(),
            absolute_url: request.build_absolute_uri(None),
            absolute_url_root: request.build_absolute_uri(Some("/")),
            path: request.path().to_string(),
            authorization_b64: normalize_to_b64(request.header(AUTHORIZATION_HEADER)),
            ..Default::default()
        };

        if let Some(session) = request.session() {
            descriptor.apply_from_session(session);
        }

        descriptor
    }

    /// Copies the session-derived fields without changing `session.accessed()`.
    pub fn apply_from_session(&mut self, session: &mut dyn Session) -> &mut Self {
        let accessed = session.accessed();
        for (field, key) in SESSION_KEYS {
            *self.session_field_mut(field) = session.get(key);
        }
        session.set_accessed(accessed);
        self
    }

    /// Sets the authorization header from raw text or bytes.
    pub fn with_authorization(mut self, authorization: impl AsRef<[u8]>) -> Self {
        self.authorization_b64 = normalize_to_b64(Some(authorization));
        self
    }

    /// Decodes the authorization header back to text.
    ///
    /// Returns `None` when absent or when the stored value is not valid
    /// base64 / UTF-8.
    pub fn authorization(&self) -> Option<String> {
        let raw = STANDARD.decode(self.authorization_b64.as_deref()?).ok()?;
        String::from_utf8(raw).ok()
    }

    fn session_field_mut(&mut self, field: SessionField) -> &mut Option<String> {
        match field {
            SessionField::Backend => &mut self.backend,
            SessionField::UserId => &mut self.user_id,
            SessionField::UserHash => &mut self.user_hash,
            SessionField::Nonce => &mut self.nonce,
        }
    }
}

fn header_text<R: TransportRequest + ?Sized>(request: &R, name: &str) -> Option<String> {
    request
        .header(name)
        .and_then(|value| std::str::from_utf8(value).ok())
        .map(str::to_string)
}

/// Map-backed session with an accessed flag.
///
/// Used by transports that materialize session data up front, and by tests.
#[derive(Debug, Clone, Default)]
pub struct MemorySession {
    values: HashMap<String, String>,
    accessed: bool,
}

impl MemorySession {
    /// Creates an empty, unaccessed session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a value without touching the accessed flag.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }
}

impl FromIterator<(String, String)> for MemorySession {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
            accessed: false,
        }
    }
}

impl Session for MemorySession {
    fn get(&mut self, key: &str) -> Option<String> {
        self.accessed = true;
        self.values.get(key).cloned()
    }

    fn accessed(&self) -> bool {
        self.accessed
    }

    fn set_accessed(&mut self, accessed: bool) {
        self.accessed = accessed;
    }
}

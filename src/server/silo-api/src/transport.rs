//! Descriptor construction from `http` requests.

use std::collections::HashMap;
use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Query};
use axum::http::header::HOST;
use axum::http::request::Parts;
use silo_auth::{MemorySession, Session, TransportRequest};

/// Query parameter carrying a link signature.
pub const SIGNATURE_QUERY_PARAM: &str = "_sig";

/// Header carrying a link signature.
pub const SIGNATURE_HEADER: &str = "x-link-signature";

/// [`TransportRequest`] view over request parts.
///
/// The peer address comes from `ConnectInfo` when the server was started with
/// connect info, else from the first `x-forwarded-for` entry.
pub struct HttpRequest<'a> {
    parts: &'a Parts,
    session: Option<MemorySession>,
}

impl<'a> HttpRequest<'a> {
    /// Wraps request parts.
    pub fn new(parts: &'a Parts) -> Self {
        Self {
            parts,
            session: None,
        }
    }

    /// Attaches materialized session data.
    pub fn with_session(mut self, session: MemorySession) -> Self {
        self.session = Some(session);
        self
    }

    /// Gives the session back, with its accessed flag.
    pub fn into_session(self) -> Option<MemorySession> {
        self.session
    }

    fn header_str(&self, name: &str) -> Option<&str> {
        self.parts.headers.get(name)?.to_str().ok()
    }

    fn scheme(&self) -> &str {
        self.header_str("x-forwarded-proto")
            .or_else(|| self.parts.uri.scheme_str())
            .unwrap_or("http")
    }

    fn host(&self) -> &str {
        self.header_str(HOST.as_str())
            .or_else(|| self.parts.uri.authority().map(|a| a.as_str()))
            .unwrap_or("localhost")
    }
}

impl TransportRequest for HttpRequest<'_> {
    fn header(&self, name: &str) -> Option<&[u8]> {
        self.parts.headers.get(name).map(|value| value.as_bytes())
    }

    fn remote_addr(&self) -> Option<String> {
        if let Some(ConnectInfo(addr)) = self.parts.extensions.get::<ConnectInfo<SocketAddr>>() {
            return Some(addr.ip().to_string());
        }
        self.header_str("x-forwarded-for")
            .and_then(|value| value.split(',').next())
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn signature(&self) -> Option<String> {
        let from_query = Query::<HashMap<String, String>>::try_from_uri(&self.parts.uri)
            .ok()
            .and_then(|Query(mut params)| params.remove(SIGNATURE_QUERY_PARAM));
        from_query.or_else(|| self.header_str(SIGNATURE_HEADER).map(str::to_string))
    }

    fn build_absolute_uri(&self, location: Option<&str>) -> String {
        let location = match location {
            Some(location) => location,
            None => self
                .parts
                .uri
                .path_and_query()
                .map_or("/", |pq| pq.as_str()),
        };
        if location.starts_with("http://") || location.starts_with("https://") {
            return location.to_string();
        }
        format!("{}://{}{}", self.scheme(), self.host(), location)
    }

    fn path(&self) -> &str {
        self.parts.uri.path()
    }

    fn session(&mut self) -> Option<&mut dyn Session> {
        self.session.as_mut().map(|session| session as &mut dyn Session)
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use axum::http::Request;
    use silo_auth::AuthenticationRequest;

    use super::*;

    fn parts(request: Request<()>) -> Parts {
        request.into_parts().0
    }

    #[test]
    fn test_descriptor_from_http_request() {
        let parts = parts(
            Request::builder()
                .uri("/api/0/projects/?_sig=abc123&cursor=1")
                .header("host", "sentry.example.com")
                .header("x-forwarded-proto", "https")
                .header("x-forwarded-for", "10.1.2.3, 172.16.0.1")
                .header("authorization", "Bearer t-abc")
                .header("x-relay-id", "relay-1")
                .body(())
                .unwrap(),
        );

        let descriptor = AuthenticationRequest::from_transport(&mut HttpRequest::new(&parts));

        assert_eq!(descriptor.path, "/api/0/projects/");
        assert_eq!(
            descriptor.absolute_url,
            "https://sentry.example.com/api/0/projects/?_sig=abc123&cursor=1"
        );
        assert_eq!(descriptor.absolute_url_root, "https://sentry.example.com/");
        assert_eq!(descriptor.remote_addr.as_deref(), Some("10.1.2.3"));
        assert_eq!(descriptor.signature.as_deref(), Some("abc123"));
        assert_eq!(descriptor.relay_id.as_deref(), Some("relay-1"));
        assert_eq!(descriptor.authorization().as_deref(), Some("Bearer t-abc"));
        assert_eq!(descriptor.user_id, None);
    }

    #[test]
    fn test_connect_info_wins_over_forwarded_for() {
        let mut request = Request::builder()
            .uri("/")
            .header("x-forwarded-for", "10.1.2.3")
            .header(SIGNATURE_HEADER, "sig-from-header")
            .body(())
            .unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4000))));
        let parts = parts(request);

        let http = HttpRequest::new(&parts);
        assert_eq!(http.remote_addr().as_deref(), Some("127.0.0.1"));
        assert_eq!(http.signature().as_deref(), Some("sig-from-header"));
        assert_eq!(http.build_absolute_uri(None), "http://localhost/");
    }

    #[test]
    fn test_session_read_keeps_accessed_flag() {
        let parts = parts(Request::builder().uri("/").body(()).unwrap());
        let mut session = MemorySession::new();
        session.insert("_auth_user_id", "42");

        let mut http = HttpRequest::new(&parts).with_session(session);
        let descriptor = AuthenticationRequest::from_transport(&mut http);

        assert_eq!(descriptor.user_id.as_deref(), Some("42"));
        assert_eq!(http.into_session().map(|s| s.accessed()), Some(false));
    }

    #[test]
    fn test_signature_is_percent_decoded() {
        let parts = parts(
            Request::builder()
                .uri("/share/?_sig=a%2Bb%2Fc%3D&_sig_ignored=x")
                .body(())
                .unwrap(),
        );

        let http = HttpRequest::new(&parts);
        assert_eq!(http.signature().as_deref(), Some("a+b/c="));
    }

    #[test]
    fn test_query_without_signature_falls_back_to_header() {
        let parts = parts(
            Request::builder()
                .uri("/share/?cursor=1%3A0")
                .header(SIGNATURE_HEADER, "sig-from-header")
                .body(())
                .unwrap(),
        );

        let http = HttpRequest::new(&parts);
        assert_eq!(http.signature().as_deref(), Some("sig-from-header"));
    }
}

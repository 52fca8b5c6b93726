//! # Silo API
//!
//! HTTP surface of the authentication resolution layer.
//!
//! - [`build_router`] - the remote resolution service run by the silo owning
//!   credentials, plus an authenticated `whoami` route resolved through
//!   [`silo_auth::RpcAuthentication`]
//! - [`RemoteAuthService`] - client side of the remote resolution call
//! - [`HttpRequest`] - builds descriptors from `http` requests

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod transport;
pub mod types;

pub use client::RemoteAuthService;
pub use error::{ApiError, ApiResult};
pub use routes::{build_router, ApiState};
pub use transport::HttpRequest;
pub use types::{AuthenticateWithRequest, ErrorBody, HealthResponse, WhoAmIResponse};

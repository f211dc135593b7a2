//! The seam between the engine and the HTTP client.
//!
//! The engine never talks to the network itself. Whoever owns the
//! authenticated client implements [`Transport`]; header injection, base URL
//! handling and token refresh stay on that side.

use std::future::Future;

use serde_json::Value;
use thiserror::Error;

/// Query string pairs, in the order they were declared.
pub type Params = Vec<(&'static str, String)>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransportError {
    #[error("unauthorized")]
    Unauthorized,
    #[error("forbidden")]
    Forbidden,
    #[error("not found")]
    NotFound,
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("rejected by server: {0}")]
    Validation(String),
    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },
    #[error("server unreachable: {0}")]
    Network(String),
    #[error("unreadable response: {0}")]
    Decode(String),
    #[error("session expired, please log in again")]
    SessionExpired,
}

/// Authenticated request function used by every fetch.
pub trait Transport: Send + Sync {
    fn get(
        &self,
        path: &str,
        params: &Params,
    ) -> impl Future<Output = Result<Value, TransportError>> + Send;

    fn post(&self, path: &str, body: Value)
    -> impl Future<Output = Result<Value, TransportError>> + Send;
}

impl<T: Transport> Transport for std::sync::Arc<T> {
    fn get(
        &self,
        path: &str,
        params: &Params,
    ) -> impl Future<Output = Result<Value, TransportError>> + Send {
        (**self).get(path, params)
    }

    fn post(
        &self,
        path: &str,
        body: Value,
    ) -> impl Future<Output = Result<Value, TransportError>> + Send {
        (**self).post(path, body)
    }
}

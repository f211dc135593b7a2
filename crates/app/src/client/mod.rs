use std::sync::Arc;

use engine::{Params, Transport, TransportError};
use reqwest::{Response, StatusCode, Url};
use serde::Deserialize;
use serde_json::Value;

use crate::{
    auth::{Auth, REQUEST_MIN_VALIDITY},
    error::{AppError, Result},
};

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[serde(alias = "message")]
    error: String,
}

/// Authenticated HTTP access to the API. Every request carries a fresh
/// bearer token; a session that cannot be refreshed fails with
/// [`TransportError::SessionExpired`] before anything is sent.
#[derive(Debug, Clone)]
pub struct HttpClient {
    base_url: Url,
    http: reqwest::Client,
    auth: Arc<Auth>,
}

impl HttpClient {
    pub fn new(base_url: &str, http: reqwest::Client, auth: Arc<Auth>) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|err| AppError::Setting(format!("invalid base_url: {err}")))?;
        Ok(Self {
            base_url,
            http,
            auth,
        })
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    async fn bearer(&self) -> std::result::Result<String, TransportError> {
        if let Err(err) = self.auth.update_token(REQUEST_MIN_VALIDITY).await {
            tracing::warn!("no usable session: {err}");
            return Err(TransportError::SessionExpired);
        }
        self.auth
            .access_token()
            .await
            .ok_or(TransportError::SessionExpired)
    }
}

fn network(err: reqwest::Error) -> TransportError {
    TransportError::Network(err.to_string())
}

async fn read_response(res: Response) -> std::result::Result<Value, TransportError> {
    let status = res.status();
    if status.is_success() {
        if status == StatusCode::NO_CONTENT {
            return Ok(Value::Null);
        }
        return res
            .json::<Value>()
            .await
            .map_err(|err| TransportError::Decode(err.to_string()));
    }

    let body = res
        .json::<ErrorResponse>()
        .await
        .map(|err| err.error)
        .unwrap_or_else(|_| "unknown error".to_string());

    let err = match status.as_u16() {
        401 => TransportError::Unauthorized,
        403 => TransportError::Forbidden,
        404 => TransportError::NotFound,
        409 => TransportError::Conflict(body),
        422 => TransportError::Validation(body),
        code => TransportError::Server {
            status: code,
            message: body,
        },
    };
    Err(err)
}

impl Transport for HttpClient {
    async fn get(&self, path: &str, params: &Params) -> std::result::Result<Value, TransportError> {
        let token = self.bearer().await?;
        let res = self
            .http
            .get(self.url(path))
            .bearer_auth(token)
            .query(params)
            .send()
            .await
            .map_err(network)?;
        read_response(res).await
    }

    async fn post(&self, path: &str, body: Value) -> std::result::Result<Value, TransportError> {
        let token = self.bearer().await?;
        let res = self
            .http
            .post(self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(network)?;
        read_response(res).await
    }
}

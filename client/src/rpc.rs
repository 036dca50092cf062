//! RPC gateway: the single call-point between the client core and the daemon.
//!
//! Every other component talks to the daemon through [`Gateway::call`], which
//! takes a method/path/body triple and returns decoded JSON or a normalized
//! [`ClientError`].
use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{normalize_error, ClientError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

#[async_trait]
pub trait Gateway: Send + Sync {
    async fn call(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value, ClientError>;
}

/// HTTP gateway against the daemon's local API, authenticated with the
/// bearer token the daemon writes to its cookie file.
pub struct HttpGateway {
    base_url: String,
    cookie_path: PathBuf,
    http: reqwest::Client,
}

impl HttpGateway {
    pub fn new(api_addr: &str, cookie_path: PathBuf) -> Self {
        Self {
            base_url: format!("http://{api_addr}"),
            cookie_path,
            http: reqwest::Client::new(),
        }
    }

    fn read_token(&self) -> Result<String, ClientError> {
        std::fs::read_to_string(&self.cookie_path)
            .map(|s| s.trim().to_string())
            .map_err(|e| ClientError::Transport(format!("Failed to read auth cookie: {e}")))
    }
}

#[async_trait]
impl Gateway for HttpGateway {
    async fn call(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value, ClientError> {
        let token = self.read_token()?;
        let url = format!("{}{path}", self.base_url);

        let mut req = match method {
            Method::Get => self.http.get(&url),
            Method::Post => self.http.post(&url),
        };
        req = req.bearer_auth(token);
        if let Some(body) = body {
            req = req.json(&body);
        }

        let res = req
            .send()
            .await
            .map_err(|e| ClientError::Transport(format!("Request failed: {e}")))?;

        let status = res.status();
        let text = res
            .text()
            .await
            .map_err(|e| ClientError::Transport(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(ClientError::ActionFailed(normalize_error(&text)));
        }

        serde_json::from_str(&text)
            .map_err(|e| ClientError::Transport(format!("Unparseable response from {path}: {e}")))
    }
}

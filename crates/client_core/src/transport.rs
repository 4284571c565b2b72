//! Thin wrapper over `reqwest` that speaks the backend's REST conventions.

use std::sync::Arc;

use reqwest::{
    header::{ACCEPT_LANGUAGE, AUTHORIZATION},
    Client, Method,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use shared::error::readable_text;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::config::ClientSettings;

/// Source of the bearer token attached to every request.
pub trait CredentialProvider: Send + Sync {
    fn access_token(&self) -> Option<String>;
}

#[derive(Debug, Clone, Default)]
pub struct StaticToken(Option<String>);

impl StaticToken {
    pub fn new(token: Option<String>) -> Self {
        Self(token.filter(|token| !token.trim().is_empty()))
    }
}

impl CredentialProvider for StaticToken {
    fn access_token(&self) -> Option<String> {
        self.0.clone()
    }
}

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("{path} returned HTTP {status}")]
    Status {
        path: String,
        status: u16,
        data: Value,
    },
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("failed to decode response from {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("unexpected response from {path}: {detail}")]
    Unexpected { path: String, detail: String },
    #[error("invalid request url '{0}'")]
    InvalidUrl(String),
}

impl RequestError {
    pub fn status(&self) -> Option<u16> {
        match self {
            RequestError::Status { status, .. } => Some(*status),
            RequestError::Transport(err) => err.status().map(|status| status.as_u16()),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

/// Formats a stored token as an `Authorization` value; tokens that already
/// carry the scheme are passed through.
pub fn bearer(token: &str) -> String {
    let token = token.trim();
    if token.starts_with("Bearer ") {
        token.to_string()
    } else {
        format!("Bearer {token}")
    }
}

#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    root: Url,
    language: String,
    credentials: Arc<dyn CredentialProvider>,
}

impl ApiClient {
    pub fn new(
        settings: &ClientSettings,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self, RequestError> {
        let root = settings.api_root();
        let root = Url::parse(&format!("{root}/")).map_err(|_| RequestError::InvalidUrl(root))?;
        let http = Client::builder()
            .timeout(settings.request_timeout())
            .build()?;
        Ok(Self {
            http,
            root,
            language: settings.language.clone(),
            credentials,
        })
    }

    pub fn root(&self) -> &Url {
        &self.root
    }

    fn url(&self, path: &str) -> Result<Url, RequestError> {
        self.root
            .join(path.trim_start_matches('/'))
            .map_err(|_| RequestError::InvalidUrl(path.to_string()))
    }

    pub async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<T, RequestError> {
        self.send(method, path, &[], body).await
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, RequestError> {
        self.send(Method::GET, path, &[], None).await
    }

    pub async fn get_query<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, RequestError> {
        self.send(Method::GET, path, query, None).await
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<T, RequestError> {
        let url = self.url(path)?;
        debug!("http: request method={method} path={path}");

        let mut builder = self
            .http
            .request(method, url)
            .header(ACCEPT_LANGUAGE, &self.language);
        if !query.is_empty() {
            builder = builder.query(query);
        }
        if let Some(token) = self.credentials.access_token() {
            builder = builder.header(AUTHORIZATION, bearer(&token));
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let text = response.text().await?;
        let data = parse_body(&text);

        if !status.is_success() {
            debug!("http: failure path={path} status={}", status.as_u16());
            return Err(RequestError::Status {
                path: path.to_string(),
                status: status.as_u16(),
                data,
            });
        }

        serde_json::from_value(data).map_err(|source| RequestError::Decode {
            path: path.to_string(),
            source,
        })
    }
}

fn parse_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| match readable_text(text) {
        Some(line) => Value::String(line),
        None => Value::Null,
    })
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;

use std::fmt;
use std::sync::Arc;

use reqwest::header::{HeaderMap, AUTHORIZATION};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde_json::Value as JsonValue;

use crate::error::{transport_error, OrmResult};
use crate::remote::{NoopTokenProvider, TokenProviderArc};

use super::rpc_error::map_http_error;

/// How an ID token is presented in the `Authorization` header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthScheme {
    /// `Bearer <token>`, used by Firestore.
    Bearer,
    /// `Firebase <token>`, used by Cloud Storage.
    Firebase,
}

/// Thin JSON-over-HTTP client rooted at one base URL.
#[derive(Clone)]
pub struct Connection {
    client: Client,
    base_url: String,
    token_provider: TokenProviderArc,
    auth_scheme: AuthScheme,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("base_url", &self.base_url)
            .field("auth_scheme", &self.auth_scheme)
            .finish()
    }
}

/// Raw response for endpoints whose outcome travels in headers.
#[derive(Debug)]
pub struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl Connection {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token_provider: Arc::new(NoopTokenProvider),
            auth_scheme: AuthScheme::Bearer,
        }
    }

    /// Attaches the provider's token to every request sent through this connection.
    pub fn with_token_provider(mut self, provider: TokenProviderArc, scheme: AuthScheme) -> Self {
        self.token_provider = provider;
        self.auth_scheme = scheme;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub async fn invoke_json(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<JsonValue>,
    ) -> OrmResult<JsonValue> {
        let response = self.send(self.build_request(method, path, query, body)).await?;
        if response.status.is_success() {
            parse_body(&response.body)
        } else {
            Err(map_http_error(response.status, &response.body))
        }
    }

    /// Like [`Connection::invoke_json`] but maps `404` to `None`.
    pub async fn invoke_json_optional(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<JsonValue>,
    ) -> OrmResult<Option<JsonValue>> {
        let response = self.send(self.build_request(method, path, query, body)).await?;
        if response.status.is_success() {
            parse_body(&response.body).map(Some)
        } else if response.status == StatusCode::NOT_FOUND {
            Ok(None)
        } else {
            Err(map_http_error(response.status, &response.body))
        }
    }

    pub async fn send(&self, request: RequestBuilder) -> OrmResult<RawResponse> {
        let response = self.authorize(request).await?.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await?;
        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }

    async fn authorize(&self, builder: RequestBuilder) -> OrmResult<RequestBuilder> {
        let token = match self.token_provider.get_token().await? {
            Some(token) if !token.is_empty() => token,
            _ => return Ok(builder),
        };
        Ok(match self.auth_scheme {
            AuthScheme::Bearer => builder.bearer_auth(token),
            AuthScheme::Firebase => builder.header(AUTHORIZATION, format!("Firebase {token}")),
        })
    }

    fn build_request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<JsonValue>,
    ) -> RequestBuilder {
        let mut builder = self
            .client
            .request(method, self.url(path))
            .header("Content-Type", "application/json");
        if !query.is_empty() {
            builder = builder.query(query);
        }
        if let Some(body) = body {
            builder = builder.json(&body);
        }
        builder
    }
}

fn parse_body(text: &str) -> OrmResult<JsonValue> {
    if text.is_empty() {
        Ok(JsonValue::Null)
    } else {
        serde_json::from_str(text)
            .map_err(|err| transport_error(format!("Malformed response body: {err}")))
    }
}

pub(crate) fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::form_urlencoded;

use crate::app::ConnectionConfig;
use crate::error::{configuration_error, transport_error, OrmError, OrmResult};
use crate::remote::{AuthBackend, Identity, IdentityProvider, LOGGER};

use super::connection::Connection;
use super::rpc_error::{extract_message, map_http_error};

const IDENTITY_TOOLKIT_VERSION: &str = "v1";

/// Parameters handed to a [`PopupHandler`] when a provider sign-in starts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PopupRequest {
    pub provider_id: String,
    pub auth_domain: String,
    pub scopes: Vec<String>,
    pub custom_parameters: BTreeMap<String, String>,
}

/// OAuth tokens obtained from the identity provider by the popup.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProviderCredential {
    pub id_token: Option<String>,
    pub access_token: Option<String>,
}

/// Runs the interactive part of a provider sign-in.
///
/// Implementations open a browser window or dialog, complete the authorization
/// handshake and return the provider's tokens. A dismissed popup should fail with
/// a `Canceled` error or an error carrying `auth/popup-closed-by-user`.
pub trait PopupHandler: Send + Sync {
    fn open_popup(&self, request: PopupRequest) -> OrmResult<ProviderCredential>;
}

/// Identity service backed by the Identity Toolkit v1 REST API.
#[derive(Clone)]
pub struct HttpAuthBackend {
    connection: Connection,
    api_key: String,
    auth_domain: String,
    popup_handler: Option<Arc<dyn PopupHandler>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmailPasswordRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SignInWithIdpRequest {
    post_body: String,
    request_uri: String,
    return_idp_credential: bool,
    return_secure_token: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInResponse {
    local_id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    id_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    provider_id: Option<String>,
}

impl SignInResponse {
    fn into_identity(self, default_provider: &str) -> Identity {
        Identity {
            uid: self.local_id,
            email: self.email,
            display_name: self.display_name.filter(|name| !name.is_empty()),
            provider_id: self
                .provider_id
                .unwrap_or_else(|| default_provider.to_string()),
            id_token: self.id_token,
            refresh_token: self.refresh_token,
        }
    }
}

impl HttpAuthBackend {
    pub fn new(config: &ConnectionConfig) -> Self {
        Self::with_client(config, Client::new())
    }

    pub fn with_client(config: &ConnectionConfig, client: Client) -> Self {
        let base_url = format!("{}/{IDENTITY_TOOLKIT_VERSION}", config.auth_base_url());
        Self {
            connection: Connection::new(client, base_url),
            api_key: config.api_key.clone(),
            auth_domain: config.auth_domain(),
            popup_handler: None,
        }
    }

    pub fn with_popup_handler(mut self, handler: Arc<dyn PopupHandler>) -> Self {
        self.popup_handler = Some(handler);
        self
    }

    async fn execute_request<TRequest, TResponse>(&self, endpoint: &str, request: &TRequest) -> OrmResult<TResponse>
    where
        TRequest: Serialize + ?Sized,
        TResponse: DeserializeOwned,
    {
        let body = serde_json::to_value(request)
            .map_err(|err| configuration_error(format!("Unable to encode {endpoint} request: {err}")))?;
        let request = self
            .connection
            .client()
            .request(Method::POST, self.connection.url(&format!("accounts:{endpoint}")))
            .query(&[("key", self.api_key.as_str())])
            .json(&body);
        let response = self.connection.send(request).await?;
        if !response.status.is_success() {
            return Err(map_auth_error(response.status, &response.body));
        }
        serde_json::from_str(&response.body)
            .map_err(|err| transport_error(format!("Malformed {endpoint} response: {err}")))
    }

    fn request_uri(&self) -> String {
        format!("https://{}/__/auth/handler", self.auth_domain)
    }
}

#[async_trait]
impl AuthBackend for HttpAuthBackend {
    async fn sign_in_with_email(&self, email: &str, password: &str) -> OrmResult<Identity> {
        let request = EmailPasswordRequest {
            email,
            password,
            return_secure_token: true,
        };
        let response: SignInResponse = self.execute_request("signInWithPassword", &request).await?;
        Ok(response.into_identity("password"))
    }

    async fn register_with_email(&self, email: &str, password: &str) -> OrmResult<Identity> {
        let request = EmailPasswordRequest {
            email,
            password,
            return_secure_token: true,
        };
        let response: SignInResponse = self.execute_request("signUp", &request).await?;
        Ok(response.into_identity("password"))
    }

    async fn sign_in_with_provider(&self, provider: &IdentityProvider) -> OrmResult<Identity> {
        let handler = self.popup_handler.as_ref().ok_or_else(|| {
            configuration_error("Provider sign-in requires a popup handler on the auth backend")
        })?;
        let credential = handler.open_popup(PopupRequest {
            provider_id: provider.provider_id().to_string(),
            auth_domain: self.auth_domain.clone(),
            scopes: provider.scopes().to_vec(),
            custom_parameters: provider.custom_parameters().clone(),
        })?;

        let request = SignInWithIdpRequest {
            post_body: encode_post_body(provider.provider_id(), &credential),
            request_uri: self.request_uri(),
            return_idp_credential: true,
            return_secure_token: true,
        };
        let response: SignInResponse = self.execute_request("signInWithIdp", &request).await?;
        Ok(response.into_identity(provider.provider_id()))
    }

    async fn sign_out(&self) -> OrmResult<()> {
        // Tokens are bearer credentials; there is no server-side session to end.
        LOGGER.debug("Signed out of the identity service");
        Ok(())
    }
}

fn encode_post_body(provider_id: &str, credential: &ProviderCredential) -> String {
    let mut post_body = form_urlencoded::Serializer::new(String::new());
    post_body.append_pair("providerId", provider_id);
    if let Some(id_token) = credential.id_token.as_deref() {
        post_body.append_pair("id_token", id_token);
    }
    if let Some(access_token) = credential.access_token.as_deref() {
        post_body.append_pair("access_token", access_token);
    }
    post_body.finish()
}

/// Identity Toolkit reports failures as `error.message` codes such as `EMAIL_NOT_FOUND`
/// or `WEAK_PASSWORD : Password should be at least 6 characters`.
fn map_auth_error(status: reqwest::StatusCode, body: &str) -> OrmError {
    let mapped = map_http_error(status, body);
    let Some(raw) = extract_message(body) else {
        return mapped;
    };
    let (server_code, detail) = match raw.split_once(" : ") {
        Some((code, detail)) => (code.trim().to_string(), Some(detail.trim().to_string())),
        None => (raw.trim().to_string(), None),
    };
    let provider_code = provider_code_for(&server_code);
    let message = detail.unwrap_or_else(|| server_code.clone());
    OrmError::new(mapped.code, message)
        .with_status(status.as_u16())
        .with_provider_code(provider_code)
}

fn provider_code_for(server_code: &str) -> String {
    let known = match server_code {
        "EMAIL_NOT_FOUND" => "auth/user-not-found",
        "INVALID_PASSWORD" => "auth/wrong-password",
        "INVALID_LOGIN_CREDENTIALS" => "auth/invalid-credential",
        "EMAIL_EXISTS" => "auth/email-already-in-use",
        "WEAK_PASSWORD" => "auth/weak-password",
        "INVALID_EMAIL" => "auth/invalid-email",
        "USER_DISABLED" => "auth/user-disabled",
        "TOO_MANY_ATTEMPTS_TRY_LATER" => "auth/too-many-requests",
        "OPERATION_NOT_ALLOWED" => "auth/operation-not-allowed",
        "INVALID_IDP_RESPONSE" => "auth/invalid-credential",
        _ => "",
    };
    if known.is_empty() {
        format!("auth/{}", server_code.to_ascii_lowercase().replace('_', "-"))
    } else {
        known.to_string()
    }
}

use std::env;

use serde::{Deserialize, Serialize};

use crate::error::{configuration_error, OrmResult};

const FIRESTORE_API_HOST: &str = "https://firestore.googleapis.com";
const AUTH_API_HOST: &str = "https://identitytoolkit.googleapis.com";
const STORAGE_API_HOST: &str = "https://firebasestorage.googleapis.com";

/// Connection parameters for one Firebase project.
///
/// Only `app_id` and `api_key` are required. The project id, storage bucket and
/// auth domain derive from `app_id` unless overridden. The `*_host` overrides
/// (and the usual emulator environment variables) redirect the REST clients.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionConfig {
    pub app_id: String,
    pub api_key: String,
    #[serde(default)]
    pub messaging_sender_id: Option<String>,
    /// Whether a Google identity provider is constructed for the session.
    #[serde(default)]
    pub google_enabled: bool,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub storage_bucket: Option<String>,
    #[serde(default)]
    pub auth_domain: Option<String>,
    #[serde(default)]
    pub firestore_host: Option<String>,
    #[serde(default)]
    pub auth_host: Option<String>,
    #[serde(default)]
    pub storage_host: Option<String>,
}

impl ConnectionConfig {
    pub fn new(app_id: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            api_key: api_key.into(),
            ..Default::default()
        }
    }

    pub fn with_messaging_sender_id(mut self, sender_id: impl Into<String>) -> Self {
        self.messaging_sender_id = Some(sender_id.into());
        self
    }

    pub fn with_google_enabled(mut self, enabled: bool) -> Self {
        self.google_enabled = enabled;
        self
    }

    pub fn with_project_id(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn with_storage_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.storage_bucket = Some(bucket.into());
        self
    }

    pub fn with_firestore_host(mut self, host: impl Into<String>) -> Self {
        self.firestore_host = Some(host.into());
        self
    }

    pub fn with_auth_host(mut self, host: impl Into<String>) -> Self {
        self.auth_host = Some(host.into());
        self
    }

    pub fn with_storage_host(mut self, host: impl Into<String>) -> Self {
        self.storage_host = Some(host.into());
        self
    }

    /// Rejects configurations missing the app identifier or the API key.
    pub fn validate(&self) -> OrmResult<()> {
        if self.app_id.trim().is_empty() {
            return Err(configuration_error("Connection config is missing 'appId'"));
        }
        if self.api_key.trim().is_empty() {
            return Err(configuration_error("Connection config is missing 'apiKey'"));
        }
        Ok(())
    }

    pub fn project_id(&self) -> &str {
        self.project_id.as_deref().unwrap_or(&self.app_id)
    }

    pub fn storage_bucket(&self) -> String {
        self.storage_bucket
            .clone()
            .unwrap_or_else(|| format!("{}.appspot.com", self.app_id))
    }

    pub fn auth_domain(&self) -> String {
        self.auth_domain
            .clone()
            .unwrap_or_else(|| format!("{}.firebaseapp.com", self.app_id))
    }

    /// Base URL of the Firestore REST API (`FIRESTORE_EMULATOR_HOST` is honoured).
    pub fn firestore_base_url(&self) -> String {
        resolve_host(
            self.firestore_host.as_deref(),
            "FIRESTORE_EMULATOR_HOST",
            FIRESTORE_API_HOST,
            "",
        )
    }

    /// Base URL of the Identity Toolkit API (`FIREBASE_AUTH_EMULATOR_HOST` is honoured).
    pub fn auth_base_url(&self) -> String {
        resolve_host(
            self.auth_host.as_deref(),
            "FIREBASE_AUTH_EMULATOR_HOST",
            AUTH_API_HOST,
            "/identitytoolkit.googleapis.com",
        )
    }

    /// Base URL of the Storage API (`FIREBASE_STORAGE_EMULATOR_HOST` is honoured).
    pub fn storage_base_url(&self) -> String {
        resolve_host(
            self.storage_host.as_deref(),
            "FIREBASE_STORAGE_EMULATOR_HOST",
            STORAGE_API_HOST,
            "",
        )
    }
}

fn resolve_host(explicit: Option<&str>, emulator_var: &str, default: &str, emulator_suffix: &str) -> String {
    if let Some(host) = explicit {
        return host.trim_end_matches('/').to_string();
    }
    match env::var(emulator_var) {
        Ok(host) if !host.trim().is_empty() => {
            let host = host.trim().trim_end_matches('/');
            if host.starts_with("http://") || host.starts_with("https://") {
                format!("{host}{emulator_suffix}")
            } else {
                format!("http://{host}{emulator_suffix}")
            }
        }
        _ => default.to_string(),
    }
}

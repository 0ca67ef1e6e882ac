use std::error::Error;
use std::fmt::{Display, Formatter};

/// Kinds of failures surfaced by the mapping layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OrmErrorCode {
    /// Bad or missing connection parameters, or an invalid field declaration.
    Configuration,
    /// A query condition list violates the combinable-filter restrictions.
    InvalidQuery,
    /// The targeted remote document does not exist.
    NotFound,
    /// The user dismissed an interactive flow or an upload was canceled.
    Canceled,
    /// Any failure reported by the remote service or the network.
    Transport,
}

impl OrmErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrmErrorCode::Configuration => "orm/configuration",
            OrmErrorCode::InvalidQuery => "orm/invalid-query",
            OrmErrorCode::NotFound => "orm/not-found",
            OrmErrorCode::Canceled => "orm/canceled",
            OrmErrorCode::Transport => "orm/transport",
        }
    }
}

#[derive(Clone, Debug)]
pub struct OrmError {
    pub code: OrmErrorCode,
    message: String,
    /// Raw error code reported by the remote service (e.g. `auth/popup-closed-by-user`).
    pub provider_code: Option<String>,
    /// HTTP status of the failed request, when the failure came from a REST call.
    pub status: Option<u16>,
}

impl OrmError {
    pub fn new(code: OrmErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            provider_code: None,
            status: None,
        }
    }

    pub fn with_provider_code(mut self, code: impl Into<String>) -> Self {
        self.provider_code = Some(code.into());
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn code_str(&self) -> &'static str {
        self.code.as_str()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_not_found(&self) -> bool {
        self.code == OrmErrorCode::NotFound
    }
}

impl Display for OrmError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.provider_code {
            Some(provider) => write!(f, "{} ({}, {})", self.message, self.code_str(), provider),
            None => write!(f, "{} ({})", self.message, self.code_str()),
        }
    }
}

impl Error for OrmError {}

impl From<reqwest::Error> for OrmError {
    fn from(err: reqwest::Error) -> Self {
        let mapped = transport_error(err.to_string());
        match err.status() {
            Some(status) => mapped.with_status(status.as_u16()),
            None => mapped,
        }
    }
}

pub type OrmResult<T> = Result<T, OrmError>;

pub fn configuration_error(message: impl Into<String>) -> OrmError {
    OrmError::new(OrmErrorCode::Configuration, message)
}

pub fn invalid_query(message: impl Into<String>) -> OrmError {
    OrmError::new(OrmErrorCode::InvalidQuery, message)
}

pub fn not_found(message: impl Into<String>) -> OrmError {
    OrmError::new(OrmErrorCode::NotFound, message)
}

pub fn canceled(message: impl Into<String>) -> OrmError {
    OrmError::new(OrmErrorCode::Canceled, message)
}

pub fn transport_error(message: impl Into<String>) -> OrmError {
    OrmError::new(OrmErrorCode::Transport, message)
}

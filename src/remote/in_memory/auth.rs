use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};

use crate::error::{transport_error, OrmError, OrmResult};
use crate::remote::{AuthBackend, Identity, IdentityProvider};

const MIN_PASSWORD_LENGTH: usize = 6;

#[derive(Clone)]
struct Account {
    password: String,
    identity: Identity,
}

#[derive(Clone)]
enum PopupOutcome {
    SignIn(Identity),
    Fail { provider_code: String, message: String },
}

/// Identity service double holding email accounts in memory and replaying a
/// scripted outcome for provider popups.
#[derive(Clone)]
pub struct InMemoryAuthBackend {
    accounts: Arc<Mutex<HashMap<String, Account>>>,
    popup: Arc<Mutex<PopupOutcome>>,
    sign_outs: Arc<Mutex<usize>>,
}

impl Default for InMemoryAuthBackend {
    fn default() -> Self {
        let identity = Identity {
            uid: random_token(28),
            email: Some("popup.user@example.com".to_string()),
            display_name: Some("Popup User".to_string()),
            provider_id: IdentityProvider::GOOGLE_PROVIDER_ID.to_string(),
            id_token: Some(random_token(32)),
            refresh_token: Some(random_token(32)),
        };
        Self {
            accounts: Arc::new(Mutex::new(HashMap::new())),
            popup: Arc::new(Mutex::new(PopupOutcome::SignIn(identity))),
            sign_outs: Arc::new(Mutex::new(0)),
        }
    }
}

impl InMemoryAuthBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next provider popups complete as `identity`.
    pub fn set_popup_identity(&self, identity: Identity) {
        *self.popup.lock().unwrap() = PopupOutcome::SignIn(identity);
    }

    /// Makes the next provider popups fail with the given provider error code.
    pub fn set_popup_failure(&self, provider_code: impl Into<String>, message: impl Into<String>) {
        *self.popup.lock().unwrap() = PopupOutcome::Fail {
            provider_code: provider_code.into(),
            message: message.into(),
        };
    }

    pub fn sign_out_count(&self) -> usize {
        *self.sign_outs.lock().unwrap()
    }

    fn issue_tokens(identity: &Identity) -> Identity {
        Identity {
            id_token: Some(random_token(32)),
            refresh_token: Some(random_token(32)),
            ..identity.clone()
        }
    }
}

#[async_trait]
impl AuthBackend for InMemoryAuthBackend {
    async fn sign_in_with_email(&self, email: &str, password: &str) -> OrmResult<Identity> {
        let accounts = self.accounts.lock().unwrap();
        let account = accounts.get(&normalize_email(email)).ok_or_else(|| {
            auth_failure("auth/user-not-found", "There is no user record corresponding to this identifier.")
        })?;
        if account.password != password {
            return Err(auth_failure(
                "auth/wrong-password",
                "The password is invalid or the user does not have a password.",
            ));
        }
        Ok(Self::issue_tokens(&account.identity))
    }

    async fn register_with_email(&self, email: &str, password: &str) -> OrmResult<Identity> {
        let email = normalize_email(email);
        if !email.contains('@') {
            return Err(auth_failure("auth/invalid-email", "The email address is badly formatted."));
        }
        if password.len() < MIN_PASSWORD_LENGTH {
            return Err(auth_failure(
                "auth/weak-password",
                "Password should be at least 6 characters",
            ));
        }
        let mut accounts = self.accounts.lock().unwrap();
        if accounts.contains_key(&email) {
            return Err(auth_failure(
                "auth/email-already-in-use",
                "The email address is already in use by another account.",
            ));
        }
        let identity = Identity {
            uid: random_token(28),
            email: Some(email.clone()),
            display_name: None,
            provider_id: "password".to_string(),
            id_token: None,
            refresh_token: None,
        };
        accounts.insert(
            email,
            Account {
                password: password.to_string(),
                identity: identity.clone(),
            },
        );
        Ok(Self::issue_tokens(&identity))
    }

    async fn sign_in_with_provider(&self, provider: &IdentityProvider) -> OrmResult<Identity> {
        match self.popup.lock().unwrap().clone() {
            PopupOutcome::SignIn(identity) => Ok(Identity {
                provider_id: provider.provider_id().to_string(),
                ..Self::issue_tokens(&identity)
            }),
            PopupOutcome::Fail {
                provider_code,
                message,
            } => Err(auth_failure(provider_code, message)),
        }
    }

    async fn sign_out(&self) -> OrmResult<()> {
        *self.sign_outs.lock().unwrap() += 1;
        Ok(())
    }
}

fn auth_failure(provider_code: impl Into<String>, message: impl Into<String>) -> OrmError {
    transport_error(message).with_provider_code(provider_code)
}

fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

fn random_token(length: usize) -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

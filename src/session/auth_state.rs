use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::OrmResult;
use crate::remote::{Identity, TokenProvider};

pub type AuthStateCallback = Arc<dyn Fn(Option<&Identity>) + Send + Sync + 'static>;

/// Current identity of a session plus the observers interested in it.
#[derive(Default)]
pub(crate) struct AuthState {
    inner: Mutex<AuthStateInner>,
}

#[derive(Default)]
struct AuthStateInner {
    current: Option<Identity>,
    listeners: Vec<AuthStateCallback>,
}

impl AuthState {
    pub(crate) fn current(&self) -> Option<Identity> {
        self.inner.lock().unwrap().current.clone()
    }

    /// Registers `callback` and invokes it right away with the current identity.
    ///
    /// Reading the identity and registering happen under one lock, so a
    /// concurrent [`AuthState::set`] is either seen here or delivered later.
    pub(crate) fn subscribe(&self, callback: AuthStateCallback) {
        let current = {
            let mut inner = self.inner.lock().unwrap();
            inner.listeners.push(callback.clone());
            inner.current.clone()
        };
        callback(current.as_ref());
    }

    pub(crate) fn set(&self, identity: Option<Identity>) {
        let listeners = {
            let mut inner = self.inner.lock().unwrap();
            inner.current = identity.clone();
            inner.listeners.clone()
        };
        // Listeners run without the lock so they may subscribe again.
        for listener in listeners {
            listener(identity.as_ref());
        }
    }
}

/// Hands the signed-in identity's ID token to the REST backends.
pub(crate) struct IdentityTokenProvider {
    state: Arc<AuthState>,
}

impl IdentityTokenProvider {
    pub(crate) fn new(state: Arc<AuthState>) -> Self {
        Self { state }
    }
}

#[async_trait]
impl TokenProvider for IdentityTokenProvider {
    async fn get_token(&self) -> OrmResult<Option<String>> {
        Ok(self.state.current().and_then(|identity| identity.id_token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn ada() -> Identity {
        Identity {
            uid: "ada".to_string(),
            id_token: Some("ID-TOKEN-123".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn subscribers_see_current_then_transitions() {
        let state = AuthState::default();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        state.subscribe(Arc::new(move |identity: Option<&Identity>| {
            sink.lock().unwrap().push(identity.map(|id| id.uid.clone()));
        }));

        state.set(Some(ada()));
        state.set(None);

        assert_eq!(
            *seen.lock().unwrap(),
            vec![None, Some("ada".to_string()), None]
        );
    }

    #[test]
    fn concurrent_subscribers_never_miss_a_sign_in() {
        for _ in 0..50 {
            let state = Arc::new(AuthState::default());
            let logs: Vec<Arc<Mutex<Vec<Option<String>>>>> =
                (0..8).map(|_| Arc::new(Mutex::new(Vec::new()))).collect();

            let subscribers: Vec<_> = logs
                .iter()
                .map(|log| {
                    let state = state.clone();
                    let sink = log.clone();
                    thread::spawn(move || {
                        state.subscribe(Arc::new(move |identity: Option<&Identity>| {
                            sink.lock().unwrap().push(identity.map(|id| id.uid.clone()));
                        }));
                    })
                })
                .collect();
            let signer = {
                let state = state.clone();
                thread::spawn(move || state.set(Some(ada())))
            };
            for handle in subscribers {
                handle.join().unwrap();
            }
            signer.join().unwrap();

            for log in &logs {
                assert!(log.lock().unwrap().contains(&Some("ada".to_string())));
            }
        }
    }

    #[test]
    fn listener_may_subscribe_again() {
        let state = Arc::new(AuthState::default());
        let nested = Arc::new(Mutex::new(0));
        let (outer_state, counter) = (state.clone(), nested.clone());
        state.subscribe(Arc::new(move |identity: Option<&Identity>| {
            if identity.is_some() {
                let counter = counter.clone();
                outer_state.subscribe(Arc::new(move |_: Option<&Identity>| {
                    *counter.lock().unwrap() += 1;
                }));
            }
        }));
        state.set(Some(ada()));
        assert_eq!(*nested.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn token_follows_signed_in_identity() {
        let state = Arc::new(AuthState::default());
        let provider = IdentityTokenProvider::new(state.clone());
        assert_eq!(provider.get_token().await.unwrap(), None);

        state.set(Some(ada()));
        assert_eq!(provider.get_token().await.unwrap().as_deref(), Some("ID-TOKEN-123"));

        state.set(None);
        assert_eq!(provider.get_token().await.unwrap(), None);
    }
}

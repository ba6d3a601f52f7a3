//! Session-first authentication
//!
//! [`AuthManager`] restores a persisted session when one exists and only falls
//! back to a full credential login otherwise. A fresh login is persisted right
//! away so the next process start can skip it.

use crate::config::Credentials;
use crate::error::Result;
use crate::platforms::Transport;
use crate::session::SessionStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    Authenticated,
}

pub struct AuthManager {
    store: SessionStore,
    credentials: Credentials,
    state: AuthState,
}

impl AuthManager {
    pub fn new(store: SessionStore, credentials: Credentials) -> Self {
        Self {
            store,
            credentials,
            state: AuthState::Unauthenticated,
        }
    }

    pub fn state(&self) -> AuthState {
        self.state
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Make sure `transport` carries an authenticated session
    ///
    /// A stored session is applied without checking it against the network; a
    /// stale one only surfaces on the first real request.
    ///
    /// # Errors
    ///
    /// Login failures, an unreadable session file and failures to persist a
    /// fresh session are all returned; none of them is retried.
    pub async fn ensure_authenticated(&mut self, transport: &mut dyn Transport) -> Result<()> {
        if self.state == AuthState::Authenticated {
            return Ok(());
        }

        if self.store.exists() {
            let session = self.store.load()?;
            transport.set_session(session)?;
            tracing::info!(
                path = %self.store.path().display(),
                transport = transport.name(),
                "Restored saved session"
            );
        } else {
            tracing::info!(
                username = %self.credentials.username,
                transport = transport.name(),
                "No saved session, logging in"
            );
            transport.login(&self.credentials).await?;
            self.store.save(&transport.session())?;
            tracing::info!(path = %self.store.path().display(), "Saved new session");
        }

        self.state = AuthState::Authenticated;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{MimicastError, PlatformError, SessionError};
    use crate::platforms::mock::{MockTransport, MockTransportConfig};
    use crate::session::Session;
    use secrecy::SecretString;
    use tempfile::TempDir;

    fn credentials() -> Credentials {
        Credentials {
            username: "mimic_bot".to_string(),
            password: SecretString::from("hunter2"),
            email: Some("bot@example.com".to_string()),
        }
    }

    fn manager(dir: &TempDir) -> AuthManager {
        AuthManager::new(
            SessionStore::new(dir.path().join("session.json")),
            credentials(),
        )
    }

    #[tokio::test]
    async fn test_login_when_no_session_and_persist() {
        let dir = TempDir::new().unwrap();
        let mut transport = MockTransport::new(MockTransportConfig::default());
        let mut auth = manager(&dir);

        assert_eq!(auth.state(), AuthState::Unauthenticated);
        auth.ensure_authenticated(&mut transport).await.unwrap();

        assert_eq!(auth.state(), AuthState::Authenticated);
        assert_eq!(transport.login_call_count(), 1);
        let saved = auth.store().load().unwrap();
        assert_eq!(saved, MockTransport::login_session("mimic_bot"));
    }

    #[tokio::test]
    async fn test_second_call_does_not_login_again() {
        let dir = TempDir::new().unwrap();
        let mut transport = MockTransport::new(MockTransportConfig::default());
        let mut auth = manager(&dir);

        auth.ensure_authenticated(&mut transport).await.unwrap();
        auth.ensure_authenticated(&mut transport).await.unwrap();
        assert_eq!(transport.login_call_count(), 1);

        // A new process restores from disk instead of logging in
        let mut fresh_transport = MockTransport::new(MockTransportConfig::default());
        let mut fresh_auth = manager(&dir);
        fresh_auth
            .ensure_authenticated(&mut fresh_transport)
            .await
            .unwrap();

        assert_eq!(fresh_transport.login_call_count(), 0);
        assert_eq!(
            fresh_transport.applied_sessions(),
            vec![MockTransport::login_session("mimic_bot")]
        );
    }

    #[tokio::test]
    async fn test_restore_existing_session_skips_login() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path().join("session.json"));
        let stored = Session::new(vec![crate::session::CookieRecord::new(
            "auth_token",
            "restored",
            ".x.com",
        )]);
        store.save(&stored).unwrap();

        let mut transport = MockTransport::new(MockTransportConfig::default());
        let mut auth = AuthManager::new(store, credentials());
        auth.ensure_authenticated(&mut transport).await.unwrap();

        assert_eq!(transport.login_call_count(), 0);
        assert_eq!(transport.session().get("auth_token"), Some("restored"));
    }

    #[tokio::test]
    async fn test_login_failure_propagates_and_saves_nothing() {
        let dir = TempDir::new().unwrap();
        let mut transport =
            MockTransport::new(MockTransportConfig::default()).with_login_failure("Wrong password");
        let mut auth = manager(&dir);

        let result = auth.ensure_authenticated(&mut transport).await;

        assert!(matches!(
            result,
            Err(MimicastError::Platform(PlatformError::Authentication(_)))
        ));
        assert_eq!(auth.state(), AuthState::Unauthenticated);
        assert!(!auth.store().exists());
    }

    #[tokio::test]
    async fn test_corrupt_session_is_fatal() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "{ not cookies").unwrap();

        let mut transport = MockTransport::new(MockTransportConfig::default());
        let mut auth = AuthManager::new(SessionStore::new(path), credentials());
        let result = auth.ensure_authenticated(&mut transport).await;

        assert!(matches!(
            result,
            Err(MimicastError::Session(SessionError::Corrupt(_)))
        ));
        assert_eq!(transport.login_call_count(), 0);
    }
}

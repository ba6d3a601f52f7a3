//! Mock transport implementation for testing
//!
//! This module provides a configurable in-memory transport that can simulate
//! login failures, unknown handles, timelines with missing text, rejected posts
//! and transport errors. Counters and recorded posts let tests verify exactly
//! what the agent did without network access.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::config::Credentials;
use crate::error::{MimicastError, PlatformError, Result};
use crate::platforms::{AccountId, PostAck, PostStream, Profile, RawPost, Transport, POST_OK};
use crate::session::{CookieRecord, Session};

/// Configuration for mock transport behavior
#[derive(Debug, Clone)]
pub struct MockTransportConfig {
    /// Profile reported for the authenticated account
    pub profile: Profile,

    /// Known handles (without `@`) and their ids
    pub handles: HashMap<String, AccountId>,

    /// Timelines per account, in the order the network returns them
    pub timelines: HashMap<AccountId, Vec<RawPost>>,

    /// Error to return from login, if any
    pub login_error: Option<String>,

    /// Status reported for submitted posts
    pub post_status: u16,

    /// Transport error to return from submit_post, if any
    pub post_error: Option<String>,

    /// Transport error to return from every fetch, if any
    pub fetch_error: Option<String>,

    pub login_call_count: Arc<Mutex<usize>>,
    pub fetch_call_count: Arc<Mutex<usize>>,
    pub posted_content: Arc<Mutex<Vec<String>>>,
    pub applied_sessions: Arc<Mutex<Vec<Session>>>,
}

impl Default for MockTransportConfig {
    fn default() -> Self {
        Self {
            profile: Profile {
                id: AccountId::new("1000"),
                handle: "mimic_bot".to_string(),
            },
            handles: HashMap::new(),
            timelines: HashMap::new(),
            login_error: None,
            post_status: POST_OK,
            post_error: None,
            fetch_error: None,
            login_call_count: Arc::new(Mutex::new(0)),
            fetch_call_count: Arc::new(Mutex::new(0)),
            posted_content: Arc::new(Mutex::new(Vec::new())),
            applied_sessions: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

/// Mock transport for testing
#[derive(Clone)]
pub struct MockTransport {
    config: MockTransportConfig,
    session: Session,
}

impl MockTransport {
    pub fn new(config: MockTransportConfig) -> Self {
        Self {
            config,
            session: Session::default(),
        }
    }

    /// Register a handle with its timeline
    pub fn with_account(mut self, handle: &str, id: &str, posts: Vec<RawPost>) -> Self {
        let id = AccountId::new(id);
        self.config.handles.insert(handle.to_string(), id.clone());
        self.config.timelines.insert(id, posts);
        self
    }

    /// Set the timeline of the authenticated account
    pub fn with_own_posts(mut self, posts: Vec<RawPost>) -> Self {
        self.config
            .timelines
            .insert(self.config.profile.id.clone(), posts);
        self
    }

    pub fn with_login_failure(mut self, error: &str) -> Self {
        self.config.login_error = Some(error.to_string());
        self
    }

    pub fn with_post_status(mut self, status: u16) -> Self {
        self.config.post_status = status;
        self
    }

    pub fn with_post_error(mut self, error: &str) -> Self {
        self.config.post_error = Some(error.to_string());
        self
    }

    pub fn with_fetch_error(mut self, error: &str) -> Self {
        self.config.fetch_error = Some(error.to_string());
        self
    }

    /// Get the number of times login was called
    pub fn login_call_count(&self) -> usize {
        *self.config.login_call_count.lock().unwrap()
    }

    /// Get the number of timeline fetches
    pub fn fetch_call_count(&self) -> usize {
        *self.config.fetch_call_count.lock().unwrap()
    }

    /// Get all content that was submitted
    pub fn posted_content(&self) -> Vec<String> {
        self.config.posted_content.lock().unwrap().clone()
    }

    /// Sessions restored through `set_session`
    pub fn applied_sessions(&self) -> Vec<Session> {
        self.config.applied_sessions.lock().unwrap().clone()
    }

    /// The session a successful mock login produces
    pub fn login_session(username: &str) -> Session {
        let mut auth = CookieRecord::new("auth_token", format!("token-{}", username), ".mock.local");
        auth.secure = true;
        auth.http_only = true;
        let csrf = CookieRecord::new("ct0", "csrf", ".mock.local");
        Session::new(vec![auth, csrf])
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn login(&mut self, credentials: &Credentials) -> Result<()> {
        *self.config.login_call_count.lock().unwrap() += 1;

        if let Some(error) = &self.config.login_error {
            return Err(PlatformError::Authentication(error.clone()).into());
        }

        self.session = Self::login_session(&credentials.username);
        Ok(())
    }

    fn session(&self) -> Session {
        self.session.clone()
    }

    fn set_session(&mut self, session: Session) -> Result<()> {
        self.config
            .applied_sessions
            .lock()
            .unwrap()
            .push(session.clone());
        self.session = session;
        Ok(())
    }

    fn fetch_recent_posts<'a>(&'a self, account: &'a AccountId, count: usize) -> PostStream<'a> {
        *self.config.fetch_call_count.lock().unwrap() += 1;

        if let Some(error) = &self.config.fetch_error {
            let error = PlatformError::Network(error.clone());
            return Box::pin(futures::stream::once(async move {
                Err::<RawPost, MimicastError>(error.into())
            }));
        }

        let posts: Vec<Result<RawPost>> = self
            .config
            .timelines
            .get(account)
            .map(|posts| posts.iter().take(count).cloned().map(Ok).collect())
            .unwrap_or_default();

        Box::pin(futures::stream::iter(posts))
    }

    async fn submit_post(&self, text: &str) -> Result<PostAck> {
        if let Some(error) = &self.config.post_error {
            return Err(PlatformError::Network(error.clone()).into());
        }

        self.config
            .posted_content
            .lock()
            .unwrap()
            .push(text.to_string());

        let id = (self.config.post_status == POST_OK).then(|| {
            format!("mock-{}", self.config.posted_content.lock().unwrap().len())
        });

        Ok(PostAck {
            status: self.config.post_status,
            id,
        })
    }

    async fn resolve_handle(&self, handle: &str) -> Result<AccountId> {
        self.config
            .handles
            .get(handle)
            .cloned()
            .ok_or_else(|| PlatformError::UnknownAccount(handle.to_string()).into())
    }

    async fn current_profile(&self) -> Result<Profile> {
        Ok(self.config.profile.clone())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

//! Transport abstraction and implementations
//!
//! This module provides a unified trait for the social-network client the agent
//! reads from and posts to. The daemon only ever talks to a [`Transport`]; the
//! concrete X client lives in [`x`] and a configurable in-memory double in
//! [`mock`].
//!
//! # Examples
//!
//! ```no_run
//! use libmimicast::platforms::{Transport, x::XClient};
//! use futures::TryStreamExt;
//!
//! # async fn example(credentials: libmimicast::config::Credentials) -> libmimicast::Result<()> {
//! let mut client = XClient::new()?;
//! client.login(&credentials).await?;
//!
//! let id = client.resolve_handle("rustlang").await?;
//! let posts: Vec<_> = client.fetch_recent_posts(&id, 10).try_collect().await?;
//! println!("fetched {} posts", posts.len());
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::Credentials;
use crate::error::Result;
use crate::session::Session;

pub mod mock;
pub mod x;

/// Status code a transport reports for an accepted post
pub const POST_OK: u16 = 200;

/// Stable account identifier assigned by the network
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A post as returned by the network; text may be missing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPost {
    pub id: String,
    pub text: Option<String>,
}

impl RawPost {
    pub fn new(id: impl Into<String>, text: Option<&str>) -> Self {
        Self {
            id: id.into(),
            text: text.map(str::to_string),
        }
    }
}

/// The authenticated account's profile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub id: AccountId,
    pub handle: String,
}

/// Acknowledgment returned when submitting a post
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostAck {
    pub status: u16,
    pub id: Option<String>,
}

impl PostAck {
    pub fn is_ok(&self) -> bool {
        self.status == POST_OK
    }
}

/// Lazy sequence of posts, newest first in provider order
pub type PostStream<'a> = BoxStream<'a, Result<RawPost>>;

/// Transport trait for social-network interactions
///
/// Session-mutating methods take `&mut self`; once authentication is done the
/// client is shared read-only (typically behind an `Arc`).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Log in with the account credentials
    ///
    /// # Errors
    ///
    /// Returns `PlatformError::Authentication` if the network rejects the
    /// credentials or asks for a step that cannot be completed unattended.
    async fn login(&mut self, credentials: &Credentials) -> Result<()>;

    /// Snapshot of the current session, suitable for persisting
    fn session(&self) -> Session;

    /// Replace the current session with a previously persisted one
    ///
    /// No network round-trip is made; an invalid session surfaces on the
    /// first real call.
    fn set_session(&mut self, session: Session) -> Result<()>;

    /// Stream up to `count` of the account's most recent posts
    fn fetch_recent_posts<'a>(&'a self, account: &'a AccountId, count: usize) -> PostStream<'a>;

    /// Submit a post
    ///
    /// Any response the network acknowledges is returned as a [`PostAck`],
    /// including unsuccessful statuses. Only transport failures are errors.
    async fn submit_post(&self, text: &str) -> Result<PostAck>;

    /// Resolve a handle (without `@`) to its account identifier
    ///
    /// # Errors
    ///
    /// Returns `PlatformError::UnknownAccount` if no such handle exists.
    async fn resolve_handle(&self, handle: &str) -> Result<AccountId>;

    /// Profile of the authenticated account
    async fn current_profile(&self) -> Result<Profile>;

    /// Lowercase transport identifier (e.g. "x", "mock")
    fn name(&self) -> &str;
}

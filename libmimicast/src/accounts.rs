//! Account lookup and recent-post corpora
//!
//! [`AccountDirectory`] resolves handles to stable account ids once at startup
//! and pulls the latest posts of an account into a [`Corpus`] every cycle.

use futures::{StreamExt, TryStreamExt};
use std::sync::Arc;

use crate::error::{MimicastError, Result};
use crate::platforms::{AccountId, Transport};

/// A resolved account: stable id plus the handle it was looked up by
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountRef {
    pub id: AccountId,
    pub handle: String,
}

/// Recent post bodies of one account, newest first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Corpus {
    pub handle: String,
    pub posts: Vec<String>,
}

/// Strip surrounding whitespace and one leading `@`
pub fn normalize_handle(handle: &str) -> &str {
    let trimmed = handle.trim();
    trimmed.strip_prefix('@').unwrap_or(trimmed)
}

#[derive(Clone)]
pub struct AccountDirectory {
    transport: Arc<dyn Transport>,
}

impl AccountDirectory {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Resolve a handle, with or without `@`, to its account
    ///
    /// # Errors
    ///
    /// `InvalidInput` for an empty handle, `PlatformError::UnknownAccount`
    /// when the network has no such account.
    pub async fn resolve_handle(&self, handle: &str) -> Result<AccountRef> {
        let handle = normalize_handle(handle);
        if handle.is_empty() {
            return Err(MimicastError::InvalidInput(
                "Account handle cannot be empty".to_string(),
            ));
        }

        let id = self.transport.resolve_handle(handle).await?;
        tracing::debug!(handle, id = %id, "Resolved handle");

        Ok(AccountRef {
            id,
            handle: handle.to_string(),
        })
    }

    /// The authenticated account
    pub async fn me(&self) -> Result<AccountRef> {
        let profile = self.transport.current_profile().await?;
        Ok(AccountRef {
            id: profile.id,
            handle: profile.handle,
        })
    }

    /// Text of up to `count` most recent posts, in provider order
    ///
    /// Posts without text (or with only whitespace) are dropped, so fewer than
    /// `count` bodies may come back.
    pub async fn latest_posts(&self, account: &AccountId, count: usize) -> Result<Vec<String>> {
        if count == 0 {
            return Err(MimicastError::InvalidInput(
                "Post count must be greater than zero".to_string(),
            ));
        }

        let posts: Vec<String> = self
            .transport
            .fetch_recent_posts(account, count)
            .take(count)
            .try_filter_map(|post| async move {
                Ok(post.text.filter(|text| !text.trim().is_empty()))
            })
            .try_collect()
            .await?;

        Ok(posts)
    }

    pub async fn corpus(&self, account: &AccountRef, count: usize) -> Result<Corpus> {
        let posts = self.latest_posts(&account.id, count).await?;
        tracing::debug!(handle = %account.handle, posts = posts.len(), "Fetched corpus");

        Ok(Corpus {
            handle: account.handle.clone(),
            posts,
        })
    }
}

//! Post submission
//!
//! The publisher submits text exactly as given. There is no retry here: a
//! failed post is reported to the loop, which simply tries again next cycle
//! with freshly generated text.

use std::sync::Arc;
use tracing::{info, warn};

use crate::error::Result;
use crate::platforms::{PostAck, Transport};

#[derive(Clone)]
pub struct Publisher {
    transport: Arc<dyn Transport>,
}

impl Publisher {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Submit a post
    ///
    /// Returns `true` when the network acknowledged it with status 200 and
    /// `false` for any other acknowledged status.
    ///
    /// # Errors
    ///
    /// Transport failures (network, parse) are returned as errors.
    pub async fn post(&self, text: &str) -> Result<bool> {
        Ok(self.submit(text).await?.is_ok())
    }

    /// Submit a post and return the full acknowledgment
    pub async fn submit(&self, text: &str) -> Result<PostAck> {
        let ack = self.transport.submit_post(text).await?;

        if ack.is_ok() {
            info!(
                transport = self.transport.name(),
                post_id = ack.id.as_deref().unwrap_or("unknown"),
                "Post accepted"
            );
        } else {
            warn!(
                transport = self.transport.name(),
                status = ack.status,
                "Post rejected"
            );
        }

        Ok(ack)
    }
}

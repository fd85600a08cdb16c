//! Notification channel client interface.

use std::fmt;

use async_trait::async_trait;

use crate::error::SendFailure;
use crate::product::{ChannelId, MessageHandle};

/// Result of editing a previously sent message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOutcome {
    Success,
    /// The channel reports the text is identical; the message still exists.
    Unchanged,
    /// The message was deleted or the handle expired.
    HandleInvalid,
    OtherFailure {
        reason: String,
        /// Timeouts and transport hiccups may succeed on another attempt.
        retryable: bool,
    },
}

impl fmt::Display for EditOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => f.write_str("edited"),
            Self::Unchanged => f.write_str("message not modified"),
            Self::HandleInvalid => f.write_str("message handle invalid"),
            Self::OtherFailure { reason, .. } => write!(f, "edit failed: {reason}"),
        }
    }
}

/// A chat backend able to send and edit messages.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChannelClient: Send + Sync {
    /// Send a new message, returning its handle.
    async fn send(&self, channel: &ChannelId, text: &str) -> Result<MessageHandle, SendFailure>;

    /// Replace the text of an existing message.
    async fn edit(&self, channel: &ChannelId, handle: MessageHandle, text: &str) -> EditOutcome;
}

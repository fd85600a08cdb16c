//! Notification delivery.
//!
//! [`ChannelClient`] abstracts the chat backend; [`NotificationCoordinator`]
//! executes reconciliation actions across every configured channel while
//! isolating per-channel failures.

/// Channel client trait and edit outcomes.
pub mod client;
/// Per-action execution across channels.
pub mod coordinator;
/// Telegram Bot API backend.
pub mod telegram;

pub use client::{ChannelClient, EditOutcome};
pub use coordinator::{Delivery, NotificationCoordinator};
pub use telegram::TelegramClient;

//! Executes [`NotificationAction`]s against the configured channels.
//!
//! The coordinator never writes to the store. It takes the record produced by
//! the reconciler, fills in or prunes message handles according to what the
//! channels reported, and hands the record back to the caller to persist.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::error::SendFailure;
use crate::product::{ChannelId, MessageHandle, ProductKey, ProductRecord};
use crate::reconcile::NotificationAction;
use crate::retry::{self, RetryPolicy};

use super::client::{ChannelClient, EditOutcome};

/// Whether channel calls are made this round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Send and edit messages.
    Notify,
    /// Record state only; used on the first round after start.
    Silent,
}

#[derive(Clone)]
pub struct NotificationCoordinator {
    client: Arc<dyn ChannelClient>,
    channels: Vec<ChannelId>,
    retry: RetryPolicy,
    pacing: Duration,
}

impl std::fmt::Debug for NotificationCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationCoordinator")
            .field("channels", &self.channels)
            .field("retry", &self.retry)
            .field("pacing", &self.pacing)
            .finish_non_exhaustive()
    }
}

impl NotificationCoordinator {
    pub fn new(client: Arc<dyn ChannelClient>, channels: Vec<ChannelId>) -> Self {
        Self {
            client,
            channels,
            retry: RetryPolicy::send(1),
            pacing: Duration::from_secs(1),
        }
    }

    /// Retry budget for transient channel failures.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Pause between successive channel calls within one action.
    #[must_use]
    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    #[must_use]
    pub fn channels(&self) -> &[ChannelId] {
        &self.channels
    }

    /// Run `action` and return the record to persist.
    pub async fn execute(
        &self,
        key: &ProductKey,
        action: &NotificationAction,
        mut record: ProductRecord,
        delivery: Delivery,
    ) -> ProductRecord {
        match (action, delivery) {
            (NotificationAction::None | NotificationAction::MarkGoneNoMessage, _) => record,
            (NotificationAction::SendNew { .. }, Delivery::Silent) => {
                record.message_handles.clear();
                record
            }
            (NotificationAction::EditExisting { .. }, Delivery::Silent) => record,
            (NotificationAction::SendNew { kind, text }, Delivery::Notify) => {
                info!(product = %key, ?kind, "sending notification");
                record.message_handles.clear();
                for (i, channel) in self.channels.iter().enumerate() {
                    self.pace(i).await;
                    if let Some(handle) = self.send_one(key, channel, text).await {
                        record.message_handles.insert(channel.clone(), handle);
                    }
                }
                record
            }
            (NotificationAction::EditExisting { text }, Delivery::Notify) => {
                info!(product = %key, channels = record.message_handles.len(), "editing notification");
                let targets: Vec<(ChannelId, MessageHandle)> = record
                    .message_handles
                    .iter()
                    .map(|(c, h)| (c.clone(), *h))
                    .collect();
                for (i, (channel, handle)) in targets.into_iter().enumerate() {
                    self.pace(i).await;
                    match self.edit_one(&channel, handle, text).await {
                        EditOutcome::Success => {
                            info!(product = %key, %channel, "message edited");
                        }
                        EditOutcome::Unchanged => {
                            info!(product = %key, %channel, "message already up to date");
                        }
                        EditOutcome::HandleInvalid => {
                            warn!(product = %key, %channel, %handle, "message is gone, dropping handle");
                            record.message_handles.remove(&channel);
                        }
                        EditOutcome::OtherFailure { reason, .. } => {
                            error!(product = %key, %channel, %reason, "edit failed, keeping handle");
                        }
                    }
                }
                record
            }
        }
    }

    async fn send_one(&self, key: &ProductKey, channel: &ChannelId, text: &str) -> Option<MessageHandle> {
        let label = format!("send to {channel}");
        let result = retry::with_backoff(self.retry, &label, SendFailure::is_retryable, |_| {
            self.client.send(channel, text)
        })
        .await;

        match result {
            Ok(handle) => {
                info!(product = %key, %channel, %handle, "message sent");
                Some(handle)
            }
            Err(e) => {
                error!(product = %key, %channel, error = %e, "send failed");
                None
            }
        }
    }

    async fn edit_one(&self, channel: &ChannelId, handle: MessageHandle, text: &str) -> EditOutcome {
        let label = format!("edit in {channel}");
        let result = retry::with_backoff(
            self.retry,
            &label,
            |outcome: &EditOutcome| matches!(outcome, EditOutcome::OtherFailure { retryable: true, .. }),
            |_| async move {
                match self.client.edit(channel, handle, text).await {
                    failure @ EditOutcome::OtherFailure { .. } => Err(failure),
                    outcome => Ok(outcome),
                }
            },
        )
        .await;

        result.unwrap_or_else(|failure| failure)
    }

    async fn pace(&self, index: usize) {
        if index > 0 && !self.pacing.is_zero() {
            tokio::time::sleep(self.pacing).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::client::MockChannelClient;
    use crate::reconcile::ListingKind;
    use std::collections::BTreeMap;

    fn key() -> ProductKey {
        ProductKey::new("https://shop.test/cart.php?a=add&pid=1", "MINI")
    }

    fn record(handles: &[(&str, i64)]) -> ProductRecord {
        ProductRecord {
            price_signature: Some("A".to_string()),
            feature_signature: Some("F".to_string()),
            purchase_link: "https://shop.test".to_string(),
            out_of_stock: true,
            message_handles: handles
                .iter()
                .map(|(c, h)| (ChannelId::new(*c), MessageHandle(*h)))
                .collect(),
        }
    }

    fn coordinator(client: MockChannelClient, channels: &[&str]) -> NotificationCoordinator {
        NotificationCoordinator::new(
            Arc::new(client),
            channels.iter().map(|c| ChannelId::new(*c)).collect(),
        )
        .with_pacing(Duration::ZERO)
        .with_retry(RetryPolicy::once())
    }

    fn send_new() -> NotificationAction {
        NotificationAction::SendNew {
            kind: ListingKind::NewListing,
            text: "new".to_string(),
        }
    }

    fn edit() -> NotificationAction {
        NotificationAction::EditExisting {
            text: "gone".to_string(),
        }
    }

    #[tokio::test]
    async fn test_send_new_isolates_channel_failures() {
        let mut client = MockChannelClient::new();
        client
            .expect_send()
            .withf(|channel, _| channel.as_str() == "c1")
            .times(1)
            .returning(|_, _| Err(SendFailure::Rejected { reason: "blocked".to_string() }));
        client
            .expect_send()
            .withf(|channel, _| channel.as_str() == "c2")
            .times(1)
            .returning(|_, _| Ok(MessageHandle(7)));

        let out = coordinator(client, &["c1", "c2"])
            .execute(&key(), &send_new(), record(&[]), Delivery::Notify)
            .await;

        assert_eq!(out.message_handles.len(), 1);
        assert_eq!(out.message_handles.get(&ChannelId::new("c2")), Some(&MessageHandle(7)));
    }

    #[tokio::test]
    async fn test_send_new_silent_makes_no_calls() {
        let mut client = MockChannelClient::new();
        client.expect_send().never();

        let out = coordinator(client, &["c1"])
            .execute(&key(), &send_new(), record(&[("c1", 3)]), Delivery::Silent)
            .await;

        assert!(out.message_handles.is_empty());
    }

    #[tokio::test]
    async fn test_send_retries_timeouts_only() {
        let mut client = MockChannelClient::new();
        let mut calls = 0;
        client
            .expect_send()
            .withf(|channel, _| channel.as_str() == "c1")
            .times(2)
            .returning(move |_, _| {
                calls += 1;
                if calls == 1 {
                    Err(SendFailure::Timeout)
                } else {
                    Ok(MessageHandle(9))
                }
            });
        client
            .expect_send()
            .withf(|channel, _| channel.as_str() == "c2")
            .times(1)
            .returning(|_, _| {
                Err(SendFailure::Rejected {
                    reason: "chat not found".to_string(),
                })
            });

        let coord = coordinator(client, &["c1", "c2"]).with_retry(RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::ZERO,
            step: Duration::ZERO,
        });
        assert_eq!(coord.channels(), [ChannelId::new("c1"), ChannelId::new("c2")]);
        let out = coord.execute(&key(), &send_new(), record(&[]), Delivery::Notify).await;
        assert_eq!(out.message_handles.get(&ChannelId::new("c1")), Some(&MessageHandle(9)));
        assert!(!out.message_handles.contains_key(&ChannelId::new("c2")));
    }

    #[tokio::test]
    async fn test_edit_classifies_outcomes() {
        let mut client = MockChannelClient::new();
        client
            .expect_edit()
            .withf(|channel, _, _| channel.as_str() == "gone")
            .times(1)
            .returning(|_, _, _| EditOutcome::HandleInvalid);
        client
            .expect_edit()
            .withf(|channel, _, _| channel.as_str() == "same")
            .times(1)
            .returning(|_, _, _| EditOutcome::Unchanged);
        client
            .expect_edit()
            .withf(|channel, _, _| channel.as_str() == "flaky")
            .times(1)
            .returning(|_, _, _| EditOutcome::OtherFailure {
                reason: "bad gateway".to_string(),
                retryable: false,
            });
        client.expect_send().never();

        let out = coordinator(client, &["gone", "same", "flaky"])
            .execute(
                &key(),
                &edit(),
                record(&[("gone", 1), ("same", 2), ("flaky", 3)]),
                Delivery::Notify,
            )
            .await;

        let expected: BTreeMap<ChannelId, MessageHandle> = [
            (ChannelId::new("same"), MessageHandle(2)),
            (ChannelId::new("flaky"), MessageHandle(3)),
        ]
        .into_iter()
        .collect();
        assert_eq!(out.message_handles, expected);
    }

    #[tokio::test]
    async fn test_edit_only_touches_channels_with_handles() {
        let mut client = MockChannelClient::new();
        client
            .expect_edit()
            .withf(|channel, handle, text| {
                channel.as_str() == "c2" && *handle == MessageHandle(5) && text == "gone"
            })
            .times(1)
            .returning(|_, _, _| EditOutcome::Success);

        let out = coordinator(client, &["c1", "c2"])
            .execute(&key(), &edit(), record(&[("c2", 5)]), Delivery::Notify)
            .await;
        assert_eq!(out.message_handles.len(), 1);
    }

    #[tokio::test]
    async fn test_mark_gone_makes_no_calls() {
        let mut client = MockChannelClient::new();
        client.expect_send().never();
        client.expect_edit().never();

        let input = record(&[]);
        let out = coordinator(client, &["c1"])
            .execute(&key(), &NotificationAction::MarkGoneNoMessage, input.clone(), Delivery::Notify)
            .await;
        assert_eq!(out, input);
    }

    #[tokio::test]
    async fn test_silent_edit_keeps_handles() {
        let mut client = MockChannelClient::new();
        client.expect_edit().never();

        let out = coordinator(client, &["c1"])
            .execute(&key(), &edit(), record(&[("c1", 4)]), Delivery::Silent)
            .await;
        assert_eq!(out.message_handles.len(), 1);
    }
}

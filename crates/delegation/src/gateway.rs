//! Prefix-routed outbound channel dispatcher (C4).
//!
//! A `userId` of shape `"prefix:identifier"` selects a registered
//! [`ChannelSender`]. Missing prefix or missing sender is reported back in
//! the result rather than raised — callers (the background runner, nudge
//! scheduler) treat delivery failure as data, not an exception. Wire-level
//! transport (actually talking to Discord/Telegram/a webhook) lives outside
//! this crate behind the `ChannelSender` trait; this module only does the
//! routing.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Serialize;

/// How urgently an outbound message should be surfaced to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Urgent,
    Normal,
    Low,
}

/// What produced an outbound message, for the sender's own formatting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    BackgroundTask,
    SubAgent,
    Reminder,
    Pulse,
    System,
    Agent,
}

#[derive(Debug, Clone, Serialize)]
pub struct OutboundMessage {
    pub content: String,
    pub priority: Priority,
    pub source: Source,
}

impl OutboundMessage {
    pub fn new(content: impl Into<String>, priority: Priority, source: Source) -> Self {
        Self {
            content: content.into(),
            priority,
            source,
        }
    }
}

/// A registered outgoing channel. Implementations talk the wire protocol
/// for one transport (Discord, Telegram, a generic webhook, ...); that
/// protocol is out of scope here — only the interface is specified.
#[async_trait]
pub trait ChannelSender: Send + Sync {
    /// Stable name this sender is registered under, e.g. `"discord"`.
    fn name(&self) -> &str;

    /// Deliver one message to `identifier` (the part of the userId after
    /// the `:`). Must not panic or block indefinitely; transport errors are
    /// returned as `Err(String)` and surfaced in [`SendResult::error`].
    async fn send(&self, identifier: &str, message: &OutboundMessage) -> Result<(), String>;

    /// Optional fan-out to every known recipient on this channel. Senders
    /// that don't support it simply don't implement this method; the
    /// gateway skips them in `broadcast` rather than calling a default
    /// no-op, so callers can distinguish "no senders support broadcast"
    /// from "broadcast silently did nothing."
    async fn broadcast(&self, _message: &OutboundMessage) -> Result<(), String> {
        Err("broadcast not supported".into())
    }

    /// Whether this sender implements `broadcast`. Defaults to false;
    /// senders overriding `broadcast` should also override this.
    fn supports_broadcast(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SendResult {
    pub success: bool,
    pub channel: String,
    pub user_id: String,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BroadcastResult {
    pub channel: String,
    pub success: bool,
    pub error: Option<String>,
}

/// Splits a `"prefix:identifier"` userId. Returns `None` when there is no
/// `:` separator at all (an empty identifier after the colon is still a
/// valid, if odd, split — only a missing prefix is a routing failure).
fn split_user_id(user_id: &str) -> Option<(&str, &str)> {
    user_id.split_once(':')
}

/// Registry mapping channel prefix -> sender, plus the routing logic of
/// §4.4. Register is last-write-wins; unregister is idempotent.
pub struct OutboundGateway {
    senders: RwLock<HashMap<String, Arc<dyn ChannelSender>>>,
}

impl Default for OutboundGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl OutboundGateway {
    pub fn new() -> Self {
        Self {
            senders: RwLock::new(HashMap::new()),
        }
    }

    /// Registers `sender` under `sender.name()`. A previous registration
    /// under the same name is replaced.
    pub fn register(&self, sender: Arc<dyn ChannelSender>) {
        self.senders.write().insert(sender.name().to_string(), sender);
    }

    /// Removes the sender registered under `name`, if any. No-op if absent.
    pub fn unregister(&self, name: &str) {
        self.senders.write().remove(name);
    }

    pub fn registered_channels(&self) -> Vec<String> {
        self.senders.read().keys().cloned().collect()
    }

    /// Routes `message` to the sender named by `user_id`'s prefix.
    /// Never fails loudly: a missing prefix or unregistered channel comes
    /// back as `success=false` with a descriptive error.
    pub async fn send(&self, user_id: &str, message: &OutboundMessage) -> SendResult {
        let Some((prefix, _identifier)) = split_user_id(user_id) else {
            return SendResult {
                success: false,
                channel: String::new(),
                user_id: user_id.to_string(),
                error: Some(format!(
                    "userId {user_id:?} has no \"prefix:identifier\" separator"
                )),
            };
        };
        let sender = self.senders.read().get(prefix).cloned();
        let Some(sender) = sender else {
            return SendResult {
                success: false,
                channel: prefix.to_string(),
                user_id: user_id.to_string(),
                error: Some(format!("no channel sender registered for prefix {prefix:?}")),
            };
        };
        let (_, identifier) = split_user_id(user_id).expect("checked above");
        match sender.send(identifier, message).await {
            Ok(()) => SendResult {
                success: true,
                channel: prefix.to_string(),
                user_id: user_id.to_string(),
                error: None,
            },
            Err(e) => SendResult {
                success: false,
                channel: prefix.to_string(),
                user_id: user_id.to_string(),
                error: Some(e),
            },
        }
    }

    /// Broadcasts `message` on every registered sender that advertises
    /// broadcast support. Each sender's outcome is reported independently;
    /// one sender's failure never stops the others.
    pub async fn broadcast(&self, message: &OutboundMessage) -> Vec<BroadcastResult> {
        let senders: Vec<Arc<dyn ChannelSender>> = self
            .senders
            .read()
            .values()
            .filter(|s| s.supports_broadcast())
            .cloned()
            .collect();
        let mut results = Vec::with_capacity(senders.len());
        for sender in senders {
            let outcome = sender.broadcast(message).await;
            results.push(BroadcastResult {
                channel: sender.name().to_string(),
                success: outcome.is_ok(),
                error: outcome.err(),
            });
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as SyncMutex;

    struct RecordingSender {
        name: String,
        sent: Arc<SyncMutex<Vec<String>>>,
        broadcasts: bool,
    }

    #[async_trait]
    impl ChannelSender for RecordingSender {
        fn name(&self) -> &str {
            &self.name
        }

        async fn send(&self, identifier: &str, message: &OutboundMessage) -> Result<(), String> {
            self.sent
                .lock()
                .push(format!("{identifier}:{}", message.content));
            Ok(())
        }

        async fn broadcast(&self, message: &OutboundMessage) -> Result<(), String> {
            if !self.broadcasts {
                return Err("broadcast not supported".into());
            }
            self.sent.lock().push(format!("*:{}", message.content));
            Ok(())
        }

        fn supports_broadcast(&self) -> bool {
            self.broadcasts
        }
    }

    fn msg(s: &str) -> OutboundMessage {
        OutboundMessage::new(s, Priority::Normal, Source::System)
    }

    #[tokio::test]
    async fn send_routes_by_prefix() {
        let gw = OutboundGateway::new();
        let sent = Arc::new(SyncMutex::new(Vec::new()));
        gw.register(Arc::new(RecordingSender {
            name: "discord".into(),
            sent: sent.clone(),
            broadcasts: false,
        }));
        let result = gw.send("discord:12345", &msg("hello")).await;
        assert!(result.success);
        assert_eq!(result.channel, "discord");
        assert_eq!(*sent.lock(), vec!["12345:hello".to_string()]);
    }

    #[tokio::test]
    async fn send_with_no_prefix_fails_without_invoking_any_sender() {
        let gw = OutboundGateway::new();
        let sent = Arc::new(SyncMutex::new(Vec::new()));
        gw.register(Arc::new(RecordingSender {
            name: "discord".into(),
            sent: sent.clone(),
            broadcasts: false,
        }));
        let result = gw.send("noprefix", &msg("hello")).await;
        assert!(!result.success);
        assert!(result.error.is_some());
        assert!(sent.lock().is_empty());
    }

    #[tokio::test]
    async fn send_with_unregistered_prefix_fails() {
        let gw = OutboundGateway::new();
        let result = gw.send("telegram:1", &msg("hi")).await;
        assert!(!result.success);
        assert_eq!(result.channel, "telegram");
    }

    #[tokio::test]
    async fn register_is_last_write_wins() {
        let gw = OutboundGateway::new();
        let sent_a = Arc::new(SyncMutex::new(Vec::new()));
        let sent_b = Arc::new(SyncMutex::new(Vec::new()));
        gw.register(Arc::new(RecordingSender {
            name: "discord".into(),
            sent: sent_a.clone(),
            broadcasts: false,
        }));
        gw.register(Arc::new(RecordingSender {
            name: "discord".into(),
            sent: sent_b.clone(),
            broadcasts: false,
        }));
        let _ = gw.send("discord:1", &msg("x")).await;
        assert!(sent_a.lock().is_empty());
        assert_eq!(sent_b.lock().len(), 1);
    }

    #[tokio::test]
    async fn unregister_is_idempotent() {
        let gw = OutboundGateway::new();
        gw.unregister("discord");
        gw.unregister("discord");
        let result = gw.send("discord:1", &msg("x")).await;
        assert!(!result.success);
    }

    #[tokio::test]
    async fn broadcast_only_invokes_senders_that_advertise_it() {
        let gw = OutboundGateway::new();
        let sent_a = Arc::new(SyncMutex::new(Vec::new()));
        let sent_b = Arc::new(SyncMutex::new(Vec::new()));
        gw.register(Arc::new(RecordingSender {
            name: "discord".into(),
            sent: sent_a.clone(),
            broadcasts: true,
        }));
        gw.register(Arc::new(RecordingSender {
            name: "telegram".into(),
            sent: sent_b.clone(),
            broadcasts: false,
        }));
        let results = gw.broadcast(&msg("announce")).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].channel, "discord");
        assert_eq!(*sent_a.lock(), vec!["*:announce".to_string()]);
        assert!(sent_b.lock().is_empty());
    }

    #[tokio::test]
    async fn each_broadcast_result_is_independent() {
        let gw = OutboundGateway::new();
        struct FailingSender;
        #[async_trait]
        impl ChannelSender for FailingSender {
            fn name(&self) -> &str {
                "failing"
            }
            async fn send(&self, _identifier: &str, _message: &OutboundMessage) -> Result<(), String> {
                Err("nope".into())
            }
            async fn broadcast(&self, _message: &OutboundMessage) -> Result<(), String> {
                Err("broadcast transport down".into())
            }
            fn supports_broadcast(&self) -> bool {
                true
            }
        }
        let sent = Arc::new(SyncMutex::new(Vec::new()));
        gw.register(Arc::new(RecordingSender {
            name: "ok".into(),
            sent: sent.clone(),
            broadcasts: true,
        }));
        gw.register(Arc::new(FailingSender));
        let mut results = gw.broadcast(&msg("go")).await;
        results.sort_by(|a, b| a.channel.cmp(&b.channel));
        assert_eq!(results.len(), 2);
        assert!(!results[0].success); // "failing"
        assert!(results[1].success); // "ok"
    }
}

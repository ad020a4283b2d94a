//! Outbound notification dispatch

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::info;

use crate::models::audit::ActionType;

/// An event emitted toward the notification collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    /// CAPA the event concerns
    pub capa_id: String,

    /// Event type, mirroring the audit action
    pub action: ActionType,

    /// Human-readable message
    pub message: String,

    /// Event-specific payload
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Fire-and-forget notification sink.
///
/// The engine never awaits delivery outcome or retries; implementations must
/// not block the caller on transport work.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: Notification);
}

/// Notifier that only logs. Useful as a default sink.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: Notification) {
        info!(
            "Notification [{}] for CAPA {}: {}",
            notification.action.as_str(),
            notification.capa_id,
            notification.message
        );
    }
}

/// Notifier that forwards events into an unbounded channel.
///
/// The send never blocks; if the receiver is gone the event is dropped,
/// matching the fire-and-forget contract.
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn notify(&self, notification: Notification) {
        let _ = self.tx.send(notification);
    }
}

use std::sync::Arc;

use async_trait::async_trait;

/// Customer-facing messages emitted by the checkout workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    OrderReceived {
        email: String,
        payment_id: String,
        amount_minor: i64,
    },
    PaymentConfirmed {
        email: String,
        payment_id: String,
    },
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: Notification) -> anyhow::Result<()>;
}

/// Writes notifications to the log instead of delivering them.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: Notification) -> anyhow::Result<()> {
        match &notification {
            Notification::OrderReceived {
                email,
                payment_id,
                amount_minor,
            } => tracing::info!(%email, %payment_id, amount_minor, "order received notification"),
            Notification::PaymentConfirmed { email, payment_id } => {
                tracing::info!(%email, %payment_id, "payment confirmed notification")
            }
        }
        Ok(())
    }
}

/// Deliver in the background. Failures are logged and never reach the caller.
pub fn dispatch(notifier: Arc<dyn Notifier>, notification: Notification) {
    tokio::spawn(async move {
        if let Err(err) = notifier.notify(notification).await {
            tracing::warn!(error = %err, "notification failed");
        }
    });
}

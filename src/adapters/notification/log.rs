use crate::ports::notification::{Error, Notification, NotificationPort};

/// Notifier that only records notifications in the trace output
#[derive(Clone, Copy, Debug, Default)]
pub struct LogNotifier;

#[async_trait::async_trait]
impl NotificationPort for LogNotifier {
    async fn notify(&self, notification: Notification) -> Result<(), Error> {
        match notification {
            Notification::BalanceAdjusted {
                member_id,
                admin_id,
                amount,
                new_balance,
            } => tracing::info!(%member_id, %admin_id, amount, new_balance, "balance adjusted"),
            Notification::LowBalance {
                member_id,
                balance,
                threshold,
            } => tracing::info!(%member_id, balance, threshold, "low balance"),
            Notification::TransferReceived {
                sender_id,
                recipient_id,
                amount,
                ..
            } => tracing::info!(%sender_id, %recipient_id, amount, "transfer received"),
        }
        Ok(())
    }
}

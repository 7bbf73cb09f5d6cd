use uuid::Uuid;

/// Fire-and-forget delivery of ledger events
///
/// Notifications are sent after the ledger write has been committed. A failure here never
/// affects the outcome of the ledger operation.
#[mockall::automock]
#[async_trait::async_trait]
pub trait NotificationPort: Send + Sync {
    async fn notify(&self, notification: Notification) -> Result<(), Error>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notification {
    /// An administrator granted or deducted points
    BalanceAdjusted {
        member_id: Uuid,
        admin_id: Uuid,
        amount: i64,
        new_balance: i64,
    },
    /// A balance fell below the configured threshold
    LowBalance {
        member_id: Uuid,
        balance: i64,
        threshold: i64,
    },
    /// Points were received from another member
    TransferReceived {
        sender_id: Uuid,
        recipient_id: Uuid,
        amount: i64,
        message: Option<String>,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Concrete adapter errors
    #[error("adapter error: {0:?}")]
    Adapter(Box<dyn std::error::Error + Send + Sync>),
}

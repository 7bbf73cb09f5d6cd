use tokio::sync::mpsc;

use crate::ports::notification::{Error, Notification, NotificationPort};

/// Forwards notifications to a tokio channel
///
/// The receiving side is typically a delivery worker (push, e-mail) owned by the application.
#[derive(Clone, Debug)]
pub struct ChannelNotifier {
    sender: mpsc::UnboundedSender<Notification>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("notification channel closed")]
pub struct ChannelClosed;

#[async_trait::async_trait]
impl NotificationPort for ChannelNotifier {
    async fn notify(&self, notification: Notification) -> Result<(), Error> {
        self.sender
            .send(notification)
            .map_err(|_| Error::Adapter(Box::new(ChannelClosed)))
    }
}

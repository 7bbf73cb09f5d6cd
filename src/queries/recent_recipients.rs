use std::task::{Context, Poll};

use tower::Service;
use tracing::Instrument;
use uuid::Uuid;

use crate::{
    commands::{find_member, DomainLogic, Error, ServiceFuture},
    domain::RecentRecipient,
    ports::{
        database::DatabasePort, member::MemberPort, notification::NotificationPort,
        points_config::PointsConfigPort,
    },
};

/// Members a sender transferred points to, most recent first
#[derive(Clone, Debug)]
pub struct RecentRecipientsRequest {
    pub sender_id: Uuid,
    /// Defaults to the configured directory limit
    pub limit: Option<usize>,
    /// Case-insensitive filter on display names
    pub search: Option<String>,
}

impl RecentRecipientsRequest {
    pub fn new(sender_id: Uuid) -> Self {
        Self {
            sender_id,
            limit: None,
            search: None,
        }
    }
}

impl<D, M, N, C> Service<RecentRecipientsRequest> for DomainLogic<D, M, N, C>
where
    D: DatabasePort + 'static,
    M: MemberPort + 'static,
    N: NotificationPort + 'static,
    C: PointsConfigPort + 'static,
{
    type Response = Vec<RecentRecipient>;
    type Error = Error;
    type Future = ServiceFuture<Vec<RecentRecipient>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: RecentRecipientsRequest) -> Self::Future {
        let database = self.database.clone();
        let member = self.member.clone();
        let config = self.config.clone();
        let span = tracing::debug_span!("recent_recipients", sender_id = %req.sender_id);
        Box::pin(
            async move {
                let limit = req.limit.unwrap_or(config.directory.default_limit);
                let search = req
                    .search
                    .map(|s| s.trim().to_lowercase())
                    .filter(|s| !s.is_empty());

                // Names only exist in the member directory, so a search has to resolve every
                // entry before the limit applies
                let fetch = if search.is_some() { None } else { Some(limit) };
                let entries = database.recent_recipients(req.sender_id, fetch).await?;

                let mut recipients = Vec::with_capacity(entries.len().min(limit));
                for entry in entries {
                    if recipients.len() >= limit {
                        break;
                    }
                    let resolved = find_member(member.as_ref(), entry.recipient_id).await?;
                    let known = resolved.is_some();
                    let display_name = resolved
                        .map(|m| m.display_name)
                        .unwrap_or_else(|| config.directory.unknown_member_name.clone());

                    if let Some(search) = &search {
                        if !display_name.to_lowercase().contains(search.as_str()) {
                            continue;
                        }
                    }
                    recipients.push(RecentRecipient {
                        recipient_id: entry.recipient_id,
                        display_name,
                        known,
                        transfer_count: entry.transfer_count,
                        last_transfer_at: entry.last_transfer_at,
                    });
                }

                tracing::debug!(count = recipients.len(), "recent recipients resolved");
                Ok(recipients)
            }
            .instrument(span),
        )
    }
}

use std::task::{Context, Poll};

use tower::Service;
use tracing::Instrument;
use uuid::Uuid;

use crate::{
    domain::{Posting, Transaction, TransactionSource},
    ports::{
        database::DatabasePort, member::MemberPort, notification::NotificationPort,
        points_config::PointsConfigPort,
    },
};

use super::{commit_posting, ensure_positive, DomainLogic, Error, ServiceFuture};

/// Remove points from a member's balance
///
/// The member must already have a balance, and it must cover the whole amount.
#[derive(Clone, Debug)]
pub struct DebitRequest {
    pub member_id: Uuid,
    /// Number of points to remove, as a positive number
    pub amount: i64,
    pub source: TransactionSource,
    pub description: Option<String>,
    pub source_id: Option<String>,
}

impl DebitRequest {
    pub fn new(member_id: Uuid, amount: i64, source: TransactionSource) -> Self {
        Self {
            member_id,
            amount,
            source,
            description: None,
            source_id: None,
        }
    }
}

impl<D, M, N, C> Service<DebitRequest> for DomainLogic<D, M, N, C>
where
    D: DatabasePort + 'static,
    M: MemberPort + 'static,
    N: NotificationPort + 'static,
    C: PointsConfigPort + 'static,
{
    type Response = Transaction;
    type Error = Error;
    type Future = ServiceFuture<Transaction>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: DebitRequest) -> Self::Future {
        let database = self.database.clone();
        let span = tracing::info_span!("debit", member_id = %req.member_id, amount = req.amount);
        Box::pin(
            async move {
                ensure_positive(req.amount)?;

                // Balance existence and sufficiency are checked inside the unit of work
                let posting = Posting::debit(req.member_id, req.amount, req.source)
                    .with_description(req.description)
                    .with_source_id(req.source_id);
                let (transaction, _) = commit_posting(database.as_ref(), posting).await?;

                Ok(transaction)
            }
            .instrument(span),
        )
    }
}

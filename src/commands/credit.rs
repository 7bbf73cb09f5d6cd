use std::task::{Context, Poll};

use tower::Service;
use tracing::Instrument;
use uuid::Uuid;

use crate::{
    domain::{Metadata, Posting, Transaction, TransactionSource},
    ports::{
        database::DatabasePort, member::MemberPort, notification::NotificationPort,
        points_config::PointsConfigPort,
    },
};

use super::{commit_posting, ensure_positive, DomainLogic, Error, ServiceFuture};

/// Add points to a member's balance
///
/// The balance is created if this is the first transaction of the member.
#[derive(Clone, Debug)]
pub struct CreditRequest {
    pub member_id: Uuid,
    pub amount: i64,
    pub source: TransactionSource,
    pub description: Option<String>,
    pub source_id: Option<String>,
    pub metadata: Metadata,
}

impl CreditRequest {
    pub fn new(member_id: Uuid, amount: i64, source: TransactionSource) -> Self {
        Self {
            member_id,
            amount,
            source,
            description: None,
            source_id: None,
            metadata: Metadata::new(),
        }
    }
}

impl<D, M, N, C> Service<CreditRequest> for DomainLogic<D, M, N, C>
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

    fn call(&mut self, req: CreditRequest) -> Self::Future {
        let database = self.database.clone();
        let span = tracing::info_span!("credit", member_id = %req.member_id, amount = req.amount);
        Box::pin(
            async move {
                ensure_positive(req.amount)?;

                let posting = Posting::credit(req.member_id, req.amount, req.source)
                    .with_description(req.description)
                    .with_source_id(req.source_id)
                    .with_metadata(req.metadata);
                let (transaction, _) = commit_posting(database.as_ref(), posting).await?;

                Ok(transaction)
            }
            .instrument(span),
        )
    }
}

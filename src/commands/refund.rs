use std::task::{Context, Poll};

use tower::Service;
use tracing::Instrument;
use uuid::Uuid;

use crate::{
    domain::{MissingBalance, Posting, Transaction, TransactionSource},
    ports::{
        database::DatabasePort, member::MemberPort, notification::NotificationPort,
        points_config::PointsConfigPort,
    },
};

use super::{commit_posting, DomainLogic, Error, ServiceFuture};

/// Reverse a previous transaction
///
/// The original transaction is left untouched. A new transaction with the opposite amount is
/// appended, pointing back to it through `reversal_of`.
///
/// Transfer legs cannot be refunded: reversing one side alone would create or destroy points.
#[derive(Clone, Debug)]
pub struct RefundRequest {
    pub admin_id: Uuid,
    pub transaction_id: Uuid,
    pub reason: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RefundResponse {
    /// The reversal transaction
    pub transaction: Transaction,
    pub new_balance: i64,
}

/// Posting that cancels out `original`
fn reversal_posting(original: &Transaction, admin_id: Uuid, reason: String) -> Posting {
    let (member_id, amount) = (original.member_id, original.amount);
    let posting = if amount < 0 {
        Posting::credit(member_id, -amount, TransactionSource::Refund)
    } else {
        Posting::debit(member_id, amount, TransactionSource::Refund)
    };

    posting
        .on_missing_balance(MissingBalance::Reject)
        .reversing(original.id)
        .with_source_id(original.source_id.clone())
        .with_entry("admin_id", admin_id)
        .with_entry("original_source", original.source)
        .with_entry("reason", &reason)
        .with_description(Some(format!("Refund: {reason}")))
}

impl<D, M, N, C> Service<RefundRequest> for DomainLogic<D, M, N, C>
where
    D: DatabasePort + 'static,
    M: MemberPort + 'static,
    N: NotificationPort + 'static,
    C: PointsConfigPort + 'static,
{
    type Response = RefundResponse;
    type Error = Error;
    type Future = ServiceFuture<RefundResponse>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: RefundRequest) -> Self::Future {
        let database = self.database.clone();
        let span = tracing::info_span!(
            "refund",
            admin_id = %req.admin_id,
            transaction_id = %req.transaction_id
        );
        Box::pin(
            async move {
                let original = database
                    .get_transaction(req.transaction_id)
                    .await?
                    .ok_or(Error::TransactionNotFound(req.transaction_id))?;
                if matches!(
                    original.source,
                    TransactionSource::TransferIn | TransactionSource::TransferOut
                ) {
                    return Err(Error::NotRefundable(original.id));
                }

                // "Already refunded" and balance sufficiency are both checked inside the unit
                // of work, so two concurrent refunds cannot both succeed
                let posting = reversal_posting(&original, req.admin_id, req.reason);
                let (transaction, balance) = commit_posting(database.as_ref(), posting).await?;

                Ok(RefundResponse {
                    transaction,
                    new_balance: balance.balance,
                })
            }
            .instrument(span),
        )
    }
}

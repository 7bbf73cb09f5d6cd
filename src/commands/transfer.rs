use std::task::{Context, Poll};

use tower::Service;
use tracing::Instrument;
use uuid::Uuid;

use crate::{
    domain::{DirectoryUpdate, MissingBalance, Posting, TransactionSource, UnitOfWork},
    ports::{
        database::DatabasePort, member::MemberPort, notification::Notification,
        notification::NotificationPort, points_config::PointsConfigPort,
    },
};

use super::{dispatch, ensure_positive, find_member, DomainLogic, Error, ServiceFuture};

/// Send points from one member to another
#[derive(Clone, Debug)]
pub struct TransferRequest {
    pub sender_id: Uuid,
    pub recipient_id: Uuid,
    pub amount: i64,
    pub message: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransferResponse {
    /// Id of the sender's transfer-out transaction
    pub transaction_id: Uuid,
    /// Id of the recipient's transfer-in transaction
    pub recipient_transaction_id: Uuid,
    pub amount: i64,
    /// Sender balance after the transfer
    pub sender_balance: i64,
}

impl<D, M, N, C> Service<TransferRequest> for DomainLogic<D, M, N, C>
where
    D: DatabasePort + 'static,
    M: MemberPort + 'static,
    N: NotificationPort + 'static,
    C: PointsConfigPort + 'static,
{
    type Response = TransferResponse;
    type Error = Error;
    type Future = ServiceFuture<TransferResponse>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: TransferRequest) -> Self::Future {
        let database = self.database.clone();
        let member = self.member.clone();
        let notification = self.notification.clone();
        let config = self.config.clone();
        let span = tracing::info_span!(
            "transfer",
            sender_id = %req.sender_id,
            recipient_id = %req.recipient_id,
            amount = req.amount
        );
        Box::pin(
            async move {
                ensure_positive(req.amount)?;
                if req.sender_id == req.recipient_id {
                    return Err(Error::SelfTransfer);
                }

                let recipient = find_member(member.as_ref(), req.recipient_id)
                    .await?
                    .filter(|recipient| recipient.active_member)
                    .ok_or(Error::RecipientNotFound(req.recipient_id))?;
                let sender_name = find_member(member.as_ref(), req.sender_id)
                    .await?
                    .map(|sender| sender.display_name)
                    .unwrap_or_else(|| config.directory.unknown_member_name.clone());

                // A sender without a balance is treated as a zero balance, which fails the
                // sufficiency check inside the unit of work
                let mut debit =
                    Posting::debit(req.sender_id, req.amount, TransactionSource::TransferOut)
                        .on_missing_balance(MissingBalance::Create)
                        .with_description(Some(format!("Transfer to {}", recipient.display_name)))
                        .with_entry("recipient_id", req.recipient_id)
                        .with_entry("recipient_name", &recipient.display_name);
                let mut credit =
                    Posting::credit(req.recipient_id, req.amount, TransactionSource::TransferIn)
                        .with_description(Some(format!("Transfer from {sender_name}")))
                        .with_entry("sender_id", req.sender_id)
                        .with_entry("sender_name", &sender_name);
                if let Some(message) = &req.message {
                    debit = debit.with_entry("message", message);
                    credit = credit.with_entry("message", message);
                }

                let committed = database
                    .commit(UnitOfWork {
                        postings: vec![debit, credit],
                        directory: Some(DirectoryUpdate {
                            sender_id: req.sender_id,
                            recipient_id: req.recipient_id,
                        }),
                    })
                    .await?;

                let (out, into) = match committed.transactions.as_slice() {
                    [out, into] => (out, into),
                    _ => {
                        return Err(Error::Database(crate::ports::database::Error::Adapter(
                            "transfer commit returned an unexpected number of transactions".into(),
                        )))
                    }
                };
                tracing::info!(
                    transaction_id = %out.id,
                    recipient_transaction_id = %into.id,
                    sender_balance = out.balance_after,
                    "transfer committed"
                );

                dispatch(
                    &notification,
                    vec![Notification::TransferReceived {
                        sender_id: req.sender_id,
                        recipient_id: req.recipient_id,
                        amount: req.amount,
                        message: req.message,
                    }],
                );

                Ok(TransferResponse {
                    transaction_id: out.id,
                    recipient_transaction_id: into.id,
                    amount: req.amount,
                    sender_balance: out.balance_after,
                })
            }
            .instrument(span),
        )
    }
}

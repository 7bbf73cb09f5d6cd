//! Administrative point adjustments

use std::task::{Context, Poll};

use tower::Service;
use tracing::Instrument;
use uuid::Uuid;

use crate::{
    domain::{Posting, Transaction, TransactionSource},
    ports::{
        database::DatabasePort,
        member::MemberPort,
        notification::{Notification, NotificationPort},
        points_config::PointsConfigPort,
    },
};

use super::{commit_posting, dispatch, ensure_positive, DomainLogic, Error, ServiceFuture};

#[derive(Clone, Debug)]
pub struct AdminGrantRequest {
    pub admin_id: Uuid,
    pub member_id: Uuid,
    pub amount: i64,
    pub reason: String,
}

#[derive(Clone, Debug)]
pub struct AdminDeductRequest {
    pub admin_id: Uuid,
    pub member_id: Uuid,
    /// Number of points to remove, as a positive number
    pub amount: i64,
    pub reason: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AdjustmentResponse {
    pub transaction: Transaction,
    pub new_balance: i64,
}

pub type GrantResponse = AdjustmentResponse;
pub type DeductResponse = AdjustmentResponse;

/// Notifications that follow an adjustment of `amount` (signed) landing on `new_balance`
fn adjustment_notifications(
    admin_id: Uuid,
    member_id: Uuid,
    amount: i64,
    new_balance: i64,
    threshold: i64,
) -> Vec<Notification> {
    let mut notifications = vec![Notification::BalanceAdjusted {
        member_id,
        admin_id,
        amount,
        new_balance,
    }];
    let previous = new_balance - amount;
    if previous >= threshold && new_balance < threshold {
        notifications.push(Notification::LowBalance {
            member_id,
            balance: new_balance,
            threshold,
        });
    }
    notifications
}

fn admin_posting(posting: Posting, admin_id: Uuid, reason: String) -> Posting {
    posting
        .with_entry("admin_id", admin_id)
        .with_entry("reason", &reason)
        .with_description(Some(reason))
}

impl<D, M, N, C> Service<AdminGrantRequest> for DomainLogic<D, M, N, C>
where
    D: DatabasePort + 'static,
    M: MemberPort + 'static,
    N: NotificationPort + 'static,
    C: PointsConfigPort + 'static,
{
    type Response = GrantResponse;
    type Error = Error;
    type Future = ServiceFuture<GrantResponse>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: AdminGrantRequest) -> Self::Future {
        let database = self.database.clone();
        let member = self.member.clone();
        let notification = self.notification.clone();
        let threshold = self.config.low_balance_threshold;
        let span = tracing::info_span!(
            "admin_grant",
            admin_id = %req.admin_id,
            member_id = %req.member_id,
            amount = req.amount
        );
        Box::pin(
            async move {
                ensure_positive(req.amount)?;
                member.get_member(req.member_id).await?;

                let posting = admin_posting(
                    Posting::credit(req.member_id, req.amount, TransactionSource::AdminCredit),
                    req.admin_id,
                    req.reason,
                );
                let (transaction, balance) = commit_posting(database.as_ref(), posting).await?;

                dispatch(
                    &notification,
                    adjustment_notifications(
                        req.admin_id,
                        req.member_id,
                        transaction.amount,
                        balance.balance,
                        threshold,
                    ),
                );

                Ok(AdjustmentResponse {
                    transaction,
                    new_balance: balance.balance,
                })
            }
            .instrument(span),
        )
    }
}

impl<D, M, N, C> Service<AdminDeductRequest> for DomainLogic<D, M, N, C>
where
    D: DatabasePort + 'static,
    M: MemberPort + 'static,
    N: NotificationPort + 'static,
    C: PointsConfigPort + 'static,
{
    type Response = DeductResponse;
    type Error = Error;
    type Future = ServiceFuture<DeductResponse>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: AdminDeductRequest) -> Self::Future {
        let database = self.database.clone();
        let member = self.member.clone();
        let notification = self.notification.clone();
        let threshold = self.config.low_balance_threshold;
        let span = tracing::info_span!(
            "admin_deduct",
            admin_id = %req.admin_id,
            member_id = %req.member_id,
            amount = req.amount
        );
        Box::pin(
            async move {
                ensure_positive(req.amount)?;
                member.get_member(req.member_id).await?;

                let posting = admin_posting(
                    Posting::debit(req.member_id, req.amount, TransactionSource::AdminDebit),
                    req.admin_id,
                    req.reason,
                );
                let (transaction, balance) = commit_posting(database.as_ref(), posting).await?;

                dispatch(
                    &notification,
                    adjustment_notifications(
                        req.admin_id,
                        req.member_id,
                        transaction.amount,
                        balance.balance,
                        threshold,
                    ),
                );

                Ok(AdjustmentResponse {
                    transaction,
                    new_balance: balance.balance,
                })
            }
            .instrument(span),
        )
    }
}

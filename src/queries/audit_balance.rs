use std::task::{Context, Poll};

use tower::Service;
use tracing::Instrument;
use uuid::Uuid;

use crate::{
    commands::{DomainLogic, Error, ServiceFuture},
    domain::TimeWindow,
    ports::{
        database::DatabasePort, member::MemberPort, notification::NotificationPort,
        points_config::PointsConfigPort,
    },
    reporting::{audit, BalanceAudit},
};

/// Replay a member's transaction log against their stored balance
#[derive(Clone, Copy, Debug)]
pub struct AuditBalanceRequest {
    pub member_id: Uuid,
}

impl<D, M, N, C> Service<AuditBalanceRequest> for DomainLogic<D, M, N, C>
where
    D: DatabasePort + 'static,
    M: MemberPort + 'static,
    N: NotificationPort + 'static,
    C: PointsConfigPort + 'static,
{
    type Response = BalanceAudit;
    type Error = Error;
    type Future = ServiceFuture<BalanceAudit>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: AuditBalanceRequest) -> Self::Future {
        let database = self.database.clone();
        let span = tracing::info_span!("audit_balance", member_id = %req.member_id);
        Box::pin(
            async move {
                let cached = database
                    .find_balance(req.member_id)
                    .await?
                    .ok_or(Error::BalanceNotFound(req.member_id))?;
                let transactions = database
                    .transactions_in(Some(req.member_id), TimeWindow::unbounded())
                    .await?;

                let audit = audit(cached, &transactions);
                if audit.is_consistent() {
                    tracing::info!(transactions = audit.transaction_count, "balance is consistent");
                } else {
                    tracing::warn!(
                        cached = audit.cached.balance,
                        replayed = audit.replayed.balance,
                        first_mismatch = ?audit.first_mismatch,
                        "balance does not match its transaction log"
                    );
                }
                Ok(audit)
            }
            .instrument(span),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{
        debit::DebitRequest, refund::RefundRequest, test_utils::Harness,
        transfer::TransferRequest,
    };
    use crate::domain::TransactionSource;
    use speculoos::prelude::*;
    use tower::{BoxError, ServiceExt};

    #[tokio::test]
    async fn test_consistent() -> Result<(), BoxError> {
        // GIVEN a member with credits, debits, a transfer and a refund
        let harness = Harness::new();
        let member_id = harness.funded_member("Ana", 1000).await;
        let friend = harness.member("Bruno");
        let purchase = harness
            .logic
            .clone()
            .oneshot(DebitRequest::new(
                member_id,
                120,
                TransactionSource::StorePurchase,
            ))
            .await?;
        harness
            .logic
            .clone()
            .oneshot(TransferRequest {
                sender_id: member_id,
                recipient_id: friend,
                amount: 80,
                message: None,
            })
            .await?;
        harness
            .logic
            .clone()
            .oneshot(RefundRequest {
                admin_id: Uuid::new_v4(),
                transaction_id: purchase.id,
                reason: "Damaged".to_string(),
            })
            .await?;

        // WHEN auditing the member
        let res = harness
            .logic
            .clone()
            .oneshot(AuditBalanceRequest { member_id })
            .await?;

        // THEN the replay matches the stored balance
        assert_that!(res.is_consistent()).is_true();
        assert_that!(res.transaction_count).is_equal_to(4);
        assert_that!(res.replayed.balance).is_equal_to(920);
        assert_that!(res.replayed.lifetime_earned).is_equal_to(1120);
        assert_that!(res.replayed.lifetime_spent).is_equal_to(200);

        Ok(())
    }

    #[tokio::test]
    async fn test_no_balance() {
        let harness = Harness::new();
        let member_id = harness.member("Ana");

        let res = harness
            .logic
            .clone()
            .oneshot(AuditBalanceRequest { member_id })
            .await;

        assert_that!(res)
            .is_err()
            .matches(|err| matches!(err, Error::BalanceNotFound(_)));
    }
}

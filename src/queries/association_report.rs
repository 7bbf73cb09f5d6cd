use std::{
    collections::HashMap,
    task::{Context, Poll},
};

use tower::Service;
use tracing::Instrument;
use uuid::Uuid;

use crate::{
    commands::{find_member, DomainLogic, Error, ServiceFuture},
    domain::TimeWindow,
    ports::{
        database::DatabasePort, member::MemberPort, notification::NotificationPort,
        points_config::PointsConfigPort,
    },
    reporting::{association_report, AssociationReport},
};

/// Activity of one association's members over a time window, for administrators
///
/// Members are attributed to an association through the member directory. Balances and
/// transactions of members the directory does not know are left out.
#[derive(Clone, Copy, Debug)]
pub struct AssociationReportRequest {
    pub association_id: Uuid,
    pub window: TimeWindow,
}

impl<D, M, N, C> Service<AssociationReportRequest> for DomainLogic<D, M, N, C>
where
    D: DatabasePort + 'static,
    M: MemberPort + 'static,
    N: NotificationPort + 'static,
    C: PointsConfigPort + 'static,
{
    type Response = AssociationReport;
    type Error = Error;
    type Future = ServiceFuture<AssociationReport>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: AssociationReportRequest) -> Self::Future {
        let database = self.database.clone();
        let member = self.member.clone();
        let span = tracing::debug_span!(
            "association_report",
            association_id = %req.association_id,
            from = ?req.window.from,
            to = ?req.window.to
        );
        Box::pin(
            async move {
                let mut transactions = database.transactions_in(None, req.window).await?;
                let mut balances = database.list_balances().await?;

                let mut in_association: HashMap<Uuid, bool> = HashMap::new();
                let member_ids = balances
                    .iter()
                    .map(|b| b.member_id)
                    .chain(transactions.iter().map(|t| t.member_id))
                    .collect::<Vec<_>>();
                for member_id in member_ids {
                    if in_association.contains_key(&member_id) {
                        continue;
                    }
                    let belongs = find_member(member.as_ref(), member_id)
                        .await?
                        .is_some_and(|m| m.association_id == req.association_id);
                    in_association.insert(member_id, belongs);
                }
                transactions.retain(|t| in_association.get(&t.member_id) == Some(&true));
                balances.retain(|b| in_association.get(&b.member_id) == Some(&true));

                let report = association_report(req.window, &transactions, &balances);
                tracing::debug!(
                    transactions = transactions.len(),
                    points_in_circulation = report.points_in_circulation,
                    "association report computed"
                );
                Ok(report)
            }
            .instrument(span),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        commands::{
            admin::AdminDeductRequest, credit::CreditRequest, test_utils::Harness,
            transfer::TransferRequest,
        },
        domain::TransactionSource,
        ports::member::Member,
    };
    use chrono::{Duration, Utc};
    use speculoos::prelude::*;
    use tower::{BoxError, ServiceExt};

    #[tokio::test]
    async fn test_report() -> Result<(), BoxError> {
        // GIVEN
        // * two funded members and one without a balance
        // * a transfer between the funded members
        // * an admin deduction
        let harness = Harness::new();
        let ana = harness.funded_member("Ana", 500).await;
        let bruno = harness.funded_member("Bruno", 300).await;
        let carla = harness.member("Carla");
        harness
            .logic
            .clone()
            .oneshot(TransferRequest {
                sender_id: ana,
                recipient_id: carla,
                amount: 200,
                message: None,
            })
            .await?;
        harness
            .logic
            .clone()
            .oneshot(AdminDeductRequest {
                admin_id: Uuid::new_v4(),
                member_id: bruno,
                amount: 100,
                reason: "Duplicate check-in".to_string(),
            })
            .await?;

        // WHEN computing the report over the last hour
        let now = Utc::now();
        let res = harness
            .logic
            .clone()
            .oneshot(AssociationReportRequest {
                association_id: harness.association_id,
                window: TimeWindow::between(now - Duration::hours(1), now + Duration::seconds(1)),
            })
            .await?;

        // THEN
        // * transfers move points without changing the circulation
        // * the deduction removes points from circulation
        assert_that!(res.points_in_circulation).is_equal_to(700);
        assert_that!(res.member_balances).is_equal_to(3);
        assert_that!(res.active_members).is_equal_to(3);
        assert_that!(res.activity.earned).is_equal_to(1000);
        assert_that!(res.activity.spent).is_equal_to(300);
        assert_that!(res.lifetime_earned - res.lifetime_spent)
            .is_equal_to(res.points_in_circulation);
        let admin_debits = res.activity.by_source.get(&TransactionSource::AdminDebit);
        assert_that!(admin_debits.map(|t| t.count)).is_equal_to(Some(1));

        Ok(())
    }

    #[tokio::test]
    async fn test_window_excludes_older_activity() -> Result<(), BoxError> {
        let harness = Harness::new();
        harness.funded_member("Ana", 500).await;

        let res = harness
            .logic
            .clone()
            .oneshot(AssociationReportRequest {
                association_id: harness.association_id,
                window: TimeWindow::between(
                    Utc::now() - Duration::days(2),
                    Utc::now() - Duration::days(1),
                ),
            })
            .await?;

        assert_that!(res.activity.earned).is_equal_to(0);
        assert_that!(res.active_members).is_equal_to(0);
        // Circulation is a snapshot, not bound to the window
        assert_that!(res.points_in_circulation).is_equal_to(500);

        Ok(())
    }

    #[tokio::test]
    async fn test_other_associations_are_excluded() -> Result<(), BoxError> {
        // GIVEN
        // * a funded member of the harness association
        // * a funded member of another association
        // * a balance for a member the directory does not know
        let harness = Harness::new();
        harness.funded_member("Ana", 100).await;
        let other_association = Uuid::new_v4();
        let outsider = Uuid::new_v4();
        harness.members.insert(Member {
            member_id: outsider,
            association_id: other_association,
            display_name: "Bruno".to_string(),
            active_member: true,
        });
        harness
            .logic
            .clone()
            .oneshot(CreditRequest::new(
                outsider,
                5000,
                TransactionSource::AdminCredit,
            ))
            .await?;
        harness
            .logic
            .clone()
            .oneshot(CreditRequest::new(
                Uuid::new_v4(),
                40,
                TransactionSource::AdminCredit,
            ))
            .await?;

        // WHEN reporting on each association
        let ours = harness
            .logic
            .clone()
            .oneshot(AssociationReportRequest {
                association_id: harness.association_id,
                window: TimeWindow::unbounded(),
            })
            .await?;
        let theirs = harness
            .logic
            .clone()
            .oneshot(AssociationReportRequest {
                association_id: other_association,
                window: TimeWindow::unbounded(),
            })
            .await?;

        // THEN each report only counts its own members
        assert_that!(ours.points_in_circulation).is_equal_to(100);
        assert_that!(ours.member_balances).is_equal_to(1);
        assert_that!(ours.activity.earned).is_equal_to(100);
        assert_that!(theirs.points_in_circulation).is_equal_to(5000);
        assert_that!(theirs.member_balances).is_equal_to(1);
        assert_that!(theirs.active_members).is_equal_to(1);

        Ok(())
    }
}

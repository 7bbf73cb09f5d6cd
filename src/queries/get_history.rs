use std::task::{Context, Poll};

use tower::Service;
use tracing::Instrument;
use uuid::Uuid;

use crate::{
    commands::{DomainLogic, Error, ServiceFuture},
    domain::{HistoryFilter, Page, PageRequest, Transaction},
    ports::{
        database::DatabasePort, member::MemberPort, notification::NotificationPort,
        points_config::PointsConfigPort,
    },
};

/// Page through a member's transactions, most recent first
#[derive(Clone, Debug, Default)]
pub struct GetHistoryRequest {
    pub member_id: Uuid,
    pub filter: HistoryFilter,
    /// 1-based page number, defaults to the first page
    pub page: Option<u32>,
    /// Defaults to the configured page size, capped to the configured maximum
    pub per_page: Option<u32>,
}

impl GetHistoryRequest {
    pub fn new(member_id: Uuid) -> Self {
        Self {
            member_id,
            ..Default::default()
        }
    }
}

impl<D, M, N, C> Service<GetHistoryRequest> for DomainLogic<D, M, N, C>
where
    D: DatabasePort + 'static,
    M: MemberPort + 'static,
    N: NotificationPort + 'static,
    C: PointsConfigPort + 'static,
{
    type Response = Page<Transaction>;
    type Error = Error;
    type Future = ServiceFuture<Page<Transaction>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: GetHistoryRequest) -> Self::Future {
        let database = self.database.clone();
        let page = PageRequest::new(req.page.unwrap_or(1), self.config.per_page(req.per_page));
        let span = tracing::debug_span!(
            "get_history",
            member_id = %req.member_id,
            page = page.page,
            per_page = page.per_page
        );
        Box::pin(
            async move {
                let res = database
                    .list_transactions(req.member_id, &req.filter, page)
                    .await?;
                tracing::debug!(
                    total_count = res.total_count,
                    returned = res.items.len(),
                    "history loaded"
                );
                Ok(res)
            }
            .instrument(span),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        commands::{debit::DebitRequest, test_utils::Harness},
        domain::{Direction, TransactionSource},
    };
    use rstest::*;
    use speculoos::prelude::*;
    use tower::{BoxError, ServiceExt};

    /// Member with one 1000 points grant followed by five purchases of 10 to 50 points
    async fn member_with_purchases(harness: &Harness) -> Result<Uuid, BoxError> {
        let member_id = harness.funded_member("Ana", 1000).await;
        for amount in [10, 20, 30, 40, 50] {
            harness
                .logic
                .clone()
                .oneshot(DebitRequest::new(
                    member_id,
                    amount,
                    TransactionSource::StorePurchase,
                ))
                .await?;
        }
        Ok(member_id)
    }

    #[tokio::test]
    async fn test_most_recent_first() -> Result<(), BoxError> {
        let harness = Harness::new();
        let member_id = member_with_purchases(&harness).await?;

        let res = harness
            .logic
            .clone()
            .oneshot(GetHistoryRequest::new(member_id))
            .await?;

        assert_that!(res.total_count).is_equal_to(6);
        assert_that!(res.total_pages).is_equal_to(1);
        let amounts: Vec<i64> = res.items.iter().map(|t| t.amount).collect();
        assert_that!(amounts).is_equal_to(vec![-50, -40, -30, -20, -10, 1000]);

        Ok(())
    }

    #[rstest]
    #[case(1, vec![-50, -40])]
    #[case(2, vec![-30, -20])]
    #[case(3, vec![-10, 1000])]
    #[case(4, vec![])]
    #[tokio::test]
    async fn test_pagination(
        #[case] page: u32,
        #[case] expected: Vec<i64>,
    ) -> Result<(), BoxError> {
        let harness = Harness::new();
        let member_id = member_with_purchases(&harness).await?;

        let res = harness
            .logic
            .clone()
            .oneshot(GetHistoryRequest {
                page: Some(page),
                per_page: Some(2),
                ..GetHistoryRequest::new(member_id)
            })
            .await?;

        let amounts: Vec<i64> = res.items.iter().map(|t| t.amount).collect();
        assert_that!(amounts).is_equal_to(expected);
        assert_that!(res.page).is_equal_to(page);
        assert_that!(res.total_count).is_equal_to(6);
        assert_that!(res.total_pages).is_equal_to(3);

        Ok(())
    }

    #[tokio::test]
    async fn test_filter_direction() -> Result<(), BoxError> {
        let harness = Harness::new();
        let member_id = member_with_purchases(&harness).await?;

        let res = harness
            .logic
            .clone()
            .oneshot(GetHistoryRequest {
                filter: HistoryFilter {
                    direction: Some(Direction::Credit),
                    ..Default::default()
                },
                ..GetHistoryRequest::new(member_id)
            })
            .await?;

        assert_that!(res.total_count).is_equal_to(1);
        assert_that!(res.items[0].source).is_equal_to(TransactionSource::AdminCredit);

        Ok(())
    }

    #[tokio::test]
    async fn test_per_page_is_capped() -> Result<(), BoxError> {
        let harness = Harness::new();
        let member_id = harness.member("Ana");

        let res = harness
            .logic
            .clone()
            .oneshot(GetHistoryRequest {
                per_page: Some(10_000),
                ..GetHistoryRequest::new(member_id)
            })
            .await?;

        assert_that!(res.per_page).is_equal_to(100);
        assert_that!(res.items).is_empty();
        assert_that!(res.total_pages).is_equal_to(0);

        Ok(())
    }
}

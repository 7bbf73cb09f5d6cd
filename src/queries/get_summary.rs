use std::task::{Context, Poll};

use chrono::{DateTime, Utc};
use tower::Service;
use tracing::Instrument;
use uuid::Uuid;

use crate::{
    commands::{DomainLogic, Error, ServiceFuture},
    domain::Period,
    ports::{
        database::DatabasePort, member::MemberPort, notification::NotificationPort,
        points_config::PointsConfigPort,
    },
    reporting::{summarize, Summary},
};

#[derive(Clone, Copy, Debug)]
pub struct GetSummaryRequest {
    pub member_id: Uuid,
    pub period: Period,
    /// End of the period, the current time when not set
    pub as_of: Option<DateTime<Utc>>,
}

impl GetSummaryRequest {
    pub fn new(member_id: Uuid, period: Period) -> Self {
        Self {
            member_id,
            period,
            as_of: None,
        }
    }
}

impl<D, M, N, C> Service<GetSummaryRequest> for DomainLogic<D, M, N, C>
where
    D: DatabasePort + 'static,
    M: MemberPort + 'static,
    N: NotificationPort + 'static,
    C: PointsConfigPort + 'static,
{
    type Response = Summary;
    type Error = Error;
    type Future = ServiceFuture<Summary>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: GetSummaryRequest) -> Self::Future {
        let database = self.database.clone();
        let span = tracing::debug_span!(
            "get_summary",
            member_id = %req.member_id,
            period = ?req.period
        );
        Box::pin(
            async move {
                let window = req.period.window(req.as_of.unwrap_or_else(Utc::now));
                let transactions = database.transactions_in(Some(req.member_id), window).await?;
                let summary = summarize(window, &transactions);
                tracing::debug!(earned = summary.earned, spent = summary.spent, "summary computed");
                Ok(summary)
            }
            .instrument(span),
        )
    }
}

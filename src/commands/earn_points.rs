use std::task::{Context, Poll};

use tower::Service;
use tracing::Instrument;
use uuid::Uuid;

use crate::{
    domain::{EarningEvent, PointsConfiguration, Posting, Transaction},
    ports::{
        database::DatabasePort,
        member::{Member, MemberPort},
        notification::NotificationPort,
        points_config::{self, PointsConfigPort},
    },
};

use super::{commit_posting, DomainLogic, Error, ServiceFuture};

pub struct EarnPointsRequest {
    pub member_id: Uuid,
    pub event: EarningEvent,
}

#[derive(Debug, PartialEq, Eq)]
pub struct EarnPointsResponse {
    pub member_id: Uuid,
    /// Points earned by the event
    pub points: i64,
    /// Credit transaction, `None` when the event earned nothing
    pub transaction: Option<Transaction>,
    pub new_balance: i64,
}

impl<D, M, N, C> Service<EarnPointsRequest> for DomainLogic<D, M, N, C>
where
    D: DatabasePort + 'static,
    M: MemberPort + 'static,
    N: NotificationPort + 'static,
    C: PointsConfigPort + 'static,
{
    type Response = EarnPointsResponse;
    type Error = Error;
    type Future = ServiceFuture<EarnPointsResponse>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: EarnPointsRequest) -> Self::Future {
        let member = self.member.clone();
        let database = self.database.clone();
        let points_config = self.points_config.clone();
        let span = tracing::info_span!("earn_points", member_id = %req.member_id);
        Box::pin(
            async move {
                // Fetch necessary data
                let member = member.get_member(req.member_id).await?;
                let config = match points_config.get_points_config(member.association_id).await {
                    Ok(config) => config,
                    Err(points_config::Error::NotConfigured(association_id)) => {
                        tracing::debug!(%association_id, "no points configuration, nothing earned");
                        PointsConfiguration::disabled(association_id)
                    }
                    Err(err) => return Err(err.into()),
                };

                let points = points_earned(&member, &config, &req.event);
                if points == 0 {
                    let balance = database.get_balance(member.member_id).await?;
                    return Ok(EarnPointsResponse {
                        member_id: member.member_id,
                        points,
                        transaction: None,
                        new_balance: balance.balance,
                    });
                }

                // Create and store the credit
                let posting = Posting::credit(member.member_id, points, req.event.source())
                    .with_description(Some(req.event.description()))
                    .with_source_id(req.event.source_id());
                let (transaction, balance) = commit_posting(database.as_ref(), posting).await?;

                // Return the response
                Ok(EarnPointsResponse {
                    member_id: member.member_id,
                    points,
                    transaction: Some(transaction),
                    new_balance: balance.balance,
                })
            }
            .instrument(span),
        )
    }
}

/// Points earned by a member for an event
///
/// Members that are no longer active do not earn points.
fn points_earned(member: &Member, config: &PointsConfiguration, event: &EarningEvent) -> i64 {
    if !member.active_member {
        return 0;
    }
    config.points_for(event)
}

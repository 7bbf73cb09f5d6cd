use std::task::{Context, Poll};

use tower::Service;
use tracing::Instrument;
use uuid::Uuid;

use crate::{
    commands::{DomainLogic, Error, ServiceFuture},
    domain::Balance,
    ports::{
        database::DatabasePort, member::MemberPort, notification::NotificationPort,
        points_config::PointsConfigPort,
    },
};

#[derive(Clone, Copy, Debug)]
pub struct GetBalanceRequest {
    pub member_id: Uuid,
}

impl<D, M, N, C> Service<GetBalanceRequest> for DomainLogic<D, M, N, C>
where
    D: DatabasePort + 'static,
    M: MemberPort + 'static,
    N: NotificationPort + 'static,
    C: PointsConfigPort + 'static,
{
    type Response = Balance;
    type Error = Error;
    type Future = ServiceFuture<Balance>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: GetBalanceRequest) -> Self::Future {
        let database = self.database.clone();
        let span = tracing::debug_span!("get_balance", member_id = %req.member_id);
        Box::pin(
            async move {
                let balance = database.get_balance(req.member_id).await?;
                tracing::debug!(balance = balance.balance, "balance loaded");
                Ok(balance)
            }
            .instrument(span),
        )
    }
}

use std::{future::Future, pin::Pin, sync::Arc};

use uuid::Uuid;

use crate::{
    config::LedgerConfig,
    domain::{Balance, Posting, Transaction, UnitOfWork},
    ports::{
        database::{self, DatabasePort},
        member::{self, Member, MemberPort},
        notification::{Notification, NotificationPort},
        points_config,
    },
};

pub mod admin;
pub mod credit;
pub mod debit;
pub mod earn_points;
pub mod refund;
pub mod transfer;

/// Ledger engine
///
/// Every operation is exposed as a [`tower::Service`] over its request type. Mutating operations
/// build a single unit of work and hand it to the database port, which applies it atomically.
pub struct DomainLogic<D, M, N, C> {
    pub(crate) database: Arc<D>,
    pub(crate) member: Arc<M>,
    pub(crate) notification: Arc<N>,
    pub(crate) points_config: Arc<C>,
    pub(crate) config: Arc<LedgerConfig>,
}

impl<D, M, N, C> DomainLogic<D, M, N, C> {
    pub fn new(
        database: D,
        member: M,
        notification: N,
        points_config: C,
        config: LedgerConfig,
    ) -> Self {
        Self {
            database: Arc::new(database),
            member: Arc::new(member),
            notification: Arc::new(notification),
            points_config: Arc::new(points_config),
            config: Arc::new(config),
        }
    }
}

impl<D, M, N, C> Clone for DomainLogic<D, M, N, C> {
    fn clone(&self) -> Self {
        Self {
            database: self.database.clone(),
            member: self.member.clone(),
            notification: self.notification.clone(),
            points_config: self.points_config.clone(),
            config: self.config.clone(),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("amount must be positive, got {0}")]
    InvalidAmount(i64),

    #[error("member {0} does not exist")]
    MemberNotFound(Uuid),
    #[error("member {0} has no points balance")]
    BalanceNotFound(Uuid),
    #[error("transaction {0} does not exist")]
    TransactionNotFound(Uuid),

    #[error("recipient {0} does not exist or is not an active member")]
    RecipientNotFound(Uuid),
    #[error("cannot transfer points to yourself")]
    SelfTransfer,

    #[error("insufficient balance: {requested} points requested, {available} available")]
    InsufficientBalance {
        member_id: Uuid,
        available: i64,
        requested: i64,
    },
    #[error("transaction {0} has already been refunded")]
    AlreadyRefunded(Uuid),
    #[error("transaction {0} is part of a transfer and cannot be refunded")]
    NotRefundable(Uuid),

    #[error("database port error: {0:?}")]
    Database(database::Error),
    #[error("member port error: {0:?}")]
    Member(member::Error),
    #[error("points configuration port error: {0:?}")]
    PointsConfig(#[from] points_config::Error),
}

/// How callers should surface an [`Error`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidAmount,
    NotFound,
    RecipientNotFound,
    SelfTransfer,
    InsufficientBalance,
    AlreadyRefunded,
    NotRefundable,
    /// Failure of a collaborator, not an expected outcome
    Internal,
}

impl ErrorKind {
    /// Business rule rejections, with an actionable message for the member
    pub fn is_business(&self) -> bool {
        matches!(
            self,
            ErrorKind::InsufficientBalance | ErrorKind::AlreadyRefunded | ErrorKind::NotRefundable
        )
    }

    /// Malformed or impossible requests
    pub fn is_request(&self) -> bool {
        matches!(
            self,
            ErrorKind::InvalidAmount
                | ErrorKind::NotFound
                | ErrorKind::RecipientNotFound
                | ErrorKind::SelfTransfer
        )
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidAmount(_) => ErrorKind::InvalidAmount,
            Error::MemberNotFound(_)
            | Error::BalanceNotFound(_)
            | Error::TransactionNotFound(_) => ErrorKind::NotFound,
            Error::RecipientNotFound(_) => ErrorKind::RecipientNotFound,
            Error::SelfTransfer => ErrorKind::SelfTransfer,
            Error::InsufficientBalance { .. } => ErrorKind::InsufficientBalance,
            Error::AlreadyRefunded(_) => ErrorKind::AlreadyRefunded,
            Error::NotRefundable(_) => ErrorKind::NotRefundable,
            Error::Database(_) | Error::Member(_) | Error::PointsConfig(_) => ErrorKind::Internal,
        }
    }
}

impl From<database::Error> for Error {
    fn from(err: database::Error) -> Self {
        match err {
            database::Error::NegativeBalance {
                member_id,
                current,
                delta,
            } => Error::InsufficientBalance {
                member_id,
                available: current,
                requested: -delta,
            },
            database::Error::BalanceNotFound(member_id) => Error::BalanceNotFound(member_id),
            database::Error::TransactionNotFound(id) => Error::TransactionNotFound(id),
            database::Error::AlreadyReversed(id) => Error::AlreadyRefunded(id),
            err => Error::Database(err),
        }
    }
}

impl From<member::Error> for Error {
    fn from(err: member::Error) -> Self {
        match err {
            member::Error::MemberDoesNotExist(member_id) => Error::MemberNotFound(member_id),
            err => Error::Member(err),
        }
    }
}

/// Future returned by every ledger service
pub type ServiceFuture<T> = Pin<Box<dyn Future<Output = Result<T, Error>> + Send>>;

pub(crate) fn ensure_positive(amount: i64) -> Result<(), Error> {
    if amount <= 0 {
        return Err(Error::InvalidAmount(amount));
    }
    Ok(())
}

/// Commit a unit of work holding a single posting
pub(crate) async fn commit_posting<D: DatabasePort>(
    database: &D,
    posting: Posting,
) -> Result<(Transaction, Balance), Error> {
    let committed = database.commit(UnitOfWork::single(posting)).await?;
    let transaction = committed.transactions.into_iter().next();
    let balance = committed.balances.into_iter().next();
    match (transaction, balance) {
        (Some(transaction), Some(balance)) => {
            tracing::info!(
                transaction_id = %transaction.id,
                member_id = %transaction.member_id,
                amount = transaction.amount,
                source = %transaction.source,
                balance = balance.balance,
                "transaction committed"
            );
            Ok((transaction, balance))
        }
        _ => Err(Error::Database(database::Error::Adapter(
            "commit returned no transaction".into(),
        ))),
    }
}

/// Look up a member, returning `None` if the directory does not know them
pub(crate) async fn find_member<M: MemberPort>(
    member: &M,
    member_id: Uuid,
) -> Result<Option<Member>, Error> {
    match member.get_member(member_id).await {
        Ok(member) => Ok(Some(member)),
        Err(member::Error::MemberDoesNotExist(_)) => Ok(None),
        Err(err) => Err(Error::Member(err)),
    }
}

/// Send notifications once the ledger write is committed
///
/// Delivery runs on its own task. Failures are logged and never reach the caller.
pub(crate) fn dispatch<N>(notifier: &Arc<N>, notifications: Vec<Notification>)
where
    N: NotificationPort + 'static,
{
    if notifications.is_empty() {
        return;
    }
    let notifier = notifier.clone();
    tokio::spawn(async move {
        for notification in notifications {
            if let Err(err) = notifier.notify(notification.clone()).await {
                tracing::warn!(?notification, error = %err, "failed to deliver notification");
            }
        }
    });
}

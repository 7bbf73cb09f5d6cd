use uuid::Uuid;

use crate::domain::{
    Balance, Committed, HistoryFilter, Page, PageRequest, TimeWindow, Transaction,
    TransferDirectoryEntry, UnitOfWork,
};

#[mockall::automock]
#[async_trait::async_trait]
pub trait DatabasePort: Send + Sync {
    /// Return the balance of a member, creating a zero balance on first access
    async fn get_balance(&self, member_id: Uuid) -> Result<Balance, Error>;

    /// Return the balance of a member without creating it
    async fn find_balance(&self, member_id: Uuid) -> Result<Option<Balance>, Error>;

    /// Apply a unit of work atomically
    ///
    /// Balance checks, balance existence checks and reversal checks all run inside the same
    /// atomic unit as the writes. If any posting fails, nothing is written.
    async fn commit(&self, unit: UnitOfWork) -> Result<Committed, Error>;

    async fn get_transaction(&self, transaction_id: Uuid) -> Result<Option<Transaction>, Error>;

    /// Page through a member's transactions, most recent first
    async fn list_transactions(
        &self,
        member_id: Uuid,
        filter: &HistoryFilter,
        page: PageRequest,
    ) -> Result<Page<Transaction>, Error>;

    /// Transactions in a time window, oldest first
    ///
    /// When `member_id` is `None`, this returns transactions for all members.
    async fn transactions_in(
        &self,
        member_id: Option<Uuid>,
        window: TimeWindow,
    ) -> Result<Vec<Transaction>, Error>;

    async fn list_balances(&self) -> Result<Vec<Balance>, Error>;

    /// Transfer directory entries of a sender, most recent first
    async fn recent_recipients(
        &self,
        sender_id: Uuid,
        limit: Option<usize>,
    ) -> Result<Vec<TransferDirectoryEntry>, Error>;
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Trying to remove too many points
    ///
    /// This would result in a negative balance, which is not supported.
    #[error("member {member_id}: cannot apply {delta} to a balance of {current}")]
    NegativeBalance {
        member_id: Uuid,
        current: i64,
        delta: i64,
    },

    /// The posting requires an existing balance record
    #[error("no balance for member {0}")]
    BalanceNotFound(Uuid),

    /// The reversed transaction does not exist
    #[error("transaction {0} does not exist")]
    TransactionNotFound(Uuid),

    /// The transaction already has a reversal
    #[error("transaction {0} has already been reversed")]
    AlreadyReversed(Uuid),

    /// Amount would not fit in the balance or lifetime aggregates
    #[error("points overflow for member {0}")]
    Overflow(Uuid),

    /// Concrete adapter errors
    ///
    /// This could represent any errors from a concrete adapter that is not part of the domain
    /// model, such as connectivity, configuration, or permission errors.
    #[error("adapter error: {0:?}")]
    Adapter(Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    pub(crate) fn from_apply(member_id: Uuid, err: crate::domain::ApplyError) -> Self {
        match err {
            crate::domain::ApplyError::NegativeBalance { current, delta } => {
                Error::NegativeBalance {
                    member_id,
                    current,
                    delta,
                }
            }
            crate::domain::ApplyError::Overflow => Error::Overflow(member_id),
        }
    }
}

use crate::{
    domain::{
        Balance, Committed, HistoryFilter, MissingBalance, Page, PageRequest, TimeWindow,
        Transaction, TransferDirectoryEntry, UnitOfWork,
    },
    ports::database::{DatabasePort, Error},
};
use chrono::Utc;
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::{Arc, Mutex, PoisonError},
};
use uuid::Uuid;

/// In-memory ledger store
///
/// A single mutex guards all the state. Each unit of work holds it from the first read to the
/// last write, which serializes every operation touching a balance.
#[derive(Clone, Debug)]
pub struct MemoryDatabase {
    state: Arc<Mutex<State>>,
}

#[derive(Debug, Default)]
struct State {
    balances: HashMap<Uuid, Balance>,
    /// Append-only log, in commit order
    transactions: Vec<Transaction>,
    positions: HashMap<Uuid, usize>,
    /// Transactions that already have a reversal
    reversed: HashSet<Uuid>,
    directory: HashMap<(Uuid, Uuid), TransferDirectoryEntry>,
}

#[async_trait::async_trait]
impl DatabasePort for MemoryDatabase {
    async fn get_balance(&self, member_id: Uuid) -> Result<Balance, Error> {
        let balance = self
            .state
            .lock()?
            .balances
            .entry(member_id)
            .or_insert_with(|| Balance::new(member_id))
            .clone();

        Ok(balance)
    }

    async fn find_balance(&self, member_id: Uuid) -> Result<Option<Balance>, Error> {
        Ok(self.state.lock()?.balances.get(&member_id).cloned())
    }

    async fn commit(&self, unit: UnitOfWork) -> Result<Committed, Error> {
        let mut guard = self.state.lock()?;
        let state = &mut *guard;
        let now = Utc::now();

        // Work on copies so that a failing posting leaves the store untouched
        let mut staged: BTreeMap<Uuid, Option<Balance>> = unit
            .member_ids()
            .into_iter()
            .map(|member_id| (member_id, state.balances.get(&member_id).cloned()))
            .collect();
        let mut reversals = HashSet::new();
        let mut transactions = Vec::with_capacity(unit.postings.len());
        let mut balances = Vec::with_capacity(unit.postings.len());

        for posting in unit.postings {
            debug_assert_ne!(posting.amount, 0, "zero amounts are never recorded");
            let member_id = posting.member_id;

            if let Some(target) = posting.reversal_of {
                if !state.positions.contains_key(&target) {
                    return Err(Error::TransactionNotFound(target));
                }
                if state.reversed.contains(&target) || !reversals.insert(target) {
                    return Err(Error::AlreadyReversed(target));
                }
            }

            let slot = staged.entry(member_id).or_default();
            if slot.is_none() && posting.missing_balance == MissingBalance::Reject {
                return Err(Error::BalanceNotFound(member_id));
            }
            let balance = slot.get_or_insert_with(|| Balance::new(member_id));
            let balance_after = balance
                .apply(posting.amount, now)
                .map_err(|err| Error::from_apply(member_id, err))?;

            balances.push(balance.clone());
            transactions.push(posting.into_transaction(Uuid::now_v7(), balance_after, now));
        }

        // Every check passed, write everything
        for (member_id, balance) in staged {
            if let Some(balance) = balance {
                state.balances.insert(member_id, balance);
            }
        }
        for transaction in &transactions {
            state
                .positions
                .insert(transaction.id, state.transactions.len());
            state.transactions.push(transaction.clone());
        }
        state.reversed.extend(reversals);
        if let Some(update) = unit.directory {
            state
                .directory
                .entry((update.sender_id, update.recipient_id))
                .and_modify(|entry| entry.record(now))
                .or_insert_with(|| {
                    TransferDirectoryEntry::first(update.sender_id, update.recipient_id, now)
                });
        }

        Ok(Committed {
            transactions,
            balances,
        })
    }

    async fn get_transaction(&self, transaction_id: Uuid) -> Result<Option<Transaction>, Error> {
        let state = self.state.lock()?;
        Ok(state
            .positions
            .get(&transaction_id)
            .map(|position| state.transactions[*position].clone()))
    }

    async fn list_transactions(
        &self,
        member_id: Uuid,
        filter: &HistoryFilter,
        page: PageRequest,
    ) -> Result<Page<Transaction>, Error> {
        let state = self.state.lock()?;
        let matching: Vec<&Transaction> = state
            .transactions
            .iter()
            .rev()
            .filter(|t| t.member_id == member_id && filter.matches(t))
            .collect();
        let items = matching
            .iter()
            .skip(page.offset())
            .take(page.limit())
            .map(|t| (*t).clone())
            .collect();

        Ok(Page::new(items, page, matching.len() as u64))
    }

    async fn transactions_in(
        &self,
        member_id: Option<Uuid>,
        window: TimeWindow,
    ) -> Result<Vec<Transaction>, Error> {
        Ok(self
            .state
            .lock()?
            .transactions
            .iter()
            .filter(|t| member_id.map_or(true, |id| t.member_id == id))
            .filter(|t| window.contains(t.created_at))
            .cloned()
            .collect())
    }

    async fn list_balances(&self) -> Result<Vec<Balance>, Error> {
        let mut balances: Vec<Balance> = self.state.lock()?.balances.values().cloned().collect();
        balances.sort_by_key(|b| b.member_id);
        Ok(balances)
    }

    async fn recent_recipients(
        &self,
        sender_id: Uuid,
        limit: Option<usize>,
    ) -> Result<Vec<TransferDirectoryEntry>, Error> {
        let mut entries: Vec<TransferDirectoryEntry> = self
            .state
            .lock()?
            .directory
            .values()
            .filter(|entry| entry.sender_id == sender_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| {
            b.last_transfer_at
                .cmp(&a.last_transfer_at)
                .then_with(|| a.recipient_id.cmp(&b.recipient_id))
        });
        entries.truncate(limit.unwrap_or(usize::MAX));
        Ok(entries)
    }
}

impl Default for MemoryDatabase {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
        }
    }
}

/// Erased [`PoisonError`]
///
/// `PoisonError` keeps the `MutexGuard` internally, which is not send. Thus we erase the error
/// and only keep the string representation instead.
#[derive(Debug, thiserror::Error)]
#[error("poison error: {0}")]
pub struct ErasedPoisonError(String);

impl<T> From<PoisonError<T>> for Error {
    fn from(err: PoisonError<T>) -> Self {
        Self::Adapter(Box::new(ErasedPoisonError(err.to_string())))
    }
}

use std::{collections::BTreeMap, fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod directory;
pub mod points;
pub mod query;

pub use directory::{RecentRecipient, TransferDirectoryEntry};
pub use points::{EarningEvent, PointsConfiguration};
pub use query::{Direction, HistoryFilter, Page, PageRequest, Period, TimeWindow};

/// Open key/value payload attached to a transaction
pub type Metadata = BTreeMap<String, String>;

/// Point balance of a member
///
/// This is a cached projection of the member's transactions. It is only ever modified together
/// with the append of the transaction that explains the change.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub member_id: Uuid,
    /// Current spendable points
    pub balance: i64,
    /// Sum of all positive amounts ever applied
    pub lifetime_earned: i64,
    /// Sum of the magnitude of all negative amounts ever applied
    pub lifetime_spent: i64,
    pub last_transaction_at: Option<DateTime<Utc>>,
}

impl Balance {
    pub fn new(member_id: Uuid) -> Self {
        Self {
            member_id,
            balance: 0,
            lifetime_earned: 0,
            lifetime_spent: 0,
            last_transaction_at: None,
        }
    }

    /// Apply a signed amount to the balance
    ///
    /// Returns the new balance. On error, the balance is left untouched.
    pub fn apply(&mut self, amount: i64, at: DateTime<Utc>) -> Result<i64, ApplyError> {
        let new_balance = self
            .balance
            .checked_add(amount)
            .ok_or(ApplyError::Overflow)?;
        if new_balance < 0 {
            return Err(ApplyError::NegativeBalance {
                current: self.balance,
                delta: amount,
            });
        }

        if amount >= 0 {
            self.lifetime_earned = self
                .lifetime_earned
                .checked_add(amount)
                .ok_or(ApplyError::Overflow)?;
        } else {
            self.lifetime_spent = self
                .lifetime_spent
                .checked_add(amount.unsigned_abs() as i64)
                .ok_or(ApplyError::Overflow)?;
        }
        self.balance = new_balance;
        self.last_transaction_at = Some(at);

        Ok(new_balance)
    }

    /// Whether the cached aggregates agree with each other
    pub fn is_consistent(&self) -> bool {
        self.balance >= 0
            && self.lifetime_earned >= 0
            && self.lifetime_spent >= 0
            && self.lifetime_earned - self.lifetime_spent == self.balance
    }
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ApplyError {
    #[error("balance of {current} cannot absorb {delta}")]
    NegativeBalance { current: i64, delta: i64 },
    #[error("points arithmetic overflow")]
    Overflow,
}

/// Category of a balance change
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionSource {
    EventCheckIn,
    ActivityTracking,
    StorePurchase,
    AdminCredit,
    AdminDebit,
    TransferIn,
    TransferOut,
    Refund,
}

impl TransactionSource {
    pub const ALL: [TransactionSource; 8] = [
        TransactionSource::EventCheckIn,
        TransactionSource::ActivityTracking,
        TransactionSource::StorePurchase,
        TransactionSource::AdminCredit,
        TransactionSource::AdminDebit,
        TransactionSource::TransferIn,
        TransactionSource::TransferOut,
        TransactionSource::Refund,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionSource::EventCheckIn => "event_check_in",
            TransactionSource::ActivityTracking => "activity_tracking",
            TransactionSource::StorePurchase => "store_purchase",
            TransactionSource::AdminCredit => "admin_credit",
            TransactionSource::AdminDebit => "admin_debit",
            TransactionSource::TransferIn => "transfer_in",
            TransactionSource::TransferOut => "transfer_out",
            TransactionSource::Refund => "refund",
        }
    }

    /// Default description used when the caller does not provide one
    pub fn default_description(&self) -> &'static str {
        match self {
            TransactionSource::EventCheckIn => "Event check-in",
            TransactionSource::ActivityTracking => "Activity tracking",
            TransactionSource::StorePurchase => "Store purchase",
            TransactionSource::AdminCredit => "Points granted by an administrator",
            TransactionSource::AdminDebit => "Points deducted by an administrator",
            TransactionSource::TransferIn => "Points received",
            TransactionSource::TransferOut => "Points sent",
            TransactionSource::Refund => "Refund",
        }
    }
}

impl fmt::Display for TransactionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown transaction source: {0}")]
pub struct UnknownSource(String);

impl FromStr for TransactionSource {
    type Err = UnknownSource;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TransactionSource::ALL
            .into_iter()
            .find(|source| source.as_str() == s)
            .ok_or_else(|| UnknownSource(s.to_string()))
    }
}

/// Immutable record of a balance change
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub member_id: Uuid,
    /// Signed amount
    ///
    /// A positive number is a credit, a negative number a debit. Zero is never recorded.
    pub amount: i64,
    /// Balance of the member right after this transaction was applied
    pub balance_after: i64,
    pub source: TransactionSource,
    pub description: String,
    pub metadata: Metadata,
    /// Foreign reference, such as an order id
    pub source_id: Option<String>,
    /// Transaction this entry reverses, only set on refunds
    pub reversal_of: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    pub fn is_credit(&self) -> bool {
        self.amount > 0
    }

    pub fn is_debit(&self) -> bool {
        self.amount < 0
    }
}

/// What to do when a posting targets a member without a balance record
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MissingBalance {
    /// Start from a zero balance
    Create,
    /// Fail the whole unit of work
    Reject,
}

/// A transaction waiting to be written
///
/// The id, `balance_after` and `created_at` are only known once the posting is applied inside a
/// unit of work.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Posting {
    pub member_id: Uuid,
    pub amount: i64,
    pub source: TransactionSource,
    pub description: String,
    pub metadata: Metadata,
    pub source_id: Option<String>,
    pub reversal_of: Option<Uuid>,
    pub missing_balance: MissingBalance,
}

impl Posting {
    pub fn credit(member_id: Uuid, amount: i64, source: TransactionSource) -> Self {
        Self {
            member_id,
            amount,
            source,
            description: source.default_description().to_string(),
            metadata: Metadata::new(),
            source_id: None,
            reversal_of: None,
            missing_balance: MissingBalance::Create,
        }
    }

    /// `amount` is the magnitude to remove; the stored amount is negative.
    pub fn debit(member_id: Uuid, amount: i64, source: TransactionSource) -> Self {
        Self {
            amount: -amount,
            missing_balance: MissingBalance::Reject,
            ..Self::credit(member_id, amount, source)
        }
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        if let Some(description) = description.filter(|d| !d.trim().is_empty()) {
            self.description = description;
        }
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata.extend(metadata);
        self
    }

    pub fn with_entry(mut self, key: &str, value: impl ToString) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_source_id(mut self, source_id: Option<String>) -> Self {
        self.source_id = source_id;
        self
    }

    pub fn reversing(mut self, transaction_id: Uuid) -> Self {
        self.reversal_of = Some(transaction_id);
        self
    }

    pub fn on_missing_balance(mut self, missing_balance: MissingBalance) -> Self {
        self.missing_balance = missing_balance;
        self
    }

    /// Turn the posting into a transaction once it has been applied
    pub fn into_transaction(self, id: Uuid, balance_after: i64, at: DateTime<Utc>) -> Transaction {
        Transaction {
            id,
            member_id: self.member_id,
            amount: self.amount,
            balance_after,
            source: self.source,
            description: self.description,
            metadata: self.metadata,
            source_id: self.source_id,
            reversal_of: self.reversal_of,
            created_at: at,
        }
    }
}

/// A group of writes that are committed together or not at all
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UnitOfWork {
    /// Postings, applied in order
    pub postings: Vec<Posting>,
    /// Transfer directory entry to upsert alongside the postings
    pub directory: Option<DirectoryUpdate>,
}

impl UnitOfWork {
    pub fn single(posting: Posting) -> Self {
        Self {
            postings: vec![posting],
            directory: None,
        }
    }

    /// Members touched by this unit, in ascending order
    ///
    /// Adapters that lock per member must acquire them in this order.
    pub fn member_ids(&self) -> Vec<Uuid> {
        let mut ids: Vec<Uuid> = self.postings.iter().map(|p| p.member_id).collect();
        ids.sort();
        ids.dedup();
        ids
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DirectoryUpdate {
    pub sender_id: Uuid,
    pub recipient_id: Uuid,
}

/// Result of a committed unit of work
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Committed {
    /// Transactions, in the same order as the postings
    pub transactions: Vec<Transaction>,
    /// Balances after the commit, in the same order as the postings
    pub balances: Vec<Balance>,
}

impl Committed {
    /// Balance of a member after the commit
    pub fn balance_of(&self, member_id: Uuid) -> Option<&Balance> {
        self.balances
            .iter()
            .rev()
            .find(|b| b.member_id == member_id)
    }
}

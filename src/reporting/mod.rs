//! Read-side projections over the transaction log
//!
//! Everything in here is a pure fold over transactions and balances that were already read from
//! storage. Nothing in this module writes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{Balance, TimeWindow, Transaction, TransactionSource};

/// Totals for a single source
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceTotals {
    pub earned: i64,
    pub spent: i64,
    pub count: u64,
}

impl SourceTotals {
    pub fn net(&self) -> i64 {
        self.earned - self.spent
    }

    fn add(&mut self, amount: i64) {
        if amount > 0 {
            self.earned += amount;
        } else {
            self.spent += -amount;
        }
        self.count += 1;
    }
}

/// Points earned and spent over a time window
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub window: TimeWindow,
    /// Sum of credits
    pub earned: i64,
    /// Sum of the magnitude of debits
    pub spent: i64,
    pub net: i64,
    pub by_source: BTreeMap<TransactionSource, SourceTotals>,
}

pub fn summarize<'a>(
    window: TimeWindow,
    transactions: impl IntoIterator<Item = &'a Transaction>,
) -> Summary {
    let mut by_source: BTreeMap<TransactionSource, SourceTotals> = BTreeMap::new();
    for transaction in transactions {
        if window.contains(transaction.created_at) {
            by_source
                .entry(transaction.source)
                .or_default()
                .add(transaction.amount);
        }
    }

    let earned = by_source.values().map(|t| t.earned).sum();
    let spent = by_source.values().map(|t| t.spent).sum();
    Summary {
        window,
        earned,
        spent,
        net: earned - spent,
        by_source,
    }
}

/// Association-wide report for administrators
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssociationReport {
    /// Activity over the window
    pub activity: Summary,
    /// Number of members with at least one transaction in the window
    pub active_members: u64,
    /// Sum of all current balances
    pub points_in_circulation: i64,
    /// Number of balance records
    pub member_balances: u64,
    pub lifetime_earned: i64,
    pub lifetime_spent: i64,
}

pub fn association_report(
    window: TimeWindow,
    transactions: &[Transaction],
    balances: &[Balance],
) -> AssociationReport {
    let activity = summarize(window, transactions);
    let mut members: Vec<Uuid> = transactions
        .iter()
        .filter(|t| window.contains(t.created_at))
        .map(|t| t.member_id)
        .collect();
    members.sort();
    members.dedup();

    AssociationReport {
        activity,
        active_members: members.len() as u64,
        points_in_circulation: balances.iter().map(|b| b.balance).sum(),
        member_balances: balances.len() as u64,
        lifetime_earned: balances.iter().map(|b| b.lifetime_earned).sum(),
        lifetime_spent: balances.iter().map(|b| b.lifetime_spent).sum(),
    }
}

/// Result of replaying a member's log against the cached balance
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceAudit {
    pub member_id: Uuid,
    pub cached: Balance,
    /// Balance rebuilt from the transaction log
    pub replayed: Balance,
    /// First transaction whose `balance_after` disagrees with the running sum
    pub first_mismatch: Option<Uuid>,
    pub transaction_count: u64,
}

impl BalanceAudit {
    pub fn is_consistent(&self) -> bool {
        self.first_mismatch.is_none()
            && self.cached.balance == self.replayed.balance
            && self.cached.lifetime_earned == self.replayed.lifetime_earned
            && self.cached.lifetime_spent == self.replayed.lifetime_spent
            && self.cached.is_consistent()
    }
}

/// Replay transactions (oldest first) and compare them with the cached balance
pub fn audit(cached: Balance, transactions: &[Transaction]) -> BalanceAudit {
    let mut replayed = Balance::new(cached.member_id);
    let mut first_mismatch = None;

    for transaction in transactions {
        replayed.balance += transaction.amount;
        if transaction.amount > 0 {
            replayed.lifetime_earned += transaction.amount;
        } else {
            replayed.lifetime_spent += -transaction.amount;
        }
        replayed.last_transaction_at = Some(transaction.created_at);

        if first_mismatch.is_none() && transaction.balance_after != replayed.balance {
            first_mismatch = Some(transaction.id);
        }
    }

    BalanceAudit {
        member_id: cached.member_id,
        cached,
        replayed,
        first_mismatch,
        transaction_count: transactions.len() as u64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, Utc};
    use speculoos::prelude::*;

    fn transaction(
        member_id: Uuid,
        amount: i64,
        balance_after: i64,
        source: TransactionSource,
        created_at: DateTime<Utc>,
    ) -> Transaction {
        Transaction {
            id: Uuid::new_v4(),
            member_id,
            amount,
            balance_after,
            source,
            description: String::new(),
            metadata: Default::default(),
            source_id: None,
            reversal_of: None,
            created_at,
        }
    }

    #[test]
    fn test_summarize() {
        let now = Utc::now();
        let ago = |hours| now - Duration::hours(hours);
        let member = Uuid::new_v4();
        let transactions = vec![
            transaction(member, 100, 100, TransactionSource::EventCheckIn, ago(960)),
            transaction(member, 50, 150, TransactionSource::EventCheckIn, ago(48)),
            transaction(member, 30, 180, TransactionSource::EventCheckIn, ago(24)),
            transaction(member, -80, 100, TransactionSource::StorePurchase, ago(1)),
        ];

        let window = TimeWindow::between(ago(168), now);
        let summary = summarize(window, &transactions);

        assert_that!(summary.earned).is_equal_to(80);
        assert_that!(summary.spent).is_equal_to(80);
        assert_that!(summary.net).is_equal_to(0);
        assert_that!(summary.by_source.get(&TransactionSource::EventCheckIn))
            .is_some()
            .is_equal_to(&SourceTotals {
                earned: 80,
                spent: 0,
                count: 2,
            });
        let purchases = summary.by_source.get(&TransactionSource::StorePurchase);
        assert_that!(purchases.map(|t| t.net())).is_equal_to(Some(-80));
    }

    #[test]
    fn test_association_report() {
        let now = Utc::now();
        let ago = |hours| now - Duration::hours(hours);
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let transactions = vec![
            transaction(a, 100, 100, TransactionSource::AdminCredit, ago(72)),
            transaction(b, 40, 40, TransactionSource::TransferIn, ago(24)),
            transaction(a, -40, 60, TransactionSource::TransferOut, ago(24)),
        ];
        let balances = vec![
            Balance {
                member_id: a,
                balance: 60,
                lifetime_earned: 100,
                lifetime_spent: 40,
                last_transaction_at: None,
            },
            Balance {
                member_id: b,
                balance: 40,
                lifetime_earned: 40,
                lifetime_spent: 0,
                last_transaction_at: None,
            },
        ];

        let window = TimeWindow::between(ago(48), now);
        let report = association_report(window, &transactions, &balances);

        assert_that!(report.points_in_circulation).is_equal_to(100);
        assert_that!(report.member_balances).is_equal_to(2);
        assert_that!(report.active_members).is_equal_to(2);
        assert_that!(report.activity.earned).is_equal_to(40);
        assert_that!(report.activity.spent).is_equal_to(40);
    }

    #[test]
    fn test_audit_mismatch() {
        let now = Utc::now();
        let member_id = Uuid::new_v4();
        let transactions = vec![
            transaction(member_id, 100, 100, TransactionSource::AdminCredit, now),
            transaction(member_id, -30, 60, TransactionSource::StorePurchase, now),
        ];
        let cached = Balance {
            member_id,
            balance: 70,
            lifetime_earned: 100,
            lifetime_spent: 30,
            last_transaction_at: Some(now),
        };

        let audit = audit(cached, &transactions);

        assert_that!(audit.replayed.balance).is_equal_to(70);
        assert_that!(audit.first_mismatch).is_equal_to(Some(transactions[1].id));
        assert_that!(audit.is_consistent()).is_false();
    }
}

//! Read-side filters, pagination and time windows

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::{Transaction, TransactionSource};

/// Sign of a transaction amount
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Credit,
    Debit,
}

/// Half-open time range `[from, to)`
///
/// A missing bound leaves that side open.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl TimeWindow {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn between(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self {
            from: Some(from),
            to: Some(to),
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.from.map_or(true, |from| at >= from) && self.to.map_or(true, |to| at < to)
    }
}

/// Summary periods offered to members
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    /// Since midnight UTC
    Today,
    /// Rolling seven days
    Week,
    /// Rolling thirty days
    Month,
}

impl Period {
    pub fn window(&self, now: DateTime<Utc>) -> TimeWindow {
        let from = match self {
            Period::Today => now
                .date_naive()
                .and_hms_opt(0, 0, 0)
                .map(|midnight| midnight.and_utc())
                .unwrap_or(now),
            Period::Week => now - Duration::days(7),
            Period::Month => now - Duration::days(30),
        };
        // Include transactions committed in the same instant as `now`
        TimeWindow::between(from, now + Duration::microseconds(1))
    }
}

/// Filters for a member's transaction history
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryFilter {
    pub direction: Option<Direction>,
    pub source: Option<TransactionSource>,
    #[serde(default)]
    pub window: TimeWindow,
}

impl HistoryFilter {
    pub fn matches(&self, transaction: &Transaction) -> bool {
        let direction = match self.direction {
            Some(Direction::Credit) => transaction.is_credit(),
            Some(Direction::Debit) => transaction.is_debit(),
            None => true,
        };
        let source = self.source.map_or(true, |s| s == transaction.source);

        direction && source && self.window.contains(transaction.created_at)
    }
}

/// One-based page request
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: u32,
    pub per_page: u32,
}

impl PageRequest {
    pub fn new(page: u32, per_page: u32) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.max(1),
        }
    }

    pub fn offset(&self) -> usize {
        (self.page.saturating_sub(1) as usize) * self.per_page as usize
    }

    pub fn limit(&self) -> usize {
        self.per_page as usize
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub per_page: u32,
    pub total_count: u64,
    pub total_pages: u32,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, request: PageRequest, total_count: u64) -> Self {
        let per_page = u64::from(request.per_page.max(1));
        Self {
            items,
            page: request.page,
            per_page: request.per_page,
            total_count,
            total_pages: total_count.div_ceil(per_page) as u32,
        }
    }
}

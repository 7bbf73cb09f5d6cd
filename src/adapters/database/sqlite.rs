//! SQLite ledger store.

use std::{
    collections::{BTreeMap, HashSet},
    str::FromStr,
};

use chrono::{DateTime, SubsecRound, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool,
};
use uuid::Uuid;

use crate::{
    config::LedgerConfig,
    domain::{
        Balance, Committed, Direction, HistoryFilter, MissingBalance, Page, PageRequest,
        TimeWindow, Transaction, TransferDirectoryEntry, UnitOfWork,
    },
    ports::database::{DatabasePort, Error},
};

const SCHEMA: [&str; 5] = [
    r#"
    CREATE TABLE IF NOT EXISTS balances (
        member_id TEXT PRIMARY KEY,
        balance INTEGER NOT NULL CHECK (balance >= 0),
        lifetime_earned INTEGER NOT NULL CHECK (lifetime_earned >= 0),
        lifetime_spent INTEGER NOT NULL CHECK (lifetime_spent >= 0),
        last_transaction_at INTEGER
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS transactions (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        id TEXT NOT NULL UNIQUE,
        member_id TEXT NOT NULL,
        amount INTEGER NOT NULL CHECK (amount <> 0),
        balance_after INTEGER NOT NULL CHECK (balance_after >= 0),
        source TEXT NOT NULL,
        description TEXT NOT NULL,
        metadata TEXT NOT NULL,
        source_id TEXT,
        reversal_of TEXT UNIQUE REFERENCES transactions (id),
        created_at INTEGER NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS transactions_member ON transactions (member_id, seq)",
    "CREATE INDEX IF NOT EXISTS transactions_created ON transactions (created_at)",
    r#"
    CREATE TABLE IF NOT EXISTS transfer_directory (
        sender_id TEXT NOT NULL,
        recipient_id TEXT NOT NULL,
        transfer_count INTEGER NOT NULL,
        last_transfer_at INTEGER NOT NULL,
        PRIMARY KEY (sender_id, recipient_id)
    )
    "#,
];

const TRANSACTION_COLUMNS: &str = "id, member_id, amount, balance_after, source, description, \
     metadata, source_id, reversal_of, created_at";

/// SQLite implementation of [`DatabasePort`]
///
/// Each unit of work runs in one SQLite transaction. The first statements of the transaction
/// touch the balance rows of every member in the unit, in ascending member order, which takes
/// the write lock before anything is read.
#[derive(Clone, Debug)]
pub struct SqliteDatabase {
    pool: SqlitePool,
}

impl SqliteDatabase {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (and create if needed) a database, then initialize the schema
    pub async fn connect(url: &str) -> Result<Self, Error> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        let database = Self::new(pool);
        database.init().await?;
        tracing::info!(url, "Connected to SQLite ledger store");
        Ok(database)
    }

    /// Connect to the database named by [`LedgerConfig::database_url`]
    pub async fn from_config(config: &LedgerConfig) -> Result<Self, Error> {
        Self::connect(&config.database_url).await
    }

    /// Private in-memory database
    ///
    /// The pool keeps a single connection alive forever, since the data disappears with it.
    pub async fn in_memory() -> Result<Self, Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        let database = Self::new(pool);
        database.init().await?;
        Ok(database)
    }

    /// Initialize the database schema.
    pub async fn init(&self) -> Result<(), Error> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn apply_unit(conn: &mut SqliteConnection, unit: UnitOfWork) -> Result<Committed, Error> {
        let now = Utc::now().trunc_subsecs(6);
        let member_ids = unit.member_ids();

        for member_id in &member_ids {
            sqlx::query("UPDATE balances SET member_id = member_id WHERE member_id = ?")
                .bind(member_id.to_string())
                .execute(&mut *conn)
                .await?;
        }

        let mut staged: BTreeMap<Uuid, Option<Balance>> = BTreeMap::new();
        for member_id in member_ids {
            let balance = Self::load_balance(&mut *conn, member_id).await?;
            staged.insert(member_id, balance);
        }

        let mut reversals = HashSet::new();
        let mut transactions = Vec::with_capacity(unit.postings.len());
        let mut balances = Vec::with_capacity(unit.postings.len());

        for posting in unit.postings {
            debug_assert_ne!(posting.amount, 0, "zero amounts are never recorded");
            let member_id = posting.member_id;

            if let Some(target) = posting.reversal_of {
                let target_str = target.to_string();
                let exists = sqlx::query("SELECT 1 FROM transactions WHERE id = ?")
                    .bind(&target_str)
                    .fetch_optional(&mut *conn)
                    .await?;
                if exists.is_none() {
                    return Err(Error::TransactionNotFound(target));
                }
                let reversed = sqlx::query("SELECT 1 FROM transactions WHERE reversal_of = ?")
                    .bind(&target_str)
                    .fetch_optional(&mut *conn)
                    .await?;
                if reversed.is_some() || !reversals.insert(target) {
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

        for balance in staged.into_values().flatten() {
            Self::store_balance(&mut *conn, &balance).await?;
        }
        for transaction in &transactions {
            Self::insert_transaction(&mut *conn, transaction).await?;
        }
        if let Some(update) = unit.directory {
            sqlx::query(
                r#"
                INSERT INTO transfer_directory
                    (sender_id, recipient_id, transfer_count, last_transfer_at)
                VALUES (?, ?, 1, ?)
                ON CONFLICT (sender_id, recipient_id) DO UPDATE SET
                    transfer_count = transfer_count + 1,
                    last_transfer_at = excluded.last_transfer_at
                "#,
            )
            .bind(update.sender_id.to_string())
            .bind(update.recipient_id.to_string())
            .bind(now.timestamp_micros())
            .execute(&mut *conn)
            .await?;
        }

        Ok(Committed {
            transactions,
            balances,
        })
    }

    async fn load_balance(
        conn: &mut SqliteConnection,
        member_id: Uuid,
    ) -> Result<Option<Balance>, Error> {
        let row = sqlx::query(
            "SELECT member_id, balance, lifetime_earned, lifetime_spent, last_transaction_at \
             FROM balances WHERE member_id = ?",
        )
        .bind(member_id.to_string())
        .fetch_optional(&mut *conn)
        .await?;

        row.as_ref().map(balance_from_row).transpose()
    }

    async fn store_balance(conn: &mut SqliteConnection, balance: &Balance) -> Result<(), Error> {
        sqlx::query(
            r#"
            INSERT INTO balances
                (member_id, balance, lifetime_earned, lifetime_spent, last_transaction_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (member_id) DO UPDATE SET
                balance = excluded.balance,
                lifetime_earned = excluded.lifetime_earned,
                lifetime_spent = excluded.lifetime_spent,
                last_transaction_at = excluded.last_transaction_at
            "#,
        )
        .bind(balance.member_id.to_string())
        .bind(balance.balance)
        .bind(balance.lifetime_earned)
        .bind(balance.lifetime_spent)
        .bind(balance.last_transaction_at.map(|at| at.timestamp_micros()))
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    async fn insert_transaction(
        conn: &mut SqliteConnection,
        transaction: &Transaction,
    ) -> Result<(), Error> {
        let metadata = serde_json::to_string(&transaction.metadata).map_err(adapter)?;
        sqlx::query(&format!(
            "INSERT INTO transactions ({TRANSACTION_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(transaction.id.to_string())
        .bind(transaction.member_id.to_string())
        .bind(transaction.amount)
        .bind(transaction.balance_after)
        .bind(transaction.source.as_str())
        .bind(&transaction.description)
        .bind(metadata)
        .bind(transaction.source_id.as_deref())
        .bind(transaction.reversal_of.map(|id| id.to_string()))
        .bind(transaction.created_at.timestamp_micros())
        .execute(&mut *conn)
        .await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl DatabasePort for SqliteDatabase {
    async fn get_balance(&self, member_id: Uuid) -> Result<Balance, Error> {
        let mut conn = self.pool.acquire().await?;
        sqlx::query(
            "INSERT INTO balances (member_id, balance, lifetime_earned, lifetime_spent) \
             VALUES (?, 0, 0, 0) ON CONFLICT (member_id) DO NOTHING",
        )
        .bind(member_id.to_string())
        .execute(&mut *conn)
        .await?;

        Self::load_balance(&mut conn, member_id)
            .await?
            .ok_or(Error::BalanceNotFound(member_id))
    }

    async fn find_balance(&self, member_id: Uuid) -> Result<Option<Balance>, Error> {
        let mut conn = self.pool.acquire().await?;
        Self::load_balance(&mut conn, member_id).await
    }

    async fn commit(&self, unit: UnitOfWork) -> Result<Committed, Error> {
        // Dropping `tx` without committing rolls everything back
        let mut tx = self.pool.begin().await?;
        let committed = Self::apply_unit(&mut tx, unit).await?;
        tx.commit().await?;
        Ok(committed)
    }

    async fn get_transaction(&self, transaction_id: Uuid) -> Result<Option<Transaction>, Error> {
        let row = sqlx::query(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = ?"
        ))
        .bind(transaction_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(transaction_from_row).transpose()
    }

    async fn list_transactions(
        &self,
        member_id: Uuid,
        filter: &HistoryFilter,
        page: PageRequest,
    ) -> Result<Page<Transaction>, Error> {
        let mut count =
            QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM transactions WHERE member_id = ");
        count.push_bind(member_id.to_string());
        push_filter(&mut count, filter);
        let total: i64 = count.build().fetch_one(&self.pool).await?.try_get(0)?;

        let mut select = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE member_id = "
        ));
        select.push_bind(member_id.to_string());
        push_filter(&mut select, filter);
        select.push(" ORDER BY seq DESC LIMIT ");
        select.push_bind(page.limit() as i64);
        select.push(" OFFSET ");
        select.push_bind(page.offset() as i64);
        let rows = select.build().fetch_all(&self.pool).await?;

        let items = rows
            .iter()
            .map(transaction_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Page::new(items, page, total as u64))
    }

    async fn transactions_in(
        &self,
        member_id: Option<Uuid>,
        window: TimeWindow,
    ) -> Result<Vec<Transaction>, Error> {
        let mut select = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE 1 = 1"
        ));
        if let Some(member_id) = member_id {
            select.push(" AND member_id = ");
            select.push_bind(member_id.to_string());
        }
        push_window(&mut select, window);
        select.push(" ORDER BY seq ASC");
        let rows = select.build().fetch_all(&self.pool).await?;

        rows.iter().map(transaction_from_row).collect()
    }

    async fn list_balances(&self) -> Result<Vec<Balance>, Error> {
        let rows = sqlx::query(
            "SELECT member_id, balance, lifetime_earned, lifetime_spent, last_transaction_at \
             FROM balances ORDER BY member_id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(balance_from_row).collect()
    }

    async fn recent_recipients(
        &self,
        sender_id: Uuid,
        limit: Option<usize>,
    ) -> Result<Vec<TransferDirectoryEntry>, Error> {
        let rows = sqlx::query(
            "SELECT sender_id, recipient_id, transfer_count, last_transfer_at \
             FROM transfer_directory WHERE sender_id = ? \
             ORDER BY last_transfer_at DESC, recipient_id ASC LIMIT ?",
        )
        .bind(sender_id.to_string())
        .bind(limit.map_or(-1, |limit| limit as i64))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(TransferDirectoryEntry {
                    sender_id: parse_uuid(row.try_get("sender_id")?)?,
                    recipient_id: parse_uuid(row.try_get("recipient_id")?)?,
                    transfer_count: row.try_get::<i64, _>("transfer_count")? as u64,
                    last_transfer_at: parse_timestamp(row.try_get("last_transfer_at")?)?,
                })
            })
            .collect()
    }
}

fn push_filter(builder: &mut QueryBuilder<'_, Sqlite>, filter: &HistoryFilter) {
    match filter.direction {
        Some(Direction::Credit) => {
            builder.push(" AND amount > 0");
        }
        Some(Direction::Debit) => {
            builder.push(" AND amount < 0");
        }
        None => {}
    }
    if let Some(source) = filter.source {
        builder.push(" AND source = ");
        builder.push_bind(source.as_str());
    }
    push_window(builder, filter.window);
}

fn push_window(builder: &mut QueryBuilder<'_, Sqlite>, window: TimeWindow) {
    if let Some(from) = window.from {
        builder.push(" AND created_at >= ");
        builder.push_bind(from.timestamp_micros());
    }
    if let Some(to) = window.to {
        builder.push(" AND created_at < ");
        builder.push_bind(to.timestamp_micros());
    }
}

fn balance_from_row(row: &SqliteRow) -> Result<Balance, Error> {
    Ok(Balance {
        member_id: parse_uuid(row.try_get("member_id")?)?,
        balance: row.try_get("balance")?,
        lifetime_earned: row.try_get("lifetime_earned")?,
        lifetime_spent: row.try_get("lifetime_spent")?,
        last_transaction_at: row
            .try_get::<Option<i64>, _>("last_transaction_at")?
            .map(parse_timestamp)
            .transpose()?,
    })
}

fn transaction_from_row(row: &SqliteRow) -> Result<Transaction, Error> {
    let metadata: String = row.try_get("metadata")?;
    Ok(Transaction {
        id: parse_uuid(row.try_get("id")?)?,
        member_id: parse_uuid(row.try_get("member_id")?)?,
        amount: row.try_get("amount")?,
        balance_after: row.try_get("balance_after")?,
        source: row.try_get::<&str, _>("source")?.parse().map_err(adapter)?,
        description: row.try_get("description")?,
        metadata: serde_json::from_str(&metadata).map_err(adapter)?,
        source_id: row.try_get("source_id")?,
        reversal_of: row
            .try_get::<Option<&str>, _>("reversal_of")?
            .map(parse_uuid)
            .transpose()?,
        created_at: parse_timestamp(row.try_get("created_at")?)?,
    })
}

fn parse_uuid(value: &str) -> Result<Uuid, Error> {
    Uuid::parse_str(value).map_err(adapter)
}

fn parse_timestamp(micros: i64) -> Result<DateTime<Utc>, Error> {
    DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| Error::Adapter(format!("invalid timestamp: {micros}").into()))
}

fn adapter<E>(err: E) -> Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    Error::Adapter(Box::new(err))
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        adapter(err)
    }
}

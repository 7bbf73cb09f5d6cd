//! Concurrent use of one ledger from many tasks
//!
//! Whatever the interleaving, two operations racing for the same balance or the same refund must
//! never both succeed when only one of them can.

use std::sync::Once;

use points_ledger::{
    adapters::{
        database::memory::MemoryDatabase, member::memory::MemoryMemberDirectory,
        notification::log::LogNotifier, points_config::memory::MemoryPointsConfig,
    },
    commands::{
        credit::CreditRequest, debit::DebitRequest, refund::RefundRequest,
        transfer::TransferRequest,
    },
    domain::TransactionSource,
    ports::{
        database::DatabasePort, member::Member, notification::NotificationPort,
        points_config::PointsConfigPort,
    },
    queries::audit_balance::AuditBalanceRequest,
    DomainLogic, Error, LedgerConfig,
};
use speculoos::prelude::*;
use tokio::task::JoinSet;
use tower::ServiceExt;
use uuid::Uuid;

static TRACING: Once = Once::new();

fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

fn member(members: &MemoryMemberDirectory, name: &str) -> Uuid {
    let member_id = Uuid::new_v4();
    members.insert(Member {
        member_id,
        association_id: Uuid::nil(),
        display_name: name.to_string(),
        active_member: true,
    });
    member_id
}

type MemoryLedger =
    DomainLogic<MemoryDatabase, MemoryMemberDirectory, LogNotifier, MemoryPointsConfig>;

/// Ledger over an in-memory store, with a handle on the store for assertions
fn memory_ledger(members: &MemoryMemberDirectory) -> (MemoryLedger, MemoryDatabase) {
    let database = MemoryDatabase::default();
    let ledger = DomainLogic::new(
        database.clone(),
        members.clone(),
        LogNotifier,
        MemoryPointsConfig::default(),
        LedgerConfig::default(),
    );
    (ledger, database)
}

/// Fire `count` debits of `amount` at a member holding `funds` points
async fn racing_debits<D, N, C>(
    ledger: DomainLogic<D, MemoryMemberDirectory, N, C>,
    database: &D,
    funds: i64,
    amount: i64,
    count: usize,
) where
    D: DatabasePort + 'static,
    N: NotificationPort + 'static,
    C: PointsConfigPort + 'static,
{
    let member_id = Uuid::new_v4();
    ledger
        .clone()
        .oneshot(CreditRequest::new(
            member_id,
            funds,
            TransactionSource::AdminCredit,
        ))
        .await
        .unwrap();

    let mut tasks = JoinSet::new();
    for _ in 0..count {
        let ledger = ledger.clone();
        tasks.spawn(async move {
            ledger
                .oneshot(DebitRequest::new(
                    member_id,
                    amount,
                    TransactionSource::StorePurchase,
                ))
                .await
        });
    }

    let mut succeeded = 0;
    while let Some(res) = tasks.join_next().await {
        match res.unwrap() {
            Ok(_) => succeeded += 1,
            Err(Error::InsufficientBalance { .. }) => {}
            Err(err) => panic!("unexpected error: {err}"),
        }
    }

    let expected = (funds / amount) as usize;
    assert_that!(succeeded).is_equal_to(expected.min(count));
    let balance = database.get_balance(member_id).await.unwrap();
    assert_that!(balance.balance).is_equal_to(funds - amount * succeeded as i64);

    let audit = ledger
        .oneshot(AuditBalanceRequest { member_id })
        .await
        .unwrap();
    assert_that!(audit.is_consistent()).is_true();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_debits_never_overdraw() {
    init_tracing();
    let members = MemoryMemberDirectory::default();
    let (ledger, database) = memory_ledger(&members);

    racing_debits(ledger, &database, 1000, 30, 50).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_refunds_only_one_wins() {
    init_tracing();
    let members = MemoryMemberDirectory::default();
    let (ledger, database) = memory_ledger(&members);
    let member_id = Uuid::new_v4();
    ledger
        .clone()
        .oneshot(CreditRequest::new(
            member_id,
            500,
            TransactionSource::AdminCredit,
        ))
        .await
        .unwrap();
    let purchase = ledger
        .clone()
        .oneshot(DebitRequest::new(
            member_id,
            200,
            TransactionSource::StorePurchase,
        ))
        .await
        .unwrap();

    let mut tasks = JoinSet::new();
    for _ in 0..10 {
        let ledger = ledger.clone();
        tasks.spawn(async move {
            ledger
                .oneshot(RefundRequest {
                    admin_id: Uuid::new_v4(),
                    transaction_id: purchase.id,
                    reason: "Duplicate order".to_string(),
                })
                .await
        });
    }

    let mut succeeded = 0;
    let mut already_refunded = 0;
    while let Some(res) = tasks.join_next().await {
        match res.unwrap() {
            Ok(_) => succeeded += 1,
            Err(Error::AlreadyRefunded(_)) => already_refunded += 1,
            Err(err) => panic!("unexpected error: {err}"),
        }
    }

    assert_that!(succeeded).is_equal_to(1);
    assert_that!(already_refunded).is_equal_to(9);
    let balance = database.get_balance(member_id).await.unwrap();
    assert_that!(balance.balance).is_equal_to(500);
}

/// Fire transfers in both directions between two members holding 100 points each
async fn opposing_transfers<D, N, C>(
    ledger: DomainLogic<D, MemoryMemberDirectory, N, C>,
    database: &D,
    members: &MemoryMemberDirectory,
    count: usize,
) where
    D: DatabasePort + 'static,
    N: NotificationPort + 'static,
    C: PointsConfigPort + 'static,
{
    let ana = member(members, "Ana");
    let bruno = member(members, "Bruno");
    for member_id in [ana, bruno] {
        ledger
            .clone()
            .oneshot(CreditRequest::new(
                member_id,
                100,
                TransactionSource::AdminCredit,
            ))
            .await
            .unwrap();
    }

    let mut tasks = JoinSet::new();
    for i in 0..count {
        let ledger = ledger.clone();
        let (sender_id, recipient_id) = if i % 2 == 0 {
            (ana, bruno)
        } else {
            (bruno, ana)
        };
        tasks.spawn(async move {
            ledger
                .oneshot(TransferRequest {
                    sender_id,
                    recipient_id,
                    amount: 7,
                    message: None,
                })
                .await
        });
    }
    while let Some(res) = tasks.join_next().await {
        match res.unwrap() {
            Ok(_) | Err(Error::InsufficientBalance { .. }) => {}
            Err(err) => panic!("unexpected error: {err}"),
        }
    }

    let total = database.get_balance(ana).await.unwrap().balance
        + database.get_balance(bruno).await.unwrap().balance;
    assert_that!(total).is_equal_to(200);
    for member_id in [ana, bruno] {
        let audit = ledger
            .clone()
            .oneshot(AuditBalanceRequest { member_id })
            .await
            .unwrap();
        assert_that!(audit.is_consistent()).is_true();
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn opposing_transfers_preserve_total() {
    init_tracing();
    let members = MemoryMemberDirectory::default();
    let (ledger, database) = memory_ledger(&members);

    opposing_transfers(ledger, &database, &members, 100).await;
}

#[cfg(feature = "sqlite")]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_debits_never_overdraw_sqlite() {
    use points_ledger::adapters::database::sqlite::SqliteDatabase;

    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("ledger.db").display());
    let database = SqliteDatabase::connect(&url).await.unwrap();
    let ledger = DomainLogic::new(
        database.clone(),
        MemoryMemberDirectory::default(),
        LogNotifier,
        MemoryPointsConfig::default(),
        LedgerConfig::default(),
    );

    racing_debits(ledger, &database, 100, 30, 8).await;
}

#[cfg(feature = "sqlite")]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn opposing_transfers_preserve_total_sqlite() {
    use points_ledger::adapters::database::sqlite::SqliteDatabase;

    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let config = LedgerConfig {
        database_url: format!("sqlite://{}", dir.path().join("ledger.db").display()),
        ..LedgerConfig::default()
    };
    let database = SqliteDatabase::from_config(&config).await.unwrap();
    let members = MemoryMemberDirectory::default();
    let ledger = DomainLogic::new(
        database.clone(),
        members.clone(),
        LogNotifier,
        MemoryPointsConfig::default(),
        config,
    );

    opposing_transfers(ledger, &database, &members, 60).await;
}

//! Shared test utilities for `splitledger`.
//!
//! This module provides helpers for setting up test databases and creating
//! ledger records with sensible defaults.

use crate::{
    core::{
        expense::{self, ExpenseDetails, NewExpense},
        group::{self, GroupDetails},
        money::Money,
        recurring::{self, Frequency, NewRecurringTemplate, RecurringTemplateDetails},
        split::SplitParticipant,
        transaction::NewTransaction,
    },
    errors::Result,
};
use chrono::NaiveDate;
use sea_orm::{ConnectOptions, DatabaseConnection};
use std::{
    path::PathBuf,
    sync::atomic::{AtomicU64, Ordering},
};

static FILE_DB_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Creates an in-memory `SQLite` database with all tables initialized.
/// This is the standard setup for all integration tests.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    init_test_tracing();
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// A file-backed `SQLite` database, removed again when dropped.
pub struct FileTestDb {
    pub db: DatabaseConnection,
    path: PathBuf,
}

impl Drop for FileTestDb {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm", "-journal"] {
            let mut file = self.path.clone().into_os_string();
            file.push(suffix);
            let _ = std::fs::remove_file(file);
        }
    }
}

/// Creates a fresh `SQLite` file in the temp directory behind a pool of
/// `max_connections` connections. Unlike `sqlite::memory:`, which is limited to
/// one connection, concurrent tasks really interleave their transactions here.
pub async fn setup_file_test_db(max_connections: u32) -> Result<FileTestDb> {
    init_test_tracing();
    let path = std::env::temp_dir().join(format!(
        "splitledger-test-{}-{}.sqlite",
        std::process::id(),
        FILE_DB_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));
    let _ = std::fs::remove_file(&path);

    let mut options = ConnectOptions::new(format!("sqlite://{}?mode=rwc", path.display()));
    options
        .max_connections(max_connections)
        .min_connections(1)
        .sqlx_logging(false);
    let db = sea_orm::Database::connect(options).await?;
    crate::config::database::create_tables(&db).await?;
    Ok(FileTestDb { db, path })
}

/// Routes `tracing` output through the test harness. Safe to call repeatedly.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Equal-split participants for the given user ids.
pub fn equal_participants(user_ids: &[&str]) -> Vec<SplitParticipant> {
    user_ids.iter().copied().map(SplitParticipant::equal).collect()
}

/// Creates a group with the given members.
pub async fn create_test_group(
    db: &DatabaseConnection,
    name: &str,
    members: &[&str],
) -> Result<GroupDetails> {
    let members: Vec<String> = members.iter().map(ToString::to_string).collect();
    group::create_group(db, name.to_string(), &members).await
}

/// Creates a personal expense split equally among `participants`.
///
/// # Defaults
/// * `title`: `"Test expense"`
/// * `category`: `"food"`
pub async fn create_test_expense(
    db: &DatabaseConnection,
    sender_id: &str,
    cents: i64,
    participants: &[&str],
) -> Result<ExpenseDetails> {
    expense::create_expense(
        db,
        NewExpense::new(
            sender_id,
            "Test expense",
            Money::from_cents(cents),
            "food",
            equal_participants(participants),
        ),
    )
    .await
}

/// A peer-to-peer transaction request: `sender_id` owes `receiver_id`.
pub fn new_transaction(sender_id: &str, receiver_id: &str, cents: i64) -> NewTransaction {
    NewTransaction {
        sender_id: sender_id.to_string(),
        receiver_id: receiver_id.to_string(),
        amount: Money::from_cents(cents),
        description: "Test transaction".to_string(),
        category: "misc".to_string(),
    }
}

/// A template request with sensible defaults.
///
/// # Defaults
/// * `title`: `"Test template"`
/// * `amount`: 15.00, split equally between `"alice"` and `"bob"`
/// * `category`: `"rent"`
/// * `auto_add`: true, no group
pub fn new_test_template(
    sender_id: &str,
    frequency: Frequency,
    next_due_date: NaiveDate,
) -> NewRecurringTemplate {
    NewRecurringTemplate {
        sender_id: sender_id.to_string(),
        title: "Test template".to_string(),
        amount: Money::from_cents(1500),
        category: "rent".to_string(),
        frequency,
        participants: equal_participants(&["alice", "bob"]),
        group_id: None,
        is_group_expense: false,
        receipt_ref: None,
        next_due_date,
        auto_add: true,
    }
}

/// Stores a template built by [`new_test_template`].
pub async fn create_test_template(
    db: &DatabaseConnection,
    sender_id: &str,
    frequency: Frequency,
    next_due_date: NaiveDate,
) -> Result<RecurringTemplateDetails> {
    recurring::create_recurring_template(db, new_test_template(sender_id, frequency, next_due_date))
        .await
}

//! Settlement processor - turns an unsettled share or transaction into a
//! recorded payment, exactly once.
//!
//! A share moves `Unsettled -> Settled` and never back. The flip is a conditional
//! update (`... WHERE is_settled = false`) executed in the same database
//! transaction that inserts the settlement transaction, so when two requests race
//! only one of them can affect the row; the loser rolls back and reports the
//! winner's transaction. Settling something already settled is not an error: the
//! existing transaction is returned, which keeps retries idempotent.

use crate::{
    config::SettlementConfig,
    core::{
        expense::load_expense,
        money::Money,
        transaction::{NewTransaction, get_transaction_by_id, insert_transaction},
    },
    entities::{ExpenseShare, Transaction, expense_share, transaction},
    errors::{Error, Result},
};
use sea_orm::{TransactionTrait, prelude::*, sea_query::Expr};
use std::future::Future;
use tracing::{info, instrument, warn};

/// Outcome of a settle request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    /// This request performed the transition.
    Created(transaction::Model),
    /// The share or transaction was already settled; this is its transaction.
    AlreadySettled(transaction::Model),
}

impl Settlement {
    #[must_use]
    pub const fn transaction(&self) -> &transaction::Model {
        match self {
            Self::Created(tx) | Self::AlreadySettled(tx) => tx,
        }
    }

    #[must_use]
    pub fn into_transaction(self) -> transaction::Model {
        match self {
            Self::Created(tx) | Self::AlreadySettled(tx) => tx,
        }
    }

    #[must_use]
    pub const fn was_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

/// Whether a store error is worth retrying (lock contention, pool exhaustion).
fn is_transient(err: &DbErr) -> bool {
    if matches!(err, DbErr::ConnectionAcquire(_)) {
        return true;
    }
    let message = err.to_string().to_lowercase();
    message.contains("database is locked") || message.contains("busy")
}

/// Runs `op` until it succeeds, fails permanently, or runs out of attempts.
async fn with_retry<T, F, Fut>(policy: &SettlementConfig, operation: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Err(Error::Database(err)) if attempt < policy.max_attempts && is_transient(&err) => {
                warn!(attempt, error = %err, "Transient store error during {}, retrying", operation);
                tokio::time::sleep(policy.backoff(attempt)).await;
                attempt += 1;
            }
            result => return result,
        }
    }
}

/// Settles the share of `participant_id` on `expense_id` with
/// `SettlementConfig::default()`. Callers that load `ledger.toml` should pass
/// `AppConfig::settlement` to [`settle_share_with`] instead.
pub async fn settle_share(
    db: &DatabaseConnection,
    expense_id: i64,
    participant_id: &str,
) -> Result<Settlement> {
    settle_share_with(db, expense_id, participant_id, &SettlementConfig::default()).await
}

/// Settles one participant share.
///
/// On success the share is settled and points at a new, already settled
/// transaction from the participant to the expense creator for the exact share
/// amount. Repeated or concurrent calls return that same transaction.
///
/// # Errors
/// `NotFound` for an unknown expense or participant, `InvalidSettlement` for the
/// creator's own share, or a database error that persisted across retries.
#[instrument(skip(db, policy))]
pub async fn settle_share_with(
    db: &DatabaseConnection,
    expense_id: i64,
    participant_id: &str,
    policy: &SettlementConfig,
) -> Result<Settlement> {
    let outcome = with_retry(policy, "share settlement", || {
        settle_share_once(db, expense_id, participant_id)
    })
    .await;

    match outcome {
        Err(Error::ConcurrencyConflict { .. }) => {
            // Another request won the race; report its transaction.
            let share = find_share(db, expense_id, participant_id).await?;
            existing_settlement(db, &share).await
        }
        other => other,
    }
}

async fn find_share<C>(conn: &C, expense_id: i64, participant_id: &str) -> Result<expense_share::Model>
where
    C: ConnectionTrait,
{
    ExpenseShare::find()
        .filter(expense_share::Column::ExpenseId.eq(expense_id))
        .filter(expense_share::Column::ParticipantId.eq(participant_id))
        .one(conn)
        .await?
        .ok_or_else(|| Error::not_found("Share", format!("{expense_id}/{participant_id}")))
}

/// Reports the transaction of a share that is already settled.
async fn existing_settlement<C>(conn: &C, share: &expense_share::Model) -> Result<Settlement>
where
    C: ConnectionTrait,
{
    let conflict = || Error::ConcurrencyConflict {
        entity: "Share",
        id: share.id.to_string(),
    };
    if !share.is_settled {
        return Err(conflict());
    }
    let transaction_id = share.transaction_id.ok_or_else(conflict)?;
    let tx = get_transaction_by_id(conn, transaction_id)
        .await?
        .ok_or_else(|| Error::not_found("Transaction", transaction_id))?;
    Ok(Settlement::AlreadySettled(tx))
}

async fn settle_share_once(
    db: &DatabaseConnection,
    expense_id: i64,
    participant_id: &str,
) -> Result<Settlement> {
    let txn = db.begin().await?;

    let details = load_expense(&txn, expense_id).await?;
    let share = details
        .share_for(participant_id)
        .cloned()
        .ok_or_else(|| Error::not_found("Share", format!("{expense_id}/{participant_id}")))?;

    if share.is_settled {
        return existing_settlement(&txn, &share).await;
    }
    if share.participant_id == details.expense.sender_id {
        return Err(Error::InvalidSettlement {
            reason: format!(
                "{} paid expense {expense_id} and cannot settle their own share",
                share.participant_id
            ),
        });
    }

    let tx = insert_transaction(
        &txn,
        NewTransaction {
            sender_id: share.participant_id.clone(),
            receiver_id: details.expense.sender_id.clone(),
            amount: Money::from_cents(share.amount),
            description: format!("Settlement of {}", details.expense.title),
            category: details.expense.category.clone(),
        },
        true,
        Some(expense_id),
    )
    .await?;

    let flipped = ExpenseShare::update_many()
        .col_expr(expense_share::Column::IsSettled, Expr::value(true))
        .col_expr(expense_share::Column::TransactionId, Expr::value(tx.id))
        .filter(expense_share::Column::Id.eq(share.id))
        .filter(expense_share::Column::IsSettled.eq(false))
        .exec(&txn)
        .await?;

    if flipped.rows_affected == 0 {
        txn.rollback().await?;
        return Err(Error::ConcurrencyConflict {
            entity: "Share",
            id: share.id.to_string(),
        });
    }

    txn.commit().await?;
    info!(
        expense_id,
        participant = %share.participant_id,
        transaction_id = tx.id,
        amount = %Money::from_cents(tx.amount),
        "Settled share"
    );
    Ok(Settlement::Created(tx))
}

/// Settles a peer-to-peer transaction with `SettlementConfig::default()`. See
/// [`settle_transaction_with`] for a configured retry policy.
pub async fn settle_transaction(db: &DatabaseConnection, transaction_id: i64) -> Result<Settlement> {
    settle_transaction_with(db, transaction_id, &SettlementConfig::default()).await
}

/// Marks a transaction settled. The flag only moves from `false` to `true`;
/// settling a settled transaction returns it unchanged.
#[instrument(skip(db, policy))]
pub async fn settle_transaction_with(
    db: &DatabaseConnection,
    transaction_id: i64,
    policy: &SettlementConfig,
) -> Result<Settlement> {
    with_retry(policy, "transaction settlement", || {
        settle_transaction_once(db, transaction_id)
    })
    .await
}

async fn settle_transaction_once(db: &DatabaseConnection, transaction_id: i64) -> Result<Settlement> {
    let flipped = Transaction::update_many()
        .col_expr(transaction::Column::IsSettled, Expr::value(true))
        .filter(transaction::Column::Id.eq(transaction_id))
        .filter(transaction::Column::IsSettled.eq(false))
        .exec(db)
        .await?;

    let tx = get_transaction_by_id(db, transaction_id)
        .await?
        .ok_or_else(|| Error::not_found("Transaction", transaction_id))?;

    if flipped.rows_affected == 0 {
        return Ok(Settlement::AlreadySettled(tx));
    }
    info!(transaction_id, "Settled transaction");
    Ok(Settlement::Created(tx))
}

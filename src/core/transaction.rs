//! Transaction business logic - Records and queries directed money movements.
//!
//! Peer-to-peer transactions start unsettled, meaning the sender owes the
//! receiver. Settlement transactions are written by the settlement processor,
//! already settled. Every new transaction is appended to the friend lists of the
//! two users involved in the same database transaction.

use crate::{
    core::{friend, money::Money},
    entities::{Transaction, transaction},
    errors::{Error, Result},
};
use sea_orm::{Condition, QueryOrder, Set, TransactionTrait, prelude::*};
use tracing::info;

/// Request to record a peer-to-peer transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTransaction {
    pub sender_id: String,
    pub receiver_id: String,
    pub amount: Money,
    pub description: String,
    pub category: String,
}

/// Inserts a transaction row and links it to the friend lists of both parties.
pub(crate) async fn insert_transaction<C>(
    conn: &C,
    new: NewTransaction,
    is_settled: bool,
    expense_id: Option<i64>,
) -> Result<transaction::Model>
where
    C: ConnectionTrait,
{
    let model = transaction::ActiveModel {
        amount: Set(new.amount.cents()),
        date: Set(chrono::Utc::now()),
        description: Set(new.description),
        category: Set(new.category),
        sender_id: Set(new.sender_id),
        receiver_id: Set(new.receiver_id),
        is_settled: Set(is_settled),
        expense_id: Set(expense_id),
        ..Default::default()
    }
    .insert(conn)
    .await?;

    friend::link_transaction(conn, &model).await?;
    Ok(model)
}

/// Records an unsettled peer-to-peer transaction: `sender_id` owes `receiver_id`.
///
/// # Errors
/// Returns an error if the amount is not positive or both parties are the same user.
pub async fn record_transaction(
    db: &DatabaseConnection,
    new: NewTransaction,
) -> Result<transaction::Model> {
    if !new.amount.is_positive() {
        return Err(Error::InvalidAmount {
            reason: format!("transaction amount must be positive, got {}", new.amount),
        });
    }
    if new.sender_id == new.receiver_id {
        return Err(Error::validation("A transaction needs two different users"));
    }

    let txn = db.begin().await?;
    let model = insert_transaction(&txn, new, false, None).await?;
    txn.commit().await?;

    info!(
        transaction_id = model.id,
        sender = %model.sender_id,
        receiver = %model.receiver_id,
        "Recorded peer-to-peer transaction"
    );
    Ok(model)
}

/// Retrieves a specific transaction by its unique ID.
pub async fn get_transaction_by_id<C>(
    conn: &C,
    transaction_id: i64,
) -> Result<Option<transaction::Model>>
where
    C: ConnectionTrait,
{
    Transaction::find_by_id(transaction_id)
        .one(conn)
        .await
        .map_err(Into::into)
}

/// Full history between two users in either direction, settled ones included,
/// newest first.
pub async fn transactions_between(
    db: &DatabaseConnection,
    user_a: &str,
    user_b: &str,
) -> Result<Vec<transaction::Model>> {
    Transaction::find()
        .filter(
            Condition::any()
                .add(
                    Condition::all()
                        .add(transaction::Column::SenderId.eq(user_a))
                        .add(transaction::Column::ReceiverId.eq(user_b)),
                )
                .add(
                    Condition::all()
                        .add(transaction::Column::SenderId.eq(user_b))
                        .add(transaction::Column::ReceiverId.eq(user_a)),
                ),
        )
        .order_by_desc(transaction::Column::Date)
        .order_by_desc(transaction::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::test_utils::*;

    #[tokio::test]
    async fn test_record_transaction_validation() -> Result<()> {
        let db = setup_test_db().await?;

        let result = record_transaction(&db, new_transaction("alice", "bob", 0)).await;
        assert!(matches!(result, Err(Error::InvalidAmount { .. })));

        let result = record_transaction(&db, new_transaction("alice", "bob", -100)).await;
        assert!(matches!(result, Err(Error::InvalidAmount { .. })));

        let result = record_transaction(&db, new_transaction("alice", "alice", 100)).await;
        assert!(matches!(result, Err(Error::Validation { .. })));

        assert_eq!(Transaction::find().count(&db).await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_record_transaction_integration() -> Result<()> {
        let db = setup_test_db().await?;

        let before = chrono::Utc::now();
        let recorded = record_transaction(&db, new_transaction("alice", "bob", 1250)).await?;
        let after = chrono::Utc::now();

        assert_eq!(recorded.amount, 1250);
        assert_eq!(recorded.sender_id, "alice");
        assert_eq!(recorded.receiver_id, "bob");
        assert!(!recorded.is_settled);
        assert!(recorded.expense_id.is_none());
        assert!(recorded.date >= before && recorded.date <= after);

        let found = get_transaction_by_id(&db, recorded.id).await?.unwrap();
        assert_eq!(found, recorded);
        assert!(get_transaction_by_id(&db, 999).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_transactions_between_covers_both_directions() -> Result<()> {
        let db = setup_test_db().await?;

        let first = record_transaction(&db, new_transaction("alice", "bob", 100)).await?;
        let second = record_transaction(&db, new_transaction("bob", "alice", 200)).await?;
        record_transaction(&db, new_transaction("alice", "carol", 300)).await?;

        let history = transactions_between(&db, "alice", "bob").await?;
        assert_eq!(history, vec![second.clone(), first.clone()]);

        let reversed = transactions_between(&db, "bob", "alice").await?;
        assert_eq!(reversed, vec![second, first]);

        assert!(transactions_between(&db, "bob", "carol").await?.is_empty());
        Ok(())
    }
}

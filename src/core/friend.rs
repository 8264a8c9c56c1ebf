//! Friend business logic.
//!
//! A friend row is unique per ordered `(user, friend)` pair. Its transaction list
//! is a back-reference only: the list rows point at transactions by id and are
//! appended whenever a transaction between the two users is written.

use crate::{
    entities::{Friend, FriendTransaction, Transaction, friend, friend_transaction, transaction},
    errors::{Error, Result},
};
use sea_orm::{QueryOrder, Set, SqlErr, prelude::*};
use tracing::debug;

/// Starts tracking `friend_id` for `user_id`. Adding an existing pair returns the
/// existing row.
pub async fn add_friend(
    db: &DatabaseConnection,
    user_id: &str,
    friend_id: &str,
) -> Result<friend::Model> {
    if user_id.trim().is_empty() || friend_id.trim().is_empty() {
        return Err(Error::validation("Friend ids cannot be empty"));
    }
    if user_id == friend_id {
        return Err(Error::validation("A user cannot befriend themselves"));
    }

    if let Some(existing) = find_friend(db, user_id, friend_id).await? {
        return Ok(existing);
    }

    let inserted = friend::ActiveModel {
        user_id: Set(user_id.to_string()),
        friend_id: Set(friend_id.to_string()),
        created_at: Set(chrono::Utc::now()),
    }
    .insert(db)
    .await;

    match inserted {
        Ok(model) => Ok(model),
        // A concurrent call added the same pair first
        Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
            debug!(user = %user_id, friend = %friend_id, "Friend row added concurrently");
            find_friend(db, user_id, friend_id)
                .await?
                .ok_or_else(|| Error::not_found("Friend", format!("{user_id}/{friend_id}")))
        }
        Err(e) => Err(e.into()),
    }
}

async fn find_friend<C>(conn: &C, user_id: &str, friend_id: &str) -> Result<Option<friend::Model>>
where
    C: ConnectionTrait,
{
    Friend::find_by_id((user_id.to_string(), friend_id.to_string()))
        .one(conn)
        .await
        .map_err(Into::into)
}

/// Friends tracked by `user_id`, ordered by friend id.
pub async fn get_friends(db: &DatabaseConnection, user_id: &str) -> Result<Vec<friend::Model>> {
    Friend::find()
        .filter(friend::Column::UserId.eq(user_id))
        .order_by_asc(friend::Column::FriendId)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Appends `tx` to the transaction list of every friend row linking its sender
/// and receiver, in either direction.
pub(crate) async fn link_transaction<C>(conn: &C, tx: &transaction::Model) -> Result<()>
where
    C: ConnectionTrait,
{
    for (user_id, friend_id) in [
        (&tx.sender_id, &tx.receiver_id),
        (&tx.receiver_id, &tx.sender_id),
    ] {
        let tracked = Friend::find_by_id((user_id.clone(), friend_id.clone()))
            .one(conn)
            .await?
            .is_some();
        if !tracked {
            continue;
        }

        friend_transaction::ActiveModel {
            user_id: Set(user_id.clone()),
            friend_id: Set(friend_id.clone()),
            transaction_id: Set(tx.id),
        }
        .insert(conn)
        .await?;
        debug!(user = %user_id, friend = %friend_id, transaction_id = tx.id, "Linked transaction to friend");
    }
    Ok(())
}

/// Transactions on the list of the `(user_id, friend_id)` relation, oldest first.
pub async fn friend_transactions(
    db: &DatabaseConnection,
    user_id: &str,
    friend_id: &str,
) -> Result<Vec<transaction::Model>> {
    let ids: Vec<i64> = FriendTransaction::find()
        .filter(friend_transaction::Column::UserId.eq(user_id))
        .filter(friend_transaction::Column::FriendId.eq(friend_id))
        .all(db)
        .await?
        .into_iter()
        .map(|link| link.transaction_id)
        .collect();

    Transaction::find()
        .filter(transaction::Column::Id.is_in(ids))
        .order_by_asc(transaction::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::core::transaction::record_transaction;
    use crate::test_utils::*;
    use tokio::task::JoinSet;

    #[tokio::test]
    async fn test_add_friend_is_idempotent() -> Result<()> {
        let db = setup_test_db().await?;

        let first = add_friend(&db, "alice", "bob").await?;
        let second = add_friend(&db, "alice", "bob").await?;
        assert_eq!(first, second);

        add_friend(&db, "alice", "carol").await?;
        let friends: Vec<String> = get_friends(&db, "alice")
            .await?
            .into_iter()
            .map(|f| f.friend_id)
            .collect();
        assert_eq!(friends, vec!["bob", "carol"]);

        // Ordered pair: bob does not track alice yet
        assert!(get_friends(&db, "bob").await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_duplicate_friend_insert_is_a_unique_violation() -> Result<()> {
        let db = setup_test_db().await?;
        let first = add_friend(&db, "alice", "bob").await?;

        // The error add_friend recovers from when another call wins the insert
        let err = friend::ActiveModel {
            user_id: Set("alice".to_string()),
            friend_id: Set("bob".to_string()),
            created_at: Set(chrono::Utc::now()),
        }
        .insert(&db)
        .await
        .unwrap_err();
        assert!(matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))));

        assert_eq!(add_friend(&db, "alice", "bob").await?, first);
        Ok(())
    }

    #[tokio::test]
    async fn test_concurrent_add_friend_returns_one_row() -> Result<()> {
        let file_db = setup_file_test_db(8).await?;

        let mut tasks = JoinSet::new();
        for _ in 0..12 {
            let db = file_db.db.clone();
            tasks.spawn(async move { add_friend(&db, "alice", "bob").await });
        }

        let mut rows = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            rows.push(joined.unwrap()?);
        }

        assert_eq!(rows.len(), 12);
        assert!(rows.iter().all(|row| *row == rows[0]));
        assert_eq!(get_friends(&file_db.db, "alice").await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_add_friend_validation() -> Result<()> {
        let db = setup_test_db().await?;
        assert!(matches!(
            add_friend(&db, "alice", "alice").await,
            Err(Error::Validation { .. })
        ));
        assert!(matches!(
            add_friend(&db, "", "bob").await,
            Err(Error::Validation { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_transactions_are_linked_to_tracking_friends() -> Result<()> {
        let db = setup_test_db().await?;
        add_friend(&db, "alice", "bob").await?;

        let tx = record_transaction(&db, new_transaction("bob", "alice", 500)).await?;
        let other = record_transaction(&db, new_transaction("alice", "carol", 700)).await?;

        let linked = friend_transactions(&db, "alice", "bob").await?;
        assert_eq!(linked, vec![tx]);

        // Nobody tracks the (bob, alice) or (alice, carol) relations
        assert!(friend_transactions(&db, "bob", "alice").await?.is_empty());
        assert!(friend_transactions(&db, "alice", "carol").await?.is_empty());
        assert!(!other.is_settled);
        Ok(())
    }
}

//! Group business logic.
//!
//! Groups are context for group-scoped expenses. Membership is read as input; the
//! ledger itself only keeps the denormalized `total_expense` in step with the
//! expenses recorded under a group.

use crate::{
    core::money::Money,
    entities::{Group, GroupMember, group, group_member},
    errors::{Error, Result},
};
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*, sea_query::Expr};
use std::collections::BTreeSet;

/// A group together with its member ids (sorted).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupDetails {
    pub group: group::Model,
    pub members: Vec<String>,
}

impl GroupDetails {
    #[must_use]
    pub fn total_expense(&self) -> Money {
        Money::from_cents(self.group.total_expense)
    }

    #[must_use]
    pub fn is_member(&self, user_id: &str) -> bool {
        self.members.iter().any(|m| m == user_id)
    }
}

/// Creates a group with the given members. Duplicate member ids are collapsed.
pub async fn create_group(
    db: &DatabaseConnection,
    name: String,
    members: &[String],
) -> Result<GroupDetails> {
    if name.trim().is_empty() {
        return Err(Error::validation("Group name cannot be empty"));
    }
    let members: BTreeSet<&str> = members.iter().map(|m| m.trim()).collect();
    if members.is_empty() || members.contains("") {
        return Err(Error::validation("Group needs at least one non-empty member id"));
    }

    let txn = db.begin().await?;

    let group = group::ActiveModel {
        name: Set(name.trim().to_string()),
        total_expense: Set(0),
        created_at: Set(chrono::Utc::now()),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    for member in &members {
        group_member::ActiveModel {
            group_id: Set(group.id),
            user_id: Set((*member).to_string()),
        }
        .insert(&txn)
        .await?;
    }

    txn.commit().await?;

    Ok(GroupDetails {
        group,
        members: members.into_iter().map(ToString::to_string).collect(),
    })
}

/// Loads a group and its members, returning `None` if it does not exist.
pub async fn get_group<C>(conn: &C, group_id: i64) -> Result<Option<GroupDetails>>
where
    C: ConnectionTrait,
{
    let Some(group) = Group::find_by_id(group_id).one(conn).await? else {
        return Ok(None);
    };
    let members = get_group_members(conn, group_id).await?;
    Ok(Some(GroupDetails { group, members }))
}

/// Member ids of a group, sorted.
pub async fn get_group_members<C>(conn: &C, group_id: i64) -> Result<Vec<String>>
where
    C: ConnectionTrait,
{
    Ok(GroupMember::find()
        .filter(group_member::Column::GroupId.eq(group_id))
        .order_by_asc(group_member::Column::UserId)
        .all(conn)
        .await?
        .into_iter()
        .map(|m| m.user_id)
        .collect())
}

/// Atomically adds `delta` to the group's `total_expense`:
/// `UPDATE groups SET total_expense = total_expense + delta WHERE id = ?`
pub(crate) async fn adjust_group_total<C>(conn: &C, group_id: i64, delta: Money) -> Result<()>
where
    C: ConnectionTrait,
{
    let result = Group::update_many()
        .col_expr(
            group::Column::TotalExpense,
            Expr::col(group::Column::TotalExpense).add(delta.cents()),
        )
        .filter(group::Column::Id.eq(group_id))
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        return Err(Error::not_found("Group", group_id));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::test_utils::*;

    #[tokio::test]
    async fn test_create_group_validation() -> Result<()> {
        let db = setup_test_db().await?;

        let result = create_group(&db, "  ".to_string(), &["alice".to_string()]).await;
        assert!(matches!(result, Err(Error::Validation { .. })));

        let result = create_group(&db, "Flat".to_string(), &[]).await;
        assert!(matches!(result, Err(Error::Validation { .. })));

        assert_eq!(Group::find().count(&db).await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_create_and_get_group() -> Result<()> {
        let db = setup_test_db().await?;
        let created = create_test_group(&db, "Flat", &["carol", "alice", "bob", "alice"]).await?;

        assert_eq!(created.members, vec!["alice", "bob", "carol"]);
        assert_eq!(created.total_expense(), Money::ZERO);

        let loaded = get_group(&db, created.group.id).await?.unwrap();
        assert_eq!(loaded, created);
        assert!(loaded.is_member("bob"));
        assert!(!loaded.is_member("mallory"));

        assert!(get_group(&db, 999).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_adjust_group_total() -> Result<()> {
        let db = setup_test_db().await?;
        let created = create_test_group(&db, "Trip", &["alice"]).await?;

        adjust_group_total(&db, created.group.id, Money::from_cents(1500)).await?;
        adjust_group_total(&db, created.group.id, Money::from_cents(-500)).await?;

        let loaded = get_group(&db, created.group.id).await?.unwrap();
        assert_eq!(loaded.total_expense(), Money::from_cents(1000));

        let missing = adjust_group_total(&db, 999, Money::from_cents(1)).await;
        assert!(matches!(missing, Err(Error::NotFound { .. })));
        Ok(())
    }
}

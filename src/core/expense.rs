//! Expense business logic - Creates, reads, edits and removes expense aggregates.
//!
//! An expense and its participant shares are one aggregate: they are loaded
//! together, written inside a single database transaction, and the shares always
//! add up to the expense amount. Creating an expense under a group also bumps the
//! group's `total_expense` in the same transaction.

use crate::{
    core::{
        group,
        money::Money,
        split::{self, ShareAllocation, SplitParticipant},
    },
    entities::{Expense, ExpenseShare, expense, expense_share},
    errors::{Error, Result},
};
use sea_orm::{Condition, QueryOrder, Set, TransactionTrait, prelude::*, sea_query::Expr};
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Request to record a new expense.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewExpense {
    pub sender_id: String,
    pub title: String,
    pub amount: Money,
    pub category: String,
    pub participants: Vec<SplitParticipant>,
    pub group_id: Option<i64>,
    pub is_group_expense: bool,
    pub receipt_ref: Option<String>,
    pub template_id: Option<i64>,
}

impl NewExpense {
    /// A personal (non-group) expense without receipt.
    #[must_use]
    pub fn new(
        sender_id: impl Into<String>,
        title: impl Into<String>,
        amount: Money,
        category: impl Into<String>,
        participants: Vec<SplitParticipant>,
    ) -> Self {
        Self {
            sender_id: sender_id.into(),
            title: title.into(),
            amount,
            category: category.into(),
            participants,
            group_id: None,
            is_group_expense: false,
            receipt_ref: None,
            template_id: None,
        }
    }

    /// Records the expense under `group_id`.
    #[must_use]
    pub fn in_group(mut self, group_id: i64) -> Self {
        self.group_id = Some(group_id);
        self.is_group_expense = true;
        self
    }

    #[must_use]
    pub fn with_receipt(mut self, receipt_ref: impl Into<String>) -> Self {
        self.receipt_ref = Some(receipt_ref.into());
        self
    }
}

/// Changes to an existing expense; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpenseUpdate {
    pub title: Option<String>,
    pub category: Option<String>,
    pub amount: Option<Money>,
}

/// An expense together with the shares it owns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpenseDetails {
    pub expense: expense::Model,
    pub shares: Vec<expense_share::Model>,
}

impl ExpenseDetails {
    #[must_use]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.expense.amount)
    }

    #[must_use]
    pub fn share_for(&self, participant_id: &str) -> Option<&expense_share::Model> {
        self.shares
            .iter()
            .find(|share| share.participant_id == participant_id)
    }

    #[must_use]
    pub fn shares_total(&self) -> Money {
        self.shares
            .iter()
            .map(|share| Money::from_cents(share.amount))
            .sum()
    }

    #[must_use]
    pub fn has_settled_shares(&self) -> bool {
        self.shares.iter().any(|share| share.is_settled)
    }

    fn allocations(&self) -> Vec<ShareAllocation> {
        self.shares
            .iter()
            .map(|share| ShareAllocation {
                user_id: share.participant_id.clone(),
                amount: Money::from_cents(share.amount),
            })
            .collect()
    }
}

/// Validates the request and computes its shares. Runs before any write.
fn prepare_expense(new: &NewExpense) -> Result<Vec<ShareAllocation>> {
    if new.title.trim().is_empty() {
        return Err(Error::validation("Expense title cannot be empty"));
    }
    if new.sender_id.trim().is_empty() {
        return Err(Error::validation("Expense sender cannot be empty"));
    }
    split::split(new.amount, &new.participants)
}

/// Writes an already validated expense, its shares and the group total through
/// `conn`. Callers own the surrounding database transaction.
pub(crate) async fn insert_expense<C>(conn: &C, new: &NewExpense) -> Result<ExpenseDetails>
where
    C: ConnectionTrait,
{
    let allocations = prepare_expense(new)?;

    if let Some(group_id) = new.group_id {
        let group = group::get_group(conn, group_id)
            .await?
            .ok_or_else(|| Error::not_found("Group", group_id))?;
        if let Some(outsider) = allocations.iter().find(|a| !group.is_member(&a.user_id)) {
            return Err(Error::invalid_split(format!(
                "participant {} is not a member of group {}",
                outsider.user_id, group.group.name
            )));
        }
    }

    let expense = expense::ActiveModel {
        title: Set(new.title.trim().to_string()),
        amount: Set(new.amount.cents()),
        category: Set(new.category.clone()),
        sender_id: Set(new.sender_id.clone()),
        group_id: Set(new.group_id),
        is_group_expense: Set(new.is_group_expense),
        receipt_ref: Set(new.receipt_ref.clone()),
        template_id: Set(new.template_id),
        created_at: Set(chrono::Utc::now()),
        ..Default::default()
    }
    .insert(conn)
    .await?;

    let mut shares = Vec::with_capacity(allocations.len());
    for allocation in allocations {
        let share = expense_share::ActiveModel {
            expense_id: Set(expense.id),
            participant_id: Set(allocation.user_id),
            amount: Set(allocation.amount.cents()),
            is_settled: Set(false),
            transaction_id: Set(None),
            ..Default::default()
        }
        .insert(conn)
        .await?;
        shares.push(share);
    }

    if let Some(group_id) = new.group_id {
        group::adjust_group_total(conn, group_id, new.amount).await?;
    }

    debug!(
        expense_id = expense.id,
        shares = shares.len(),
        "Expense aggregate written"
    );
    Ok(ExpenseDetails { expense, shares })
}

/// Records a new expense, splitting its amount across the participants.
///
/// # Errors
/// `InvalidSplit` (before anything is written) when the split is malformed,
/// `Validation` for an empty title, `NotFound` for an unknown group.
pub async fn create_expense(db: &DatabaseConnection, new: NewExpense) -> Result<ExpenseDetails> {
    prepare_expense(&new)?;

    let txn = db.begin().await?;
    let details = insert_expense(&txn, &new).await?;
    txn.commit().await?;

    info!(
        expense_id = details.expense.id,
        sender = %details.expense.sender_id,
        amount = %details.amount(),
        "Created expense"
    );
    Ok(details)
}

/// Records an expense under a group, split equally among all current members.
pub async fn create_group_expense(
    db: &DatabaseConnection,
    group_id: i64,
    sender_id: String,
    title: String,
    amount: Money,
    category: String,
) -> Result<ExpenseDetails> {
    let members = group::get_group_members(db, group_id).await?;
    if members.is_empty() {
        return Err(Error::not_found("Group", group_id));
    }
    let participants = members.into_iter().map(SplitParticipant::equal).collect();
    create_expense(
        db,
        NewExpense::new(sender_id, title, amount, category, participants).in_group(group_id),
    )
    .await
}

/// Loads an expense aggregate through any connection or transaction.
pub(crate) async fn load_expense<C>(conn: &C, expense_id: i64) -> Result<ExpenseDetails>
where
    C: ConnectionTrait,
{
    let expense = Expense::find_by_id(expense_id)
        .one(conn)
        .await?
        .ok_or_else(|| Error::not_found("Expense", expense_id))?;
    let shares = expense
        .find_related(ExpenseShare)
        .order_by_asc(expense_share::Column::Id)
        .all(conn)
        .await?;
    Ok(ExpenseDetails { expense, shares })
}

/// Retrieves an expense with its shares, or `None` if it does not exist.
pub async fn get_expense(db: &DatabaseConnection, expense_id: i64) -> Result<Option<ExpenseDetails>> {
    match load_expense(db, expense_id).await {
        Ok(details) => Ok(Some(details)),
        Err(Error::NotFound { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Expenses a user created or takes part in, newest first.
pub async fn list_expenses_for_user(
    db: &DatabaseConnection,
    user_id: &str,
) -> Result<Vec<ExpenseDetails>> {
    let participating: BTreeSet<i64> = ExpenseShare::find()
        .filter(expense_share::Column::ParticipantId.eq(user_id))
        .all(db)
        .await?
        .into_iter()
        .map(|share| share.expense_id)
        .collect();

    let expenses = Expense::find()
        .filter(
            Condition::any()
                .add(expense::Column::SenderId.eq(user_id))
                .add(expense::Column::Id.is_in(participating)),
        )
        .order_by_desc(expense::Column::CreatedAt)
        .order_by_desc(expense::Column::Id)
        .all(db)
        .await?;

    let mut result = Vec::with_capacity(expenses.len());
    for expense in expenses {
        let shares = expense
            .find_related(ExpenseShare)
            .order_by_asc(expense_share::Column::Id)
            .all(db)
            .await?;
        result.push(ExpenseDetails { expense, shares });
    }
    Ok(result)
}

/// Edits an expense.
///
/// Title and category can always change. An amount change re-runs the split
/// engine, keeping the ratio between the current shares, and moves the group
/// total by the difference; it is refused once any share is settled.
pub async fn update_expense(
    db: &DatabaseConnection,
    expense_id: i64,
    update: ExpenseUpdate,
) -> Result<ExpenseDetails> {
    if update.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
        return Err(Error::validation("Expense title cannot be empty"));
    }

    let txn = db.begin().await?;
    let current = load_expense(&txn, expense_id).await?;

    let new_amount = update.amount.filter(|amount| *amount != current.amount());
    let reallocated = match new_amount {
        Some(_) if current.has_settled_shares() => {
            return Err(Error::ExpenseLocked { expense_id });
        }
        Some(amount) => Some((amount, split::resplit(amount, &current.allocations())?)),
        None => None,
    };

    let mut active: expense::ActiveModel = current.expense.clone().into();
    if let Some(title) = update.title {
        active.title = Set(title.trim().to_string());
    }
    if let Some(category) = update.category {
        active.category = Set(category);
    }

    if let Some((amount, allocations)) = reallocated {
        active.amount = Set(amount.cents());
        rewrite_unsettled_shares(&txn, expense_id, &current.shares, allocations).await?;
        if let Some(group_id) = current.expense.group_id {
            group::adjust_group_total(&txn, group_id, amount - current.amount()).await?;
        }
    }

    active.update(&txn).await?;
    let details = load_expense(&txn, expense_id).await?;
    txn.commit().await?;

    info!(expense_id, amount = %details.amount(), "Updated expense");
    Ok(details)
}

/// Writes new share amounts, but only onto shares that are still unsettled.
/// A share settled after it was read makes the whole rewrite fail with
/// `ExpenseLocked`; the caller's transaction is then rolled back.
async fn rewrite_unsettled_shares<C>(
    conn: &C,
    expense_id: i64,
    shares: &[expense_share::Model],
    allocations: Vec<ShareAllocation>,
) -> Result<()>
where
    C: ConnectionTrait,
{
    for (share, allocation) in shares.iter().zip(allocations) {
        let written = ExpenseShare::update_many()
            .col_expr(
                expense_share::Column::Amount,
                Expr::value(allocation.amount.cents()),
            )
            .filter(expense_share::Column::Id.eq(share.id))
            .filter(expense_share::Column::IsSettled.eq(false))
            .exec(conn)
            .await?;
        if written.rows_affected == 0 {
            return Err(Error::ExpenseLocked { expense_id });
        }
    }
    Ok(())
}

/// Removes an expense and its shares, reversing its contribution to the group
/// total. Refused once any share is settled.
pub async fn delete_expense(db: &DatabaseConnection, expense_id: i64) -> Result<()> {
    let txn = db.begin().await?;
    let current = load_expense(&txn, expense_id).await?;
    if current.has_settled_shares() {
        return Err(Error::ExpenseLocked { expense_id });
    }

    ExpenseShare::delete_many()
        .filter(expense_share::Column::ExpenseId.eq(expense_id))
        .exec(&txn)
        .await?;
    Expense::delete_by_id(expense_id).exec(&txn).await?;

    if let Some(group_id) = current.expense.group_id {
        group::adjust_group_total(&txn, group_id, -current.amount()).await?;
    }

    txn.commit().await?;
    info!(expense_id, "Deleted expense");
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::test_utils::*;

    #[tokio::test]
    async fn test_create_expense_rejects_invalid_split_before_writing() -> Result<()> {
        let db = setup_test_db().await?;

        let result = create_expense(
            &db,
            NewExpense::new("alice", "Dinner", Money::ZERO, "food", equal_participants(&["alice"])),
        )
        .await;
        assert!(matches!(result, Err(Error::InvalidSplit { .. })));

        let result = create_expense(
            &db,
            NewExpense::new("alice", "Dinner", Money::from_cents(100), "food", vec![]),
        )
        .await;
        assert!(matches!(result, Err(Error::InvalidSplit { .. })));

        let result = create_expense(
            &db,
            NewExpense::new(
                "alice",
                " ",
                Money::from_cents(100),
                "food",
                equal_participants(&["alice"]),
            ),
        )
        .await;
        assert!(matches!(result, Err(Error::Validation { .. })));

        assert_eq!(Expense::find().count(&db).await?, 0);
        assert_eq!(ExpenseShare::find().count(&db).await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_create_expense_shares_reconcile() -> Result<()> {
        let db = setup_test_db().await?;

        let details = create_test_expense(&db, "alice", 1000, &["alice", "bob", "carol"]).await?;

        assert_eq!(details.shares.len(), 3);
        assert_eq!(details.shares_total(), details.amount());
        assert_eq!(details.share_for("alice").unwrap().amount, 334);
        assert_eq!(details.share_for("bob").unwrap().amount, 333);
        assert_eq!(details.share_for("carol").unwrap().amount, 333);
        assert!(details.shares.iter().all(|s| !s.is_settled && s.transaction_id.is_none()));

        let loaded = get_expense(&db, details.expense.id).await?.unwrap();
        assert_eq!(loaded, details);
        Ok(())
    }

    #[tokio::test]
    async fn test_create_expense_with_receipt_and_exact_shares() -> Result<()> {
        let db = setup_test_db().await?;

        let new = NewExpense::new(
            "alice",
            "Groceries",
            Money::from_cents(2500),
            "food",
            vec![
                SplitParticipant::exact("alice", Money::from_cents(500)),
                SplitParticipant::exact("bob", Money::from_cents(2000)),
            ],
        )
        .with_receipt("receipts/42.jpg");
        let details = create_expense(&db, new).await?;

        assert_eq!(details.expense.receipt_ref.as_deref(), Some("receipts/42.jpg"));
        assert_eq!(details.share_for("bob").unwrap().amount, 2000);
        assert!(!details.expense.is_group_expense);
        Ok(())
    }

    #[tokio::test]
    async fn test_group_expense_updates_total_and_checks_membership() -> Result<()> {
        let db = setup_test_db().await?;
        let flat = create_test_group(&db, "Flat", &["alice", "bob", "carol"]).await?;

        let details = create_group_expense(
            &db,
            flat.group.id,
            "alice".to_string(),
            "Internet".to_string(),
            Money::from_cents(10_000),
            "utilities".to_string(),
        )
        .await?;
        assert!(details.expense.is_group_expense);
        assert_eq!(details.expense.group_id, Some(flat.group.id));
        assert_eq!(details.shares_total(), Money::from_cents(10_000));

        let outsider = NewExpense::new(
            "alice",
            "Pizza",
            Money::from_cents(900),
            "food",
            equal_participants(&["alice", "mallory"]),
        )
        .in_group(flat.group.id);
        let result = create_expense(&db, outsider).await;
        assert!(matches!(result, Err(Error::InvalidSplit { .. })));

        let group = group::get_group(&db, flat.group.id).await?.unwrap();
        assert_eq!(group.total_expense(), Money::from_cents(10_000));
        Ok(())
    }

    #[tokio::test]
    async fn test_create_expense_unknown_group() -> Result<()> {
        let db = setup_test_db().await?;
        let new = NewExpense::new(
            "alice",
            "Pizza",
            Money::from_cents(900),
            "food",
            equal_participants(&["alice"]),
        )
        .in_group(404);
        let result = create_expense(&db, new).await;
        assert!(matches!(result, Err(Error::NotFound { .. })));

        // Nothing was persisted
        assert!(list_expenses_for_user(&db, "alice").await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_list_expenses_for_user() -> Result<()> {
        let db = setup_test_db().await?;
        let first = create_test_expense(&db, "alice", 1000, &["alice", "bob"]).await?;
        let second = create_test_expense(&db, "bob", 2000, &["bob", "carol"]).await?;
        create_test_expense(&db, "dave", 3000, &["dave"]).await?;

        let bob: Vec<i64> = list_expenses_for_user(&db, "bob")
            .await?
            .into_iter()
            .map(|d| d.expense.id)
            .collect();
        assert_eq!(bob, vec![second.expense.id, first.expense.id]);

        let carol = list_expenses_for_user(&db, "carol").await?;
        assert_eq!(carol.len(), 1);
        assert_eq!(carol[0].shares.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_update_expense_resplits_amount() -> Result<()> {
        let db = setup_test_db().await?;
        let flat = create_test_group(&db, "Flat", &["alice", "bob"]).await?;
        let new = NewExpense::new(
            "alice",
            "Power",
            Money::from_cents(1000),
            "utilities",
            vec![
                SplitParticipant::weighted("alice", 3),
                SplitParticipant::weighted("bob", 1),
            ],
        )
        .in_group(flat.group.id);
        let created = create_expense(&db, new).await?;
        assert_eq!(created.share_for("alice").unwrap().amount, 750);

        let updated = update_expense(
            &db,
            created.expense.id,
            ExpenseUpdate {
                title: Some("Electricity".to_string()),
                category: Some("bills".to_string()),
                amount: Some(Money::from_cents(2000)),
            },
        )
        .await?;

        assert_eq!(updated.expense.title, "Electricity");
        assert_eq!(updated.expense.category, "bills");
        assert_eq!(updated.amount(), Money::from_cents(2000));
        assert_eq!(updated.share_for("alice").unwrap().amount, 1500);
        assert_eq!(updated.share_for("bob").unwrap().amount, 500);
        assert_eq!(updated.shares_total(), updated.amount());

        let group = group::get_group(&db, flat.group.id).await?.unwrap();
        assert_eq!(group.total_expense(), Money::from_cents(2000));
        Ok(())
    }

    #[tokio::test]
    async fn test_update_and_delete_locked_after_settlement() -> Result<()> {
        let db = setup_test_db().await?;
        let created = create_test_expense(&db, "alice", 1000, &["alice", "bob"]).await?;
        crate::core::settlement::settle_share(&db, created.expense.id, "bob").await?;

        let result = update_expense(
            &db,
            created.expense.id,
            ExpenseUpdate {
                amount: Some(Money::from_cents(1200)),
                ..Default::default()
            },
        )
        .await;
        assert!(matches!(result, Err(Error::ExpenseLocked { .. })));

        // Category edits are still allowed
        let updated = update_expense(
            &db,
            created.expense.id,
            ExpenseUpdate {
                category: Some("travel".to_string()),
                ..Default::default()
            },
        )
        .await?;
        assert_eq!(updated.expense.category, "travel");
        assert_eq!(updated.amount(), Money::from_cents(1000));

        let result = delete_expense(&db, created.expense.id).await;
        assert!(matches!(result, Err(Error::ExpenseLocked { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_share_rewrite_refuses_share_settled_after_read() -> Result<()> {
        let db = setup_test_db().await?;
        let created = create_test_expense(&db, "alice", 1000, &["alice", "bob"]).await?;

        // Read the shares, then let a settlement land before they are rewritten
        let stale = load_expense(&db, created.expense.id).await?;
        crate::core::settlement::settle_share(&db, created.expense.id, "bob").await?;

        let allocations = split::resplit(Money::from_cents(2000), &stale.allocations())?;
        let txn = db.begin().await?;
        let result =
            rewrite_unsettled_shares(&txn, created.expense.id, &stale.shares, allocations).await;
        assert!(matches!(result, Err(Error::ExpenseLocked { .. })));
        txn.rollback().await?;

        let reloaded = get_expense(&db, created.expense.id).await?.unwrap();
        assert_eq!(reloaded.share_for("alice").unwrap().amount, 500);
        assert_eq!(reloaded.share_for("bob").unwrap().amount, 500);
        assert!(reloaded.share_for("bob").unwrap().is_settled);
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_expense_reverses_group_total() -> Result<()> {
        let db = setup_test_db().await?;
        let flat = create_test_group(&db, "Flat", &["alice", "bob"]).await?;
        let created = create_group_expense(
            &db,
            flat.group.id,
            "bob".to_string(),
            "Soap".to_string(),
            Money::from_cents(450),
            "home".to_string(),
        )
        .await?;

        delete_expense(&db, created.expense.id).await?;

        assert!(get_expense(&db, created.expense.id).await?.is_none());
        let remaining = ExpenseShare::find()
            .filter(expense_share::Column::ExpenseId.eq(created.expense.id))
            .count(&db)
            .await?;
        assert_eq!(remaining, 0);
        let group = group::get_group(&db, flat.group.id).await?.unwrap();
        assert_eq!(group.total_expense(), Money::ZERO);

        let missing = delete_expense(&db, created.expense.id).await;
        assert!(matches!(missing, Err(Error::NotFound { .. })));
        Ok(())
    }
}

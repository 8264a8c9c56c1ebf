//! Balance aggregation - who owes whom.
//!
//! Outstanding debt comes from two places:
//! - unsettled peer-to-peer transactions (the sender owes the receiver), and
//! - unsettled expense shares (the participant owes the expense creator).
//!
//! Settled rows stay in the store for history but never count towards a balance.
//! A creator's own share is not a debt. All sums are exact integer cents, so
//! `net_balance(a, b) == -net_balance(b, a)` holds at all times.

use crate::{
    core::money::Money,
    entities::{Expense, ExpenseShare, Transaction, expense, expense_share, transaction},
    errors::Result,
};
use sea_orm::{Condition, prelude::*};
use std::collections::BTreeMap;

/// One outstanding directed debt.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Debt {
    debtor: String,
    creditor: String,
    amount: Money,
}

/// Net position of a user against one counterpart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterpartBalance {
    pub user_id: String,
    /// Positive: the summarized user owes the counterpart. Negative: the
    /// counterpart owes the summarized user.
    pub amount: Money,
}

/// Aggregate answer to "how much do I owe, and how much am I owed".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceSummary {
    pub user_id: String,
    pub you_owe: Money,
    pub you_are_owed: Money,
    /// Non-zero per-counterpart balances, ordered by counterpart id
    pub counterparts: Vec<CounterpartBalance>,
}

/// Every outstanding debt that involves `user_id` on either side.
async fn outstanding_debts<C>(conn: &C, user_id: &str) -> Result<Vec<Debt>>
where
    C: ConnectionTrait,
{
    let mut debts = Vec::new();

    let transactions = Transaction::find()
        .filter(transaction::Column::IsSettled.eq(false))
        .filter(
            Condition::any()
                .add(transaction::Column::SenderId.eq(user_id))
                .add(transaction::Column::ReceiverId.eq(user_id)),
        )
        .all(conn)
        .await?;
    debts.extend(transactions.into_iter().map(|tx| Debt {
        debtor: tx.sender_id,
        creditor: tx.receiver_id,
        amount: Money::from_cents(tx.amount),
    }));

    let shares = ExpenseShare::find()
        .find_also_related(Expense)
        .filter(expense_share::Column::IsSettled.eq(false))
        .filter(
            Condition::any()
                .add(expense_share::Column::ParticipantId.eq(user_id))
                .add(expense::Column::SenderId.eq(user_id)),
        )
        .all(conn)
        .await?;
    debts.extend(shares.into_iter().filter_map(|(share, expense)| {
        let expense = expense?;
        (share.participant_id != expense.sender_id).then(|| Debt {
            debtor: share.participant_id,
            creditor: expense.sender_id,
            amount: Money::from_cents(share.amount),
        })
    }));

    Ok(debts)
}

/// Signed balance of `user_id` against each counterpart.
fn per_counterpart(user_id: &str, debts: Vec<Debt>) -> BTreeMap<String, Money> {
    let mut balances: BTreeMap<String, Money> = BTreeMap::new();
    for debt in debts {
        if debt.debtor == debt.creditor {
            continue;
        }
        if debt.debtor == user_id {
            *balances.entry(debt.creditor).or_default() += debt.amount;
        } else if debt.creditor == user_id {
            *balances.entry(debt.debtor).or_default() -= debt.amount;
        }
    }
    balances
}

/// Net outstanding balance between two users. Positive means `user_a` owes
/// `user_b` that amount; negative means `user_b` owes `user_a`.
pub async fn net_balance<C>(conn: &C, user_a: &str, user_b: &str) -> Result<Money>
where
    C: ConnectionTrait,
{
    if user_a == user_b {
        return Ok(Money::ZERO);
    }
    let debts = outstanding_debts(conn, user_a).await?;
    Ok(per_counterpart(user_a, debts)
        .remove(user_b)
        .unwrap_or_default())
}

/// Totals what `user_id` owes and is owed. Each counterpart is netted on its
/// own; debts to one user never cancel credit with another.
pub async fn summary<C>(conn: &C, user_id: &str) -> Result<BalanceSummary>
where
    C: ConnectionTrait,
{
    let debts = outstanding_debts(conn, user_id).await?;

    let mut you_owe = Money::ZERO;
    let mut you_are_owed = Money::ZERO;
    let mut counterparts = Vec::new();
    for (counterpart, amount) in per_counterpart(user_id, debts) {
        if amount.is_positive() {
            you_owe += amount;
        } else if amount.is_negative() {
            you_are_owed += amount.abs();
        } else {
            continue;
        }
        counterparts.push(CounterpartBalance {
            user_id: counterpart,
            amount,
        });
    }

    Ok(BalanceSummary {
        user_id: user_id.to_string(),
        you_owe,
        you_are_owed,
        counterparts,
    })
}

/// Total still owed on a group's expenses: every unsettled share that does not
/// belong to the expense creator.
pub async fn group_outstanding<C>(conn: &C, group_id: i64) -> Result<Money>
where
    C: ConnectionTrait,
{
    let shares = ExpenseShare::find()
        .find_also_related(Expense)
        .filter(expense::Column::GroupId.eq(group_id))
        .filter(expense_share::Column::IsSettled.eq(false))
        .all(conn)
        .await?;

    Ok(shares
        .into_iter()
        .filter_map(|(share, expense)| {
            let expense = expense?;
            (share.participant_id != expense.sender_id).then(|| Money::from_cents(share.amount))
        })
        .sum())
}

//! Transaction entity - A directed money movement between two users.
//!
//! An unsettled transaction means `sender_id` owes `receiver_id` the amount.
//! Settlement transactions are created already settled and carry the
//! originating `expense_id`. Amount and parties never change after creation.
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Transaction database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "transactions")]
pub struct Model {
    /// Unique identifier for the transaction
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Amount in cents, always positive
    pub amount: i64,
    /// When the transaction was recorded
    pub date: DateTimeUtc,
    /// Human-readable description
    pub description: String,
    /// Category copied from the expense or supplied by the caller
    pub category: String,
    /// Paying (or owing) user
    pub sender_id: String,
    /// Receiving (or owed) user
    pub receiver_id: String,
    /// Flips once, from `false` to `true`
    pub is_settled: bool,
    /// Expense this transaction settles, if any
    pub expense_id: Option<i64>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

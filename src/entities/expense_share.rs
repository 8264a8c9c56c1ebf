//! Expense share entity - The portion of an expense owed by one participant.
//!
//! `is_settled` only ever moves from `false` to `true`, and `transaction_id`
//! is set in the same conditional update.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Participant share database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "expense_shares")]
pub struct Model {
    /// Unique identifier for the share
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Owning expense
    pub expense_id: i64,
    /// Participant this share is attributed to
    pub participant_id: String,
    /// Share amount in cents
    pub amount: i64,
    /// Whether the share has been paid back
    pub is_settled: bool,
    /// Settlement transaction, set when the share is settled
    pub transaction_id: Option<i64>,
}

/// Defines relationships between ExpenseShare and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each share belongs to one expense
    #[sea_orm(
        belongs_to = "super::expense::Entity",
        from = "Column::ExpenseId",
        to = "super::expense::Column::Id",
        on_delete = "Cascade"
    )]
    Expense,
}

impl Related<super::expense::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Expense.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

//! Expense entity - The aggregate root of a shared expense.
//!
//! An expense owns its participant shares (`expense_shares` rows). Shares never
//! outlive their expense and are written in the same database transaction.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Expense database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "expenses")]
pub struct Model {
    /// Unique identifier for the expense
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Short human-readable title (e.g., "Dinner", "Rent")
    pub title: String,
    /// Total amount in cents; always equals the sum of the shares
    pub amount: i64,
    /// Free-form category (e.g., "food", "utilities")
    pub category: String,
    /// User who paid and created the expense
    pub sender_id: String,
    /// Group the expense was recorded under, if any
    pub group_id: Option<i64>,
    /// Whether the expense was recorded as a group expense
    pub is_group_expense: bool,
    /// Opaque reference to an uploaded receipt
    pub receipt_ref: Option<String>,
    /// Template that materialized this expense, if it is recurring
    pub template_id: Option<i64>,
    /// When the expense was created
    pub created_at: DateTimeUtc,
}

/// Defines relationships between Expense and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One expense has many participant shares
    #[sea_orm(has_many = "super::expense_share::Entity")]
    Shares,
    /// An expense optionally belongs to a group
    #[sea_orm(
        belongs_to = "super::group::Entity",
        from = "Column::GroupId",
        to = "super::group::Column::Id"
    )]
    Group,
}

impl Related<super::expense_share::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Shares.def()
    }
}

impl Related<super::group::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Group.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

//! Recurring template entity - A reusable expense definition.
//!
//! The scheduler materializes a new expense from each due template and moves
//! `next_due_date` forward by `frequency`. The frequency is stored as text so
//! that an unknown cadence can be detected and skipped instead of failing the
//! whole run.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Recurring template database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "recurring_templates")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    /// User who pays each materialized expense
    pub sender_id: String,
    pub title: String,
    /// Amount in cents of every materialized expense
    pub amount: i64,
    pub category: String,
    /// `"daily"`, `"weekly"` or `"monthly"`
    pub frequency: String,
    pub group_id: Option<i64>,
    pub is_group_expense: bool,
    pub receipt_ref: Option<String>,
    /// Date on or after which the next expense is materialized
    pub next_due_date: Date,
    /// Only templates with `auto_add` are picked up by the scheduler
    pub auto_add: bool,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One template has many participants
    #[sea_orm(has_many = "super::template_participant::Entity")]
    Participants,
}

impl Related<super::template_participant::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Participants.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

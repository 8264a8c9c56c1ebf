//! Template participant entity - One participant of a recurring template.
//!
//! Same shape as an expense share without settlement state. Either `weight`,
//! `share` or neither is set, mirroring the split request it was created from.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "template_participants")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub template_id: i64,
    pub user_id: String,
    /// Proportional weight
    pub weight: Option<i64>,
    /// Exact share in cents
    pub share: Option<i64>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::recurring_template::Entity",
        from = "Column::TemplateId",
        to = "super::recurring_template::Column::Id",
        on_delete = "Cascade"
    )]
    Template,
}

impl Related<super::recurring_template::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Template.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

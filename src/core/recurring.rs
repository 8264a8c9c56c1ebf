//! Recurring template business logic.
//!
//! A template holds everything needed to recreate an expense: amount, category,
//! participants and group linkage. The scheduler reads due templates from here;
//! users create, toggle and delete them.

use crate::{
    core::{
        money::Money,
        split::{self, SplitParticipant},
    },
    entities::{
        RecurringTemplate, TemplateParticipant, recurring_template, template_participant,
    },
    errors::{Error, Result},
};
use chrono::{Days, Months, NaiveDate};
use sea_orm::{Condition, QueryOrder, Set, TransactionTrait, prelude::*};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, fmt, str::FromStr};
use tracing::info;

/// How often a template fires.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
}

impl Frequency {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        }
    }

    /// The due date following `date`.
    ///
    /// Monthly keeps the day of month and clamps to the last day of shorter
    /// months, so January 31 becomes February 28 (or 29). The clamp sticks:
    /// the next step starts from the clamped date. `None` only when the result
    /// would leave chrono's supported range.
    #[must_use]
    pub fn advance(self, date: NaiveDate) -> Option<NaiveDate> {
        match self {
            Self::Daily => date.checked_add_days(Days::new(1)),
            Self::Weekly => date.checked_add_days(Days::new(7)),
            Self::Monthly => date.checked_add_months(Months::new(1)),
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            _ => Err(Error::InvalidFrequency {
                frequency: s.to_string(),
            }),
        }
    }
}

/// Request to create a recurring template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRecurringTemplate {
    pub sender_id: String,
    pub title: String,
    pub amount: Money,
    pub category: String,
    pub frequency: Frequency,
    pub participants: Vec<SplitParticipant>,
    pub group_id: Option<i64>,
    pub is_group_expense: bool,
    pub receipt_ref: Option<String>,
    /// First date an expense is materialized
    pub next_due_date: NaiveDate,
    pub auto_add: bool,
}

/// A template with its participant list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecurringTemplateDetails {
    pub template: recurring_template::Model,
    pub participants: Vec<SplitParticipant>,
}

impl RecurringTemplateDetails {
    #[must_use]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.template.amount)
    }

    /// Parses the stored cadence.
    pub fn frequency(&self) -> Result<Frequency> {
        self.template.frequency.parse()
    }
}

fn to_split_participant(row: template_participant::Model) -> Result<SplitParticipant> {
    let weight = row
        .weight
        .map(u32::try_from)
        .transpose()
        .map_err(|_| Error::invalid_split(format!("stored weight for {} is out of range", row.user_id)))?;
    Ok(SplitParticipant {
        user_id: row.user_id,
        weight,
        share: row.share.map(Money::from_cents),
    })
}

/// Participants of a template in insertion order.
pub(crate) async fn load_participants<C>(conn: &C, template_id: i64) -> Result<Vec<SplitParticipant>>
where
    C: ConnectionTrait,
{
    TemplateParticipant::find()
        .filter(template_participant::Column::TemplateId.eq(template_id))
        .order_by_asc(template_participant::Column::Id)
        .all(conn)
        .await?
        .into_iter()
        .map(to_split_participant)
        .collect()
}

/// Stores a new template. The participant list is checked with the split
/// engine up front, so a template that could never materialize is rejected.
pub async fn create_recurring_template(
    db: &DatabaseConnection,
    new: NewRecurringTemplate,
) -> Result<RecurringTemplateDetails> {
    if new.title.trim().is_empty() {
        return Err(Error::validation("Template title cannot be empty"));
    }
    if new.sender_id.trim().is_empty() {
        return Err(Error::validation("Template sender cannot be empty"));
    }
    split::split(new.amount, &new.participants)?;

    let txn = db.begin().await?;

    let template = recurring_template::ActiveModel {
        sender_id: Set(new.sender_id),
        title: Set(new.title.trim().to_string()),
        amount: Set(new.amount.cents()),
        category: Set(new.category),
        frequency: Set(new.frequency.to_string()),
        group_id: Set(new.group_id),
        is_group_expense: Set(new.is_group_expense),
        receipt_ref: Set(new.receipt_ref),
        next_due_date: Set(new.next_due_date),
        auto_add: Set(new.auto_add),
        created_at: Set(chrono::Utc::now()),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    for participant in &new.participants {
        template_participant::ActiveModel {
            template_id: Set(template.id),
            user_id: Set(participant.user_id.clone()),
            weight: Set(participant.weight.map(i64::from)),
            share: Set(participant.share.map(Money::cents)),
            ..Default::default()
        }
        .insert(&txn)
        .await?;
    }

    txn.commit().await?;

    info!(
        template_id = template.id,
        frequency = %template.frequency,
        next_due_date = %template.next_due_date,
        "Created recurring template"
    );
    Ok(RecurringTemplateDetails {
        template,
        participants: new.participants,
    })
}

/// Retrieves a template with its participants, or `None`.
pub async fn get_recurring_template<C>(
    conn: &C,
    template_id: i64,
) -> Result<Option<RecurringTemplateDetails>>
where
    C: ConnectionTrait,
{
    let Some(template) = RecurringTemplate::find_by_id(template_id).one(conn).await? else {
        return Ok(None);
    };
    let participants = load_participants(conn, template_id).await?;
    Ok(Some(RecurringTemplateDetails {
        template,
        participants,
    }))
}

/// Templates a user pays for or takes part in, soonest due first.
pub async fn list_templates_for_user(
    db: &DatabaseConnection,
    user_id: &str,
) -> Result<Vec<RecurringTemplateDetails>> {
    let participating: BTreeSet<i64> = TemplateParticipant::find()
        .filter(template_participant::Column::UserId.eq(user_id))
        .all(db)
        .await?
        .into_iter()
        .map(|p| p.template_id)
        .collect();

    let templates = RecurringTemplate::find()
        .filter(
            Condition::any()
                .add(recurring_template::Column::SenderId.eq(user_id))
                .add(recurring_template::Column::Id.is_in(participating)),
        )
        .order_by_asc(recurring_template::Column::NextDueDate)
        .order_by_asc(recurring_template::Column::Id)
        .all(db)
        .await?;

    let mut result = Vec::with_capacity(templates.len());
    for template in templates {
        let participants = load_participants(db, template.id).await?;
        result.push(RecurringTemplateDetails {
            template,
            participants,
        });
    }
    Ok(result)
}

/// Templates the scheduler should fire for `today`: `auto_add` set and due on or
/// before `today`.
pub async fn due_templates<C>(conn: &C, today: NaiveDate) -> Result<Vec<recurring_template::Model>>
where
    C: ConnectionTrait,
{
    RecurringTemplate::find()
        .filter(recurring_template::Column::AutoAdd.eq(true))
        .filter(recurring_template::Column::NextDueDate.lte(today))
        .order_by_asc(recurring_template::Column::NextDueDate)
        .order_by_asc(recurring_template::Column::Id)
        .all(conn)
        .await
        .map_err(Into::into)
}

/// Turns automatic materialization on or off.
pub async fn set_auto_add(
    db: &DatabaseConnection,
    template_id: i64,
    auto_add: bool,
) -> Result<recurring_template::Model> {
    let template = RecurringTemplate::find_by_id(template_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("RecurringTemplate", template_id))?;

    let mut active: recurring_template::ActiveModel = template.into();
    active.auto_add = Set(auto_add);
    let updated = active.update(db).await?;

    info!(template_id, auto_add, "Updated recurring template");
    Ok(updated)
}

/// Deletes a template and its participants. Expenses it already produced are
/// kept.
pub async fn delete_recurring_template(db: &DatabaseConnection, template_id: i64) -> Result<()> {
    let txn = db.begin().await?;

    TemplateParticipant::delete_many()
        .filter(template_participant::Column::TemplateId.eq(template_id))
        .exec(&txn)
        .await?;
    let deleted = RecurringTemplate::delete_by_id(template_id).exec(&txn).await?;
    if deleted.rows_affected == 0 {
        return Err(Error::not_found("RecurringTemplate", template_id));
    }

    txn.commit().await?;
    info!(template_id, "Deleted recurring template");
    Ok(())
}

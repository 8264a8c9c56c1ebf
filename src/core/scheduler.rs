//! Recurring scheduler - materializes expenses from due templates.
//!
//! [`run_scheduler_tick`] takes the current date as an argument, so tests and
//! operators can drive it directly; [`run_scheduler_loop`] only calls it on a
//! timer. Creating the expense and moving the template's `next_due_date` commit
//! together. The template update is conditional on the due date still being the
//! one that was read, so two overlapping ticks cannot fire the same occurrence.

use crate::{
    config::SchedulerConfig,
    core::{
        expense::{ExpenseDetails, NewExpense, insert_expense},
        money::Money,
        recurring::{Frequency, due_templates, load_participants},
    },
    entities::{RecurringTemplate, recurring_template},
    errors::{Error, Result},
};
use chrono::NaiveDate;
use sea_orm::{TransactionTrait, prelude::*, sea_query::Expr};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};

/// Runs one scheduler pass for `today`.
///
/// Every template with `auto_add` set and `next_due_date <= today` produces one
/// expense and advances by one period. A template that fails (unknown
/// frequency, invalid split, store error) is logged and left untouched for the
/// next tick; the others are still processed. An empty due set returns an
/// empty list.
#[instrument(skip(db))]
pub async fn run_scheduler_tick(db: &DatabaseConnection, today: NaiveDate) -> Result<Vec<ExpenseDetails>> {
    let due = due_templates(db, today).await?;
    if due.is_empty() {
        debug!("No recurring templates due");
        return Ok(Vec::new());
    }

    let mut created = Vec::with_capacity(due.len());
    for template in &due {
        match materialize_template(db, template).await {
            Ok(Some(details)) => created.push(details),
            Ok(None) => debug!(
                template_id = template.id,
                "Template already advanced by another run"
            ),
            Err(e) => warn!(
                template_id = template.id,
                frequency = %template.frequency,
                error = %e,
                "Skipping recurring template"
            ),
        }
    }

    info!(
        due = due.len(),
        created = created.len(),
        "Scheduler tick finished"
    );
    Ok(created)
}

/// Creates the expense for one occurrence of `template` and advances its due
/// date. Returns `None` if the template's due date changed since it was read.
async fn materialize_template(
    db: &DatabaseConnection,
    template: &recurring_template::Model,
) -> Result<Option<ExpenseDetails>> {
    let frequency: Frequency = template.frequency.parse()?;
    let next_due = frequency
        .advance(template.next_due_date)
        .ok_or_else(|| Error::validation(format!(
            "next due date after {} is out of range",
            template.next_due_date
        )))?;

    let txn = db.begin().await?;

    let participants = load_participants(&txn, template.id).await?;
    let new = NewExpense {
        sender_id: template.sender_id.clone(),
        title: template.title.clone(),
        amount: Money::from_cents(template.amount),
        category: template.category.clone(),
        participants,
        group_id: template.group_id,
        is_group_expense: template.is_group_expense,
        receipt_ref: template.receipt_ref.clone(),
        template_id: Some(template.id),
    };
    let details = insert_expense(&txn, &new).await?;

    let advanced = RecurringTemplate::update_many()
        .col_expr(recurring_template::Column::NextDueDate, Expr::value(next_due))
        .filter(recurring_template::Column::Id.eq(template.id))
        .filter(recurring_template::Column::NextDueDate.eq(template.next_due_date))
        .filter(recurring_template::Column::AutoAdd.eq(true))
        .exec(&txn)
        .await?;
    if advanced.rows_affected == 0 {
        txn.rollback().await?;
        return Ok(None);
    }

    txn.commit().await?;
    info!(
        template_id = template.id,
        expense_id = details.expense.id,
        due = %template.next_due_date,
        next_due = %next_due,
        "Materialized recurring expense"
    );
    Ok(Some(details))
}

/// Calls [`run_scheduler_tick`] with the current UTC date every
/// `config.interval()`, starting immediately. Never returns; tick errors are
/// logged and the loop carries on.
pub async fn run_scheduler_loop(db: DatabaseConnection, config: SchedulerConfig) {
    let mut interval = tokio::time::interval(config.interval());
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(interval_secs = config.interval_secs, "Recurring scheduler started");

    loop {
        interval.tick().await;
        let today = chrono::Utc::now().date_naive();
        if let Err(e) = run_scheduler_tick(&db, today).await {
            error!("Scheduler tick for {} failed: {}", today, e);
        }
    }
}

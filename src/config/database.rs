//! Database configuration module.
//!
//! Handles `SQLite` connections and table creation using `SeaORM`'s
//! `Schema::create_table_from_entity`, so the schema always follows the entity
//! definitions. Parent tables are created before the child tables that
//! reference them.

use crate::entities::{
    Expense, ExpenseShare, Friend, FriendTransaction, Group, GroupMember, RecurringTemplate,
    TemplateParticipant, Transaction,
};
use crate::errors::Result;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, Schema};
use tracing::{debug, info};

/// Default location of the ledger database.
pub const DEFAULT_DATABASE_URL: &str = "sqlite://data/splitledger.sqlite?mode=rwc";

/// Gets the database URL from the `DATABASE_URL` environment variable, falling
/// back to `configured` and finally to [`DEFAULT_DATABASE_URL`].
#[must_use]
pub fn get_database_url(configured: Option<&str>) -> String {
    std::env::var("DATABASE_URL")
        .ok()
        .or_else(|| configured.map(ToString::to_string))
        .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string())
}

/// Establishes a connection to the given database URL.
pub async fn create_connection(database_url: &str) -> Result<DatabaseConnection> {
    debug!("Connecting to database at {}", database_url);
    Database::connect(database_url).await.map_err(Into::into)
}

/// Creates all ledger tables if they do not exist yet.
pub async fn create_tables(db: &DatabaseConnection) -> Result<()> {
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    let mut statements = vec![
        schema.create_table_from_entity(Group),
        schema.create_table_from_entity(GroupMember),
        schema.create_table_from_entity(Expense),
        schema.create_table_from_entity(ExpenseShare),
        schema.create_table_from_entity(Transaction),
        schema.create_table_from_entity(RecurringTemplate),
        schema.create_table_from_entity(TemplateParticipant),
        schema.create_table_from_entity(Friend),
        schema.create_table_from_entity(FriendTransaction),
    ];

    for statement in &mut statements {
        statement.if_not_exists();
        db.execute(builder.build(&*statement)).await?;
    }

    info!("Ledger tables ensured ({} tables)", statements.len());
    Ok(())
}

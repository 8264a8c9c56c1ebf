//! Entity module - Contains all SeaORM entity definitions for the ledger store.
//! Each entity has a Model struct for data and an Entity struct for operations.
//! Expense shares and template participants are child rows that are only ever
//! written together with their parent.

pub mod expense;
pub mod expense_share;
pub mod friend;
pub mod friend_transaction;
pub mod group;
pub mod group_member;
pub mod recurring_template;
pub mod template_participant;
pub mod transaction;

// Re-export specific types to avoid conflicts
pub use expense::{Column as ExpenseColumn, Entity as Expense, Model as ExpenseModel};
pub use expense_share::{
    Column as ExpenseShareColumn, Entity as ExpenseShare, Model as ExpenseShareModel,
};
pub use friend::{Column as FriendColumn, Entity as Friend, Model as FriendModel};
pub use friend_transaction::{
    Column as FriendTransactionColumn, Entity as FriendTransaction,
    Model as FriendTransactionModel,
};
pub use group::{Column as GroupColumn, Entity as Group, Model as GroupModel};
pub use group_member::{
    Column as GroupMemberColumn, Entity as GroupMember, Model as GroupMemberModel,
};
pub use recurring_template::{
    Column as RecurringTemplateColumn, Entity as RecurringTemplate,
    Model as RecurringTemplateModel,
};
pub use template_participant::{
    Column as TemplateParticipantColumn, Entity as TemplateParticipant,
    Model as TemplateParticipantModel,
};
pub use transaction::{
    Column as TransactionColumn, Entity as Transaction, Model as TransactionModel,
};

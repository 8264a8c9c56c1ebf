//! Core business logic - framework-agnostic ledger operations.
//!
//! Every function here takes a `SeaORM` connection and returns the crate
//! [`Result`](crate::errors::Result); callers decide how to surface errors.

/// Net balances between users
pub mod balance;
/// Expense aggregates: creation, edits, queries
pub mod expense;
/// Friend relations and their transaction lists
pub mod friend;
/// Groups as context for group-scoped expenses
pub mod group;
/// Integer-cent money type
pub mod money;
/// Recurring expense templates
pub mod recurring;
/// Periodic materialization of due templates
pub mod scheduler;
/// Share and transaction settlement
pub mod settlement;
/// Split engine
pub mod split;
/// Peer-to-peer transactions
pub mod transaction;

//! Database storage for the triage store.
//!
//! This module provides the storage layer, including:
//!
//! - SQLite schema for users, mailboxes, categories, imported email and actions
//! - Typed query functions per table that compose inside transactions
//! - Async-safe database operations via tokio::task::spawn_blocking

mod database;
pub mod queries;
mod schema;

pub use database::{Database, DatabaseError, Result, TxBehavior};
pub use schema::SCHEMA_VERSION;

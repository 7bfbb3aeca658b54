//! triage - Local storage engine for AI-assisted Gmail triage
//!
//! This crate persists users, their OAuth links and sessions, connected
//! Gmail mailboxes, categories, imported email and the actions taken on it,
//! and provides the services that drive import and triage on top.

pub mod config;
pub mod domain;
pub mod services;
pub mod storage;

pub use storage::{Database, DatabaseError};

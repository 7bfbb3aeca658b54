//! Business services layer.
//!
//! This module contains the services that orchestrate triage workflows,
//! coordinating between the storage layer, the action executor and domain
//! types.
//!
//! # Architecture
//!
//! ```text
//! CLI / API handlers
//!          |
//!          v
//!    Services Layer  <-- You are here
//!          |
//!          v
//! Storage (SQLite)  +  ActionExecutor (mail provider)
//! ```
//!
//! # Services Overview
//!
//! - [`OnboardingService`]: OAuth sign-in, sessions, verification tokens and mailbox connection
//! - [`TriageService`]: Message import, classification and action processing
//! - [`StatsService`]: Store-wide and per-user summaries

mod error;
mod executor;
mod onboarding_service;
mod stats_service;
mod triage_service;

pub use error::{Result, ServiceError};
pub use executor::{ActionExecutor, ExecutorError};
pub use onboarding_service::{
    ConnectedMailbox, LinkedAccount, OAuthProfile, OnboardingService, PruneReport,
};
pub use stats_service::{CategoryStat, StatsReport, StatsScope, StatsService};
pub use triage_service::{ActionRunReport, ImportReport, TriageService};

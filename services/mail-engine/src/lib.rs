//! # ReportRail Mail Engine
//!
//! Executes scheduled SQL-backed reports and mails the results:
//! - `sweeper`: the periodic catch-up sweep over due reports
//! - `run_now`: the user-triggered on-demand run path
//! - `adapters`: query-executor and email-sender collaborator seams
//! - `store`: report persistence with optimistic schedule advancement
//! - `render`: CSV attachments and email subject/body rendering
//!
//! Schedule math itself lives in `reporting-core`; this crate only
//! orchestrates execution and bookkeeping around it.

pub mod adapters;
pub mod config;
pub mod database;
pub mod errors;
pub mod render;
pub mod run_now;
pub mod store;
pub mod sweeper;

pub use errors::{EngineError, Result};
pub use run_now::{RecipientOutcome, ReportRunner, RunResult};
pub use sweeper::{ExecutionOutcome, ExecutionTimeouts, ScheduleSweeper};

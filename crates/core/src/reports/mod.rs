//! Read-only aggregation over the ledger.
//!
//! This module provides pure business logic for:
//! - Dashboard summaries (totals, movements, low stock, time series)
//! - Per-entity movement reports
//! - Role-based redaction of financial figures

pub mod redaction;
pub mod service;
pub mod types;


pub use redaction::{PrivilegeLevel, RedactionPolicy, ViewerRole};
pub use service::{DashboardInput, ReportService};
pub use types::*;

//! Source document workflow.
//!
//! This module implements the document lifecycle state machine and the
//! translation of approve/void transitions into balance mutations.
//!
//! # Modules
//!
//! - `types` - Document domain types (DocumentStatus, SourceDocument, WorkflowAction)
//! - `service` - State transition and document validation logic
//! - `dispatch` - Per-line mutation planning for approval and reversal

pub mod dispatch;
pub mod service;
pub mod types;

#[cfg(test)]
mod dispatch_props;
#[cfg(test)]
mod service_props;

pub use dispatch::{COUNTERPARTY_LINE_NO, DispatchPhase, DispatchService, PlannedMutation};
pub use service::WorkflowService;
pub use types::{
    DocumentKind, DocumentStatus, LineItem, NewDocument, SourceDocument, WorkflowAction,
};

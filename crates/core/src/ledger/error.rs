//! Ledger error types.
//!
//! Every engine operation fails with a `LedgerError`. Store backends map
//! their native errors into `Storage` or `LockTimeout`.

use tallyhall_shared::AppError;
use tallyhall_shared::types::{DocumentId, EntityId};
use thiserror::Error;

use super::types::{EntityKind, EntryKey};
use crate::workflow::DocumentStatus;

/// Result alias for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Errors that can occur during ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    // ========== Lookup Errors ==========
    /// Owning entity not found.
    #[error("Entity not found: {0}")]
    EntityNotFound(EntityId),

    /// Source document not found.
    #[error("Document not found: {0}")]
    DocumentNotFound(DocumentId),

    // ========== State Errors ==========
    /// Approval or rejection requested for a document that is not pending.
    #[error("Document {document_id} is not pending (status: {status})")]
    DocumentNotPending {
        /// The document.
        document_id: DocumentId,
        /// Its current status.
        status: DocumentStatus,
    },

    /// Void requested for a document that is not approved.
    #[error("Document {document_id} is not approved (status: {status})")]
    DocumentNotApproved {
        /// The document.
        document_id: DocumentId,
        /// Its current status.
        status: DocumentStatus,
    },

    // ========== Validation Errors ==========
    /// Document failed validation at creation.
    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    /// Void requested without a reason.
    #[error("Void reason is required")]
    VoidReasonRequired,

    /// Operation targets the wrong kind of entity.
    #[error("Entity {entity_id} is a {actual}, expected {expected}")]
    EntityKindMismatch {
        /// The entity.
        entity_id: EntityId,
        /// The kind the operation needs.
        expected: EntityKind,
        /// The entity's actual kind.
        actual: EntityKind,
    },

    // ========== Concurrency Errors ==========
    /// Waiting for a per-entity or per-document lock timed out.
    #[error("Lock wait timed out: {0}")]
    LockTimeout(String),

    /// A document-sourced entry with the same key already exists.
    #[error("Duplicate ledger entry for document {} line {} ({})", .0.document_id, .0.line_no, .0.kind)]
    DuplicateEntry(EntryKey),

    // ========== Reporting Errors ==========
    /// Viewer lacks the privilege to see a financial figure.
    #[error("Viewer is not allowed to see financial figures")]
    RedactionPolicyViolation,

    // ========== Storage Errors ==========
    /// Backend error.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl LedgerError {
    /// Returns the error code for API responses.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::EntityNotFound(_) => "ENTITY_NOT_FOUND",
            Self::DocumentNotFound(_) => "DOCUMENT_NOT_FOUND",
            Self::DocumentNotPending { .. } => "DOCUMENT_NOT_PENDING",
            Self::DocumentNotApproved { .. } => "DOCUMENT_NOT_APPROVED",
            Self::InvalidDocument(_) => "INVALID_DOCUMENT",
            Self::VoidReasonRequired => "VOID_REASON_REQUIRED",
            Self::EntityKindMismatch { .. } => "ENTITY_KIND_MISMATCH",
            Self::LockTimeout(_) => "LOCK_TIMEOUT",
            Self::DuplicateEntry(_) => "DUPLICATE_ENTRY",
            Self::RedactionPolicyViolation => "REDACTION_POLICY_VIOLATION",
            Self::Storage(_) => "STORAGE_ERROR",
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn http_status_code(&self) -> u16 {
        match self {
            // 400 Bad Request - validation errors
            Self::InvalidDocument(_) | Self::VoidReasonRequired | Self::EntityKindMismatch { .. } => {
                400
            }

            // 403 Forbidden
            Self::RedactionPolicyViolation => 403,

            // 404 Not Found
            Self::EntityNotFound(_) | Self::DocumentNotFound(_) => 404,

            // 409 Conflict - state and concurrency errors
            Self::DocumentNotPending { .. }
            | Self::DocumentNotApproved { .. }
            | Self::LockTimeout(_)
            | Self::DuplicateEntry(_) => 409,

            // 500 Internal Server Error
            Self::Storage(_) => 500,
        }
    }

    /// Returns true if the caller may retry the whole operation.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::LockTimeout(_))
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        let message = err.to_string();
        match err {
            LedgerError::EntityNotFound(_) | LedgerError::DocumentNotFound(_) => {
                Self::NotFound(message)
            }
            LedgerError::InvalidDocument(_)
            | LedgerError::VoidReasonRequired
            | LedgerError::EntityKindMismatch { .. } => Self::Validation(message),
            LedgerError::DocumentNotPending { .. }
            | LedgerError::DocumentNotApproved { .. }
            | LedgerError::RedactionPolicyViolation => Self::BusinessRule(message),
            LedgerError::LockTimeout(_) | LedgerError::DuplicateEntry(_) => Self::Conflict(message),
            LedgerError::Storage(_) => Self::Database(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::types::EntryKind;

    #[test]
    fn test_error_codes() {
        let id = EntityId::new();
        assert_eq!(LedgerError::EntityNotFound(id).error_code(), "ENTITY_NOT_FOUND");
        assert_eq!(
            LedgerError::DocumentNotPending {
                document_id: DocumentId::new(),
                status: DocumentStatus::Approved,
            }
            .error_code(),
            "DOCUMENT_NOT_PENDING"
        );
        assert_eq!(LedgerError::VoidReasonRequired.error_code(), "VOID_REASON_REQUIRED");
    }

    #[test]
    fn test_http_status_codes() {
        assert_eq!(LedgerError::InvalidDocument("x".into()).http_status_code(), 400);
        assert_eq!(LedgerError::RedactionPolicyViolation.http_status_code(), 403);
        assert_eq!(
            LedgerError::DocumentNotFound(DocumentId::new()).http_status_code(),
            404
        );
        assert_eq!(LedgerError::LockTimeout("entity".into()).http_status_code(), 409);
        assert_eq!(LedgerError::Storage("down".into()).http_status_code(), 500);
    }

    #[test]
    fn test_only_lock_timeout_is_retryable() {
        assert!(LedgerError::LockTimeout("entity".into()).is_retryable());
        assert!(!LedgerError::EntityNotFound(EntityId::new()).is_retryable());
        assert!(!LedgerError::Storage("down".into()).is_retryable());
    }

    #[test]
    fn test_error_display() {
        let document_id = DocumentId::new();
        let err = LedgerError::DocumentNotApproved {
            document_id,
            status: DocumentStatus::Pending,
        };
        assert_eq!(
            err.to_string(),
            format!("Document {document_id} is not approved (status: pending)")
        );

        let err = LedgerError::DuplicateEntry(EntryKey {
            document_id,
            line_no: 2,
            kind: EntryKind::Purchase,
        });
        assert_eq!(
            err.to_string(),
            format!("Duplicate ledger entry for document {document_id} line 2 (purchase)")
        );
    }

    #[test]
    fn test_into_app_error() {
        let app: AppError = LedgerError::EntityNotFound(EntityId::new()).into();
        assert_eq!(app.status_code(), 404);

        let app: AppError = LedgerError::LockTimeout("entity".into()).into();
        assert!(app.is_retryable());

        let app: AppError = LedgerError::VoidReasonRequired.into();
        assert_eq!(app.error_code(), "VALIDATION_ERROR");
    }
}

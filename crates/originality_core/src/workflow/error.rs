//! crates/originality_core/src/workflow/error.rs
//!
//! Error taxonomy of the upload workflow and its user-facing translation.

use uuid::Uuid;

use crate::catalog::ServiceKind;
use crate::interaction::OutboundMessage;
use crate::messages;
use crate::ports::PortError;

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("text extraction failed: {0}")]
    Extraction(String),
    #[error("document contains no words")]
    EmptyDocument,
    #[error("insufficient credit: {required} required, {available} available")]
    InsufficientCredit { required: i64, available: i64 },
    #[error("'{file_name}' is not a format accepted by {service}")]
    FormatMismatch {
        service: ServiceKind,
        file_name: String,
    },
    #[error("an analysis is already running for this user")]
    Busy,
    #[error("scoring API returned {status}: {body}")]
    ScoringApi { status: u16, body: String },
    #[error("not found: {0}")]
    NotFound(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("service {0} is unavailable")]
    ServiceUnavailable(ServiceKind),
    #[error("scoring is not configured")]
    ScoringNotConfigured,
    #[error("upload {0} has already been analysed")]
    AlreadyProcessed(Uuid),
    #[error("payment provider error: {0}")]
    Payment(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

pub type WorkflowResult<T> = Result<T, WorkflowError>;

impl From<PortError> for WorkflowError {
    fn from(err: PortError) -> Self {
        match err {
            PortError::NotFound(what) => WorkflowError::NotFound(what),
            PortError::InsufficientCredit {
                required,
                available,
            } => WorkflowError::InsufficientCredit {
                required,
                available,
            },
            PortError::Storage(msg) => WorkflowError::Storage(msg),
            PortError::Extraction(msg) => WorkflowError::Extraction(msg),
            PortError::ScoringApi { status, body } => WorkflowError::ScoringApi { status, body },
            PortError::Payment(msg) => WorkflowError::Payment(msg),
            PortError::Unexpected(msg) => WorkflowError::Unexpected(msg),
        }
    }
}

impl WorkflowError {
    /// Short category name for structured logs.
    pub fn category(&self) -> &'static str {
        match self {
            WorkflowError::Extraction(_) => "extraction",
            WorkflowError::EmptyDocument => "empty_document",
            WorkflowError::InsufficientCredit { .. } => "insufficient_credit",
            WorkflowError::FormatMismatch { .. } => "format_mismatch",
            WorkflowError::Busy => "busy",
            WorkflowError::ScoringApi { .. } => "scoring_api",
            WorkflowError::NotFound(_) => "not_found",
            WorkflowError::Storage(_) => "storage",
            WorkflowError::ServiceUnavailable(_) => "service_unavailable",
            WorkflowError::ScoringNotConfigured => "scoring_not_configured",
            WorkflowError::AlreadyProcessed(_) => "already_processed",
            WorkflowError::Payment(_) => "payment",
            WorkflowError::Unexpected(_) => "unexpected",
        }
    }

    /// The one message shown to the user for this category.
    pub fn user_message(&self) -> OutboundMessage {
        match self {
            WorkflowError::Extraction(_) => messages::extraction_failed(),
            WorkflowError::EmptyDocument => messages::empty_document(),
            WorkflowError::InsufficientCredit {
                required,
                available,
            } => messages::insufficient_credit(*available, *required),
            WorkflowError::FormatMismatch { service, .. } => messages::format_error(*service),
            WorkflowError::Busy => messages::already_analyzing(),
            WorkflowError::ScoringApi { .. } => messages::scoring_failed(),
            WorkflowError::NotFound(_) => messages::not_found(),
            WorkflowError::Storage(_) => messages::storage_failed(),
            WorkflowError::ServiceUnavailable(_) => messages::service_unavailable(),
            WorkflowError::ScoringNotConfigured => messages::scoring_not_configured(),
            WorkflowError::AlreadyProcessed(_) => messages::already_processed(),
            WorkflowError::Payment(_) => messages::payment_failed(),
            WorkflowError::Unexpected(_) => messages::generic_error(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_messages_hide_internal_details() {
        let err = WorkflowError::ScoringApi {
            status: 500,
            body: "secret stack trace".to_string(),
        };
        assert!(!err.user_message().text.contains("secret"));
        let err = WorkflowError::Unexpected("connection refused at 10.0.0.3".to_string());
        assert!(!err.user_message().text.contains("10.0.0.3"));
    }

    #[test]
    fn port_errors_keep_their_category() {
        let err: WorkflowError = PortError::InsufficientCredit {
            required: 3,
            available: 1,
        }
        .into();
        assert_eq!(err.category(), "insufficient_credit");
        let err: WorkflowError = PortError::Storage("bucket missing".to_string()).into();
        assert_eq!(err.category(), "storage");
    }
}

//! crates/originality_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases or APIs.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::catalog::{DocumentFormat, ServiceKind};
use crate::domain::{
    Checkout, ConversationSession, CreditTransaction, FeedbackRating, NewScoreLog, NewUpload,
    PaymentStatus, ScoreLogEntry, ScoreResult, ServiceRecord, Upload, UsageNote, User,
};
use crate::interaction::{MessageId, OutboundMessage};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Insufficient credit: {required} required, {available} available")]
    InsufficientCredit { required: i64, available: i64 },
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Text extraction failed: {0}")]
    Extraction(String),
    #[error("Scoring API returned {status}: {body}")]
    ScoringApi { status: u16, body: String },
    #[error("Payment provider error: {0}")]
    Payment(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait DatabaseService: Send + Sync {
    // --- Users ---
    async fn get_or_create_user(&self, external_id: i64, username: Option<&str>)
        -> PortResult<User>;

    async fn get_user(&self, user_id: Uuid) -> PortResult<User>;

    async fn set_customer_id(&self, user_id: Uuid, customer_id: &str) -> PortResult<()>;

    // --- Busy lease ---
    /// Takes the per-user busy lease. Succeeds when no lease is held or the
    /// held one started before `now - max_hold`.
    async fn try_acquire_busy_lease(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
        max_hold: chrono::Duration,
    ) -> PortResult<bool>;

    async fn release_busy_lease(&self, user_id: Uuid) -> PortResult<()>;

    // --- Uploads ---
    async fn create_upload(&self, upload: NewUpload) -> PortResult<Upload>;

    async fn get_upload(&self, upload_id: Uuid) -> PortResult<Upload>;

    /// Sets `status = completed` and `payment_status = paid`.
    async fn complete_upload(&self, upload_id: Uuid) -> PortResult<()>;

    async fn set_upload_payment_status(
        &self,
        upload_id: Uuid,
        payment_status: PaymentStatus,
    ) -> PortResult<()>;

    // --- Score audit log ---
    async fn create_score_log(&self, entry: NewScoreLog) -> PortResult<ScoreLogEntry>;

    async fn complete_score_log(&self, log_id: Uuid, result: &ScoreResult) -> PortResult<()>;

    async fn fail_score_log(&self, log_id: Uuid, error_message: &str) -> PortResult<()>;

    /// The most recent attempt for an upload, if any.
    async fn latest_score_log(&self, upload_id: Uuid) -> PortResult<Option<ScoreLogEntry>>;

    // --- Services ---
    async fn list_services(&self) -> PortResult<Vec<ServiceRecord>>;

    async fn get_service(&self, kind: ServiceKind) -> PortResult<Option<ServiceRecord>>;

    async fn set_service_availability(
        &self,
        kind: ServiceKind,
        available: bool,
        note: &str,
    ) -> PortResult<Option<ServiceRecord>>;

    // --- Credit purchases ---
    async fn create_transaction(
        &self,
        user_id: Uuid,
        amount: i64,
        currency: &str,
        credits: i64,
    ) -> PortResult<CreditTransaction>;

    async fn attach_checkout_session(&self, transaction_id: Uuid, session_id: &str)
        -> PortResult<()>;

    async fn pending_transactions(&self, user_id: Uuid) -> PortResult<Vec<CreditTransaction>>;

    async fn find_transaction_by_session(
        &self,
        session_id: &str,
    ) -> PortResult<Option<CreditTransaction>>;

    // --- Feedback ---
    async fn save_feedback(
        &self,
        user_id: Uuid,
        rating: FeedbackRating,
        message: Option<&str>,
    ) -> PortResult<()>;
}

/// Atomic balance operations. Every movement appends one usage-log row.
#[async_trait]
pub trait CreditLedger: Send + Sync {
    async fn balance(&self, user_id: Uuid) -> PortResult<i64>;

    /// Removes `amount` credits, failing with `PortError::InsufficientCredit`
    /// and leaving the balance untouched when it is too low.
    async fn debit(&self, user_id: Uuid, amount: i64, note: UsageNote) -> PortResult<i64>;

    /// Adds `amount` credits. No upper bound.
    async fn credit(&self, user_id: Uuid, amount: i64, note: UsageNote) -> PortResult<i64>;

    /// Marks a pending purchase completed and credits its pack in one step.
    /// Returns `None` when the purchase was already settled.
    async fn settle_purchase(&self, transaction_id: Uuid) -> PortResult<Option<i64>>;
}

/// Per-conversation key-value session storage.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Returns the stored session, or an empty one for a new conversation.
    async fn load(&self, conversation_id: &str) -> PortResult<ConversationSession>;

    async fn save(&self, conversation_id: &str, session: &ConversationSession) -> PortResult<()>;
}

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn put(
        &self,
        bucket: &str,
        path: &str,
        content: Bytes,
        content_type: &str,
    ) -> PortResult<()>;

    async fn get(&self, bucket: &str, path: &str) -> PortResult<Bytes>;
}

#[async_trait]
pub trait TextExtractionService: Send + Sync {
    /// Converts a document into plain text, failing with `PortError::Extraction`
    /// when nothing can be recovered.
    async fn extract(&self, content: Bytes, format: DocumentFormat) -> PortResult<String>;
}

#[async_trait]
pub trait ScoringService: Send + Sync {
    /// Scores a text for machine authorship. A non-success HTTP status fails
    /// with `PortError::ScoringApi`.
    async fn scan(&self, title: &str, content: &str) -> PortResult<ScoreResult>;
}

/// Parameters for a credit-pack checkout.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub customer_id: String,
    pub credits: i64,
    /// Minor currency units.
    pub amount: i64,
    pub currency: String,
    pub success_url: String,
    pub cancel_url: String,
}

#[async_trait]
pub trait PaymentService: Send + Sync {
    /// Registers the user with the payment provider, returning the customer id.
    async fn create_customer(&self, user: &User) -> PortResult<String>;

    async fn create_checkout(&self, request: CheckoutRequest) -> PortResult<Checkout>;

    async fn is_checkout_paid(&self, session_id: &str) -> PortResult<bool>;
}

/// Outbound side of the conversation transport.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send(&self, conversation_id: &str, message: OutboundMessage) -> PortResult<MessageId>;

    async fn delete(&self, conversation_id: &str, message_id: MessageId) -> PortResult<()>;
}

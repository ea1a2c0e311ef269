//! crates/originality_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or wire format; the adapters
//! in the `bot` service map their rows onto them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::catalog::ServiceKind;

/// A person talking to the bot. `credit` is the authoritative balance.
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    /// Stable identity supplied by the conversation transport.
    pub external_id: i64,
    pub username: Option<String>,
    pub customer_id: Option<String>,
    pub credit: i64,
    /// Start of the current busy lease, `None` when the user is idle.
    pub analyzing_since: Option<DateTime<Utc>>,
}

impl User {
    /// Whether a busy lease is held that has not yet expired.
    pub fn is_analyzing(&self, now: DateTime<Utc>, max_hold: chrono::Duration) -> bool {
        match self.analyzing_since {
            Some(since) => now - since < max_hold,
            None => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    Queued,
    Processing,
    Completed,
}

impl UploadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStatus::Queued => "queued",
            UploadStatus::Processing => "processing",
            UploadStatus::Completed => "completed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "queued" => Some(UploadStatus::Queued),
            "processing" => Some(UploadStatus::Processing),
            "completed" => Some(UploadStatus::Completed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    NotPaid,
    Paid,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::NotPaid => "not_paid",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "not_paid" => Some(PaymentStatus::NotPaid),
            "paid" => Some(PaymentStatus::Paid),
            "failed" => Some(PaymentStatus::Failed),
            _ => None,
        }
    }
}

/// One submitted document and where its bytes live.
#[derive(Debug, Clone)]
pub struct Upload {
    pub id: Uuid,
    pub user_id: Uuid,
    pub service: ServiceKind,
    pub file_name: String,
    pub file_size: i64,
    pub file_path: String,
    pub mime_type: Option<String>,
    pub status: UploadStatus,
    pub payment_status: PaymentStatus,
    /// Price quote taken when the document was first read. Absent for
    /// flat-rate services.
    pub word_count: Option<i64>,
    pub credits_required: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Fields needed to insert an upload row.
#[derive(Debug, Clone)]
pub struct NewUpload {
    pub user_id: Uuid,
    pub service: ServiceKind,
    pub file_name: String,
    pub file_size: i64,
    pub file_path: String,
    pub mime_type: Option<String>,
    pub payment_status: PaymentStatus,
    pub word_count: Option<i64>,
    pub credits_required: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreStatus {
    Pending,
    Completed,
    Failed,
}

impl ScoreStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScoreStatus::Pending => "pending",
            ScoreStatus::Completed => "completed",
            ScoreStatus::Failed => "failed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(ScoreStatus::Pending),
            "completed" => Some(ScoreStatus::Completed),
            "failed" => Some(ScoreStatus::Failed),
            _ => None,
        }
    }
}

/// One attempt at scoring an upload. The newest entry for an upload is the
/// active one.
#[derive(Debug, Clone)]
pub struct ScoreLogEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub upload_id: Uuid,
    pub word_count: i64,
    pub credits_used: i64,
    pub request_data: Option<serde_json::Value>,
    pub response_data: Option<serde_json::Value>,
    pub ai_score: Option<f64>,
    pub ai_confidence: Option<f64>,
    pub public_link: Option<String>,
    pub scan_id: Option<String>,
    pub status: ScoreStatus,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewScoreLog {
    pub user_id: Uuid,
    pub upload_id: Uuid,
    pub word_count: i64,
    pub credits_used: i64,
    pub request_data: serde_json::Value,
}

/// Normalised output of the external scoring API.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreResult {
    /// Likelihood that the text is machine-written, `0.0..=1.0`.
    pub ai_score: f64,
    pub ai_confidence: f64,
    pub public_link: Option<String>,
    pub scan_id: String,
    /// Raw response body kept for the audit log.
    pub raw_response: serde_json::Value,
}

/// Append-only record of a ledger movement tied to an upload.
#[derive(Debug, Clone)]
pub struct UsageNote {
    pub upload_id: Option<Uuid>,
    pub description: String,
}

/// A service row as persisted; availability is flipped by the maintenance poller.
#[derive(Debug, Clone)]
pub struct ServiceRecord {
    pub kind: ServiceKind,
    pub name: String,
    pub available: bool,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(TransactionStatus::Pending),
            "completed" => Some(TransactionStatus::Completed),
            "failed" => Some(TransactionStatus::Failed),
            "cancelled" => Some(TransactionStatus::Cancelled),
            _ => None,
        }
    }
}

/// A credit purchase. `amount` is in minor currency units.
#[derive(Debug, Clone)]
pub struct CreditTransaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub checkout_session_id: Option<String>,
    pub amount: i64,
    pub currency: String,
    pub credits: i64,
    pub status: TransactionStatus,
}

/// A hosted checkout page created by the payment collaborator.
#[derive(Debug, Clone)]
pub struct Checkout {
    pub session_id: String,
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackRating {
    Good,
    Bad,
}

impl FeedbackRating {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackRating::Good => "good",
            FeedbackRating::Bad => "bad",
        }
    }
}

/// Per-conversation workflow state. A cache of persisted rows, never the
/// source of truth for balances or payment status.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationSession {
    pub selected_service: Option<ServiceKind>,
    pub pending_upload_id: Option<Uuid>,
    pub pending_word_count: Option<i64>,
    pub pending_credits_required: Option<i64>,
    #[serde(default)]
    pub waiting_for_credit_amount: bool,
    #[serde(default)]
    pub waiting_for_feedback_message: bool,
    pub feedback_rating: Option<FeedbackRating>,
}

impl ConversationSession {
    /// Drops every field tied to a pending upload.
    pub fn clear_pending_upload(&mut self) {
        self.pending_upload_id = None;
        self.pending_word_count = None;
        self.pending_credits_required = None;
    }

    pub fn set_pending_upload(&mut self, upload_id: Uuid, word_count: i64, credits_required: i64) {
        self.pending_upload_id = Some(upload_id);
        self.pending_word_count = Some(word_count);
        self.pending_credits_required = Some(credits_required);
    }
}

/// A document attached to an inbound message, already downloaded by the transport.
#[derive(Debug, Clone)]
pub struct DocumentSubmission {
    pub file_name: String,
    pub mime_type: Option<String>,
    pub content: bytes::Bytes,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_lease_is_not_analyzing() {
        let now = Utc::now();
        let mut user = User {
            id: Uuid::new_v4(),
            external_id: 7,
            username: None,
            customer_id: None,
            credit: 0,
            analyzing_since: Some(now - chrono::Duration::minutes(30)),
        };
        assert!(!user.is_analyzing(now, chrono::Duration::minutes(15)));
        user.analyzing_since = Some(now - chrono::Duration::minutes(1));
        assert!(user.is_analyzing(now, chrono::Duration::minutes(15)));
    }

    #[test]
    fn session_survives_json_without_flags() {
        let session: ConversationSession =
            serde_json::from_str(r#"{"selected_service":"originality"}"#).unwrap();
        assert_eq!(session.selected_service, Some(ServiceKind::Originality));
        assert!(!session.waiting_for_credit_amount);
        assert!(session.pending_upload_id.is_none());
    }
}

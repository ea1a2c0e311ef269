#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use originality_core::catalog::{DocumentFormat, ServiceKind};
use originality_core::domain::{
    Checkout, ConversationSession, CreditTransaction, DocumentSubmission, FeedbackRating,
    NewScoreLog, NewUpload, PaymentStatus, ScoreLogEntry, ScoreResult, ScoreStatus, ServiceRecord,
    TransactionStatus, Upload, UploadStatus, UsageNote, User,
};
use originality_core::interaction::{ConversationRef, MessageId, OutboundMessage};
use originality_core::ports::*;
use originality_core::workflow::{
    NoRefund, RefundPolicy, Turn, Workflow, WorkflowDeps, WorkflowSettings,
};

pub const CONVERSATION: &str = "chat-1";
pub const BUCKET: &str = "documents";

//=========================================================================================
// In-memory persistence: users, uploads, score logs, ledger, sessions, storage
//=========================================================================================

#[derive(Debug, Clone)]
pub struct UsageRow {
    pub user_id: Uuid,
    pub upload_id: Option<Uuid>,
    pub credits: i64,
    pub description: String,
}

#[derive(Default)]
pub struct State {
    pub users: HashMap<Uuid, User>,
    pub uploads: HashMap<Uuid, Upload>,
    pub score_logs: Vec<ScoreLogEntry>,
    pub usage: Vec<UsageRow>,
    pub services: Vec<ServiceRecord>,
    pub transactions: HashMap<Uuid, CreditTransaction>,
    pub feedback: Vec<(Uuid, FeedbackRating, Option<String>)>,
    pub sessions: HashMap<String, ConversationSession>,
    pub objects: HashMap<(String, String), Bytes>,
}

/// Runs against the state when a busy lease is granted, standing in for
/// whatever another conversation did while this one waited.
pub type LeaseHook = Box<dyn FnOnce(&mut State) + Send>;

#[derive(Default)]
pub struct InMemory {
    pub state: Mutex<State>,
    pub fail_storage_put: Mutex<bool>,
    /// Each flag fails the next call only.
    pub fail_complete_upload: Mutex<bool>,
    pub fail_complete_log: Mutex<bool>,
    pub on_lease_granted: Mutex<Option<LeaseHook>>,
}

impl InMemory {
    pub fn new() -> Self {
        let store = Self::default();
        {
            let mut state = store.state.lock().unwrap();
            state.services = vec![
                ServiceRecord {
                    kind: ServiceKind::Originality,
                    name: "AI Report".to_string(),
                    available: true,
                    note: None,
                },
                ServiceRecord {
                    kind: ServiceKind::Turnitin,
                    name: "Similarity Report".to_string(),
                    available: true,
                    note: None,
                },
            ];
        }
        store
    }

    pub fn add_user(&self, external_id: i64, credit: i64) -> User {
        let user = User {
            id: Uuid::new_v4(),
            external_id,
            username: None,
            customer_id: None,
            credit,
            analyzing_since: None,
        };
        self.state
            .lock()
            .unwrap()
            .users
            .insert(user.id, user.clone());
        user
    }

    pub fn user(&self, user_id: Uuid) -> User {
        self.state.lock().unwrap().users[&user_id].clone()
    }

    pub fn credit_of(&self, user_id: Uuid) -> i64 {
        self.user(user_id).credit
    }

    pub fn uploads(&self) -> Vec<Upload> {
        self.state.lock().unwrap().uploads.values().cloned().collect()
    }

    pub fn upload(&self, upload_id: Uuid) -> Upload {
        self.state.lock().unwrap().uploads[&upload_id].clone()
    }

    pub fn logs_for(&self, upload_id: Uuid) -> Vec<ScoreLogEntry> {
        self.state
            .lock()
            .unwrap()
            .score_logs
            .iter()
            .filter(|log| log.upload_id == upload_id)
            .cloned()
            .collect()
    }

    pub fn usage_for(&self, user_id: Uuid) -> Vec<UsageRow> {
        self.state
            .lock()
            .unwrap()
            .usage
            .iter()
            .filter(|row| row.user_id == user_id)
            .cloned()
            .collect()
    }

    pub fn session(&self, conversation_id: &str) -> ConversationSession {
        self.state
            .lock()
            .unwrap()
            .sessions
            .get(conversation_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn put_session(&self, conversation_id: &str, session: ConversationSession) {
        self.state
            .lock()
            .unwrap()
            .sessions
            .insert(conversation_id.to_string(), session);
    }

    pub fn set_available(&self, kind: ServiceKind, available: bool) {
        let mut state = self.state.lock().unwrap();
        for service in state.services.iter_mut().filter(|s| s.kind == kind) {
            service.available = available;
        }
    }

    pub fn hold_lease(&self, user_id: Uuid, since: DateTime<Utc>) {
        let mut state = self.state.lock().unwrap();
        if let Some(user) = state.users.get_mut(&user_id) {
            user.analyzing_since = Some(since);
        }
    }

    /// Replaces a stored object with bytes no extractor can read.
    pub fn corrupt_object(&self, bucket: &str, path: &str) {
        self.state
            .lock()
            .unwrap()
            .objects
            .insert((bucket.to_string(), path.to_string()), unreadable_bytes());
    }

    pub fn object_count(&self) -> usize {
        self.state.lock().unwrap().objects.len()
    }

    pub fn transactions(&self) -> Vec<CreditTransaction> {
        self.state
            .lock()
            .unwrap()
            .transactions
            .values()
            .cloned()
            .collect()
    }
}

#[async_trait]
impl DatabaseService for InMemory {
    async fn get_or_create_user(
        &self,
        external_id: i64,
        username: Option<&str>,
    ) -> PortResult<User> {
        let mut state = self.state.lock().unwrap();
        if let Some(user) = state.users.values().find(|u| u.external_id == external_id) {
            return Ok(user.clone());
        }
        let user = User {
            id: Uuid::new_v4(),
            external_id,
            username: username.map(str::to_string),
            customer_id: None,
            credit: 0,
            analyzing_since: None,
        };
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_user(&self, user_id: Uuid) -> PortResult<User> {
        self.state
            .lock()
            .unwrap()
            .users
            .get(&user_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("user {}", user_id)))
    }

    async fn set_customer_id(&self, user_id: Uuid, customer_id: &str) -> PortResult<()> {
        let mut state = self.state.lock().unwrap();
        let user = state
            .users
            .get_mut(&user_id)
            .ok_or_else(|| PortError::NotFound(format!("user {}", user_id)))?;
        user.customer_id = Some(customer_id.to_string());
        Ok(())
    }

    async fn try_acquire_busy_lease(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
        max_hold: chrono::Duration,
    ) -> PortResult<bool> {
        let mut state = self.state.lock().unwrap();
        let user = state
            .users
            .get_mut(&user_id)
            .ok_or_else(|| PortError::NotFound(format!("user {}", user_id)))?;
        if user.is_analyzing(now, max_hold) {
            return Ok(false);
        }
        user.analyzing_since = Some(now);
        if let Some(hook) = self.on_lease_granted.lock().unwrap().take() {
            hook(&mut *state);
        }
        Ok(true)
    }

    async fn release_busy_lease(&self, user_id: Uuid) -> PortResult<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(user) = state.users.get_mut(&user_id) {
            user.analyzing_since = None;
        }
        Ok(())
    }

    async fn create_upload(&self, upload: NewUpload) -> PortResult<Upload> {
        let row = Upload {
            id: Uuid::new_v4(),
            user_id: upload.user_id,
            service: upload.service,
            file_name: upload.file_name,
            file_size: upload.file_size,
            file_path: upload.file_path,
            mime_type: upload.mime_type,
            status: UploadStatus::Queued,
            payment_status: upload.payment_status,
            word_count: upload.word_count,
            credits_required: upload.credits_required,
            created_at: Utc::now(),
        };
        self.state
            .lock()
            .unwrap()
            .uploads
            .insert(row.id, row.clone());
        Ok(row)
    }

    async fn get_upload(&self, upload_id: Uuid) -> PortResult<Upload> {
        self.state
            .lock()
            .unwrap()
            .uploads
            .get(&upload_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("upload {}", upload_id)))
    }

    async fn complete_upload(&self, upload_id: Uuid) -> PortResult<()> {
        if std::mem::take(&mut *self.fail_complete_upload.lock().unwrap()) {
            return Err(PortError::Unexpected("connection reset".to_string()));
        }
        let mut state = self.state.lock().unwrap();
        let upload = state
            .uploads
            .get_mut(&upload_id)
            .ok_or_else(|| PortError::NotFound(format!("upload {}", upload_id)))?;
        upload.status = UploadStatus::Completed;
        upload.payment_status = PaymentStatus::Paid;
        Ok(())
    }

    async fn set_upload_payment_status(
        &self,
        upload_id: Uuid,
        payment_status: PaymentStatus,
    ) -> PortResult<()> {
        let mut state = self.state.lock().unwrap();
        let upload = state
            .uploads
            .get_mut(&upload_id)
            .ok_or_else(|| PortError::NotFound(format!("upload {}", upload_id)))?;
        upload.payment_status = payment_status;
        Ok(())
    }

    async fn create_score_log(&self, entry: NewScoreLog) -> PortResult<ScoreLogEntry> {
        let log = ScoreLogEntry {
            id: Uuid::new_v4(),
            user_id: entry.user_id,
            upload_id: entry.upload_id,
            word_count: entry.word_count,
            credits_used: entry.credits_used,
            request_data: Some(entry.request_data),
            response_data: None,
            ai_score: None,
            ai_confidence: None,
            public_link: None,
            scan_id: None,
            status: ScoreStatus::Pending,
            error_message: None,
            created_at: Utc::now(),
        };
        self.state.lock().unwrap().score_logs.push(log.clone());
        Ok(log)
    }

    async fn complete_score_log(&self, log_id: Uuid, result: &ScoreResult) -> PortResult<()> {
        if std::mem::take(&mut *self.fail_complete_log.lock().unwrap()) {
            return Err(PortError::Unexpected("connection reset".to_string()));
        }
        let mut state = self.state.lock().unwrap();
        let log = state
            .score_logs
            .iter_mut()
            .find(|log| log.id == log_id)
            .ok_or_else(|| PortError::NotFound(format!("score log {}", log_id)))?;
        log.status = ScoreStatus::Completed;
        log.ai_score = Some(result.ai_score);
        log.ai_confidence = Some(result.ai_confidence);
        log.public_link = result.public_link.clone();
        log.scan_id = Some(result.scan_id.clone());
        log.response_data = Some(result.raw_response.clone());
        Ok(())
    }

    async fn fail_score_log(&self, log_id: Uuid, error_message: &str) -> PortResult<()> {
        let mut state = self.state.lock().unwrap();
        let log = state
            .score_logs
            .iter_mut()
            .find(|log| log.id == log_id)
            .ok_or_else(|| PortError::NotFound(format!("score log {}", log_id)))?;
        log.status = ScoreStatus::Failed;
        log.error_message = Some(error_message.to_string());
        Ok(())
    }

    async fn latest_score_log(&self, upload_id: Uuid) -> PortResult<Option<ScoreLogEntry>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .score_logs
            .iter()
            .rev()
            .find(|log| log.upload_id == upload_id)
            .cloned())
    }

    async fn list_services(&self) -> PortResult<Vec<ServiceRecord>> {
        Ok(self.state.lock().unwrap().services.clone())
    }

    async fn get_service(&self, kind: ServiceKind) -> PortResult<Option<ServiceRecord>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .services
            .iter()
            .find(|s| s.kind == kind)
            .cloned())
    }

    async fn set_service_availability(
        &self,
        kind: ServiceKind,
        available: bool,
        note: &str,
    ) -> PortResult<Option<ServiceRecord>> {
        let mut state = self.state.lock().unwrap();
        Ok(state
            .services
            .iter_mut()
            .find(|s| s.kind == kind)
            .map(|service| {
                service.available = available;
                service.note = Some(note.to_string());
                service.clone()
            }))
    }

    async fn create_transaction(
        &self,
        user_id: Uuid,
        amount: i64,
        currency: &str,
        credits: i64,
    ) -> PortResult<CreditTransaction> {
        let tx = CreditTransaction {
            id: Uuid::new_v4(),
            user_id,
            checkout_session_id: None,
            amount,
            currency: currency.to_string(),
            credits,
            status: TransactionStatus::Pending,
        };
        self.state
            .lock()
            .unwrap()
            .transactions
            .insert(tx.id, tx.clone());
        Ok(tx)
    }

    async fn attach_checkout_session(
        &self,
        transaction_id: Uuid,
        session_id: &str,
    ) -> PortResult<()> {
        let mut state = self.state.lock().unwrap();
        let tx = state
            .transactions
            .get_mut(&transaction_id)
            .ok_or_else(|| PortError::NotFound(format!("transaction {}", transaction_id)))?;
        tx.checkout_session_id = Some(session_id.to_string());
        Ok(())
    }

    async fn pending_transactions(&self, user_id: Uuid) -> PortResult<Vec<CreditTransaction>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .transactions
            .values()
            .filter(|tx| tx.user_id == user_id && tx.status == TransactionStatus::Pending)
            .cloned()
            .collect())
    }

    async fn find_transaction_by_session(
        &self,
        session_id: &str,
    ) -> PortResult<Option<CreditTransaction>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .transactions
            .values()
            .find(|tx| tx.checkout_session_id.as_deref() == Some(session_id))
            .cloned())
    }

    async fn save_feedback(
        &self,
        user_id: Uuid,
        rating: FeedbackRating,
        message: Option<&str>,
    ) -> PortResult<()> {
        self.state
            .lock()
            .unwrap()
            .feedback
            .push((user_id, rating, message.map(str::to_string)));
        Ok(())
    }
}

#[async_trait]
impl CreditLedger for InMemory {
    async fn balance(&self, user_id: Uuid) -> PortResult<i64> {
        Ok(self.get_user(user_id).await?.credit)
    }

    async fn debit(&self, user_id: Uuid, amount: i64, note: UsageNote) -> PortResult<i64> {
        let mut state = self.state.lock().unwrap();
        let user = state
            .users
            .get_mut(&user_id)
            .ok_or_else(|| PortError::NotFound(format!("user {}", user_id)))?;
        if user.credit < amount {
            return Err(PortError::InsufficientCredit {
                required: amount,
                available: user.credit,
            });
        }
        user.credit -= amount;
        let balance = user.credit;
        state.usage.push(UsageRow {
            user_id,
            upload_id: note.upload_id,
            credits: amount,
            description: note.description,
        });
        Ok(balance)
    }

    async fn credit(&self, user_id: Uuid, amount: i64, note: UsageNote) -> PortResult<i64> {
        let mut state = self.state.lock().unwrap();
        let user = state
            .users
            .get_mut(&user_id)
            .ok_or_else(|| PortError::NotFound(format!("user {}", user_id)))?;
        user.credit += amount;
        let balance = user.credit;
        state.usage.push(UsageRow {
            user_id,
            upload_id: note.upload_id,
            credits: -amount,
            description: note.description,
        });
        Ok(balance)
    }

    async fn settle_purchase(&self, transaction_id: Uuid) -> PortResult<Option<i64>> {
        let mut state = self.state.lock().unwrap();
        let tx = state
            .transactions
            .get_mut(&transaction_id)
            .ok_or_else(|| PortError::NotFound(format!("transaction {}", transaction_id)))?;
        if tx.status != TransactionStatus::Pending {
            return Ok(None);
        }
        tx.status = TransactionStatus::Completed;
        let (user_id, credits) = (tx.user_id, tx.credits);
        let user = state
            .users
            .get_mut(&user_id)
            .ok_or_else(|| PortError::NotFound(format!("user {}", user_id)))?;
        user.credit += credits;
        let balance = user.credit;
        state.usage.push(UsageRow {
            user_id,
            upload_id: None,
            credits: -credits,
            description: format!("Credit purchase: {} credits", credits),
        });
        Ok(Some(balance))
    }
}

#[async_trait]
impl SessionStore for InMemory {
    async fn load(&self, conversation_id: &str) -> PortResult<ConversationSession> {
        Ok(self.session(conversation_id))
    }

    async fn save(&self, conversation_id: &str, session: &ConversationSession) -> PortResult<()> {
        self.put_session(conversation_id, session.clone());
        Ok(())
    }
}

#[async_trait]
impl ObjectStorage for InMemory {
    async fn put(
        &self,
        bucket: &str,
        path: &str,
        content: Bytes,
        _content_type: &str,
    ) -> PortResult<()> {
        if *self.fail_storage_put.lock().unwrap() {
            return Err(PortError::Storage("bucket unreachable".to_string()));
        }
        self.state
            .lock()
            .unwrap()
            .objects
            .insert((bucket.to_string(), path.to_string()), content);
        Ok(())
    }

    async fn get(&self, bucket: &str, path: &str) -> PortResult<Bytes> {
        self.state
            .lock()
            .unwrap()
            .objects
            .get(&(bucket.to_string(), path.to_string()))
            .cloned()
            .ok_or_else(|| PortError::Storage(format!("object {} missing", path)))
    }
}

//=========================================================================================
// Collaborator fakes
//=========================================================================================

/// Treats the document bytes as UTF-8 text.
pub struct PlainTextExtractor;

#[async_trait]
impl TextExtractionService for PlainTextExtractor {
    async fn extract(&self, content: Bytes, _format: DocumentFormat) -> PortResult<String> {
        String::from_utf8(content.to_vec())
            .map_err(|_| PortError::Extraction("unable to extract text".to_string()))
    }
}

pub struct FakeScorer {
    pub calls: AtomicUsize,
    pub fail_with: Mutex<Option<u16>>,
}

impl FakeScorer {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_with: Mutex::new(None),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ScoringService for FakeScorer {
    async fn scan(&self, _title: &str, _content: &str) -> PortResult<ScoreResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(status) = *self.fail_with.lock().unwrap() {
            return Err(PortError::ScoringApi {
                status,
                body: "upstream failure".to_string(),
            });
        }
        Ok(ScoreResult {
            ai_score: 0.25,
            ai_confidence: 0.9,
            public_link: Some("https://reports.example/scan-1".to_string()),
            scan_id: "scan-1".to_string(),
            raw_response: serde_json::json!({ "id": "scan-1" }),
        })
    }
}

#[derive(Default)]
pub struct FakePayments {
    pub paid_sessions: Mutex<Vec<String>>,
    pub checkouts: Mutex<Vec<CheckoutRequest>>,
    counter: AtomicU64,
}

impl FakePayments {
    pub fn mark_paid(&self, session_id: &str) {
        self.paid_sessions
            .lock()
            .unwrap()
            .push(session_id.to_string());
    }
}

#[async_trait]
impl PaymentService for FakePayments {
    async fn create_customer(&self, user: &User) -> PortResult<String> {
        Ok(format!("cus_{}", user.external_id))
    }

    async fn create_checkout(&self, request: CheckoutRequest) -> PortResult<Checkout> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        self.checkouts.lock().unwrap().push(request);
        Ok(Checkout {
            session_id: format!("cs_test_{}", n),
            url: format!("https://checkout.example/cs_test_{}", n),
        })
    }

    async fn is_checkout_paid(&self, session_id: &str) -> PortResult<bool> {
        Ok(self
            .paid_sessions
            .lock()
            .unwrap()
            .iter()
            .any(|s| s == session_id))
    }
}

/// Records everything the workflow shows the user.
#[derive(Default)]
pub struct RecordingTransport {
    pub sent: Mutex<Vec<(MessageId, OutboundMessage)>>,
    pub deleted: Mutex<Vec<MessageId>>,
    next_id: AtomicU64,
}

impl RecordingTransport {
    /// Messages still visible, i.e. sent and not deleted.
    pub fn visible(&self) -> Vec<OutboundMessage> {
        let deleted = self.deleted.lock().unwrap().clone();
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| !deleted.contains(id))
            .map(|(_, msg)| msg.clone())
            .collect()
    }

    pub fn last_text(&self) -> String {
        self.visible()
            .last()
            .map(|msg| msg.text.clone())
            .unwrap_or_default()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
        self.deleted.lock().unwrap().clear();
    }
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    async fn send(&self, _conversation_id: &str, message: OutboundMessage) -> PortResult<MessageId> {
        let id = MessageId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.sent.lock().unwrap().push((id, message));
        Ok(id)
    }

    async fn delete(&self, _conversation_id: &str, message_id: MessageId) -> PortResult<()> {
        self.deleted.lock().unwrap().push(message_id);
        Ok(())
    }
}

//=========================================================================================
// Harness
//=========================================================================================

pub struct Harness {
    pub store: Arc<InMemory>,
    pub scorer: Arc<FakeScorer>,
    pub payments: Arc<FakePayments>,
    pub transport: RecordingTransport,
    pub workflow: Workflow,
    pub user: User,
}

impl Harness {
    pub fn new(credit: i64) -> Self {
        Self::with_refund_policy(credit, Arc::new(NoRefund))
    }

    pub fn with_refund_policy(credit: i64, refund_policy: Arc<dyn RefundPolicy>) -> Self {
        let store = Arc::new(InMemory::new());
        let scorer = Arc::new(FakeScorer::new());
        let payments = Arc::new(FakePayments::default());
        let user = store.add_user(1001, credit);
        let deps = WorkflowDeps {
            db: store.clone(),
            ledger: store.clone(),
            sessions: store.clone(),
            storage: store.clone(),
            extractor: Arc::new(PlainTextExtractor),
            scoring: Some(scorer.clone()),
            payments: payments.clone(),
            refund_policy,
        };
        let settings = WorkflowSettings {
            storage_bucket: BUCKET.to_string(),
            busy_lease: chrono::Duration::minutes(15),
            currency: "usd".to_string(),
            bot_username: "originality_bot".to_string(),
        };
        Self {
            store,
            scorer,
            payments,
            transport: RecordingTransport::default(),
            workflow: Workflow::new(deps, settings),
            user,
        }
    }

    pub fn turn(&self) -> Turn<'_> {
        Turn::new(
            ConversationRef {
                conversation_id: CONVERSATION.to_string(),
                user_id: self.user.id,
            },
            &self.transport,
        )
    }

    pub fn select(&self, kind: ServiceKind) {
        let mut session = self.store.session(CONVERSATION);
        session.selected_service = Some(kind);
        self.store.put_session(CONVERSATION, session);
    }

    pub fn credit(&self) -> i64 {
        self.store.credit_of(self.user.id)
    }
}

/// A submission whose "text" is `words` repetitions of a word.
pub fn document(file_name: &str, words: usize) -> DocumentSubmission {
    let text = vec!["word"; words].join(" ");
    DocumentSubmission {
        file_name: file_name.to_string(),
        mime_type: None,
        content: Bytes::from(text),
    }
}

/// A submission whose bytes are not valid UTF-8.
pub fn unreadable_document(file_name: &str) -> DocumentSubmission {
    DocumentSubmission {
        file_name: file_name.to_string(),
        mime_type: None,
        content: unreadable_bytes(),
    }
}

fn unreadable_bytes() -> Bytes {
    Bytes::from_static(&[0xff, 0xfe, 0xfd, 0x00])
}

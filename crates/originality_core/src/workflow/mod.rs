//! crates/originality_core/src/workflow/mod.rs
//!
//! The conversation workflow: service selection, document intake, price
//! confirmation, analysis, credit purchases and feedback. Every entry point
//! runs behind one error boundary that logs the failure and answers with a
//! single user-facing message.

mod analysis;
mod error;
mod feedback;
mod intake;
mod purchase;
mod refund;

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::domain::DocumentSubmission;
use crate::interaction::{ConversationRef, MessageId, OutboundMessage, UserAction};
use crate::messages;
use crate::ports::{
    ChatTransport, CreditLedger, DatabaseService, ObjectStorage, PaymentService, PortResult,
    ScoringService, SessionStore, TextExtractionService,
};

pub use error::{WorkflowError, WorkflowResult};
pub use purchase::{parse_start_param, SettleOutcome, StartParam};
pub use refund::{NoRefund, RefundOnFailure, RefundPolicy};

/// Static settings the workflow needs from configuration.
#[derive(Debug, Clone)]
pub struct WorkflowSettings {
    /// Bucket that receives uploaded documents.
    pub storage_bucket: String,
    /// Longest time a busy lease blocks a user before it counts as stale.
    pub busy_lease: chrono::Duration,
    /// ISO currency code for credit purchases.
    pub currency: String,
    /// Bot handle used to build checkout return deep links.
    pub bot_username: String,
}

/// Collaborators the workflow drives.
#[derive(Clone)]
pub struct WorkflowDeps {
    pub db: Arc<dyn DatabaseService>,
    pub ledger: Arc<dyn CreditLedger>,
    pub sessions: Arc<dyn SessionStore>,
    pub storage: Arc<dyn ObjectStorage>,
    pub extractor: Arc<dyn TextExtractionService>,
    /// `None` when no scoring API key is configured.
    pub scoring: Option<Arc<dyn ScoringService>>,
    pub payments: Arc<dyn PaymentService>,
    pub refund_policy: Arc<dyn RefundPolicy>,
}

/// One inbound event: who sent it and where replies go.
pub struct Turn<'a> {
    pub conversation: ConversationRef,
    pub transport: &'a dyn ChatTransport,
}

impl<'a> Turn<'a> {
    pub fn new(conversation: ConversationRef, transport: &'a dyn ChatTransport) -> Self {
        Self {
            conversation,
            transport,
        }
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation.conversation_id
    }

    pub fn user_id(&self) -> Uuid {
        self.conversation.user_id
    }

    pub(crate) async fn reply(&self, message: OutboundMessage) -> PortResult<MessageId> {
        self.transport.send(self.conversation_id(), message).await
    }

    /// Removes a transient notice. A failed delete is only logged.
    pub(crate) async fn retract(&self, message_id: MessageId) {
        if let Err(e) = self.transport.delete(self.conversation_id(), message_id).await {
            warn!(
                conversation_id = %self.conversation_id(),
                error = %e,
                "Failed to delete transient message"
            );
        }
    }
}

pub struct Workflow {
    deps: WorkflowDeps,
    settings: WorkflowSettings,
}

impl Workflow {
    pub fn new(deps: WorkflowDeps, settings: WorkflowSettings) -> Self {
        Self { deps, settings }
    }

    pub fn settings(&self) -> &WorkflowSettings {
        &self.settings
    }

    //=========================================================================================
    // Entry points
    //=========================================================================================

    pub async fn handle_action(&self, turn: &Turn<'_>, action: UserAction) {
        let outcome = match action {
            UserAction::Home => self.show_home(turn).await,
            UserAction::SelectService { service } => self.select_service(turn, service).await,
            UserAction::ConfirmUpload { upload_id } => self.confirm_upload(turn, upload_id).await,
            UserAction::CancelUpload { upload_id } => self.cancel_upload(turn, upload_id).await,
            UserAction::BuyCredits { credits: None } => self.show_credit_menu(turn).await,
            UserAction::BuyCredits {
                credits: Some(credits),
            } => self.start_checkout(turn, credits).await,
            UserAction::CustomCredits => self.ask_credit_amount(turn).await,
            UserAction::Start { param } => self.start(turn, param.as_deref()).await,
            UserAction::Feedback { rating } => self.start_feedback(turn, rating).await,
        };
        self.finish(turn, outcome).await;
    }

    pub async fn handle_document(&self, turn: &Turn<'_>, document: DocumentSubmission) {
        let outcome = self.receive_document(turn, document).await;
        self.finish(turn, outcome).await;
    }

    pub async fn handle_text(&self, turn: &Turn<'_>, text: &str) {
        let outcome = self.receive_text(turn, text).await;
        self.finish(turn, outcome).await;
    }

    /// Error boundary: logs the failure and sends the category's message.
    async fn finish(&self, turn: &Turn<'_>, outcome: WorkflowResult<()>) {
        let Err(err) = outcome else {
            return;
        };
        match &err {
            WorkflowError::Unexpected(_) | WorkflowError::Storage(_) | WorkflowError::ScoringApi { .. } => {
                error!(
                    conversation_id = %turn.conversation_id(),
                    user_id = %turn.user_id(),
                    category = err.category(),
                    error = %err,
                    "Workflow step failed"
                );
            }
            _ => {
                info!(
                    conversation_id = %turn.conversation_id(),
                    user_id = %turn.user_id(),
                    category = err.category(),
                    error = %err,
                    "Workflow step rejected"
                );
            }
        }
        if let Err(e) = turn.reply(err.user_message()).await {
            error!(
                conversation_id = %turn.conversation_id(),
                error = %e,
                "Failed to deliver error message"
            );
        }
    }

    //=========================================================================================
    // Navigation
    //=========================================================================================

    async fn show_home(&self, turn: &Turn<'_>) -> WorkflowResult<()> {
        let services = self.deps.db.list_services().await?;
        turn.reply(messages::home(&services)).await?;
        Ok(())
    }

    async fn select_service(
        &self,
        turn: &Turn<'_>,
        kind: crate::catalog::ServiceKind,
    ) -> WorkflowResult<()> {
        let service = self
            .deps
            .db
            .get_service(kind)
            .await?
            .ok_or(WorkflowError::ServiceUnavailable(kind))?;
        if !service.available {
            return Err(WorkflowError::ServiceUnavailable(kind));
        }

        let mut session = self.deps.sessions.load(turn.conversation_id()).await?;
        session.selected_service = Some(kind);
        session.clear_pending_upload();
        self.deps.sessions.save(turn.conversation_id(), &session).await?;

        info!(user_id = %turn.user_id(), service = %kind, "Service selected");
        turn.reply(messages::upload_prompt(&service)).await?;
        Ok(())
    }

    //=========================================================================================
    // Busy lease and transient notices
    //=========================================================================================

    /// Runs `work` while holding the user's busy lease. The lease is released
    /// on every exit path; a release failure is logged and left to expire.
    async fn with_busy_lease<T, F>(&self, user_id: Uuid, work: F) -> WorkflowResult<T>
    where
        F: Future<Output = WorkflowResult<T>>,
    {
        let acquired = self
            .deps
            .db
            .try_acquire_busy_lease(user_id, Utc::now(), self.settings.busy_lease)
            .await?;
        if !acquired {
            return Err(WorkflowError::Busy);
        }

        let outcome = work.await;

        if let Err(e) = self.deps.db.release_busy_lease(user_id).await {
            error!(%user_id, error = %e, "Failed to release busy lease");
        }
        outcome
    }

    /// Shows `notice` while `work` runs and removes it afterwards.
    async fn with_notice<T, F>(
        &self,
        turn: &Turn<'_>,
        notice: OutboundMessage,
        work: F,
    ) -> WorkflowResult<T>
    where
        F: Future<Output = WorkflowResult<T>>,
    {
        let notice_id = turn.reply(notice).await?;
        let outcome = work.await;
        turn.retract(notice_id).await;
        outcome
    }
}

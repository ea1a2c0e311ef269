//! crates/originality_core/src/workflow/intake.rs
//!
//! Document intake: the gates every submission passes, then either a price
//! quote awaiting confirmation or an immediate flat charge.

use chrono::Utc;
use tracing::info;

use super::{Turn, Workflow, WorkflowError, WorkflowResult};
use crate::catalog::{DocumentFormat, ServiceKind};
use crate::domain::{DocumentSubmission, NewUpload, PaymentStatus, UsageNote, User};
use crate::messages::{self, Quote};
use crate::pricing::{count_words, credits_for, required_credits};

/// Storage key of an uploaded document.
pub(crate) fn storage_path(external_id: i64, file_name: &str) -> String {
    format!(
        "essays/{}/{}_{}",
        external_id,
        Utc::now().timestamp_millis(),
        safe_file_name(file_name)
    )
}

/// The file name as a single URL- and filesystem-safe path segment. The
/// original name is kept on the upload row for display.
fn safe_file_name(file_name: &str) -> String {
    let cleaned: String = file_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "document".to_string()
    } else {
        cleaned.to_string()
    }
}

impl Workflow {
    pub(super) async fn receive_document(
        &self,
        turn: &Turn<'_>,
        document: DocumentSubmission,
    ) -> WorkflowResult<()> {
        let session = self.deps.sessions.load(turn.conversation_id()).await?;
        if session.waiting_for_credit_amount || session.waiting_for_feedback_message {
            info!(user_id = %turn.user_id(), "Ignoring document while waiting for a text reply");
            return Ok(());
        }

        let Some(kind) = session.selected_service else {
            let services = self.deps.db.list_services().await?;
            turn.reply(messages::no_service_selected(&services)).await?;
            return Ok(());
        };

        let format = DocumentFormat::detect(&document.file_name, document.mime_type.as_deref())
            .filter(|format| kind.accepts(*format))
            .ok_or_else(|| WorkflowError::FormatMismatch {
                service: kind,
                file_name: document.file_name.clone(),
            })?;

        let available = self
            .deps
            .db
            .get_service(kind)
            .await?
            .map(|service| service.available)
            .unwrap_or(false);
        if !available {
            return Err(WorkflowError::ServiceUnavailable(kind));
        }

        let user = self.deps.db.get_user(turn.user_id()).await?;
        if user.is_analyzing(Utc::now(), self.settings.busy_lease) {
            return Err(WorkflowError::Busy);
        }

        info!(
            user_id = %user.id,
            service = %kind,
            file_name = %document.file_name,
            size = document.content.len(),
            "Document received"
        );

        if kind.policy().requires_confirmation {
            self.quote_document(turn, &user, kind, format, document).await
        } else {
            self.charge_flat(turn, &user, kind, format, document).await
        }
    }

    /// Reads and prices the document, stores it, and asks for confirmation.
    async fn quote_document(
        &self,
        turn: &Turn<'_>,
        user: &User,
        kind: ServiceKind,
        format: DocumentFormat,
        document: DocumentSubmission,
    ) -> WorkflowResult<()> {
        if self.deps.scoring.is_none() {
            return Err(WorkflowError::ScoringNotConfigured);
        }

        let work = async {
            let text = self
                .deps
                .extractor
                .extract(document.content.clone(), format)
                .await?;
            let words = count_words(&text);
            if words == 0 {
                return Err(WorkflowError::EmptyDocument);
            }
            let required = required_credits(words);

            let path = storage_path(user.external_id, &document.file_name);
            let mime_type = document
                .mime_type
                .clone()
                .unwrap_or_else(|| format.mime_type().to_string());
            self.deps
                .storage
                .put(
                    &self.settings.storage_bucket,
                    &path,
                    document.content.clone(),
                    &mime_type,
                )
                .await?;

            let upload = self
                .deps
                .db
                .create_upload(NewUpload {
                    user_id: user.id,
                    service: kind,
                    file_name: document.file_name.clone(),
                    file_size: document.content.len() as i64,
                    file_path: path,
                    mime_type: Some(mime_type),
                    payment_status: PaymentStatus::NotPaid,
                    word_count: Some(words as i64),
                    credits_required: Some(required),
                })
                .await?;
            Ok::<_, WorkflowError>(upload)
        };
        let upload = self
            .with_busy_lease(user.id, self.with_notice(turn, messages::processing(), work))
            .await?;

        let word_count = upload.word_count.unwrap_or_default();
        let required = upload.credits_required.unwrap_or_default();

        let mut session = self.deps.sessions.load(turn.conversation_id()).await?;
        session.set_pending_upload(upload.id, word_count, required);
        self.deps.sessions.save(turn.conversation_id(), &session).await?;

        let balance = self.deps.ledger.balance(user.id).await?;
        let quote = Quote {
            upload_id: upload.id,
            file_name: &upload.file_name,
            word_count,
            required_credits: required,
            current_credit: balance,
        };
        info!(
            user_id = %user.id,
            upload_id = %upload.id,
            word_count,
            required,
            balance,
            "Document quoted"
        );
        if balance >= required {
            turn.reply(messages::confirmation(&quote)).await?;
        } else {
            turn.reply(messages::insufficient_for_quote(&quote)).await?;
        }
        Ok(())
    }

    /// Stores the document and charges the service's flat price right away.
    async fn charge_flat(
        &self,
        turn: &Turn<'_>,
        user: &User,
        kind: ServiceKind,
        format: DocumentFormat,
        document: DocumentSubmission,
    ) -> WorkflowResult<()> {
        let required = credits_for(kind, 0);
        let balance = self.deps.ledger.balance(user.id).await?;
        if balance < required {
            turn.reply(messages::insufficient_credit(balance, required))
                .await?;
            return Ok(());
        }

        let work = async {
            let path = storage_path(user.external_id, &document.file_name);
            let mime_type = document
                .mime_type
                .clone()
                .unwrap_or_else(|| format.mime_type().to_string());
            self.deps
                .storage
                .put(
                    &self.settings.storage_bucket,
                    &path,
                    document.content.clone(),
                    &mime_type,
                )
                .await?;

            let upload = self
                .deps
                .db
                .create_upload(NewUpload {
                    user_id: user.id,
                    service: kind,
                    file_name: document.file_name.clone(),
                    file_size: document.content.len() as i64,
                    file_path: path,
                    mime_type: Some(mime_type),
                    payment_status: PaymentStatus::NotPaid,
                    word_count: None,
                    credits_required: None,
                })
                .await?;

            let remaining = self
                .deps
                .ledger
                .debit(
                    user.id,
                    required,
                    UsageNote {
                        upload_id: Some(upload.id),
                        description: format!("Document upload: {}", upload.file_name),
                    },
                )
                .await?;
            self.deps
                .db
                .set_upload_payment_status(upload.id, PaymentStatus::Paid)
                .await?;
            Ok::<_, WorkflowError>((upload, remaining))
        };
        let (upload, remaining) = self
            .with_busy_lease(user.id, self.with_notice(turn, messages::processing(), work))
            .await?;

        let mut session = self.deps.sessions.load(turn.conversation_id()).await?;
        session.selected_service = None;
        self.deps.sessions.save(turn.conversation_id(), &session).await?;

        info!(
            user_id = %user.id,
            upload_id = %upload.id,
            service = %kind,
            remaining,
            "Flat-rate document accepted"
        );
        turn.reply(messages::flat_upload_success(
            &upload.file_name,
            upload.file_size,
            upload.id,
            remaining,
        ))
        .await?;
        Ok(())
    }
}

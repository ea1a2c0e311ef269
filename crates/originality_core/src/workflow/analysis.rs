//! crates/originality_core/src/workflow/analysis.rs
//!
//! Confirmation, cancellation and resumption of a quoted upload, and the
//! charged scoring run itself.

use std::sync::Arc;

use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{Turn, Workflow, WorkflowError, WorkflowResult};
use crate::catalog::DocumentFormat;
use crate::domain::{
    ConversationSession, NewScoreLog, ScoreResult, ScoreStatus, Upload, UploadStatus, UsageNote,
};
use crate::messages::{self, Quote};
use crate::ports::ScoringService;
use crate::pricing::{count_words, required_credits};

/// Word count and price of an upload, as first quoted to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PriceQuote {
    pub word_count: i64,
    pub credits: i64,
}

struct AnalysisOutcome {
    result: ScoreResult,
    quote: PriceQuote,
    remaining: i64,
}

impl Workflow {
    /// Loads an upload, hiding other users' uploads behind `NotFound`.
    pub(super) async fn owned_upload(&self, turn: &Turn<'_>, upload_id: Uuid) -> WorkflowResult<Upload> {
        let upload = self.deps.db.get_upload(upload_id).await?;
        if upload.user_id != turn.user_id() {
            warn!(
                user_id = %turn.user_id(),
                %upload_id,
                "Upload requested by a user who does not own it"
            );
            return Err(WorkflowError::NotFound(format!("upload {}", upload_id)));
        }
        Ok(upload)
    }

    /// Only quoted uploads that have not been scored yet can be confirmed,
    /// cancelled or resumed.
    ///
    /// A pending score log outside the busy lease means an attempt was charged
    /// but never recorded as finished, so it counts as processed.
    async fn ensure_awaiting_confirmation(&self, upload: &Upload) -> WorkflowResult<()> {
        if !upload.service.policy().requires_confirmation {
            return Err(WorkflowError::NotFound(format!("quoted upload {}", upload.id)));
        }
        if upload.status == UploadStatus::Completed {
            return Err(WorkflowError::AlreadyProcessed(upload.id));
        }
        if let Some(log) = self.deps.db.latest_score_log(upload.id).await? {
            if matches!(log.status, ScoreStatus::Completed | ScoreStatus::Pending) {
                return Err(WorkflowError::AlreadyProcessed(upload.id));
            }
        }
        Ok(())
    }

    /// Recovers the quote from persisted state first, then the session cache,
    /// then the latest score attempt.
    pub(super) async fn resolve_quote(
        &self,
        session: &ConversationSession,
        upload: &Upload,
    ) -> WorkflowResult<Option<PriceQuote>> {
        if let (Some(word_count), Some(credits)) = (upload.word_count, upload.credits_required) {
            return Ok(Some(PriceQuote {
                word_count,
                credits,
            }));
        }
        if session.pending_upload_id == Some(upload.id) {
            if let (Some(word_count), Some(credits)) =
                (session.pending_word_count, session.pending_credits_required)
            {
                return Ok(Some(PriceQuote {
                    word_count,
                    credits,
                }));
            }
        }
        Ok(self
            .deps
            .db
            .latest_score_log(upload.id)
            .await?
            .map(|log| PriceQuote {
                word_count: log.word_count,
                credits: log.credits_used,
            }))
    }

    pub(super) async fn confirm_upload(&self, turn: &Turn<'_>, upload_id: Uuid) -> WorkflowResult<()> {
        let scoring = self
            .deps
            .scoring
            .clone()
            .ok_or(WorkflowError::ScoringNotConfigured)?;
        let upload = self.owned_upload(turn, upload_id).await?;
        self.ensure_awaiting_confirmation(&upload).await?;

        let session = self.deps.sessions.load(turn.conversation_id()).await?;
        let quote = self.resolve_quote(&session, &upload).await?;

        if let Some(quote) = quote {
            let balance = self.deps.ledger.balance(turn.user_id()).await?;
            if balance < quote.credits {
                return Err(WorkflowError::InsufficientCredit {
                    required: quote.credits,
                    available: balance,
                });
            }
        }

        let outcome = self
            .with_busy_lease(
                turn.user_id(),
                self.with_notice(
                    turn,
                    messages::analysis_processing(),
                    self.run_analysis(&upload, quote, scoring),
                ),
            )
            .await?;

        let mut session = self.deps.sessions.load(turn.conversation_id()).await?;
        session.clear_pending_upload();
        session.selected_service = None;
        self.deps.sessions.save(turn.conversation_id(), &session).await?;

        info!(
            user_id = %turn.user_id(),
            upload_id = %upload.id,
            ai_score = outcome.result.ai_score,
            credits = outcome.quote.credits,
            remaining = outcome.remaining,
            "Analysis completed"
        );
        turn.reply(messages::analysis_result(
            &upload.file_name,
            outcome.quote.word_count,
            &outcome.result,
            outcome.quote.credits,
            outcome.remaining,
        ))
        .await?;
        Ok(())
    }

    /// Extract, log, debit, score. Runs under the busy lease.
    async fn run_analysis(
        &self,
        upload: &Upload,
        quote: Option<PriceQuote>,
        scoring: Arc<dyn ScoringService>,
    ) -> WorkflowResult<AnalysisOutcome> {
        // Another conversation may have confirmed the same upload while this
        // one waited for the lease.
        let upload = &self.deps.db.get_upload(upload.id).await?;
        self.ensure_awaiting_confirmation(upload).await?;

        let content = self
            .deps
            .storage
            .get(&self.settings.storage_bucket, &upload.file_path)
            .await?;
        let format = DocumentFormat::detect(&upload.file_name, upload.mime_type.as_deref())
            .ok_or_else(|| {
                WorkflowError::Extraction(format!("unsupported document '{}'", upload.file_name))
            })?;
        let text = self.deps.extractor.extract(content, format).await?;
        let words = count_words(&text);
        if words == 0 {
            return Err(WorkflowError::EmptyDocument);
        }
        let quote = quote.unwrap_or(PriceQuote {
            word_count: words as i64,
            credits: required_credits(words),
        });

        let log = self
            .deps
            .db
            .create_score_log(NewScoreLog {
                user_id: upload.user_id,
                upload_id: upload.id,
                word_count: quote.word_count,
                credits_used: quote.credits,
                request_data: json!({
                    "title": upload.file_name,
                    "word_count": quote.word_count,
                }),
            })
            .await?;

        let remaining = match self
            .deps
            .ledger
            .debit(
                upload.user_id,
                quote.credits,
                UsageNote {
                    upload_id: Some(upload.id),
                    description: format!("Originality analysis: {}", upload.file_name),
                },
            )
            .await
        {
            Ok(remaining) => remaining,
            Err(e) => {
                let err = WorkflowError::from(e);
                self.record_failure(log.id, &err).await;
                return Err(err);
            }
        };

        let result = match scoring.scan(&upload.file_name, &text).await {
            Ok(result) => result,
            Err(e) => {
                let err = WorkflowError::from(e);
                self.record_failure(log.id, &err).await;
                self.apply_refund_policy(upload, quote.credits, &err).await;
                return Err(err);
            }
        };

        // Charged and scanned: the result is delivered even if recording it
        // fails. Either write alone refuses a replay.
        if let Err(e) = self.deps.db.complete_upload(upload.id).await {
            error!(upload_id = %upload.id, error = %e, "Failed to mark scored upload completed");
        }
        if let Err(e) = self.deps.db.complete_score_log(log.id, &result).await {
            error!(log_id = %log.id, upload_id = %upload.id, error = %e, "Failed to record score result");
        }

        Ok(AnalysisOutcome {
            result,
            quote,
            remaining,
        })
    }

    async fn record_failure(&self, log_id: Uuid, err: &WorkflowError) {
        if let Err(e) = self.deps.db.fail_score_log(log_id, &err.to_string()).await {
            error!(%log_id, error = %e, "Failed to mark score log as failed");
        }
    }

    async fn apply_refund_policy(&self, upload: &Upload, credits: i64, err: &WorkflowError) {
        if !self.deps.refund_policy.should_refund(err) {
            warn!(
                upload_id = %upload.id,
                credits,
                "Scoring failed after the charge; credits kept"
            );
            return;
        }
        let note = UsageNote {
            upload_id: Some(upload.id),
            description: format!("Refund for failed analysis: {}", upload.file_name),
        };
        match self.deps.ledger.credit(upload.user_id, credits, note).await {
            Ok(balance) => info!(upload_id = %upload.id, credits, balance, "Charge refunded"),
            Err(e) => error!(upload_id = %upload.id, error = %e, "Failed to refund charge"),
        }
    }

    pub(super) async fn cancel_upload(&self, turn: &Turn<'_>, upload_id: Uuid) -> WorkflowResult<()> {
        let upload = self.owned_upload(turn, upload_id).await?;
        self.ensure_awaiting_confirmation(&upload).await?;

        let mut session = self.deps.sessions.load(turn.conversation_id()).await?;
        if session.pending_upload_id == Some(upload.id) {
            session.clear_pending_upload();
            self.deps.sessions.save(turn.conversation_id(), &session).await?;
        }
        info!(user_id = %turn.user_id(), %upload_id, "Upload cancelled");
        turn.reply(messages::cancelled()).await?;
        Ok(())
    }

    /// Re-presents the confirmation (or top-up prompt) for a quoted upload,
    /// rebuilding the session's pending fields from persisted state.
    pub(super) async fn resume_upload(&self, turn: &Turn<'_>, upload_id: Uuid) -> WorkflowResult<()> {
        let upload = self.owned_upload(turn, upload_id).await?;
        self.ensure_awaiting_confirmation(&upload).await?;

        let mut session = self.deps.sessions.load(turn.conversation_id()).await?;
        let quote = self
            .resolve_quote(&session, &upload)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(format!("quote for upload {}", upload.id)))?;

        session.set_pending_upload(upload.id, quote.word_count, quote.credits);
        session.selected_service = Some(upload.service);
        self.deps.sessions.save(turn.conversation_id(), &session).await?;

        let balance = self.deps.ledger.balance(turn.user_id()).await?;
        let view = Quote {
            upload_id: upload.id,
            file_name: &upload.file_name,
            word_count: quote.word_count,
            required_credits: quote.credits,
            current_credit: balance,
        };
        info!(
            user_id = %turn.user_id(),
            %upload_id,
            balance,
            required = quote.credits,
            "Upload resumed"
        );
        if balance >= quote.credits {
            turn.reply(messages::confirmation(&view)).await?;
        } else {
            turn.reply(messages::insufficient_for_quote(&view)).await?;
        }
        Ok(())
    }
}

//! crates/originality_core/src/workflow/feedback.rs

use tracing::info;

use super::{Turn, Workflow, WorkflowResult};
use crate::domain::FeedbackRating;
use crate::messages;

const SKIP_COMMAND: &str = "/skip";

impl Workflow {
    pub(super) async fn start_feedback(
        &self,
        turn: &Turn<'_>,
        rating: FeedbackRating,
    ) -> WorkflowResult<()> {
        let mut session = self.deps.sessions.load(turn.conversation_id()).await?;
        session.waiting_for_feedback_message = true;
        session.waiting_for_credit_amount = false;
        session.feedback_rating = Some(rating);
        self.deps.sessions.save(turn.conversation_id(), &session).await?;
        turn.reply(messages::feedback_prompt()).await?;
        Ok(())
    }

    /// Free text is only meaningful as the answer to an open prompt; anything
    /// else brings the user back to the menu.
    pub(super) async fn receive_text(&self, turn: &Turn<'_>, text: &str) -> WorkflowResult<()> {
        let session = self.deps.sessions.load(turn.conversation_id()).await?;
        if session.waiting_for_credit_amount {
            return self.receive_credit_amount(turn, text).await;
        }
        if session.waiting_for_feedback_message {
            return self.receive_feedback(turn, text).await;
        }
        self.show_home(turn).await
    }

    async fn receive_feedback(&self, turn: &Turn<'_>, text: &str) -> WorkflowResult<()> {
        let mut session = self.deps.sessions.load(turn.conversation_id()).await?;
        let rating = session.feedback_rating.unwrap_or(FeedbackRating::Good);
        let text = text.trim();
        let message = (!text.is_empty() && text != SKIP_COMMAND).then_some(text);

        self.deps
            .db
            .save_feedback(turn.user_id(), rating, message)
            .await?;

        session.waiting_for_feedback_message = false;
        session.feedback_rating = None;
        self.deps.sessions.save(turn.conversation_id(), &session).await?;

        info!(
            user_id = %turn.user_id(),
            rating = rating.as_str(),
            with_message = message.is_some(),
            "Feedback saved"
        );
        turn.reply(messages::feedback_thanks()).await?;
        Ok(())
    }
}

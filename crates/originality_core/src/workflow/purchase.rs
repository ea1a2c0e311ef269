//! crates/originality_core/src/workflow/purchase.rs
//!
//! Credit purchases: the pack menu, hosted checkout creation, settlement of
//! paid checkouts and the deep links that bring the user back afterwards.

use tracing::{info, warn};
use uuid::Uuid;

use super::{Turn, Workflow, WorkflowError, WorkflowResult};
use crate::messages;
use crate::ports::CheckoutRequest;
use crate::pricing::{credit_pack_price, credit_pack_price_minor, MAX_CREDIT_PURCHASE};

const PAYMENT_SUCCESS_PREFIX: &str = "payment_success_";
const PAYMENT_CANCEL_PREFIX: &str = "payment_cancel_";
const CREDIT_PURCHASE_SUCCESS: &str = "credit_purchase_success";
const CREDIT_PURCHASE_CANCEL: &str = "credit_purchase_cancel";

/// Parameter carried by a start deep link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartParam {
    /// Checkout finished while an upload was waiting for credits.
    PaymentSuccess(Uuid),
    PaymentCancel(Uuid),
    /// Checkout finished with no upload waiting.
    CreditPurchaseSuccess,
    CreditPurchaseCancel,
}

impl StartParam {
    pub fn encode(&self) -> String {
        match self {
            StartParam::PaymentSuccess(id) => format!("{}{}", PAYMENT_SUCCESS_PREFIX, id),
            StartParam::PaymentCancel(id) => format!("{}{}", PAYMENT_CANCEL_PREFIX, id),
            StartParam::CreditPurchaseSuccess => CREDIT_PURCHASE_SUCCESS.to_string(),
            StartParam::CreditPurchaseCancel => CREDIT_PURCHASE_CANCEL.to_string(),
        }
    }
}

pub fn parse_start_param(raw: &str) -> Option<StartParam> {
    let raw = raw.trim();
    if let Some(id) = raw.strip_prefix(PAYMENT_SUCCESS_PREFIX) {
        return Uuid::parse_str(id).ok().map(StartParam::PaymentSuccess);
    }
    if let Some(id) = raw.strip_prefix(PAYMENT_CANCEL_PREFIX) {
        return Uuid::parse_str(id).ok().map(StartParam::PaymentCancel);
    }
    match raw {
        CREDIT_PURCHASE_SUCCESS => Some(StartParam::CreditPurchaseSuccess),
        CREDIT_PURCHASE_CANCEL => Some(StartParam::CreditPurchaseCancel),
        _ => None,
    }
}

/// Result of settling one checkout from the payment callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleOutcome {
    Settled { balance: i64 },
    AlreadySettled,
    NotPaid,
}

impl Workflow {
    fn deep_link(&self, param: StartParam) -> String {
        format!(
            "https://t.me/{}?start={}",
            self.settings.bot_username,
            param.encode()
        )
    }

    pub(super) async fn show_credit_menu(&self, turn: &Turn<'_>) -> WorkflowResult<()> {
        let balance = self.deps.ledger.balance(turn.user_id()).await?;
        turn.reply(messages::credit_menu(balance)).await?;
        Ok(())
    }

    pub(super) async fn ask_credit_amount(&self, turn: &Turn<'_>) -> WorkflowResult<()> {
        let mut session = self.deps.sessions.load(turn.conversation_id()).await?;
        session.waiting_for_credit_amount = true;
        session.waiting_for_feedback_message = false;
        self.deps.sessions.save(turn.conversation_id(), &session).await?;
        turn.reply(messages::custom_amount_prompt()).await?;
        Ok(())
    }

    /// Handles the typed reply to the custom-amount prompt.
    pub(super) async fn receive_credit_amount(&self, turn: &Turn<'_>, text: &str) -> WorkflowResult<()> {
        let credits = match text.trim().parse::<i64>() {
            Ok(credits) if (1..=MAX_CREDIT_PURCHASE).contains(&credits) => credits,
            _ => {
                turn.reply(messages::invalid_amount()).await?;
                return Ok(());
            }
        };

        let mut session = self.deps.sessions.load(turn.conversation_id()).await?;
        session.waiting_for_credit_amount = false;
        self.deps.sessions.save(turn.conversation_id(), &session).await?;

        self.start_checkout(turn, credits).await
    }

    pub(super) async fn start_checkout(&self, turn: &Turn<'_>, credits: i64) -> WorkflowResult<()> {
        let (Some(price), Some(amount)) =
            (credit_pack_price(credits), credit_pack_price_minor(credits))
        else {
            info!(user_id = %turn.user_id(), credits, "Credit amount out of range");
            turn.reply(messages::invalid_amount()).await?;
            return Ok(());
        };

        let user = self.deps.db.get_user(turn.user_id()).await?;
        let customer_id = match user.customer_id.clone() {
            Some(customer_id) => customer_id,
            None => {
                let customer_id = self.deps.payments.create_customer(&user).await?;
                self.deps.db.set_customer_id(user.id, &customer_id).await?;
                info!(user_id = %user.id, "Payment customer created");
                customer_id
            }
        };

        let transaction = self
            .deps
            .db
            .create_transaction(user.id, amount, &self.settings.currency, credits)
            .await?;

        let session = self.deps.sessions.load(turn.conversation_id()).await?;
        let (success, cancel) = match session.pending_upload_id {
            Some(upload_id) => (
                StartParam::PaymentSuccess(upload_id),
                StartParam::PaymentCancel(upload_id),
            ),
            None => (
                StartParam::CreditPurchaseSuccess,
                StartParam::CreditPurchaseCancel,
            ),
        };

        let checkout = self
            .deps
            .payments
            .create_checkout(CheckoutRequest {
                customer_id,
                credits,
                amount,
                currency: self.settings.currency.clone(),
                success_url: self.deep_link(success),
                cancel_url: self.deep_link(cancel),
            })
            .await?;
        self.deps
            .db
            .attach_checkout_session(transaction.id, &checkout.session_id)
            .await?;

        info!(
            user_id = %user.id,
            transaction_id = %transaction.id,
            credits,
            amount,
            "Checkout created"
        );
        turn.reply(messages::checkout(
            credits,
            price,
            &self.settings.currency,
            &checkout.url,
        ))
        .await?;
        Ok(())
    }

    /// Credits every pending purchase of the user whose checkout is paid.
    /// Returns how many purchases were settled by this call.
    pub(super) async fn settle_user_purchases(&self, user_id: Uuid) -> WorkflowResult<usize> {
        let mut settled = 0;
        for transaction in self.deps.db.pending_transactions(user_id).await? {
            let Some(session_id) = transaction.checkout_session_id.as_deref() else {
                continue;
            };
            match self.deps.payments.is_checkout_paid(session_id).await {
                Ok(true) => {
                    if let Some(balance) = self.deps.ledger.settle_purchase(transaction.id).await? {
                        info!(
                            %user_id,
                            transaction_id = %transaction.id,
                            credits = transaction.credits,
                            balance,
                            "Purchase settled"
                        );
                        settled += 1;
                    }
                }
                Ok(false) => {}
                Err(e) => warn!(
                    transaction_id = %transaction.id,
                    error = %e,
                    "Could not verify checkout status"
                ),
            }
        }
        Ok(settled)
    }

    /// Settles a single checkout, e.g. from a payment-provider callback.
    pub async fn complete_checkout(&self, session_id: &str) -> WorkflowResult<SettleOutcome> {
        let transaction = self
            .deps
            .db
            .find_transaction_by_session(session_id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(format!("checkout session {}", session_id)))?;

        if !self.deps.payments.is_checkout_paid(session_id).await? {
            return Ok(SettleOutcome::NotPaid);
        }
        match self.deps.ledger.settle_purchase(transaction.id).await? {
            Some(balance) => {
                info!(
                    user_id = %transaction.user_id,
                    transaction_id = %transaction.id,
                    credits = transaction.credits,
                    balance,
                    "Purchase settled from callback"
                );
                Ok(SettleOutcome::Settled { balance })
            }
            None => Ok(SettleOutcome::AlreadySettled),
        }
    }

    /// Entry from a start command, with or without a deep-link parameter.
    pub(super) async fn start(&self, turn: &Turn<'_>, param: Option<&str>) -> WorkflowResult<()> {
        let Some(param) = param.and_then(parse_start_param) else {
            return self.show_home(turn).await;
        };
        info!(user_id = %turn.user_id(), param = %param.encode(), "Deep link received");

        match param {
            StartParam::PaymentSuccess(upload_id) => {
                self.settle_user_purchases(turn.user_id()).await?;
                self.resume_upload(turn, upload_id).await
            }
            StartParam::PaymentCancel(upload_id) => {
                let mut session = self.deps.sessions.load(turn.conversation_id()).await?;
                if session.pending_upload_id == Some(upload_id) {
                    session.clear_pending_upload();
                    self.deps.sessions.save(turn.conversation_id(), &session).await?;
                }
                turn.reply(messages::purchase_cancelled()).await?;
                Ok(())
            }
            StartParam::CreditPurchaseSuccess => {
                let settled = self.settle_user_purchases(turn.user_id()).await?;
                if settled == 0 {
                    turn.reply(messages::purchase_pending()).await?;
                    return Ok(());
                }
                let balance = self.deps.ledger.balance(turn.user_id()).await?;
                turn.reply(messages::purchase_completed(balance)).await?;

                let session = self.deps.sessions.load(turn.conversation_id()).await?;
                if let Some(upload_id) = session.pending_upload_id {
                    self.resume_upload(turn, upload_id).await?;
                }
                Ok(())
            }
            StartParam::CreditPurchaseCancel => {
                turn.reply(messages::purchase_cancelled()).await?;
                Ok(())
            }
        }
    }
}

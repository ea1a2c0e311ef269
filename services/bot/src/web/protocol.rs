//! services/bot/src/web/protocol.rs
//!
//! Request and response bodies of the HTTP conversation transport.

use originality_core::OutboundMessage;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Everything the bot said during one interaction, in order.
#[derive(Debug, Serialize, ToSchema)]
pub struct InteractionResponse {
    /// Messages with optional rows of buttons. A button targets either a
    /// user action or an external URL.
    #[schema(value_type = Vec<Object>)]
    pub messages: Vec<OutboundMessage>,
}

/// Free text typed by the user.
#[derive(Debug, Deserialize, ToSchema)]
pub struct TextMessageRequest {
    pub text: String,
}

/// Outcome of a checkout completion notification.
#[derive(Debug, Serialize, ToSchema)]
pub struct CheckoutCompleteResponse {
    /// One of `settled`, `already_settled` or `not_paid`.
    pub status: String,
    /// The buyer's balance after settlement.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
}

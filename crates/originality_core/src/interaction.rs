//! crates/originality_core/src/interaction.rs
//!
//! Inbound user actions and outbound chat messages, independent of any
//! particular chat transport.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::catalog::ServiceKind;
use crate::domain::FeedbackRating;

/// A button press or command coming from the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UserAction {
    /// Show the main menu with the service list.
    Home,
    SelectService { service: ServiceKind },
    ConfirmUpload { upload_id: Uuid },
    CancelUpload { upload_id: Uuid },
    /// Buy a credit pack; `None` opens the pack menu.
    BuyCredits { credits: Option<i64> },
    /// Ask the user to type the number of credits to buy.
    CustomCredits,
    /// Deep-link start, carrying the payment correlation parameter if any.
    Start { param: Option<String> },
    Feedback { rating: FeedbackRating },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ButtonTarget {
    Action { action: UserAction },
    Url { url: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Button {
    pub label: String,
    pub target: ButtonTarget,
}

impl Button {
    pub fn action(label: impl Into<String>, action: UserAction) -> Self {
        Self {
            label: label.into(),
            target: ButtonTarget::Action { action },
        }
    }

    pub fn url(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            target: ButtonTarget::Url { url: url.into() },
        }
    }
}

/// A message sent back to the user, with optional rows of buttons.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub buttons: Vec<Vec<Button>>,
}

impl OutboundMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            buttons: Vec::new(),
        }
    }

    pub fn with_row(mut self, row: Vec<Button>) -> Self {
        if !row.is_empty() {
            self.buttons.push(row);
        }
        self
    }
}

/// Transport-assigned handle of a sent message, used to delete it later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub u64);

/// Who is talking and in which conversation.
#[derive(Debug, Clone)]
pub struct ConversationRef {
    pub conversation_id: String,
    pub user_id: Uuid,
}

//! crates/originality_core/src/messages.rs
//!
//! User-facing texts and the keyboards that go with them. Error texts never
//! include internal error details.

use uuid::Uuid;

use crate::catalog::ServiceKind;
use crate::domain::{FeedbackRating, ScoreResult, ServiceRecord};
use crate::interaction::{Button, OutboundMessage, UserAction};
use crate::pricing::{LARGE_PACK_CREDITS, MAX_CREDIT_PURCHASE, SMALL_PACK_CREDITS, SMALL_PACK_PRICE};

pub const GENERIC_ERROR: &str = "Something went wrong while handling your request. Please try again later.";

fn home_button() -> Button {
    Button::action("Back to home", UserAction::Home)
}

fn service_row(services: &[ServiceRecord]) -> Vec<Button> {
    services
        .iter()
        .map(|s| {
            let marker = if s.available { "✅" } else { "❌" };
            Button::action(
                format!("{} {}", marker, s.name),
                UserAction::SelectService { service: s.kind },
            )
        })
        .collect()
}

/// Formats an integer with thousands separators, `12345` -> `12,345`.
pub fn thousands(value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    if value < 0 {
        out.insert(0, '-');
    }
    out
}

/// Human-readable size: megabytes from 1 MB upward, kilobytes below.
pub fn file_size(bytes: i64) -> String {
    let kb = bytes as f64 / 1024.0;
    let mb = kb / 1024.0;
    if mb >= 1.0 {
        format!("{:.2} MB", mb)
    } else {
        format!("{:.2} KB", kb)
    }
}

fn percent(fraction: f64) -> String {
    format!("{:.2}", fraction * 100.0)
}

pub fn home(services: &[ServiceRecord]) -> OutboundMessage {
    OutboundMessage::text("Welcome! Pick a service, then send your document.")
        .with_row(service_row(services))
        .with_row(vec![
            Button::action("Buy credits", UserAction::BuyCredits { credits: None }),
        ])
        .with_row(vec![
            Button::action(
                "👍 Feedback",
                UserAction::Feedback {
                    rating: FeedbackRating::Good,
                },
            ),
            Button::action(
                "👎 Feedback",
                UserAction::Feedback {
                    rating: FeedbackRating::Bad,
                },
            ),
        ])
}

pub fn upload_prompt(service: &ServiceRecord) -> OutboundMessage {
    let formats = match service.kind {
        ServiceKind::Originality => ".doc or .docx",
        ServiceKind::Turnitin => ".docx",
    };
    OutboundMessage::text(format!(
        "You selected {}. Send your document as a {} file.",
        service.name, formats
    ))
    .with_row(vec![home_button()])
}

pub fn no_service_selected(services: &[ServiceRecord]) -> OutboundMessage {
    OutboundMessage::text("Please choose a service before sending a document.")
        .with_row(service_row(services))
        .with_row(vec![home_button()])
}

pub fn format_error(service: ServiceKind) -> OutboundMessage {
    let text = match service {
        ServiceKind::Originality => {
            "The AI report accepts Word documents only. Please send a .doc or .docx file."
        }
        ServiceKind::Turnitin => "This service accepts .docx files only. Please send a .docx file.",
    };
    OutboundMessage::text(text)
}

pub fn service_unavailable() -> OutboundMessage {
    OutboundMessage::text("This service is temporarily unavailable. Please try again later.")
        .with_row(vec![home_button()])
}

pub fn scoring_not_configured() -> OutboundMessage {
    OutboundMessage::text("The AI report service is not configured yet. Please try again later.")
}

pub fn already_analyzing() -> OutboundMessage {
    OutboundMessage::text(
        "A document is already being analysed for you. Please wait for it to finish.",
    )
}

pub fn processing() -> OutboundMessage {
    OutboundMessage::text("⏳ Processing your document...")
}

pub fn analysis_processing() -> OutboundMessage {
    OutboundMessage::text("⏳ Running the AI analysis. This can take a minute...")
}

pub fn empty_document() -> OutboundMessage {
    OutboundMessage::text("We could not find any words in this document.")
}

pub fn extraction_failed() -> OutboundMessage {
    OutboundMessage::text("We could not read the text of this document. Please check the file and try again.")
}

pub fn storage_failed() -> OutboundMessage {
    OutboundMessage::text("We could not store or load your document. Please try again.")
}

pub fn scoring_failed() -> OutboundMessage {
    OutboundMessage::text("The analysis could not be completed. Please contact support if credits were charged.")
        .with_row(vec![home_button()])
}

pub fn not_found() -> OutboundMessage {
    OutboundMessage::text("We could not find that upload.").with_row(vec![home_button()])
}

pub fn already_processed() -> OutboundMessage {
    OutboundMessage::text("This document has already been analysed.").with_row(vec![home_button()])
}

pub fn payment_failed() -> OutboundMessage {
    OutboundMessage::text("We could not reach the payment provider. Please try again later.")
}

pub fn generic_error() -> OutboundMessage {
    OutboundMessage::text(GENERIC_ERROR)
}

pub struct Quote<'a> {
    pub upload_id: Uuid,
    pub file_name: &'a str,
    pub word_count: i64,
    pub required_credits: i64,
    pub current_credit: i64,
}

pub fn confirmation(quote: &Quote<'_>) -> OutboundMessage {
    OutboundMessage::text(format!(
        "📄 {}\nWords: {}\nCredits required: {}\nYour balance: {}\n\nContinue with the analysis?",
        quote.file_name,
        thousands(quote.word_count),
        quote.required_credits,
        quote.current_credit
    ))
    .with_row(vec![
        Button::action(
            "Continue",
            UserAction::ConfirmUpload {
                upload_id: quote.upload_id,
            },
        ),
        Button::action(
            "Cancel",
            UserAction::CancelUpload {
                upload_id: quote.upload_id,
            },
        ),
    ])
    .with_row(vec![home_button()])
}

pub fn insufficient_for_quote(quote: &Quote<'_>) -> OutboundMessage {
    OutboundMessage::text(format!(
        "📄 {}\nWords: {}\nCredits required: {}\nYour balance: {}\n\nYou do not have enough credits for this analysis.",
        quote.file_name,
        thousands(quote.word_count),
        quote.required_credits,
        quote.current_credit
    ))
    .with_row(vec![Button::action(
        "Buy credits",
        UserAction::BuyCredits { credits: None },
    )])
    .with_row(vec![home_button()])
}

pub fn insufficient_credit(current: i64, required: i64) -> OutboundMessage {
    OutboundMessage::text(format!(
        "Not enough credits. Balance: {}, required: {}.",
        current, required
    ))
    .with_row(vec![Button::action(
        "Buy credits",
        UserAction::BuyCredits { credits: None },
    )])
    .with_row(vec![home_button()])
}

pub fn cancelled() -> OutboundMessage {
    OutboundMessage::text("The analysis was cancelled. No credits were charged.")
        .with_row(vec![home_button()])
}

pub fn flat_upload_success(
    file_name: &str,
    size_bytes: i64,
    upload_id: Uuid,
    remaining: i64,
) -> OutboundMessage {
    OutboundMessage::text(format!(
        "✅ Document received.\nFile: {}\nSize: {}\nUpload ID: {}\nRemaining credits: {}",
        file_name,
        file_size(size_bytes),
        upload_id,
        remaining
    ))
    .with_row(vec![home_button()])
}

pub fn analysis_result(
    file_name: &str,
    word_count: i64,
    result: &ScoreResult,
    credits_used: i64,
    remaining: i64,
) -> OutboundMessage {
    let mut lines = vec![
        "✅ Analysis completed".to_string(),
        String::new(),
        format!("File: {}", file_name),
        format!("Words: {}", thousands(word_count)),
        String::new(),
        "Results:".to_string(),
        format!("AI-generated: {}%", percent(result.ai_score)),
        format!("Original: {}%", percent(1.0 - result.ai_score)),
        format!("Confidence: {}%", percent(result.ai_confidence)),
        String::new(),
    ];
    if let Some(link) = &result.public_link {
        lines.push(format!("Full report: {}", link));
        lines.push(String::new());
    }
    lines.push(format!("Credits used: {}", credits_used));
    lines.push(format!("Remaining credits: {}", remaining));

    let mut message = OutboundMessage::text(lines.join("\n"));
    if let Some(link) = &result.public_link {
        message = message.with_row(vec![Button::url("View full report", link.clone())]);
    }
    message.with_row(vec![home_button()])
}

pub fn credit_menu(current: i64) -> OutboundMessage {
    OutboundMessage::text(format!(
        "Your balance: {} credits.\nPrice: {} per credit for a pack of 10.",
        current,
        SMALL_PACK_PRICE / SMALL_PACK_CREDITS
    ))
    .with_row(vec![
        Button::action(
            "Buy 10",
            UserAction::BuyCredits {
                credits: Some(SMALL_PACK_CREDITS),
            },
        ),
        Button::action(
            "Buy 100",
            UserAction::BuyCredits {
                credits: Some(LARGE_PACK_CREDITS),
            },
        ),
    ])
    .with_row(vec![Button::action("Custom amount", UserAction::CustomCredits)])
    .with_row(vec![home_button()])
}

pub fn custom_amount_prompt() -> OutboundMessage {
    OutboundMessage::text("How many credits would you like to buy? Reply with a whole number.")
}

pub fn invalid_amount() -> OutboundMessage {
    OutboundMessage::text(format!(
        "Please send a positive whole number of credits, at most {}.",
        MAX_CREDIT_PURCHASE
    ))
}

pub fn checkout(credits: i64, amount_major: i64, currency: &str, url: &str) -> OutboundMessage {
    OutboundMessage::text(format!(
        "{} credits for {} {}. Complete the payment using the button below.",
        credits,
        amount_major,
        currency.to_uppercase()
    ))
    .with_row(vec![Button::url("Pay now", url)])
    .with_row(vec![home_button()])
}

pub fn purchase_completed(balance: i64) -> OutboundMessage {
    OutboundMessage::text(format!("✅ Payment received. Your balance is now {} credits.", balance))
        .with_row(vec![home_button()])
}

pub fn purchase_pending() -> OutboundMessage {
    OutboundMessage::text("Your payment is still being processed. We will add the credits as soon as it clears.")
}

pub fn purchase_cancelled() -> OutboundMessage {
    OutboundMessage::text("The payment was cancelled.").with_row(vec![home_button()])
}

pub fn feedback_prompt() -> OutboundMessage {
    OutboundMessage::text("Thanks! Tell us more in a message, or send /skip.")
}

pub fn feedback_thanks() -> OutboundMessage {
    OutboundMessage::text("Thank you for your feedback!").with_row(vec![home_button()])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score(ai: f64, link: Option<&str>) -> ScoreResult {
        ScoreResult {
            ai_score: ai,
            ai_confidence: 0.875,
            public_link: link.map(str::to_string),
            scan_id: "scan-1".to_string(),
            raw_response: serde_json::Value::Null,
        }
    }

    #[test]
    fn thousands_separators() {
        assert_eq!(thousands(0), "0");
        assert_eq!(thousands(999), "999");
        assert_eq!(thousands(2500), "2,500");
        assert_eq!(thousands(1234567), "1,234,567");
        assert_eq!(thousands(-1000), "-1,000");
    }

    #[test]
    fn file_size_units() {
        assert_eq!(file_size(512), "0.50 KB");
        assert_eq!(file_size(3 * 1024 * 1024), "3.00 MB");
    }

    #[test]
    fn result_shows_complementary_percentages() {
        let msg = analysis_result("essay.docx", 2500, &score(0.25, None), 1, 4);
        assert!(msg.text.contains("AI-generated: 25.00%"));
        assert!(msg.text.contains("Original: 75.00%"));
        assert!(msg.text.contains("Confidence: 87.50%"));
        assert!(msg.text.contains("Words: 2,500"));
        assert!(!msg.text.contains("Full report"));
        assert_eq!(msg.buttons.len(), 1);
    }

    #[test]
    fn result_links_the_report_when_present() {
        let msg = analysis_result("essay.docx", 10, &score(0.5, Some("https://r/1")), 1, 0);
        assert!(msg.text.contains("Full report: https://r/1"));
        assert_eq!(msg.buttons[0][0], Button::url("View full report", "https://r/1"));
    }
}

//! services/bot/src/web/rest.rs
//!
//! Contains the Axum handlers for the conversation endpoints and the master
//! definition for the OpenAPI specification.

use crate::web::protocol::{
    CheckoutCompleteResponse, HealthResponse, InteractionResponse, TextMessageRequest,
};
use crate::web::state::AppState;
use crate::web::transport::BufferedTransport;
use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use originality_core::{
    ConversationRef, DocumentSubmission, SettleOutcome, Turn, User, UserAction, WorkflowError,
};
use std::sync::Arc;
use tracing::{error, info, warn};
use utoipa::OpenApi;

const MAX_CONVERSATION_ID_LEN: usize = 128;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        post_document_handler,
        post_action_handler,
        post_message_handler,
        complete_checkout_handler,
        health_handler,
    ),
    components(
        schemas(InteractionResponse, TextMessageRequest, CheckoutCompleteResponse, HealthResponse)
    ),
    tags(
        (name = "Originality Bot API", description = "Conversation endpoints for the document analysis bot.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// Interaction plumbing
//=========================================================================================

enum Inbound {
    Document(DocumentSubmission),
    Action(UserAction),
    Text(String),
}

type HandlerError = (StatusCode, String);

fn check_conversation_id(conversation_id: &str) -> Result<(), HandlerError> {
    if conversation_id.trim().is_empty() || conversation_id.len() > MAX_CONVERSATION_ID_LEN {
        return Err((
            StatusCode::BAD_REQUEST,
            "Invalid conversation id".to_string(),
        ));
    }
    Ok(())
}

/// Runs one inbound event through the workflow while holding the
/// conversation's lock, and returns whatever the bot replied.
async fn interact(
    state: &AppState,
    conversation_id: String,
    user: &User,
    event: Inbound,
) -> InteractionResponse {
    let lock = state.conversation_locks.get(&conversation_id).await;
    let _guard = lock.lock().await;

    let transport = BufferedTransport::new();
    {
        let turn = Turn::new(
            ConversationRef {
                conversation_id,
                user_id: user.id,
            },
            &transport,
        );
        match event {
            Inbound::Document(document) => state.workflow.handle_document(&turn, document).await,
            Inbound::Action(action) => state.workflow.handle_action(&turn, action).await,
            Inbound::Text(text) => state.workflow.handle_text(&turn, &text).await,
        }
    }

    InteractionResponse {
        messages: transport.into_messages(),
    }
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Send a document into a conversation.
///
/// Accepts a multipart/form-data request; the first part carrying a file name
/// is the document.
#[utoipa::path(
    post,
    path = "/conversations/{conversation_id}/documents",
    request_body(content_type = "multipart/form-data", description = "The document to analyse."),
    responses(
        (status = 200, description = "Replies produced by the bot", body = InteractionResponse),
        (status = 400, description = "Bad request (e.g., missing header or file)")
    ),
    params(
        ("conversation_id" = String, Path, description = "The conversation the document belongs to."),
        ("x-user-id" = i64, Header, description = "Stable id of the user in the chat transport.")
    )
)]
pub async fn post_document_handler(
    State(app_state): State<Arc<AppState>>,
    Path(conversation_id): Path<String>,
    Extension(user): Extension<User>,
    mut multipart: Multipart,
) -> Result<Json<InteractionResponse>, HandlerError> {
    check_conversation_id(&conversation_id)?;

    let document = loop {
        let field = multipart.next_field().await.map_err(|e| {
            (
                StatusCode::BAD_REQUEST,
                format!("Failed to read multipart data: {}", e),
            )
        })?;
        let Some(field) = field else {
            return Err((
                StatusCode::BAD_REQUEST,
                "Multipart form must include a file".to_string(),
            ));
        };
        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        let mime_type = field.content_type().map(str::to_string);
        let content = field.bytes().await.map_err(|e| {
            (
                StatusCode::BAD_REQUEST,
                format!("Failed to read file bytes: {}", e),
            )
        })?;
        break DocumentSubmission {
            file_name,
            mime_type,
            content,
        };
    };

    info!(
        %conversation_id,
        user_id = %user.id,
        file_name = %document.file_name,
        size = document.content.len(),
        "Document received"
    );
    let response = interact(&app_state, conversation_id, &user, Inbound::Document(document)).await;
    Ok(Json(response))
}

/// Press a button or issue a command.
#[utoipa::path(
    post,
    path = "/conversations/{conversation_id}/actions",
    request_body(content_type = "application/json", description = "A tagged user action, e.g. {\"type\":\"select_service\",\"service\":\"originality\"}."),
    responses(
        (status = 200, description = "Replies produced by the bot", body = InteractionResponse),
        (status = 400, description = "Bad request")
    ),
    params(
        ("conversation_id" = String, Path, description = "The conversation the action belongs to."),
        ("x-user-id" = i64, Header, description = "Stable id of the user in the chat transport.")
    )
)]
pub async fn post_action_handler(
    State(app_state): State<Arc<AppState>>,
    Path(conversation_id): Path<String>,
    Extension(user): Extension<User>,
    Json(action): Json<UserAction>,
) -> Result<Json<InteractionResponse>, HandlerError> {
    check_conversation_id(&conversation_id)?;
    let response = interact(&app_state, conversation_id, &user, Inbound::Action(action)).await;
    Ok(Json(response))
}

/// Send free text, such as a custom credit amount or a feedback message.
#[utoipa::path(
    post,
    path = "/conversations/{conversation_id}/messages",
    request_body = TextMessageRequest,
    responses(
        (status = 200, description = "Replies produced by the bot", body = InteractionResponse),
        (status = 400, description = "Bad request")
    ),
    params(
        ("conversation_id" = String, Path, description = "The conversation the message belongs to."),
        ("x-user-id" = i64, Header, description = "Stable id of the user in the chat transport.")
    )
)]
pub async fn post_message_handler(
    State(app_state): State<Arc<AppState>>,
    Path(conversation_id): Path<String>,
    Extension(user): Extension<User>,
    Json(request): Json<TextMessageRequest>,
) -> Result<Json<InteractionResponse>, HandlerError> {
    check_conversation_id(&conversation_id)?;
    let response = interact(&app_state, conversation_id, &user, Inbound::Text(request.text)).await;
    Ok(Json(response))
}

/// Notification from the payment provider that a checkout finished.
///
/// The checkout is re-read from the provider; credits are added only when it
/// is paid and the purchase has not been settled before.
#[utoipa::path(
    post,
    path = "/payments/checkout/{session_id}/complete",
    responses(
        (status = 200, description = "Settled or already settled", body = CheckoutCompleteResponse),
        (status = 202, description = "Checkout not paid yet", body = CheckoutCompleteResponse),
        (status = 404, description = "Unknown checkout session"),
        (status = 502, description = "Payment provider error")
    ),
    params(
        ("session_id" = String, Path, description = "The checkout session id.")
    )
)]
pub async fn complete_checkout_handler(
    State(app_state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, HandlerError> {
    match app_state.workflow.complete_checkout(&session_id).await {
        Ok(outcome) => Ok(checkout_response(outcome)),
        Err(WorkflowError::NotFound(what)) => {
            warn!(%session_id, "Completion for unknown checkout");
            Err((StatusCode::NOT_FOUND, format!("{} not found", what)))
        }
        Err(WorkflowError::Payment(e)) => {
            error!(%session_id, error = %e, "Payment provider error during settlement");
            Err((
                StatusCode::BAD_GATEWAY,
                "Payment provider error".to_string(),
            ))
        }
        Err(e) => {
            error!(%session_id, error = %e, "Failed to settle checkout");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to settle checkout".to_string(),
            ))
        }
    }
}

fn checkout_response(outcome: SettleOutcome) -> (StatusCode, Json<CheckoutCompleteResponse>) {
    let (code, status, balance) = match outcome {
        SettleOutcome::Settled { balance } => (StatusCode::OK, "settled", Some(balance)),
        SettleOutcome::AlreadySettled => (StatusCode::OK, "already_settled", None),
        SettleOutcome::NotPaid => (StatusCode::ACCEPTED, "not_paid", None),
    };
    (
        code,
        Json(CheckoutCompleteResponse {
            status: status.to_string(),
            balance,
        }),
    )
}

/// Liveness probe.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up", body = HealthResponse))
)]
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversation_ids_are_bounded() {
        assert!(check_conversation_id("chat-1").is_ok());
        assert!(check_conversation_id("  ").is_err());
        assert!(check_conversation_id(&"x".repeat(MAX_CONVERSATION_ID_LEN + 1)).is_err());
    }

    #[test]
    fn unpaid_checkout_is_accepted_not_ok() {
        let (code, Json(body)) = checkout_response(SettleOutcome::NotPaid);
        assert_eq!(code, StatusCode::ACCEPTED);
        assert_eq!(body.status, "not_paid");

        let (code, Json(body)) = checkout_response(SettleOutcome::Settled { balance: 12 });
        assert_eq!(code, StatusCode::OK);
        assert_eq!(body.balance, Some(12));
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let Json(body) = health_handler().await;
        assert_eq!(body.status, "ok");
    }

    #[test]
    fn openapi_lists_conversation_routes() {
        let doc = ApiDoc::openapi();
        assert!(doc
            .paths
            .paths
            .contains_key("/conversations/{conversation_id}/documents"));
        assert!(doc
            .paths
            .paths
            .contains_key("/payments/checkout/{session_id}/complete"));
    }
}

//! Router for the chat API

use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::post,
};
use chrono::Utc;
use serde_json::json;

use super::public;
use crate::ai::chat::{Chat, Transcript};
use crate::ai::prompt;
use crate::api::public::ApiError;
use crate::api::state::AppState;
use crate::auth::AuthError;
use crate::google::calendar::CalendarClient;

type SharedState = Arc<AppState>;

/// Run one conversational turn against the user's calendar
async fn chat_handler(
    State(state): State<SharedState>,
    axum::Json(payload): axum::Json<public::ChatRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let credentials = state
        .store
        .credentials(&payload.token)
        .ok_or(AuthError::MissingCredential)?;

    let config = &state.config;
    let client = CalendarClient::new(&credentials, config.timezone, &config.calendar_api_url);

    let today = Utc::now()
        .with_timezone(&config.timezone)
        .format("%Y-%m-%d")
        .to_string();
    let system_instruction = prompt::system_instruction(config.timezone.name(), &today)?;

    let chat = Chat::new(
        &client,
        &config.primary_llm,
        &config.fallback_llm,
        system_instruction,
    );
    let transcript = Transcript::new_with_messages(payload.messages);

    match chat.next_turn(transcript).await {
        Ok((reply, transcript)) => Ok(axum::Json(public::ChatResponse {
            reply,
            messages: transcript.messages(),
        })
        .into_response()),
        Err(err) => {
            tracing::error!("Chat turn failed: {}", err);
            Ok((
                StatusCode::SERVICE_UNAVAILABLE,
                axum::Json(json!({"reply": public::SERVICE_UNAVAILABLE_REPLY})),
            )
                .into_response())
        }
    }
}

/// Create the chat router
pub fn router() -> Router<SharedState> {
    Router::new().route("/", post(chat_handler))
}

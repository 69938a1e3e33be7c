//! Public types for the chat API
use serde::{Deserialize, Serialize};

use crate::openai::Message;

#[derive(Deserialize)]
pub struct ChatRequest {
    /// Credential token from the OAuth callback
    pub token: String,
    /// Full conversation so far, ending with the new user message.
    /// The server keeps no session state between turns.
    pub messages: Vec<Message>,
}

#[derive(Serialize)]
pub struct ChatResponse {
    pub reply: String,
    pub messages: Vec<Message>,
}

/// Fixed apology when both LLM providers are down.
pub const SERVICE_UNAVAILABLE_REPLY: &str =
    "Sorry, the AI service is unavailable right now. Please try again in a moment.";

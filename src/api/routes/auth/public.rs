//! Public types for the OAuth handshake endpoints
use serde::{Deserialize, Serialize};

/// Query parameters Google sends back to the redirect URI.
#[derive(Deserialize)]
pub struct CallbackQuery {
    pub state: String,
    pub code: String,
}

#[derive(Serialize, Deserialize)]
pub struct AuthCallbackResponse {
    /// Opaque handle for the stored credentials; clients send it with
    /// every chat request instead of raw tokens
    pub token: String,
}

//! Router for the OAuth handshake: starting authorization and
//! receiving the provider's redirect callback.

use std::sync::Arc;

use axum::{
    Router,
    extract::{Query, State},
    response::{IntoResponse, Redirect},
    routing::get,
};

use super::public;
use crate::api::public::ApiError;
use crate::api::state::AppState;
use crate::auth::Credentials;
use crate::google::oauth;

type SharedState = Arc<AppState>;

/// Mint a state token and bounce the browser to Google's consent page
async fn authorize(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let state_token = state.store.begin_auth()?;
    let url = oauth::authorization_url(
        &state.config.google_client_id,
        &state.config.google_redirect_uri,
        &state_token,
    );
    Ok(Redirect::temporary(&url))
}

/// The provider's redirect lands here. The state token is redeemed
/// (single use, time bounded) before the code is exchanged; the
/// resulting bundle is stored and only its opaque token leaves the
/// server.
async fn oauth2callback(
    State(state): State<SharedState>,
    Query(params): Query<public::CallbackQuery>,
) -> Result<impl IntoResponse, ApiError> {
    state.store.redeem_state(&params.state)?;

    let config = &state.config;
    let token = oauth::exchange_code_for_token(
        &config.google_client_id,
        &config.google_client_secret,
        &params.code,
        &config.google_redirect_uri,
        &config.google_token_uri,
    )
    .await?;

    let scopes = token
        .scope
        .map(|scope| scope.split(' ').map(String::from).collect())
        .unwrap_or_else(|| vec![oauth::CALENDAR_SCOPE.to_string()]);
    let credentials = Credentials {
        access_token: token.access_token,
        refresh_token: token.refresh_token,
        token_uri: config.google_token_uri.clone(),
        client_id: config.google_client_id.clone(),
        client_secret: config.google_client_secret.clone(),
        scopes,
    };

    let credential_token = state.store.issue_credentials(credentials)?;
    Ok(axum::Json(public::AuthCallbackResponse {
        token: credential_token,
    }))
}

/// Create the auth router (mounted at the root so the provider's
/// redirect URI stays short)
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/authorize", get(authorize))
        .route("/oauth2callback", get(oauth2callback))
}

//! OAuth helpers for the Google authorization code flow. The consent
//! UI and token refresh are Google's side of the contract; this only
//! builds the redirect URL and swaps an authorization code for tokens.

use anyhow::{Error, Result};
use serde::Deserialize;

pub const CALENDAR_SCOPE: &str = "https://www.googleapis.com/auth/calendar";

const AUTH_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<i64>,
    pub scope: Option<String>,
    pub token_type: Option<String>,
}

/// Build the consent URL the user is redirected to. `state` binds the
/// eventual callback to the pending handshake entry.
pub fn authorization_url(client_id: &str, redirect_uri: &str, state: &str) -> String {
    format!(
        "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&access_type=offline&include_granted_scopes=true&prompt=consent&state={}",
        AUTH_ENDPOINT,
        urlencoding::encode(client_id),
        urlencoding::encode(redirect_uri),
        urlencoding::encode(CALENDAR_SCOPE),
        urlencoding::encode(state)
    )
}

/// Exchange an authorization code for tokens at `token_uri`.
pub async fn exchange_code_for_token(
    client_id: &str,
    client_secret: &str,
    code: &str,
    redirect_uri: &str,
    token_uri: &str,
) -> Result<TokenResponse, Error> {
    let params = [
        ("code", code),
        ("client_id", client_id),
        ("client_secret", client_secret),
        ("redirect_uri", redirect_uri),
        ("grant_type", "authorization_code"),
    ];

    let response = reqwest::Client::new()
        .post(token_uri)
        .form(&params)
        .timeout(std::time::Duration::from_secs(30))
        .send()
        .await?
        .error_for_status()?
        .json::<TokenResponse>()
        .await?;

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authorization_url_carries_state() {
        let url = authorization_url(
            "client-123",
            "http://127.0.0.1:2222/oauth2callback",
            "state-abc",
        );
        assert!(url.starts_with("https://accounts.google.com/o/oauth2/v2/auth?"));
        assert!(url.contains("client_id=client-123"));
        assert!(url.contains("state=state-abc"));
        assert!(url.contains("access_type=offline"));
        assert!(url.contains("prompt=consent"));
        assert!(url.contains(&format!("scope={}", urlencoding::encode(CALENDAR_SCOPE))));
    }

    #[tokio::test]
    async fn test_exchange_code_for_token() {
        let mut server = mockito::Server::new_async().await;

        let mock = server
            .mock("POST", "/token")
            .match_body(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("code".into(), "auth-code".into()),
                mockito::Matcher::UrlEncoded("grant_type".into(), "authorization_code".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                    "access_token": "ya29.abc",
                    "refresh_token": "1//refresh",
                    "expires_in": 3599,
                    "scope": "https://www.googleapis.com/auth/calendar",
                    "token_type": "Bearer"
                }"#,
            )
            .create();

        let token = exchange_code_for_token(
            "client-id",
            "client-secret",
            "auth-code",
            "http://127.0.0.1:2222/oauth2callback",
            &format!("{}/token", server.url()),
        )
        .await
        .unwrap();

        mock.assert();
        assert_eq!(token.access_token, "ya29.abc");
        assert_eq!(token.refresh_token.as_deref(), Some("1//refresh"));
    }

    #[tokio::test]
    async fn test_exchange_rejected_code_is_an_error() {
        let mut server = mockito::Server::new_async().await;

        let mock = server
            .mock("POST", "/token")
            .with_status(400)
            .with_body(r#"{"error": "invalid_grant"}"#)
            .create();

        let result = exchange_code_for_token(
            "client-id",
            "client-secret",
            "bad-code",
            "http://127.0.0.1:2222/oauth2callback",
            &format!("{}/token", server.url()),
        )
        .await;

        mock.assert();
        assert!(result.is_err());
    }
}

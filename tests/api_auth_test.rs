//! Integration tests for the OAuth handshake endpoints

mod test_utils;

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{Request, StatusCode, header},
    };
    use tower::util::ServiceExt;

    use crate::test_utils::{Upstreams, body_to_string, test_app};

    /// Pull the `state` value back out of the consent redirect URL
    fn state_from_location(location: &str) -> String {
        location
            .split('&')
            .find_map(|pair| pair.strip_prefix("state="))
            .expect("Redirect URL carries no state parameter")
            .to_string()
    }

    /// Tests that starting authorization redirects to the provider
    /// with a fresh state token embedded
    #[tokio::test]
    async fn it_redirects_to_the_provider_with_a_state() {
        let app = test_app(Upstreams::default());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/authorize")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);

        let location = response
            .headers()
            .get(header::LOCATION)
            .expect("Missing Location header")
            .to_str()
            .unwrap();
        assert!(location.starts_with("https://accounts.google.com/o/oauth2/v2/auth"));
        assert!(!state_from_location(location).is_empty());
    }

    /// Tests that a callback with an unknown state is rejected
    #[tokio::test]
    async fn it_rejects_an_unknown_state() {
        let app = test_app(Upstreams::default());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/oauth2callback?state=bogus&code=whatever")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    /// Tests the full handshake: authorize, callback with a valid
    /// code, credential token issued, and the state unusable twice
    #[tokio::test]
    async fn it_completes_the_handshake_exactly_once() {
        let mut token_server = mockito::Server::new_async().await;
        let token_mock = token_server
            .mock("POST", "/token")
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

        let app = test_app(Upstreams {
            token_uri: format!("{}/token", token_server.url()),
            ..Upstreams::default()
        });

        // Start the handshake and capture the state from the redirect
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/authorize")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let location = response
            .headers()
            .get(header::LOCATION)
            .unwrap()
            .to_str()
            .unwrap();
        let state = state_from_location(location);

        // Complete the callback
        let callback_uri = format!("/oauth2callback?state={}&code=auth-code", state);
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(callback_uri.clone())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        token_mock.assert();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_to_string(response.into_body()).await;
        let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert!(!parsed["token"].as_str().unwrap().is_empty());

        // Replaying the same state must fail
        let response = app
            .oneshot(
                Request::builder()
                    .uri(callback_uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    /// Tests that a failed code exchange doesn't issue a credential
    #[tokio::test]
    async fn it_surfaces_a_rejected_code_exchange() {
        let mut token_server = mockito::Server::new_async().await;
        let _token_mock = token_server
            .mock("POST", "/token")
            .with_status(400)
            .with_body(r#"{"error": "invalid_grant"}"#)
            .create();

        let app = test_app(Upstreams {
            token_uri: format!("{}/token", token_server.url()),
            ..Upstreams::default()
        });

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/authorize")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let location = response
            .headers()
            .get(header::LOCATION)
            .unwrap()
            .to_str()
            .unwrap();
        let state = state_from_location(location);

        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/oauth2callback?state={}&code=bad-code", state))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}

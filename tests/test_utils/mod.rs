//! Test utilities for integration tests
use std::env;
use std::fs;
use std::sync::Arc;
use std::time::SystemTime;

use axum::Router;
use axum::body::Body;

use calendai::api::{AppState, app};
use calendai::core::{AppConfig, LlmProvider};

/// The upstream endpoints a test wants pointed at its mock servers.
/// Anything left as a default is unreachable, which is fine for tests
/// that never get that far.
pub struct Upstreams {
    pub primary_llm: String,
    pub fallback_llm: String,
    pub calendar_api: String,
    pub token_uri: String,
}

impl Default for Upstreams {
    fn default() -> Self {
        Self {
            primary_llm: String::from("http://127.0.0.1:1"),
            fallback_llm: String::from("http://127.0.0.1:1"),
            calendar_api: String::from("http://127.0.0.1:1"),
            token_uri: String::from("http://127.0.0.1:1/token"),
        }
    }
}

/// Creates a test application router with a fresh cache file under a
/// uniquely named temp path, so tests can run in parallel.
pub fn test_app(upstreams: Upstreams) -> Router {
    let temp_dir = env::temp_dir();
    let ts = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap()
        .as_nanos()
        .to_string();
    let dir = temp_dir.join(format!("calendai-test-{}", ts));
    fs::create_dir_all(&dir).expect("Failed to create base directory");
    let cache_path = dir.join("cache.json");

    let config = AppConfig {
        timezone: chrono_tz::UTC,
        cache_path: cache_path.to_str().unwrap().to_string(),
        google_client_id: String::from("test_client_id"),
        google_client_secret: String::from("test_client_secret"),
        google_redirect_uri: String::from("http://127.0.0.1:2222/oauth2callback"),
        google_token_uri: upstreams.token_uri,
        calendar_api_url: upstreams.calendar_api,
        primary_llm: LlmProvider {
            api_hostname: upstreams.primary_llm,
            api_key: String::from("test-primary-key"),
            model: String::from("llama-3.1-8b-instant"),
        },
        fallback_llm: LlmProvider {
            api_hostname: upstreams.fallback_llm,
            api_key: String::from("test-fallback-key"),
            model: String::from("gpt-4o-mini"),
        },
    };

    app(Arc::new(AppState::new(config)))
}

pub async fn body_to_string(body: Body) -> String {
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("Failed to read response body");
    String::from_utf8(bytes.to_vec()).expect("Response body was not UTF-8")
}

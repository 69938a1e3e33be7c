use std::env;

use chrono_tz::Tz;

/// One OpenAI-compatible chat completion endpoint.
#[derive(Clone, Debug)]
pub struct LlmProvider {
    pub api_hostname: String,
    pub api_key: String,
    pub model: String,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Timezone used for new events and availability when a calendar
    /// doesn't declare its own
    pub timezone: Tz,
    /// Path of the file-backed auth cache
    pub cache_path: String,
    pub google_client_id: String,
    pub google_client_secret: String,
    pub google_redirect_uri: String,
    pub google_token_uri: String,
    pub calendar_api_url: String,
    pub primary_llm: LlmProvider,
    pub fallback_llm: LlmProvider,
}

impl Default for AppConfig {
    fn default() -> Self {
        let timezone = env::var("CALENDAI_TIMEZONE")
            .unwrap_or_else(|_| "America/Sao_Paulo".to_string())
            .parse()
            .expect("CALENDAI_TIMEZONE is not a valid IANA timezone");
        let cache_path = env::var("CALENDAI_CACHE_PATH")
            .unwrap_or_else(|_| "/tmp/calendai_cache.json".to_string());
        let google_client_id =
            env::var("CALENDAI_GOOGLE_CLIENT_ID").expect("Missing CALENDAI_GOOGLE_CLIENT_ID");
        let google_client_secret = env::var("CALENDAI_GOOGLE_CLIENT_SECRET")
            .expect("Missing CALENDAI_GOOGLE_CLIENT_SECRET");
        let google_redirect_uri = env::var("CALENDAI_GOOGLE_REDIRECT_URI")
            .unwrap_or_else(|_| "http://127.0.0.1:2222/oauth2callback".to_string());
        let google_token_uri = env::var("CALENDAI_GOOGLE_TOKEN_URI")
            .unwrap_or_else(|_| "https://oauth2.googleapis.com/token".to_string());
        let calendar_api_url = env::var("CALENDAI_CALENDAR_API_URL")
            .unwrap_or_else(|_| "https://www.googleapis.com/calendar/v3".to_string());

        let primary_llm = LlmProvider {
            api_hostname: env::var("CALENDAI_LLM_HOST")
                .unwrap_or_else(|_| "https://api.groq.com/openai".to_string()),
            api_key: env::var("GROQ_API_KEY").unwrap_or_else(|_| "".to_string()),
            model: env::var("CALENDAI_LLM_MODEL")
                .unwrap_or_else(|_| "llama-3.1-8b-instant".to_string()),
        };
        let fallback_llm = LlmProvider {
            api_hostname: env::var("CALENDAI_FALLBACK_LLM_HOST")
                .unwrap_or_else(|_| "https://api.openai.com".to_string()),
            api_key: env::var("OPENAI_API_KEY").unwrap_or_else(|_| "".to_string()),
            model: env::var("CALENDAI_FALLBACK_LLM_MODEL")
                .unwrap_or_else(|_| "gpt-4o-mini".to_string()),
        };

        Self {
            timezone,
            cache_path,
            google_client_id,
            google_client_secret,
            google_redirect_uri,
            google_token_uri,
            calendar_api_url,
            primary_llm,
            fallback_llm,
        }
    }
}

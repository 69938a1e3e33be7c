//! The per-turn orchestration between the user, the LLM providers,
//! and the calendar tools.
//!
//! One turn is a short linear machine: first completion with the tool
//! registry enabled; if the model requested tools, run every request
//! in the order it was emitted and answer each one; then a second
//! completion with tool calling disabled to force the narrated reply.
//! Either completion may fall back to the secondary provider once;
//! when both providers are down the turn fails without touching the
//! transcript.
//!
//! Calendar writes performed by tools are NOT rolled back when the
//! second completion fails: once a tool reports success the action is
//! committed, whether or not a reply narrating it is ever produced.

use serde_json::Value;

use super::models::Transcript;
use crate::ai::tools;
use crate::core::LlmProvider;
use crate::google::calendar::CalendarClient;
use crate::openai::{Message, Role, ToolChoice, completion};

/// Both providers refused or failed. Surfaced to the user as a fixed
/// apology, never retried automatically.
#[derive(thiserror::Error, Debug)]
#[error("all chat completion providers are unavailable")]
pub struct ServiceUnavailable;

pub struct Chat<'a> {
    client: &'a CalendarClient,
    primary: &'a LlmProvider,
    fallback: &'a LlmProvider,
    system_instruction: String,
    tools: Vec<Value>,
}

impl<'a> Chat<'a> {
    pub fn new(
        client: &'a CalendarClient,
        primary: &'a LlmProvider,
        fallback: &'a LlmProvider,
        system_instruction: String,
    ) -> Self {
        Self {
            client,
            primary,
            fallback,
            system_instruction,
            tools: tools::definitions(),
        }
    }

    /// The system instruction is prepended for each call but never
    /// committed to the transcript the caller gets back.
    fn with_system_instruction(&self, transcript: &Transcript) -> Vec<Message> {
        let mut messages = vec![Message::new(Role::System, &self.system_instruction)];
        messages.extend(transcript.messages());
        messages
    }

    /// One completion against the primary provider, retried once
    /// against the fallback on any fault.
    async fn completion_with_fallback(
        &self,
        messages: &[Message],
        tool_choice: ToolChoice,
    ) -> Result<Message, ServiceUnavailable> {
        let response = match completion(messages, Some(&self.tools), tool_choice, self.primary)
            .await
        {
            Ok(response) => response,
            Err(primary_err) => {
                tracing::warn!(
                    "Primary provider {} failed ({}), trying fallback",
                    self.primary.model,
                    primary_err
                );
                completion(messages, Some(&self.tools), tool_choice, self.fallback)
                    .await
                    .map_err(|fallback_err| {
                        tracing::error!(
                            "Fallback provider {} also failed: {}",
                            self.fallback.model,
                            fallback_err
                        );
                        ServiceUnavailable
                    })?
            }
        };

        Message::sanitized_from(&response["choices"][0]["message"]).map_err(|e| {
            tracing::error!("Unusable completion message: {}", e);
            ServiceUnavailable
        })
    }

    /// Run one user turn. `transcript` is the full prior conversation
    /// plus the new user message; the reply and the updated transcript
    /// come back together. On error the transcript is dropped
    /// unchanged, but calendar writes that already happened stand.
    pub async fn next_turn(
        &self,
        mut transcript: Transcript,
    ) -> Result<(String, Transcript), ServiceUnavailable> {
        let assistant = self
            .completion_with_fallback(&self.with_system_instruction(&transcript), ToolChoice::Auto)
            .await?;
        transcript.push(assistant.clone());

        let requests = assistant.tool_calls().to_vec();
        if requests.is_empty() {
            let reply = assistant.content.unwrap_or_default();
            return Ok((reply, transcript));
        }

        // Answer every request in the order the model emitted it.
        // dispatch() absorbs all handler failures into payloads, so
        // each request id gets exactly one tool message.
        for request in &requests {
            let payload = tools::dispatch(
                self.client,
                &request.function.name,
                &request.function.arguments,
            )
            .await;
            transcript.push(Message::new_tool_result(
                &request.id,
                &request.function.name,
                &payload,
            ));
        }

        let reply = self
            .completion_with_fallback(&self.with_system_instruction(&transcript), ToolChoice::None)
            .await?;
        transcript.push(reply.clone());

        Ok((reply.content.unwrap_or_default(), transcript))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Credentials;
    use chrono_tz::UTC;

    fn provider(hostname: &str) -> LlmProvider {
        LlmProvider {
            api_hostname: hostname.to_string(),
            api_key: "test-key".to_string(),
            model: "llama-3.1-8b-instant".to_string(),
        }
    }

    fn calendar_client(api_base: &str) -> CalendarClient {
        let credentials = Credentials {
            access_token: "ya29.test".to_string(),
            refresh_token: None,
            token_uri: "https://oauth2.googleapis.com/token".to_string(),
            client_id: "client-id".to_string(),
            client_secret: "client-secret".to_string(),
            scopes: vec![],
        };
        CalendarClient::new(&credentials, UTC, api_base)
    }

    fn user_turn(text: &str) -> Transcript {
        Transcript::new_with_messages(vec![Message::new(Role::User, text)])
    }

    fn content_response(text: &str) -> String {
        format!(
            r#"{{"choices": [{{"index": 0, "message": {{"role": "assistant", "content": "{}"}}, "finish_reason": "stop"}}]}}"#,
            text
        )
    }

    const SYSTEM: &str = "You are a calendar assistant.";

    #[tokio::test]
    async fn test_turn_without_tool_calls() {
        let mut llm = mockito::Server::new_async().await;
        let calendar = mockito::Server::new_async().await;

        let mock = llm
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(content_response("Hi! How can I help with your calendar?"))
            .create();

        let client = calendar_client(&calendar.url());
        let primary = provider(&llm.url());
        let fallback = provider("http://127.0.0.1:1");
        let chat = Chat::new(&client, &primary, &fallback, SYSTEM.to_string());

        let (reply, transcript) = chat.next_turn(user_turn("hello")).await.unwrap();

        mock.assert();
        assert_eq!(reply, "Hi! How can I help with your calendar?");
        // User message plus one assistant message, no system entry
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript.messages()[0].role, Role::User);
        assert_eq!(transcript.messages()[1].role, Role::Assistant);
    }

    #[tokio::test]
    async fn test_tool_results_keep_request_order_even_when_one_faults() {
        let mut llm = mockito::Server::new_async().await;
        let mut calendar = mockito::Server::new_async().await;

        // First response requests two tools: A doesn't exist, B does
        let tool_call_response = r#"{
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [
                        {
                            "id": "call_a",
                            "type": "function",
                            "function": {"name": "summon_meteor", "arguments": "{}"}
                        },
                        {
                            "id": "call_b",
                            "type": "function",
                            "function": {"name": "list_calendars", "arguments": "{}"}
                        }
                    ]
                },
                "finish_reason": "tool_calls"
            }]
        }"#;

        let first = llm
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(tool_call_response)
            .create();
        let second = llm
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(content_response("Here are your calendars."))
            .create();

        let _calendar_mock = calendar
            .mock("GET", "/users/me/calendarList")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"items": [{"id": "primary", "summary": "Personal", "primary": true}]}"#)
            .create();

        let client = calendar_client(&calendar.url());
        let primary = provider(&llm.url());
        let fallback = provider("http://127.0.0.1:1");
        let chat = Chat::new(&client, &primary, &fallback, SYSTEM.to_string());

        let (reply, transcript) = chat.next_turn(user_turn("list my calendars")).await.unwrap();

        first.assert();
        second.assert();
        assert_eq!(reply, "Here are your calendars.");

        // user, assistant(tool_calls), tool A, tool B, assistant
        let messages = transcript.messages();
        assert_eq!(messages.len(), 5);
        assert_eq!(messages[2].role, Role::Tool);
        assert_eq!(messages[2].tool_call_id.as_deref(), Some("call_a"));
        assert!(messages[2].content.as_ref().unwrap().contains("unknown_tool"));
        assert_eq!(messages[3].role, Role::Tool);
        assert_eq!(messages[3].tool_call_id.as_deref(), Some("call_b"));
        assert!(messages[3].content.as_ref().unwrap().contains("Personal"));
    }

    #[tokio::test]
    async fn test_fallback_succeeds_without_duplicate_entries() {
        let mut primary_llm = mockito::Server::new_async().await;
        let mut fallback_llm = mockito::Server::new_async().await;
        let calendar = mockito::Server::new_async().await;

        let primary_mock = primary_llm
            .mock("POST", "/v1/chat/completions")
            .with_status(500)
            .with_body("boom")
            .create();
        let fallback_mock = fallback_llm
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(content_response("Fallback here, all good."))
            .create();

        let client = calendar_client(&calendar.url());
        let primary = provider(&primary_llm.url());
        let fallback = provider(&fallback_llm.url());
        let chat = Chat::new(&client, &primary, &fallback, SYSTEM.to_string());

        let (reply, transcript) = chat.next_turn(user_turn("hello")).await.unwrap();

        primary_mock.assert();
        fallback_mock.assert();
        assert_eq!(reply, "Fallback here, all good.");
        // Only the fallback's message landed: user + one assistant
        assert_eq!(transcript.len(), 2);
    }

    #[tokio::test]
    async fn test_both_providers_down_is_service_unavailable() {
        let mut primary_llm = mockito::Server::new_async().await;
        let mut fallback_llm = mockito::Server::new_async().await;
        let calendar = mockito::Server::new_async().await;

        let primary_mock = primary_llm
            .mock("POST", "/v1/chat/completions")
            .with_status(500)
            .create();
        let fallback_mock = fallback_llm
            .mock("POST", "/v1/chat/completions")
            .with_status(503)
            .create();

        let client = calendar_client(&calendar.url());
        let primary = provider(&primary_llm.url());
        let fallback = provider(&fallback_llm.url());
        let chat = Chat::new(&client, &primary, &fallback, SYSTEM.to_string());

        let result = chat.next_turn(user_turn("hello")).await;

        primary_mock.assert();
        fallback_mock.assert();
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_missing_event_delete_still_produces_a_reply() {
        let mut llm = mockito::Server::new_async().await;
        let mut calendar = mockito::Server::new_async().await;

        let tool_call_response = r#"{
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_del",
                        "type": "function",
                        "function": {
                            "name": "delete_event",
                            "arguments": "{\"event_id\": \"ghost\"}"
                        }
                    }]
                },
                "finish_reason": "tool_calls"
            }]
        }"#;

        let _first = llm
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(tool_call_response)
            .create();
        let second = llm
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(content_response("That event was already gone."))
            .create();

        let delete_mock = calendar
            .mock("DELETE", "/calendars/primary/events/ghost")
            .with_status(404)
            .create();

        let client = calendar_client(&calendar.url());
        let primary = provider(&llm.url());
        let fallback = provider("http://127.0.0.1:1");
        let chat = Chat::new(&client, &primary, &fallback, SYSTEM.to_string());

        let (reply, transcript) = chat
            .next_turn(user_turn("delete the ghost event"))
            .await
            .unwrap();

        delete_mock.assert();
        second.assert();
        assert_eq!(reply, "That event was already gone.");
        let messages = transcript.messages();
        assert_eq!(messages.len(), 4);
        assert!(messages[2].content.as_ref().unwrap().contains("not_found"));
    }
}

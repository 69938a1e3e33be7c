//! Chat completion client for OpenAI compatible APIs. Both the
//! primary and the fallback provider speak this shape, so one client
//! covers them.

use std::time::Duration;

use anyhow::{Error, Result, anyhow};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::core::LlmProvider;

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub enum Role {
    #[serde(rename = "system")]
    System,
    #[serde(rename = "assistant")]
    Assistant,
    #[serde(rename = "user")]
    User,
    #[serde(rename = "tool")]
    Tool,
}

// Object {
//     "content": Null,
//     "role": String("assistant"),
//     "tool_calls": Array [
//         Object {
//             "function": Object {
//                 "arguments": String("{\"query\":\"standup\"}"),
//                 "name": String("search_events")
//             },
//             "id": String("call_KCg5V0N5E7hHHrUwdefHBfgL"),
//             "type": String("function")
//         }
//     ]
// }
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct FunctionCallFn {
    pub arguments: String,
    pub name: String,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct FunctionCall {
    pub function: FunctionCallFn,
    pub id: String,
    pub r#type: String,
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct Message {
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<FunctionCall>>,
}

impl Message {
    pub fn new(role: Role, content: &str) -> Self {
        Message {
            role,
            content: Some(content.to_string()),
            name: None,
            tool_call_id: None,
            tool_calls: None,
        }
    }

    /// One tool result, paired with the request id that produced it.
    pub fn new_tool_result(tool_call_id: &str, tool_name: &str, payload: &str) -> Self {
        Message {
            role: Role::Tool,
            content: Some(payload.to_string()),
            name: Some(tool_name.to_string()),
            tool_call_id: Some(tool_call_id.to_string()),
            tool_calls: None,
        }
    }

    /// Convert the raw provider message into the canonical shape the
    /// transcript keeps. Provider internal fields (refusal,
    /// annotations, ...) are dropped, and a null content alongside
    /// tool calls becomes the empty string so the message stays valid
    /// when echoed back to the API.
    pub fn sanitized_from(raw: &Value) -> Result<Self, Error> {
        let tool_calls = match raw.get("tool_calls") {
            Some(calls) if !calls.is_null() => {
                Some(serde_json::from_value::<Vec<FunctionCall>>(calls.clone())?)
            }
            _ => None,
        };
        let mut content = raw
            .get("content")
            .and_then(|c| c.as_str())
            .map(|c| c.to_string());
        if content.is_none() && tool_calls.is_some() {
            content = Some(String::new());
        }

        Ok(Message {
            role: Role::Assistant,
            content,
            name: None,
            tool_call_id: None,
            tool_calls,
        })
    }

    pub fn tool_calls(&self) -> &[FunctionCall] {
        self.tool_calls.as_deref().unwrap_or(&[])
    }
}

#[derive(Serialize)]
pub struct Property {
    pub r#type: Value,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r#enum: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Value>,
}

impl Property {
    /// A required field of the given JSON type.
    pub fn new(r#type: &str, description: &str) -> Self {
        Self {
            r#type: json!(r#type),
            description: description.to_string(),
            r#enum: None,
            items: None,
        }
    }

    /// An optional field, typed `[type, null]` so the model may omit it.
    pub fn nullable(r#type: &str, description: &str) -> Self {
        Self {
            r#type: json!([r#type, "null"]),
            description: description.to_string(),
            r#enum: None,
            items: None,
        }
    }
}

#[derive(Serialize)]
pub struct Parameters<Props: Serialize> {
    pub r#type: String,
    pub properties: Props,
    pub required: Vec<String>,
    #[serde(rename = "additionalProperties")]
    pub additional_properties: bool,
}

#[derive(Serialize)]
pub struct Function<Props: Serialize> {
    pub name: String,
    pub description: String,
    pub parameters: Parameters<Props>,
}

#[derive(Serialize)]
pub enum ToolType {
    #[serde(rename = "function")]
    Function,
}

/// The `{"type": "function", "function": {...}}` wrapper the API
/// expects for each tool definition.
#[derive(Serialize)]
pub struct ToolSpec<Props: Serialize> {
    pub r#type: ToolType,
    pub function: Function<Props>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ToolChoice {
    /// The model decides whether to call tools
    Auto,
    /// Force a plain text answer, no further tool calls
    None,
}

impl ToolChoice {
    fn as_str(&self) -> &'static str {
        match self {
            ToolChoice::Auto => "auto",
            ToolChoice::None => "none",
        }
    }
}

/// One chat completion call, temperature pinned to 0. Transport
/// failures and non-2xx statuses surface as errors so the caller can
/// decide whether to try the fallback provider.
pub async fn completion(
    messages: &[Message],
    tools: Option<&[Value]>,
    tool_choice: ToolChoice,
    provider: &LlmProvider,
) -> Result<Value, Error> {
    let mut payload = json!({
        "model": provider.model,
        "messages": messages,
        "temperature": 0,
    });
    if let Some(tools) = tools {
        payload["tools"] = json!(tools);
        payload["tool_choice"] = json!(tool_choice.as_str());
    }

    let url = format!(
        "{}/v1/chat/completions",
        provider.api_hostname.trim_end_matches("/")
    );
    let response = reqwest::Client::new()
        .post(url)
        .bearer_auth(&provider.api_key)
        .header("Content-Type", "application/json")
        .timeout(Duration::from_secs(60))
        .json(&payload)
        .send()
        .await?
        .error_for_status()?
        .json::<Value>()
        .await?;

    if response["choices"][0]["message"].is_null() {
        return Err(anyhow!("Malformed completion response: {}", response));
    }

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_provider(hostname: &str) -> LlmProvider {
        LlmProvider {
            api_hostname: hostname.to_string(),
            api_key: "test-key".to_string(),
            model: "llama-3.1-8b-instant".to_string(),
        }
    }

    #[test]
    fn test_role_serialization() {
        assert_eq!(serde_json::to_string(&Role::System).unwrap(), r#""system""#);
        assert_eq!(
            serde_json::to_string(&Role::Assistant).unwrap(),
            r#""assistant""#
        );
        assert_eq!(serde_json::to_string(&Role::User).unwrap(), r#""user""#);
        assert_eq!(serde_json::to_string(&Role::Tool).unwrap(), r#""tool""#);
    }

    #[test]
    fn test_message_new() {
        let msg = Message::new(Role::User, "Hello world");
        assert_eq!(
            serde_json::to_string(&msg).unwrap(),
            r#"{"role":"user","content":"Hello world"}"#
        );
    }

    #[test]
    fn test_message_new_tool_result() {
        let msg = Message::new_tool_result("call_test123", "list_calendars", r#"{"count":2}"#);
        assert_eq!(
            serde_json::to_string(&msg).unwrap(),
            r#"{"role":"tool","content":"{\"count\":2}","name":"list_calendars","tool_call_id":"call_test123"}"#
        );
    }

    #[test]
    fn test_sanitize_plain_content() {
        let raw = serde_json::json!({
            "role": "assistant",
            "content": "All set!",
            "refusal": null,
            "annotations": []
        });
        let msg = Message::sanitized_from(&raw).unwrap();
        assert_eq!(msg.role, Role::Assistant);
        assert_eq!(msg.content.as_deref(), Some("All set!"));
        assert!(msg.tool_calls.is_none());
        // Provider internal fields don't survive serialization
        let json = serde_json::to_string(&msg).unwrap();
        assert!(!json.contains("refusal"));
        assert!(!json.contains("annotations"));
    }

    #[test]
    fn test_sanitize_coerces_null_content_with_tool_calls() {
        let raw = serde_json::json!({
            "role": "assistant",
            "content": null,
            "tool_calls": [{
                "id": "call_abc",
                "type": "function",
                "function": {"name": "list_calendars", "arguments": "{}"}
            }]
        });
        let msg = Message::sanitized_from(&raw).unwrap();
        assert_eq!(msg.content.as_deref(), Some(""));
        assert_eq!(msg.tool_calls().len(), 1);
        assert_eq!(msg.tool_calls()[0].function.name, "list_calendars");
    }

    #[test]
    fn test_property_serialization() {
        let prop = Property::new("string", "The search query");
        assert_eq!(
            serde_json::to_string(&prop).unwrap(),
            r#"{"type":"string","description":"The search query"}"#
        );

        let prop = Property::nullable("string", "Optional date");
        assert_eq!(
            serde_json::to_string(&prop).unwrap(),
            r#"{"type":["string","null"],"description":"Optional date"}"#
        );
    }

    #[test]
    fn test_tool_spec_serialization() {
        let spec = ToolSpec {
            r#type: ToolType::Function,
            function: Function {
                name: "list_calendars".to_string(),
                description: "List the user's calendars".to_string(),
                parameters: Parameters {
                    r#type: "object".to_string(),
                    properties: serde_json::json!({}),
                    required: vec![],
                    additional_properties: false,
                },
            },
        };
        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["type"], "function");
        assert_eq!(json["function"]["name"], "list_calendars");
        assert_eq!(json["function"]["parameters"]["additionalProperties"], false);
    }

    #[tokio::test]
    async fn test_completion_basic() {
        let mut server = mockito::Server::new_async().await;

        let response_body = r#"{
            "id": "chatcmpl-123",
            "object": "chat.completion",
            "created": 1694268190,
            "model": "llama-3.1-8b-instant",
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": "Hello!"
                },
                "finish_reason": "stop"
            }]
        }"#;

        let mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(response_body)
            .create();

        let messages = vec![Message::new(Role::User, "Hi")];
        let result = completion(
            &messages,
            None,
            ToolChoice::Auto,
            &test_provider(&server.url()),
        )
        .await;

        mock.assert();
        let json = result.unwrap();
        assert_eq!(json["choices"][0]["message"]["content"], "Hello!");
    }

    #[tokio::test]
    async fn test_completion_passes_tools_and_tool_choice() {
        let mut server = mockito::Server::new_async().await;

        let mock = server
            .mock("POST", "/v1/chat/completions")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "tool_choice": "none",
                "temperature": 0,
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"choices": [{"index": 0, "message": {"role": "assistant", "content": "Done"}}]}"#,
            )
            .create();

        let tools = vec![serde_json::json!({
            "type": "function",
            "function": {"name": "list_calendars", "description": "", "parameters": {}}
        })];
        let messages = vec![Message::new(Role::User, "Hi")];
        let result = completion(
            &messages,
            Some(&tools),
            ToolChoice::None,
            &test_provider(&server.url()),
        )
        .await;

        mock.assert();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_completion_http_error_is_an_error() {
        let mut server = mockito::Server::new_async().await;

        let mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(500)
            .with_body("upstream exploded")
            .create();

        let messages = vec![Message::new(Role::User, "Hi")];
        let result = completion(
            &messages,
            None,
            ToolChoice::Auto,
            &test_provider(&server.url()),
        )
        .await;

        mock.assert();
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_completion_missing_message_is_an_error() {
        let mut server = mockito::Server::new_async().await;

        let mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error": {"message": "model overloaded"}}"#)
            .create();

        let messages = vec![Message::new(Role::User, "Hi")];
        let result = completion(
            &messages,
            None,
            ToolChoice::Auto,
            &test_provider(&server.url()),
        )
        .await;

        mock.assert();
        assert!(result.is_err());
    }
}

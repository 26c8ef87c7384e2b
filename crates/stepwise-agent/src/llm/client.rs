//! OpenAI-compatible model caller.
//!
//! Talks to the **OpenAI Chat Completions API** and any endpoint that
//! mimics it (Ollama, Together, vLLM, OpenRouter) in streaming SSE or
//! non-streaming mode, and maps the wire format to and from the
//! provider-agnostic [`Message`]/[`Part`] model.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue, RETRY_AFTER};
use serde_json::{Value, json};
use stepwise_tools::ToolDescription;
use uuid::Uuid;

use crate::error::{ConfigError, ModelError};
use crate::llm::caller::{ModelCaller, ModelRequest, TextSink};
use crate::llm::streaming_openai::OpenAiStreamAccumulator;
use crate::llm::types::{Message, Part, Role, ToolOutcome};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Default OpenAI API base URL.
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Default API key variable.
pub const DEFAULT_API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Default request timeout.
const DEFAULT_TIMEOUT_SECS: u64 = 120;

// ---------------------------------------------------------------------------
// Client configuration
// ---------------------------------------------------------------------------

/// Configuration for one OpenAI-compatible endpoint.
#[derive(Clone)]
pub struct OpenAiConfig {
    /// API key for bearer authentication.
    pub api_key: String,
    /// Environment variable the key was read from, for error messages.
    pub api_key_env: String,
    /// Base URL for the API (e.g. `https://api.openai.com/v1`).
    pub base_url: String,
    /// Model identifier.
    pub model: String,
    /// Maximum tokens per response.
    pub max_tokens: Option<u32>,
    /// Sampling temperature.
    pub temperature: Option<f32>,
    /// Use SSE streaming.
    pub stream: bool,
    /// Whole-request timeout.
    pub timeout: Duration,
}

impl fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("api_key", &"<redacted>")
            .field("api_key_env", &self.api_key_env)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("stream", &self.stream)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl OpenAiConfig {
    /// Configuration for the hosted OpenAI API.
    pub fn openai(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::compatible(api_key, model, OPENAI_BASE_URL)
    }

    /// Configuration for any OpenAI-compatible endpoint.
    pub fn compatible(
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            api_key_env: DEFAULT_API_KEY_ENV.to_owned(),
            base_url: base_url.into(),
            model: model.into(),
            max_tokens: None,
            temperature: None,
            stream: true,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// A [`ModelCaller`] backed by an OpenAI-compatible HTTP endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiCaller {
    config: OpenAiConfig,
    http: reqwest::Client,
}

impl OpenAiCaller {
    /// Create a new caller.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingApiKey`] for an empty key and
    /// [`ConfigError::Invalid`] if the HTTP client cannot be built.
    pub fn new(config: OpenAiConfig) -> Result<Self, ConfigError> {
        if config.api_key.is_empty() {
            return Err(ConfigError::MissingApiKey {
                env_var: config.api_key_env,
            });
        }

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ConfigError::Invalid {
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self { config, http })
    }

    /// The model this caller targets.
    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Build the JSON body for the Chat Completions API.
    pub fn build_request_body(&self, request: &ModelRequest<'_>) -> Value {
        let mut body = json!({
            "model": self.config.model,
            "messages": messages_to_openai(request.messages),
        });

        if let Some(max_tokens) = self.config.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if let Some(temp) = self.config.temperature {
            body["temperature"] = json!(temp);
        }
        if !request.tools.is_empty() {
            body["tools"] = tools_to_openai(request.tools);
        }
        if self.config.stream {
            body["stream"] = json!(true);
        }

        body
    }

    /// Send the request and turn non-2xx statuses into [`ModelError`]s.
    async fn send(&self, body: &Value) -> Result<reqwest::Response, ModelError> {
        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );

        let mut headers = HeaderMap::new();
        let auth_value = format!("Bearer {}", self.config.api_key);
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth_value).map_err(|e| {
                ModelError::invalid_request(format!("invalid authorization header: {e}"))
            })?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        tracing::debug!(url = %url, model = %body["model"], stream = self.config.stream, "sending model request");

        let resp = self
            .http
            .post(&url)
            .headers(headers)
            .json(body)
            .send()
            .await?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let retry_after = resp
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let text = resp.text().await.unwrap_or_default();

        tracing::warn!(status = %status, "model request rejected");
        Err(classify_status(status, retry_after, &text))
    }

    /// Consume an SSE body, forwarding text deltas.
    async fn consume_stream(
        &self,
        resp: reqwest::Response,
        on_text: &TextSink,
    ) -> Result<Message, ModelError> {
        let mut accumulator = OpenAiStreamAccumulator::new();

        let mut byte_stream = resp.bytes_stream();
        let mut buffer: Vec<u8> = Vec::new();

        while let Some(chunk) = byte_stream.next().await {
            let chunk = chunk.map_err(|e| ModelError::unavailable(format!("stream read error: {e}")))?;
            buffer.extend_from_slice(&chunk);

            // Split on complete lines only; a UTF-8 sequence may straddle chunks.
            while let Some(newline_pos) = buffer.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=newline_pos).collect();
                let line = std::str::from_utf8(&line).map_err(|e| {
                    ModelError::unavailable(format!("invalid UTF-8 in stream: {e}"))
                })?;

                if let Some(delta) = accumulator.feed_line(line)? {
                    on_text(&delta);
                }

                if accumulator.is_done() {
                    return accumulator.into_message();
                }
            }
        }

        accumulator.into_message()
    }
}

#[async_trait]
impl ModelCaller for OpenAiCaller {
    async fn call(
        &self,
        request: ModelRequest<'_>,
        on_text: &TextSink,
    ) -> Result<Message, ModelError> {
        let body = self.build_request_body(&request);
        let resp = self.send(&body).await?;

        if self.config.stream {
            return self.consume_stream(resp, on_text).await;
        }

        let text = resp
            .text()
            .await
            .map_err(|e| ModelError::unavailable(format!("failed to read response body: {e}")))?;
        let v: Value = serde_json::from_str(&text)
            .map_err(|e| ModelError::invalid_request(format!("invalid JSON response: {e}")))?;

        let message = parse_openai_response(&v)?;
        let text = message.text();
        if !text.is_empty() {
            on_text(&text);
        }
        Ok(message)
    }
}

/// Map an HTTP error status to the model error taxonomy.
pub fn classify_status(status: StatusCode, retry_after: Option<Duration>, body: &str) -> ModelError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => ModelError::RateLimited { retry_after },
        s if s.is_client_error() => {
            ModelError::invalid_request(format!("API returned {status}: {body}"))
        }
        _ => ModelError::unavailable(format!("API returned {status}: {body}")),
    }
}

// ===========================================================================
// Format conversion (free functions)
// ===========================================================================

/// Convert the history into the OpenAI `messages` array.
///
/// Tool messages fan out into one `role: "tool"` entry per result, and
/// `source` parts are not sent back to the provider.
pub fn messages_to_openai(messages: &[Message]) -> Vec<Value> {
    let mut wire_messages: Vec<Value> = Vec::with_capacity(messages.len());

    for msg in messages {
        match msg.role {
            Role::System | Role::User => {
                wire_messages.push(json!({
                    "role": msg.role.to_string(),
                    "content": msg.text(),
                }));
            }
            Role::Assistant => {
                let tool_calls: Vec<Value> = msg
                    .tool_calls()
                    .map(|tc| {
                        json!({
                            "id": tc.call_id,
                            "type": "function",
                            "function": {
                                "name": tc.tool_name,
                                "arguments": tc.input.to_string(),
                            }
                        })
                    })
                    .collect();

                let text = msg.text();
                if tool_calls.is_empty() {
                    wire_messages.push(json!({
                        "role": "assistant",
                        "content": text,
                    }));
                } else {
                    let mut m = json!({
                        "role": "assistant",
                        "tool_calls": tool_calls,
                    });
                    if !text.is_empty() {
                        m["content"] = json!(text);
                    }
                    wire_messages.push(m);
                }
            }
            Role::Tool => {
                for (call_id, outcome) in msg.tool_results_iter() {
                    wire_messages.push(json!({
                        "role": "tool",
                        "tool_call_id": call_id,
                        "content": outcome_to_openai(outcome),
                    }));
                }
            }
        }
    }

    wire_messages
}

/// Render a tool outcome as the string content of a `tool` message.
fn outcome_to_openai(outcome: &ToolOutcome) -> String {
    match outcome {
        ToolOutcome::Output(Value::String(s)) => s.clone(),
        ToolOutcome::Output(v) => v.to_string(),
        ToolOutcome::Error(failure) => format!("Error ({}): {}", failure.kind, failure.message),
    }
}

/// Convert tool descriptions into the OpenAI `tools` array.
pub fn tools_to_openai(tools: &[ToolDescription]) -> Value {
    let tool_values: Vec<Value> = tools
        .iter()
        .map(|t| {
            json!({
                "type": "function",
                "function": {
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.input_schema,
                }
            })
        })
        .collect();
    json!(tool_values)
}

/// Parse a non-streaming Chat Completions response into an assistant
/// message.
pub fn parse_openai_response(v: &Value) -> Result<Message, ModelError> {
    let message = &v["choices"][0]["message"];

    if message.is_null() {
        return Err(ModelError::invalid_request(
            "missing `choices[0].message` in response",
        ));
    }

    let mut parts = Vec::new();

    if let Some(content) = message["content"].as_str() {
        if !content.is_empty() {
            parts.push(Part::text(content));
        }
    }

    parts.extend(source_parts(&message["annotations"]));

    if let Some(tool_calls) = message["tool_calls"].as_array() {
        for tc in tool_calls {
            let func = &tc["function"];
            parts.push(tool_call_part(
                tc["id"].as_str().unwrap_or_default(),
                func["name"].as_str().unwrap_or_default(),
                func["arguments"].as_str().unwrap_or_default(),
            )?);
        }
    }

    Ok(Message::assistant_parts(parts))
}

/// Build a `tool-call` part from wire fields.
///
/// Empty arguments mean an empty object; a missing id is replaced with a
/// generated one.
pub(crate) fn tool_call_part(id: &str, name: &str, arguments: &str) -> Result<Part, ModelError> {
    if name.is_empty() {
        return Err(ModelError::invalid_request("tool call without a function name"));
    }

    let input: Value = if arguments.trim().is_empty() {
        Value::Object(Default::default())
    } else {
        serde_json::from_str(arguments).map_err(|e| {
            ModelError::invalid_request(format!("invalid JSON in tool call `{name}` arguments: {e}"))
        })?
    };

    let call_id = if id.is_empty() {
        format!("call_{}", Uuid::new_v4().simple())
    } else {
        id.to_owned()
    };

    Ok(Part::tool_call(call_id, name, input))
}

/// Extract `url_citation` annotations as `source` parts.
pub(crate) fn source_parts(annotations: &Value) -> Vec<Part> {
    annotations
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter(|a| a["type"] == "url_citation")
                .filter_map(|a| {
                    let citation = &a["url_citation"];
                    let uri = citation["url"].as_str()?;
                    let title = citation["title"].as_str().map(str::to_owned);
                    Some(Part::source(uri, title))
                })
                .collect()
        })
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::ToolFailure;

    fn caller(stream: bool) -> OpenAiCaller {
        let mut config = OpenAiConfig::openai("sk-test", "gpt-4o-mini");
        config.stream = stream;
        config.max_tokens = Some(512);
        OpenAiCaller::new(config).unwrap()
    }

    #[test]
    fn empty_api_key_returns_error() {
        let err = OpenAiCaller::new(OpenAiConfig::openai("", "gpt-4o-mini")).unwrap_err();
        assert!(matches!(err, ConfigError::MissingApiKey { .. }));
    }

    #[test]
    fn empty_api_key_names_configured_variable() {
        let mut config = OpenAiConfig::openai("", "gpt-4o-mini");
        config.api_key_env = "GROQ_API_KEY".into();
        match OpenAiCaller::new(config).unwrap_err() {
            ConfigError::MissingApiKey { env_var } => assert_eq!(env_var, "GROQ_API_KEY"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn debug_output_hides_api_key() {
        let config = OpenAiConfig::openai("sk-secret", "gpt-4o-mini");
        assert!(!format!("{config:?}").contains("sk-secret"));
    }

    #[test]
    fn compatible_config_construction() {
        let config = OpenAiConfig::compatible("k", "llama3", "http://localhost:11434/v1");
        assert_eq!(config.base_url, "http://localhost:11434/v1");
        assert!(config.stream);
    }

    // -- Request building ----------------------------------------------------

    #[test]
    fn build_request_body_basic() {
        let messages = vec![Message::user("Hi")];
        let request = ModelRequest {
            messages: &messages,
            tools: &[],
            step: 1,
        };
        let body = caller(false).build_request_body(&request);

        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["max_tokens"], 512);
        assert!(body.get("tools").is_none());
        assert!(body.get("stream").is_none());
        assert_eq!(body["messages"][0]["role"], "user");
    }

    #[test]
    fn build_request_body_with_tools_and_stream() {
        let messages = vec![Message::user("weather?")];
        let tools = vec![ToolDescription {
            name: "getWeather".into(),
            description: "Weather for a city".into(),
            input_schema: json!({ "type": "object" }),
        }];
        let request = ModelRequest {
            messages: &messages,
            tools: &tools,
            step: 1,
        };
        let body = caller(true).build_request_body(&request);

        assert_eq!(body["stream"], true);
        assert_eq!(body["tools"][0]["function"]["name"], "getWeather");
    }

    // -- Message conversion --------------------------------------------------

    #[test]
    fn messages_to_openai_system_and_user() {
        let messages = vec![Message::system("You are helpful."), Message::user("Hello")];
        let wire = messages_to_openai(&messages);

        assert_eq!(wire.len(), 2);
        assert_eq!(wire[0]["role"], "system");
        assert_eq!(wire[0]["content"], "You are helpful.");
        assert_eq!(wire[1]["role"], "user");
        assert_eq!(wire[1]["content"], "Hello");
    }

    #[test]
    fn messages_to_openai_tool_calls() {
        let messages = vec![Message::assistant_parts(vec![
            Part::text("Checking."),
            Part::tool_call("call_abc", "getWeather", json!({ "city": "Cairo" })),
        ])];
        let wire = messages_to_openai(&messages);

        assert_eq!(wire.len(), 1);
        assert_eq!(wire[0]["content"], "Checking.");
        let tc = &wire[0]["tool_calls"][0];
        assert_eq!(tc["id"], "call_abc");
        assert_eq!(tc["type"], "function");
        assert_eq!(tc["function"]["name"], "getWeather");
        let args: Value =
            serde_json::from_str(tc["function"]["arguments"].as_str().unwrap()).unwrap();
        assert_eq!(args["city"], "Cairo");
    }

    #[test]
    fn messages_to_openai_tool_results_fan_out() {
        let messages = vec![Message::tool_results(vec![
            Part::tool_result("c1", "getWeather", ToolOutcome::Output(json!("30°C, sunny"))),
            Part::tool_result("c2", "getLocation", ToolOutcome::Error(ToolFailure::unknown_tool("getLocation"))),
            Part::tool_result("c3", "count", ToolOutcome::Output(json!({ "n": 3 }))),
        ])];
        let wire = messages_to_openai(&messages);

        assert_eq!(wire.len(), 3);
        assert_eq!(wire[0]["tool_call_id"], "c1");
        assert_eq!(wire[0]["content"], "30°C, sunny");
        assert!(wire[1]["content"].as_str().unwrap().starts_with("Error (unknown-tool)"));
        assert_eq!(wire[2]["content"], r#"{"n":3}"#);
    }

    #[test]
    fn source_parts_are_not_sent() {
        let messages = vec![Message::assistant_parts(vec![
            Part::text("Answer"),
            Part::source("https://example.com", None),
        ])];
        let wire = messages_to_openai(&messages);
        assert_eq!(wire[0]["content"], "Answer");
    }

    // -- Response parsing ----------------------------------------------------

    #[test]
    fn parse_text_response_with_citations() {
        let v = json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": "It is sunny.",
                    "annotations": [{
                        "type": "url_citation",
                        "url_citation": { "url": "https://weather.example", "title": "Weather" }
                    }]
                }
            }]
        });

        let msg = parse_openai_response(&v).unwrap();
        assert_eq!(msg.parts.len(), 2);
        assert_eq!(msg.text(), "It is sunny.");
        assert_eq!(
            msg.parts[1],
            Part::source("https://weather.example", Some("Weather".into()))
        );
    }

    #[test]
    fn parse_tool_call_response() {
        let v = json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_xyz",
                        "type": "function",
                        "function": { "name": "getWeather", "arguments": "{\"city\":\"Cairo\"}" }
                    }]
                },
                "finish_reason": "tool_calls"
            }]
        });

        let msg = parse_openai_response(&v).unwrap();
        let calls: Vec<_> = msg.tool_calls().collect();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].call_id, "call_xyz");
        assert_eq!(calls[0].input["city"], "Cairo");
    }

    #[test]
    fn missing_call_id_is_generated() {
        let part = tool_call_part("", "getWeather", "").unwrap();
        let Part::ToolCall { call_id, input, .. } = part else {
            panic!("expected tool call part");
        };
        assert!(call_id.starts_with("call_"));
        assert_eq!(input, json!({}));
    }

    #[test]
    fn missing_message_is_invalid() {
        let err = parse_openai_response(&json!({ "choices": [] })).unwrap_err();
        assert!(matches!(err, ModelError::InvalidRequest { .. }));
    }

    // -- Status classification -----------------------------------------------

    #[test]
    fn status_classification() {
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, Some(Duration::from_secs(7)), ""),
            ModelError::RateLimited {
                retry_after: Some(Duration::from_secs(7))
            }
        );
        assert!(matches!(
            classify_status(StatusCode::BAD_REQUEST, None, "bad"),
            ModelError::InvalidRequest { .. }
        ));
        assert!(matches!(
            classify_status(StatusCode::UNPROCESSABLE_ENTITY, None, ""),
            ModelError::InvalidRequest { .. }
        ));
        assert!(matches!(
            classify_status(StatusCode::SERVICE_UNAVAILABLE, None, ""),
            ModelError::Unavailable { .. }
        ));
        assert!(matches!(
            classify_status(StatusCode::INTERNAL_SERVER_ERROR, None, ""),
            ModelError::Unavailable { .. }
        ));
    }
}

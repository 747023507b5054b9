use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::RequestError;
use crate::model::ChatMessage;
use crate::model_client::{ModelClient, ModelFuture, ModelRequest};
use crate::providers::http_errors::{ApiErrorBody, model_api_request_error, model_api_status_error};

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

/// `content` is either a plain string or a list of typed parts.
#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<Value>,
}

/// Client for any OpenAI-compatible `chat/completions` endpoint; OpenRouter
/// by default.
#[derive(Clone)]
pub struct OpenRouterClient {
    client: Client,
    api_url: String,
    api_key: String,
    timeout_secs: u64,
}

impl fmt::Debug for OpenRouterClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenRouterClient")
            .field("api_url", &self.api_url)
            .field("timeout_secs", &self.timeout_secs)
            .finish_non_exhaustive()
    }
}

fn chat_url(base_url: &str) -> String {
    format!("{}/chat/completions", base_url.trim_end_matches('/'))
}

fn to_wire_messages(messages: &[ChatMessage]) -> Vec<WireMessage<'_>> {
    messages
        .iter()
        .map(|msg| WireMessage {
            role: msg.role().as_str(),
            content: msg.content(),
        })
        .collect()
}

fn content_text(content: Value) -> Option<String> {
    match content {
        Value::String(text) => Some(text),
        Value::Array(parts) => Some(
            parts
                .iter()
                .filter_map(|part| match part {
                    Value::String(text) => Some(text.as_str()),
                    other => other.get("text").and_then(Value::as_str),
                })
                .collect(),
        ),
        _ => None,
    }
}

fn parse_completion(body: &str) -> Result<ChatMessage, RequestError> {
    let parsed: ChatCompletionResponse = serde_json::from_str(body)
        .map_err(|err| RequestError::MalformedResponse(format!("invalid JSON body: {err}")))?;

    if let Some(error) = parsed.error {
        return Err(RequestError::MalformedResponse(format!(
            "provider returned an error: {}",
            error.message
        )));
    }

    let content = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| RequestError::MalformedResponse("response has no choices".to_string()))?
        .message
        .content
        .and_then(content_text)
        .filter(|content| !content.trim().is_empty())
        .ok_or_else(|| {
            RequestError::MalformedResponse("response message has no content".to_string())
        })?;

    Ok(ChatMessage::assistant(content))
}

impl OpenRouterClient {
    pub fn new(cfg: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.model_timeout_secs))
            .build()
            .context("Failed to initialize HTTP client")?;
        Ok(Self::with_client(client, cfg))
    }

    pub fn with_client(client: Client, cfg: &Config) -> Self {
        Self {
            client,
            api_url: chat_url(&cfg.model_base_url),
            api_key: cfg.api_key.clone(),
            timeout_secs: cfg.model_timeout_secs,
        }
    }

    async fn chat(&self, request: ModelRequest<'_>) -> Result<ChatMessage, RequestError> {
        let params = request.params;
        let body = ChatCompletionRequest {
            model: &params.model,
            messages: to_wire_messages(request.messages),
            temperature: params.temperature,
            max_tokens: params.max_tokens,
            stream: false,
        };
        debug!(
            api_url = %self.api_url,
            model = %params.model,
            message_count = request.messages.len(),
            "sending chat completion request"
        );

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| {
                warn!(
                    api_url = %self.api_url,
                    model = %params.model,
                    error = %err,
                    "chat completion request failed"
                );
                model_api_request_error(err, &self.api_url, self.timeout_secs)
            })?;

        let status = response.status();
        let response_body = response
            .text()
            .await
            .map_err(|err| model_api_request_error(err, &self.api_url, self.timeout_secs))?;

        if !status.is_success() {
            warn!(
                api_url = %self.api_url,
                model = %params.model,
                status = %status,
                response_body_len = response_body.len(),
                "model API returned non-success status"
            );
            return Err(model_api_status_error(status, &response_body));
        }

        let message = parse_completion(&response_body).inspect_err(|err| {
            warn!(model = %params.model, error = %err, "could not use model response");
        })?;
        debug!(
            model = %params.model,
            response_len = message.content().len(),
            "received chat completion response"
        );
        Ok(message)
    }
}

impl ModelClient for OpenRouterClient {
    fn complete<'a>(&'a self, request: ModelRequest<'a>) -> ModelFuture<'a> {
        Box::pin(self.chat(request))
    }
}

#[cfg(test)]
mod tests {
    use super::{OpenRouterClient, chat_url, parse_completion};
    use crate::config::Config;
    use crate::error::RequestError;
    use crate::model::{ChatMessage, GenerationParams, Role};
    use crate::model_client::{ModelClient, ModelRequest};
    use serde_json::Value;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread::{self, JoinHandle};
    use std::time::Duration;

    fn test_config(base_url: &str) -> Config {
        Config {
            api_key: "sk-test".to_string(),
            model: "openai/gpt-5-mini".to_string(),
            model_base_url: base_url.to_string(),
            system_prompt: String::new(),
            temperature: 0.5,
            max_tokens: Some(64),
            model_timeout_secs: 5,
        }
    }

    fn find_header_end(buf: &[u8]) -> Option<usize> {
        buf.windows(4).position(|window| window == b"\r\n\r\n")
    }

    fn content_length(head: &str) -> usize {
        head.lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.trim()
                    .eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse().ok())
                    .flatten()
            })
            .unwrap_or(0)
    }

    /// Serves one canned response and hands back the raw request text.
    fn serve_once(status_line: &str, body: &str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind should succeed");
        let addr = listener.local_addr().expect("address should be available");
        let response = format!(
            "HTTP/1.1 {status_line}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        );

        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept should succeed");
            let mut buf = Vec::new();
            let mut chunk = [0_u8; 4096];
            loop {
                let read = stream.read(&mut chunk).expect("read should succeed");
                if read == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..read]);
                if let Some(end) = find_header_end(&buf) {
                    let head = String::from_utf8_lossy(&buf[..end]).to_string();
                    if buf.len() >= end + 4 + content_length(&head) {
                        break;
                    }
                }
            }
            stream
                .write_all(response.as_bytes())
                .expect("write should succeed");
            String::from_utf8_lossy(&buf).to_string()
        });

        (format!("http://{addr}/api/v1"), handle)
    }

    fn request_body(raw: &str) -> Value {
        let (_, body) = raw.split_once("\r\n\r\n").expect("request has a body");
        serde_json::from_str(body).expect("request body should be JSON")
    }

    fn params() -> GenerationParams {
        GenerationParams {
            model: "openai/gpt-5-mini".to_string(),
            temperature: 0.5,
            max_tokens: Some(64),
        }
    }

    #[test]
    fn chat_url_trims_trailing_slash() {
        assert_eq!(
            chat_url("https://openrouter.ai/api/v1/"),
            "https://openrouter.ai/api/v1/chat/completions"
        );
    }

    #[test]
    fn parse_completion_reads_first_choice() {
        let message =
            parse_completion(r#"{"choices":[{"message":{"role":"assistant","content":"Hi!"}}]}"#)
                .expect("completion should parse");
        assert_eq!(message.role(), Role::Assistant);
        assert_eq!(message.content(), "Hi!");
    }

    #[test]
    fn parse_completion_joins_text_parts() {
        let message = parse_completion(
            r#"{"choices":[{"message":{"content":[{"type":"text","text":"hi"}]}}]}"#,
        )
        .expect("text parts should parse");
        assert_eq!(message.content(), "hi");

        let message = parse_completion(
            r#"{"choices":[{"message":{"content":[{"type":"text","text":"Hello, "},{"type":"image_url","image_url":{}},{"type":"text","text":"world"}]}}]}"#,
        )
        .expect("mixed parts should parse");
        assert_eq!(message.content(), "Hello, world");
    }

    #[test]
    fn parse_completion_rejects_unusable_bodies() {
        for body in [
            "not json",
            r#"{"choices":[]}"#,
            r#"{"choices":[{"message":{"content":null}}]}"#,
            r#"{"choices":[{"message":{"content":"  "}}]}"#,
            r#"{"choices":[{"message":{"content":[{"type":"image_url","image_url":{}}]}}]}"#,
            r#"{"choices":[{"message":{"content":42}}]}"#,
            r#"{"error":{"message":"model overloaded"}}"#,
        ] {
            let err = parse_completion(body).expect_err("body should be rejected");
            assert!(
                matches!(err, RequestError::MalformedResponse(_)),
                "unexpected error for {body}: {err:?}"
            );
        }
    }

    #[tokio::test]
    async fn complete_posts_history_and_params() {
        let (base_url, server) = serve_once(
            "200 OK",
            r#"{"id":"gen-1","choices":[{"message":{"role":"assistant","content":"Hello back"}}]}"#,
        );
        let client = OpenRouterClient::new(&test_config(&base_url)).expect("client should build");
        let history = vec![
            ChatMessage::system("Be brief."),
            ChatMessage::user("Hello"),
        ];
        let params = params();

        let reply = client
            .complete(ModelRequest {
                messages: &history,
                params: &params,
            })
            .await
            .expect("completion should succeed");
        assert_eq!(reply.content(), "Hello back");

        let raw = server.join().expect("server thread should join");
        assert!(raw.starts_with("POST /api/v1/chat/completions "), "{raw}");
        assert!(
            raw.to_ascii_lowercase()
                .contains("authorization: bearer sk-test"),
            "{raw}"
        );

        let body = request_body(&raw);
        assert_eq!(body["model"], "openai/gpt-5-mini");
        assert_eq!(body["stream"], false);
        assert_eq!(body["max_tokens"], 64);
        assert_eq!(body["temperature"], 0.5);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["messages"][1]["content"], "Hello");
    }

    #[tokio::test]
    async fn complete_maps_unauthorized_status() {
        let (base_url, server) = serve_once(
            "401 Unauthorized",
            r#"{"error":{"message":"No auth credentials found","code":401}}"#,
        );
        let client = OpenRouterClient::new(&test_config(&base_url)).expect("client should build");
        let history = vec![ChatMessage::user("Hello")];
        let params = params();

        let err = client
            .complete(ModelRequest {
                messages: &history,
                params: &params,
            })
            .await
            .expect_err("completion should fail");
        server.join().expect("server thread should join");

        match err {
            RequestError::Unauthorized { status, message } => {
                assert_eq!(status, 401);
                assert_eq!(message, "No auth credentials found");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn complete_maps_rate_limit_and_server_errors() {
        let history = vec![ChatMessage::user("Hello")];
        let params = params();

        let (base_url, server) = serve_once(
            "429 Too Many Requests",
            r#"{"error":{"message":"slow down"}}"#,
        );
        let client = OpenRouterClient::new(&test_config(&base_url)).expect("client should build");
        let err = client
            .complete(ModelRequest {
                messages: &history,
                params: &params,
            })
            .await
            .expect_err("completion should fail");
        server.join().expect("server thread should join");
        assert!(matches!(err, RequestError::RateLimited { .. }), "{err:?}");

        let (base_url, server) = serve_once("500 Internal Server Error", "boom");
        let client = OpenRouterClient::new(&test_config(&base_url)).expect("client should build");
        let err = client
            .complete(ModelRequest {
                messages: &history,
                params: &params,
            })
            .await
            .expect_err("completion should fail");
        server.join().expect("server thread should join");
        assert!(
            matches!(err, RequestError::Status { status: 500, .. }),
            "{err:?}"
        );
    }

    #[tokio::test]
    async fn complete_applies_configured_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind should succeed");
        let addr = listener.local_addr().expect("address should be available");
        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().expect("accept should succeed");
            thread::sleep(Duration::from_secs(3));
            drop(stream);
        });
        let mut cfg = test_config(&format!("http://{addr}/api/v1"));
        cfg.model_timeout_secs = 1;
        let client = OpenRouterClient::new(&cfg).expect("client should build");
        let history = vec![ChatMessage::user("Hello")];
        let params = params();

        let err = client
            .complete(ModelRequest {
                messages: &history,
                params: &params,
            })
            .await
            .expect_err("silent server should time out");
        server.join().expect("server thread should join");

        match err {
            RequestError::Timeout { timeout_secs, .. } => assert_eq!(timeout_secs, 1),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}

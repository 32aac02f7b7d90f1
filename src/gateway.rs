//! Model Gateway: the one-shot generate-with-tools call and the endpoint
//! plumbing for the live stream. The wire protocol is the Gemini-style
//! `generateContent` / `BidiGenerateContent` surface; everything above this
//! module only sees `ModelGateway` and `ModelReply`.

use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde_json::{json, Value};

use crate::types::{ChatMessage, MessagePart, MessageRole, ToolCall};
use crate::util::{env_f64, env_optional, env_u64, env_usize, jitter_ratio, parse_retry_after};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_LIVE_URL: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";
const DEFAULT_MODEL: &str = "gemini-2.5-flash";
const DEFAULT_LIVE_MODEL: &str = "gemini-2.0-flash-live-001";

#[derive(Debug)]
pub(crate) enum GatewayError {
    /// Missing or rejected API key — the user must fix credentials, not retry.
    Auth(String),
    /// Network-level failure or a non-auth HTTP error after retries.
    Transport(String),
    /// The endpoint answered but the payload was not understood.
    Protocol(String),
}

impl std::fmt::Display for GatewayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auth(msg) => write!(f, "credential error: {msg}"),
            Self::Transport(msg) => write!(f, "connection error: {msg}"),
            Self::Protocol(msg) => write!(f, "unexpected model response: {msg}"),
        }
    }
}

impl std::error::Error for GatewayError {}

#[derive(Debug)]
pub(crate) enum ModelReply {
    Text(String),
    ToolCalls(Vec<ToolCall>),
}

pub(crate) trait ModelGateway {
    fn generate(
        &self,
        system: &str,
        history: &[ChatMessage],
        tools: &[Value],
    ) -> Result<ModelReply, GatewayError>;
}

// ── Wire mapping ─────────────────────────────────────────────────────────

/// Conversation history in wire form. System-role entries (local error
/// notices) never leave the process.
pub(crate) fn to_wire_contents(history: &[ChatMessage]) -> Vec<Value> {
    let mut out = Vec::new();
    for msg in history {
        let role = match msg.role {
            MessageRole::User => "user",
            MessageRole::Model => "model",
            MessageRole::System => continue,
        };
        let mut parts = Vec::new();
        for part in &msg.parts {
            match part {
                MessagePart::Text { value } => {
                    if !value.is_empty() {
                        parts.push(json!({ "text": value }));
                    }
                }
                MessagePart::Image { mime_type, data } => {
                    parts.push(json!({
                        "inline_data": { "mime_type": mime_type, "data": data }
                    }));
                }
            }
        }
        if parts.is_empty() {
            parts.push(json!({ "text": "" }));
        }
        out.push(json!({ "role": role, "parts": parts }));
    }
    out
}

fn synth_call_id(index: usize) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    format!("fc{index}-{nanos}")
}

/// Either the model spoke, or it asked for tools. The one-shot wire may omit
/// function-call ids; a correlation id is synthesized here so the
/// dispatcher's one-response-per-id contract holds in both transports.
pub(crate) fn parse_generate_response(payload: &Value) -> Result<ModelReply, GatewayError> {
    let parts = payload
        .get("candidates")
        .and_then(|v| v.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.as_array())
        .ok_or_else(|| GatewayError::Protocol("response has no candidate parts".into()))?;

    let mut text_parts = Vec::new();
    let mut tool_calls = Vec::new();

    for (index, part) in parts.iter().enumerate() {
        if let Some(call) = part.get("functionCall") {
            let name = call
                .get("name")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();
            let id = call
                .get("id")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string())
                .unwrap_or_else(|| synth_call_id(index));
            let args = call.get("args").cloned().unwrap_or_else(|| json!({}));
            tool_calls.push(ToolCall { id, name, args });
        } else if let Some(text) = part.get("text").and_then(|v| v.as_str()) {
            if !text.is_empty() {
                text_parts.push(text.to_string());
            }
        }
    }

    if !tool_calls.is_empty() {
        return Ok(ModelReply::ToolCalls(tool_calls));
    }
    Ok(ModelReply::Text(text_parts.join("\n")))
}

// ── HTTP implementation ──────────────────────────────────────────────────

pub(crate) struct HttpGateway {
    api_key: String,
    model: String,
    live_model: String,
    base_url: String,
    timeout_secs: u64,
    max_retries: usize,
    retry_base: f64,
    retry_max: f64,
}

impl HttpGateway {
    /// Env vars win over the config file; the file wins over defaults.
    pub(crate) fn from_env(defaults: &crate::config::FileConfig) -> Result<Self, GatewayError> {
        let api_key = env_optional("MIRA_API_KEY")
            .or_else(|| env_optional("GEMINI_API_KEY"))
            .ok_or_else(|| GatewayError::Auth("set MIRA_API_KEY or GEMINI_API_KEY".into()))?;
        let model = env_optional("MIRA_MODEL")
            .or_else(|| defaults.model.clone())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let live_model = env_optional("MIRA_LIVE_MODEL")
            .or_else(|| defaults.live_model.clone())
            .unwrap_or_else(|| DEFAULT_LIVE_MODEL.to_string());
        let base_url = env_optional("MIRA_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let timeout_secs =
            env_u64("MIRA_TIMEOUT", 120).map_err(|e| GatewayError::Transport(e.to_string()))?;
        let max_retries =
            env_usize("MIRA_MAX_RETRIES", 2).map_err(|e| GatewayError::Transport(e.to_string()))?;
        let retry_base =
            env_f64("MIRA_RETRY_BASE", 0.5).map_err(|e| GatewayError::Transport(e.to_string()))?;
        let retry_max =
            env_f64("MIRA_RETRY_MAX", 4.0).map_err(|e| GatewayError::Transport(e.to_string()))?;
        Ok(Self {
            api_key,
            model,
            live_model,
            base_url,
            timeout_secs,
            max_retries,
            retry_base,
            retry_max,
        })
    }

    /// Websocket endpoint for the live session, key attached as a query
    /// parameter the way the REST calls carry it.
    pub(crate) fn live_endpoint(&self) -> String {
        let base = env_optional("MIRA_LIVE_URL").unwrap_or_else(|| DEFAULT_LIVE_URL.to_string());
        format!("{base}?key={}", urlencoding::encode(&self.api_key))
    }

    pub(crate) fn live_model(&self) -> String {
        self.live_model.clone()
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url.trim_end_matches('/'),
            self.model,
            urlencoding::encode(&self.api_key)
        )
    }
}

impl ModelGateway for HttpGateway {
    fn generate(
        &self,
        system: &str,
        history: &[ChatMessage],
        tools: &[Value],
    ) -> Result<ModelReply, GatewayError> {
        let mut payload = json!({
            "system_instruction": { "parts": [{ "text": system }] },
            "contents": to_wire_contents(history),
        });
        if !tools.is_empty() {
            payload["tools"] = json!([{ "function_declarations": tools }]);
        }

        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(self.timeout_secs))
            .timeout_read(Duration::from_secs(self.timeout_secs))
            .timeout_write(Duration::from_secs(self.timeout_secs))
            .build();
        let endpoint = self.endpoint();

        let retryable = |status: u16| matches!(status, 429 | 500 | 502 | 503 | 504 | 529);
        let mut last_error = GatewayError::Transport("request was never sent".into());

        for attempt in 0..=self.max_retries {
            match agent
                .post(&endpoint)
                .set("content-type", "application/json")
                .send_json(payload.clone())
            {
                Ok(resp) => {
                    let body = resp
                        .into_string()
                        .map_err(|e| GatewayError::Transport(e.to_string()))?;
                    let parsed: Value = serde_json::from_str(&body)
                        .map_err(|e| GatewayError::Protocol(e.to_string()))?;
                    return parse_generate_response(&parsed);
                }
                Err(ureq::Error::Status(code, resp)) => {
                    let retry_after = parse_retry_after(&resp);
                    let text = resp.into_string().unwrap_or_default();
                    if matches!(code, 401 | 403) || (code == 400 && text.contains("API key")) {
                        return Err(GatewayError::Auth(format!("HTTP {code}: key rejected")));
                    }
                    if attempt < self.max_retries && retryable(code) {
                        let mut delay =
                            (self.retry_base * 2.0_f64.powi(attempt as i32)).min(self.retry_max);
                        if let Some(retry_after) = retry_after {
                            delay = delay.max(retry_after);
                        }
                        delay *= 1.0 + jitter_ratio() * 0.2;
                        thread::sleep(Duration::from_secs_f64(delay));
                        continue;
                    }
                    let preview = crate::util::truncate_chars(&text, 200);
                    last_error = GatewayError::Transport(format!("HTTP {code}: {preview}"));
                    break;
                }
                Err(ureq::Error::Transport(err)) => {
                    if attempt < self.max_retries {
                        let delay =
                            (self.retry_base * 2.0_f64.powi(attempt as i32)).min(self.retry_max);
                        thread::sleep(Duration::from_secs_f64(delay));
                        continue;
                    }
                    last_error = GatewayError::Transport(err.to_string());
                    break;
                }
            }
        }

        eprintln!("[gateway] generate failed after {} retries: {last_error}", self.max_retries);
        Err(last_error)
    }
}

// ── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_contents_skip_system_entries() {
        let history = vec![
            ChatMessage::text(MessageRole::User, "hello"),
            ChatMessage::text(MessageRole::System, "local error note"),
            ChatMessage::text(MessageRole::Model, "hi"),
        ];
        let wire = to_wire_contents(&history);
        assert_eq!(wire.len(), 2);
        assert_eq!(wire[0]["role"], "user");
        assert_eq!(wire[1]["role"], "model");
    }

    #[test]
    fn test_wire_contents_carry_images_inline() {
        let msg = ChatMessage {
            role: MessageRole::User,
            parts: vec![
                MessagePart::Text { value: "what is this".into() },
                MessagePart::Image { mime_type: "image/png".into(), data: "QUJD".into() },
            ],
        };
        let wire = to_wire_contents(&[msg]);
        assert_eq!(wire[0]["parts"][1]["inline_data"]["mime_type"], "image/png");
    }

    #[test]
    fn test_parse_text_reply() {
        let payload = json!({
            "candidates": [{ "content": { "parts": [{ "text": "All done." }] } }]
        });
        match parse_generate_response(&payload).unwrap() {
            ModelReply::Text(text) => assert_eq!(text, "All done."),
            other => panic!("expected text, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_tool_calls_synthesizes_missing_ids() {
        let payload = json!({
            "candidates": [{ "content": { "parts": [
                { "functionCall": { "name": "addStudent", "args": { "name": "Olena" } } },
                { "functionCall": { "id": "call-7", "name": "listTasks", "args": {} } }
            ] } }]
        });
        match parse_generate_response(&payload).unwrap() {
            ModelReply::ToolCalls(calls) => {
                assert_eq!(calls.len(), 2);
                assert!(!calls[0].id.is_empty());
                assert_eq!(calls[1].id, "call-7");
                assert_eq!(calls[0].args["name"], "Olena");
            }
            other => panic!("expected tool calls, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_rejects_shapeless_payload() {
        let payload = json!({ "ok": true });
        assert!(matches!(
            parse_generate_response(&payload),
            Err(GatewayError::Protocol(_))
        ));
    }
}

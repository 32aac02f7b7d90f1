//! Single-shot turn handling. One request to the gateway per user message;
//! the reply is either plain text or a batch of tool calls that is dispatched
//! exactly once and folded into one model-role message. Gateway failures are
//! not retried here — a system-role notice is appended and the user re-sends.

use std::path::{Path, PathBuf};

use crate::context::{build_system_context, tools_for_mode};
use crate::dispatch::{dispatch, ToolRegistry};
use crate::gateway::{GatewayError, ModelGateway, ModelReply};
use crate::store::DataStore;
use crate::types::{ChatMessage, ContextMode, MessagePart, MessageRole, ToolResponse};

pub(crate) struct ChatSession {
    pub(crate) mode: ContextMode,
    pub(crate) messages: Vec<ChatMessage>,
    /// Streaming partial transcript shown while a live session runs;
    /// replaced wholesale on each update, cleared on turn completion.
    pub(crate) live_transcription: String,
    pub(crate) busy: bool,
    pub(crate) needs_credential: bool,
}

impl ChatSession {
    pub(crate) fn new(mode: ContextMode) -> Self {
        Self {
            mode,
            messages: Vec::new(),
            live_transcription: String::new(),
            busy: false,
            needs_credential: false,
        }
    }

    pub(crate) fn reset(&mut self) {
        self.messages.clear();
        self.live_transcription.clear();
        self.busy = false;
    }

    pub(crate) fn push_system(&mut self, text: impl Into<String>) {
        self.messages.push(ChatMessage::text(MessageRole::System, text));
    }

    /// One user turn. Returns Err only when a turn is already in flight —
    /// callers drop the attempt rather than queue it, so model responses
    /// can never arrive out of order.
    pub(crate) fn send_turn(
        &mut self,
        store: &dyn DataStore,
        registry: &ToolRegistry,
        gateway: &dyn ModelGateway,
        text: &str,
        image: Option<MessagePart>,
    ) -> Result<(), String> {
        if self.busy {
            return Err("a turn is already in flight".into());
        }
        self.busy = true;

        let mut parts = vec![MessagePart::Text { value: text.to_string() }];
        if let Some(image) = image {
            parts.push(image);
        }
        self.messages.push(ChatMessage { role: MessageRole::User, parts });

        let outcome = self.run_turn(store, registry, gateway);
        self.busy = false;
        if let Err(notice) = outcome {
            self.push_system(notice);
        }
        Ok(())
    }

    fn run_turn(
        &mut self,
        store: &dyn DataStore,
        registry: &ToolRegistry,
        gateway: &dyn ModelGateway,
    ) -> Result<(), String> {
        let system = build_system_context(store, self.mode)
            .map_err(|e| format!("Couldn't prepare the assistant context: {e}"))?;
        let tools = tools_for_mode(self.mode);

        match gateway.generate(&system, &self.messages, &tools) {
            Ok(ModelReply::Text(text)) => {
                let text = if text.trim().is_empty() { "Done.".to_string() } else { text };
                self.messages.push(ChatMessage::text(MessageRole::Model, text));
                Ok(())
            }
            Ok(ModelReply::ToolCalls(calls)) => {
                if self.mode == ContextMode::Guest {
                    // Guests are never offered tools; a call arriving anyway
                    // is a protocol anomaly and must not reach the dispatcher.
                    eprintln!("[turn] dropped {} tool call(s) in guest mode", calls.len());
                    self.messages.push(ChatMessage::text(
                        MessageRole::Model,
                        "I can't look up or change CRM data in guest mode.",
                    ));
                    return Ok(());
                }
                let responses = dispatch(registry, store, &calls);
                let text = format_tool_responses(&responses);
                self.messages.push(ChatMessage::text(MessageRole::Model, text));
                Ok(())
            }
            Err(err) => {
                if matches!(err, GatewayError::Auth(_)) {
                    self.needs_credential = true;
                }
                Err(user_facing_gateway_error(&err))
            }
        }
    }
}

fn user_facing_gateway_error(err: &GatewayError) -> String {
    match err {
        GatewayError::Auth(_) => {
            "The model API credential was rejected — update MIRA_API_KEY and try again.".into()
        }
        GatewayError::Transport(_) => {
            "I couldn't reach the model gateway — please re-send your message.".into()
        }
        GatewayError::Protocol(_) => {
            "The model gateway returned something unexpected — please re-send your message.".into()
        }
    }
}

/// One human-readable line per tool response: the message field (with
/// suggestion bullets when present), or the error, or a generic fallback.
pub(crate) fn format_tool_responses(responses: &[ToolResponse]) -> String {
    let mut lines = Vec::new();
    for response in responses {
        if let Some(error) = &response.error {
            lines.push(error.clone());
            continue;
        }
        if let Some(message) = response.result.get("message").and_then(|v| v.as_str()) {
            let mut line = message.to_string();
            if let Some(suggestions) = response.result.get("suggestions").and_then(|v| v.as_array())
            {
                for candidate in suggestions {
                    let name = candidate.get("name").and_then(|v| v.as_str()).unwrap_or("?");
                    let id = candidate.get("id").and_then(|v| v.as_i64()).unwrap_or(0);
                    line.push_str(&format!("\n- {name} (#{id})"));
                }
            }
            lines.push(line);
        } else if let Some(error) = response.result.get("error").and_then(|v| v.as_str()) {
            lines.push(format!("{}: {error}", response.name));
        } else {
            lines.push("Action performed.".to_string());
        }
    }
    lines.join("\n")
}

// ── Transcript persistence ───────────────────────────────────────────────
// The chat REPL keeps its conversation across invocations; the cap bounds
// the prompt size for long-running sessions.

pub(crate) fn session_file_path(data_dir: &Path, session_id: &str) -> PathBuf {
    let safe_id = session_id.replace(['/', '\\', ':', '*', '?', '"', '<', '>', '|'], "_");
    data_dir.join("sessions").join(format!("{safe_id}.json"))
}

pub(crate) fn load_session_messages(
    data_dir: &Path,
    session_id: &str,
    max_messages: usize,
) -> Vec<ChatMessage> {
    let path = session_file_path(data_dir, session_id);
    match std::fs::read_to_string(&path) {
        Ok(data) => match serde_json::from_str::<Vec<ChatMessage>>(&data) {
            Ok(mut messages) => {
                if messages.len() > max_messages {
                    messages.drain(..messages.len() - max_messages);
                }
                messages
            }
            Err(_) => Vec::new(),
        },
        Err(_) => Vec::new(),
    }
}

pub(crate) fn save_session_messages(
    data_dir: &Path,
    session_id: &str,
    messages: &[ChatMessage],
    max_messages: usize,
) {
    let path = session_file_path(data_dir, session_id);
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let start = messages.len().saturating_sub(max_messages);
    if let Ok(json) = serde_json::to_string_pretty(&messages[start..]) {
        let tmp_path = path.with_extension("json.tmp");
        if std::fs::write(&tmp_path, &json).is_ok() {
            let _ = std::fs::rename(&tmp_path, &path);
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::temp_store;
    use crate::store::DataStore;
    use crate::types::ToolCall;
    use serde_json::json;

    /// Canned gateway: returns the queued replies in order.
    struct StubGateway {
        replies: std::cell::RefCell<Vec<Result<ModelReply, GatewayError>>>,
    }

    impl StubGateway {
        fn with(replies: Vec<Result<ModelReply, GatewayError>>) -> Self {
            Self { replies: std::cell::RefCell::new(replies) }
        }
    }

    impl ModelGateway for StubGateway {
        fn generate(
            &self,
            _system: &str,
            _history: &[ChatMessage],
            _tools: &[serde_json::Value],
        ) -> Result<ModelReply, GatewayError> {
            self.replies.borrow_mut().remove(0)
        }
    }

    #[test]
    fn test_text_reply_becomes_model_message() {
        let (store, path) = temp_store("turn_text");
        let registry = ToolRegistry::new();
        let gateway = StubGateway::with(vec![Ok(ModelReply::Text("Hello there.".into()))]);
        let mut session = ChatSession::new(ContextMode::Authenticated);

        session.send_turn(&store, &registry, &gateway, "hi", None).unwrap();
        assert_eq!(session.messages.len(), 2);
        assert_eq!(session.messages[1].role, MessageRole::Model);
        assert_eq!(session.messages[1].text_content(), "Hello there.");
        assert!(!session.busy);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_tool_calls_are_dispatched_and_folded() {
        let (store, path) = temp_store("turn_tools");
        let registry = ToolRegistry::new();
        let gateway = StubGateway::with(vec![Ok(ModelReply::ToolCalls(vec![ToolCall {
            id: "c1".into(),
            name: "addStudent".into(),
            args: json!({ "name": "Olena Ivanova" }),
        }]))]);
        let mut session = ChatSession::new(ContextMode::Authenticated);

        session.send_turn(&store, &registry, &gateway, "add olena", None).unwrap();
        assert_eq!(store.list_students().unwrap().len(), 1);
        assert!(session.messages[1].text_content().contains("Olena Ivanova"));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_guest_mode_never_reaches_the_dispatcher() {
        let (store, path) = temp_store("turn_guest");
        store.add_student("Olena Ivanova", None, None, None).unwrap();
        let registry = ToolRegistry::new();
        // even a coerced tool call must not mutate anything for a guest
        let gateway = StubGateway::with(vec![Ok(ModelReply::ToolCalls(vec![ToolCall {
            id: "c1".into(),
            name: "deleteStudent".into(),
            args: json!({ "name": "Olena" }),
        }]))]);
        let mut session = ChatSession::new(ContextMode::Guest);

        session.send_turn(&store, &registry, &gateway, "delete olena", None).unwrap();
        assert_eq!(store.list_students().unwrap().len(), 1);
        assert!(session.messages[1].text_content().contains("guest mode"));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_busy_session_rejects_a_second_send() {
        let (store, path) = temp_store("turn_busy");
        let registry = ToolRegistry::new();
        let gateway = StubGateway::with(vec![]);
        let mut session = ChatSession::new(ContextMode::Authenticated);
        session.busy = true;

        let result = session.send_turn(&store, &registry, &gateway, "hi", None);
        assert!(result.is_err());
        assert!(session.messages.is_empty());
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_gateway_failure_appends_system_notice_and_abandons_turn() {
        let (store, path) = temp_store("turn_gw_err");
        let registry = ToolRegistry::new();
        let gateway =
            StubGateway::with(vec![Err(GatewayError::Auth("key rejected".into()))]);
        let mut session = ChatSession::new(ContextMode::Authenticated);

        session.send_turn(&store, &registry, &gateway, "hi", None).unwrap();
        assert_eq!(session.messages[1].role, MessageRole::System);
        assert!(session.needs_credential);
        assert!(!session.busy);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_format_suggestions_as_bullets() {
        let response = ToolResponse::ok(
            "c1",
            "deleteStudent",
            json!({
                "message": "Several students match \"Olena\" — which one did you mean?",
                "suggestions": [
                    { "id": 1, "name": "Olena Ivanova" },
                    { "id": 2, "name": "Olena Shevchenko" }
                ]
            }),
        );
        let text = format_tool_responses(&[response]);
        assert!(text.contains("- Olena Ivanova (#1)"));
        assert!(text.contains("- Olena Shevchenko (#2)"));
    }

    #[test]
    fn test_format_falls_back_to_generic_line() {
        let response = ToolResponse::ok("c1", "listStudents", json!({ "students": [] }));
        assert_eq!(format_tool_responses(&[response]), "Action performed.");
    }

    #[test]
    fn test_session_messages_roundtrip_with_cap() {
        let dir = std::env::temp_dir().join(format!("mira_turn_persist_{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let messages: Vec<ChatMessage> = (0..10)
            .map(|i| ChatMessage::text(MessageRole::User, format!("msg {i}")))
            .collect();
        save_session_messages(&dir, "desk", &messages, 6);
        let loaded = load_session_messages(&dir, "desk", 6);
        assert_eq!(loaded.len(), 6);
        assert_eq!(loaded[0].text_content(), "msg 4");
        std::fs::remove_dir_all(&dir).ok();
    }
}

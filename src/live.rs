//! Live voice session: a persistent duplex stream against the gateway.
//!
//! One dedicated thread owns every handle — microphone stream, playback
//! stream, websocket — because cpal streams are not `Send` and because a
//! single owner gives teardown exactly one code path. The thread multiplexes
//! with a short socket read timeout: drain outbound commands and mic frames,
//! then poll the socket. User-initiated stop and remote close both land in
//! the same teardown at the bottom of the loop; no exit leaks a handle.
//!
//! Session phases: Idle → Opening → Open → Closing → Idle. The microphone is
//! acquired first (permission and missing-device failures must be
//! distinguishable before any network work), then the socket, then playback.

use std::net::TcpStream;
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use serde_json::{json, Value};
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};

use crate::audio::{self, CaptureHandle, Player};
use crate::context::build_system_context;
use crate::dispatch::{dispatch, ToolRegistry};
use crate::store::SqliteStore;
use crate::tool_defs::tool_definitions_json;
use crate::turn::ChatSession;
use crate::types::{ContextMode, MessageRole, ToolCall, ToolResponse};
use crate::util::truncate_chars;

const READ_TIMEOUT_MS: u64 = 25;
const OPEN_HANDSHAKE_TIMEOUT_SECS: u64 = 30;
/// Bounds on tool-response payloads sent over the stream: frames must stay
/// small and plain-data-only.
const RESPONSE_STRING_MAX: usize = 2_000;
const RESPONSE_LIST_MAX: usize = 20;
const RESPONSE_DEPTH_MAX: usize = 6;

// ── Errors ───────────────────────────────────────────────────────────────

/// Session-boundary failures, classified because the user-facing remedy
/// differs: grant OS permission vs. plug in a microphone vs. fix the API
/// key vs. plain retry.
#[derive(Debug)]
pub(crate) enum VoiceError {
    MicPermission(String),
    NoInputDevice,
    Auth(String),
    Connection(String),
}

impl std::fmt::Display for VoiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MicPermission(detail) => {
                write!(f, "microphone access denied ({detail})")
            }
            Self::NoInputDevice => write!(f, "no microphone was found"),
            Self::Auth(detail) => write!(f, "credential error: {detail}"),
            Self::Connection(detail) => write!(f, "connection error: {detail}"),
        }
    }
}

impl std::error::Error for VoiceError {}

// ── Events & commands ────────────────────────────────────────────────────

/// What the session thread reports back to the UI loop.
pub(crate) enum SessionEvent {
    Opened,
    /// Replaces the previous partial transcript wholesale.
    PartialTranscript(String),
    /// Both transcript buffers, flushed exactly once per turn completion.
    TurnFinalized { user: String, model: String },
    Ended { reason: String },
}

enum Command {
    Text(String),
    Stop,
}

/// Inbound server frames, decoded into their orderable parts.
#[derive(Debug)]
pub(crate) enum ServerEvent {
    SetupComplete,
    Audio(Vec<i16>),
    InputTranscript(String),
    OutputTranscript(String),
    Interrupted,
    TurnComplete,
    ToolCalls(Vec<ToolCall>),
    GoAway,
}

// ── Controller ───────────────────────────────────────────────────────────

struct SessionHandle {
    cmd_tx: mpsc::Sender<Command>,
    join: thread::JoinHandle<()>,
}

pub(crate) struct LiveSessionController {
    handle: Option<SessionHandle>,
}

impl LiveSessionController {
    pub(crate) fn new() -> Self {
        Self { handle: None }
    }

    pub(crate) fn is_active(&self) -> bool {
        self.handle
            .as_ref()
            .map(|h| !h.join.is_finished())
            .unwrap_or(false)
    }

    /// Opening phase: spawns the session thread and blocks until the thread
    /// has acquired the microphone and finished the gateway handshake, so
    /// acquisition failures surface synchronously with their specific cause.
    pub(crate) fn start(
        &mut self,
        endpoint: String,
        model: String,
        db_path: PathBuf,
        mode: ContextMode,
        event_tx: mpsc::Sender<SessionEvent>,
    ) -> Result<(), VoiceError> {
        if self.is_active() {
            return Err(VoiceError::Connection("a live session is already active".into()));
        }
        self.handle = None;

        let (cmd_tx, cmd_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel();
        let join = thread::spawn(move || {
            run_session(endpoint, model, db_path, mode, cmd_rx, ready_tx, event_tx);
        });

        match ready_rx.recv_timeout(Duration::from_secs(OPEN_HANDSHAKE_TIMEOUT_SECS)) {
            Ok(Ok(())) => {
                self.handle = Some(SessionHandle { cmd_tx, join });
                Ok(())
            }
            Ok(Err(err)) => {
                let _ = join.join();
                Err(err)
            }
            Err(_) => {
                // thread never reported; signal it down and give up
                let _ = cmd_tx.send(Command::Stop);
                let _ = join.join();
                Err(VoiceError::Connection("handshake timed out".into()))
            }
        }
    }

    pub(crate) fn send_text(&self, text: &str) {
        if let Some(handle) = &self.handle {
            let _ = handle.cmd_tx.send(Command::Text(text.to_string()));
        }
    }

    /// Idempotent: stopping an Idle controller is a no-op. A remote close
    /// has already run the thread-side teardown; this just reaps the thread.
    pub(crate) fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        let _ = handle.cmd_tx.send(Command::Stop);
        if handle.join.join().is_err() {
            eprintln!("[live] session thread panicked during teardown");
        }
    }
}

// ── Session thread ───────────────────────────────────────────────────────

type Socket = WebSocket<MaybeTlsStream<TcpStream>>;

fn classify_connect_error(err: tungstenite::Error) -> VoiceError {
    if let tungstenite::Error::Http(response) = &err {
        let code = response.status().as_u16();
        if matches!(code, 401 | 403) {
            return VoiceError::Auth(format!("HTTP {code}: key rejected"));
        }
    }
    VoiceError::Connection(err.to_string())
}

fn set_read_timeout(socket: &mut Socket) {
    let timeout = Some(Duration::from_millis(READ_TIMEOUT_MS));
    let result = match socket.get_mut() {
        MaybeTlsStream::Plain(stream) => stream.set_read_timeout(timeout),
        MaybeTlsStream::Rustls(stream) => stream.sock.set_read_timeout(timeout),
        _ => Ok(()),
    };
    if let Err(err) = result {
        eprintln!("[live] could not set socket read timeout: {err}");
    }
}

fn setup_frame(model: &str, system: &str, mode: ContextMode) -> Value {
    let mut setup = json!({
        "model": format!("models/{model}"),
        "generationConfig": { "responseModalities": ["AUDIO"] },
        "systemInstruction": { "parts": [{ "text": system }] },
        "inputAudioTranscription": {},
        "outputAudioTranscription": {},
    });
    if mode == ContextMode::Authenticated {
        setup["tools"] = json!([{ "function_declarations": tool_definitions_json() }]);
    }
    json!({ "setup": setup })
}

fn run_session(
    endpoint: String,
    model: String,
    db_path: PathBuf,
    mode: ContextMode,
    cmd_rx: mpsc::Receiver<Command>,
    ready_tx: mpsc::Sender<Result<(), VoiceError>>,
    event_tx: mpsc::Sender<SessionEvent>,
) {
    // The session thread gets its own store handle; the context is rebuilt
    // here, at session start, never cached.
    let store = match SqliteStore::open(&db_path) {
        Ok(store) => store,
        Err(err) => {
            let _ = ready_tx.send(Err(VoiceError::Connection(err.to_string())));
            return;
        }
    };
    let system = match build_system_context(&store, mode) {
        Ok(system) => system,
        Err(err) => {
            let _ = ready_tx.send(Err(VoiceError::Connection(err)));
            return;
        }
    };
    let registry = ToolRegistry::new();

    // Microphone first: its failures must reach the user with their
    // specific cause before any network work happens.
    let (frame_tx, frame_rx) = mpsc::channel();
    let capture = match audio::start_capture(frame_tx) {
        Ok(capture) => capture,
        Err(err) => {
            let _ = ready_tx.send(Err(err));
            return;
        }
    };

    let mut socket = match tungstenite::connect(&endpoint) {
        Ok((socket, _)) => socket,
        Err(err) => {
            teardown(Some(capture), None, None);
            let _ = ready_tx.send(Err(classify_connect_error(err)));
            return;
        }
    };
    set_read_timeout(&mut socket);

    let setup = setup_frame(&model, &system, mode);
    if let Err(err) = socket.send(Message::Text(setup.to_string().into())) {
        teardown(Some(capture), None, Some(socket));
        let _ = ready_tx.send(Err(VoiceError::Connection(format!("setup send: {err}"))));
        return;
    }

    let player = match Player::new() {
        Ok(player) => player,
        Err(err) => {
            teardown(Some(capture), None, Some(socket));
            let _ = ready_tx.send(Err(err));
            return;
        }
    };

    let _ = ready_tx.send(Ok(()));
    let _ = event_tx.send(SessionEvent::Opened);

    let mut input_buf = String::new();
    let mut output_buf = String::new();
    let mut reason = "stopped".to_string();

    'session: loop {
        loop {
            match cmd_rx.try_recv() {
                Ok(Command::Text(text)) => {
                    let frame = json!({
                        "clientContent": {
                            "turns": [{ "role": "user", "parts": [{ "text": text }] }],
                            "turnComplete": true,
                        }
                    });
                    if socket.send(Message::Text(frame.to_string().into())).is_err() {
                        reason = "connection lost".to_string();
                        break 'session;
                    }
                }
                Ok(Command::Stop) => break 'session,
                Err(mpsc::TryRecvError::Empty) => break,
                Err(mpsc::TryRecvError::Disconnected) => {
                    reason = "controller dropped".to_string();
                    break 'session;
                }
            }
        }

        while let Ok(frame) = frame_rx.try_recv() {
            let media = json!({
                "realtimeInput": {
                    "mediaChunks": [{
                        "mimeType": format!("audio/pcm;rate={}", audio::INPUT_SAMPLE_RATE),
                        "data": audio::encode_frame(&frame),
                    }]
                }
            });
            if socket.send(Message::Text(media.to_string().into())).is_err() {
                reason = "connection lost".to_string();
                break 'session;
            }
        }

        let payload = match socket.read() {
            Ok(Message::Text(text)) => serde_json::from_str::<Value>(&text).ok(),
            Ok(Message::Binary(binary)) => serde_json::from_slice::<Value>(&binary).ok(),
            Ok(Message::Ping(data)) => {
                let _ = socket.send(Message::Pong(data));
                None
            }
            Ok(Message::Close(frame)) => {
                reason = frame
                    .map(|f| f.reason.to_string())
                    .filter(|r| !r.is_empty())
                    .unwrap_or_else(|| "closed by server".to_string());
                break 'session;
            }
            Ok(_) => None,
            Err(tungstenite::Error::Io(err))
                if matches!(
                    err.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                ) =>
            {
                None
            }
            Err(err) => {
                reason = format!("stream error: {err}");
                break 'session;
            }
        };

        let Some(payload) = payload else { continue };
        for event in parse_server_frame(&payload) {
            match event {
                ServerEvent::SetupComplete => {}
                ServerEvent::Audio(samples) => player.enqueue(samples),
                ServerEvent::InputTranscript(delta) => {
                    input_buf.push_str(&delta);
                    let _ = event_tx.send(SessionEvent::PartialTranscript(input_buf.clone()));
                }
                ServerEvent::OutputTranscript(delta) => output_buf.push_str(&delta),
                ServerEvent::Interrupted => player.interrupt(),
                ServerEvent::TurnComplete => {
                    let _ = event_tx.send(SessionEvent::TurnFinalized {
                        user: std::mem::take(&mut input_buf),
                        model: std::mem::take(&mut output_buf),
                    });
                }
                ServerEvent::ToolCalls(calls) => {
                    if mode == ContextMode::Guest {
                        eprintln!("[live] dropped {} tool call(s) in guest mode", calls.len());
                        continue;
                    }
                    let responses = dispatch(&registry, &store, &calls);
                    if responses.is_empty() {
                        continue;
                    }
                    let frame = tool_response_frame(&responses);
                    if socket.send(Message::Text(frame.to_string().into())).is_err() {
                        reason = "connection lost".to_string();
                        break 'session;
                    }
                }
                ServerEvent::GoAway => {
                    reason = "server is closing the stream".to_string();
                    break 'session;
                }
            }
        }
    }

    // Closing: one path for stop, remote close and stream errors alike.
    teardown(Some(capture), Some(player), Some(socket));
    input_buf.clear();
    output_buf.clear();
    let _ = event_tx.send(SessionEvent::Ended { reason });
}

/// Best-effort release of every handle; a failure in one release never
/// prevents the others.
fn teardown(capture: Option<CaptureHandle>, player: Option<Player>, socket: Option<Socket>) {
    drop(capture);
    drop(player);
    if let Some(mut socket) = socket {
        if let Err(err) = socket.close(None) {
            eprintln!("[live] socket close: {err}");
        }
    }
}

// ── Frame parsing ────────────────────────────────────────────────────────

pub(crate) fn parse_server_frame(payload: &Value) -> Vec<ServerEvent> {
    let mut events = Vec::new();

    if payload.get("setupComplete").is_some() {
        events.push(ServerEvent::SetupComplete);
    }

    if let Some(calls) = payload
        .get("toolCall")
        .and_then(|tc| tc.get("functionCalls"))
        .and_then(|fc| fc.as_array())
    {
        let calls = calls
            .iter()
            .map(|call| ToolCall {
                id: call
                    .get("id")
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string(),
                name: call
                    .get("name")
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string(),
                args: call.get("args").cloned().unwrap_or_else(|| json!({})),
            })
            .collect();
        events.push(ServerEvent::ToolCalls(calls));
    }

    if let Some(content) = payload.get("serverContent") {
        if content.get("interrupted").and_then(|v| v.as_bool()) == Some(true) {
            events.push(ServerEvent::Interrupted);
        }
        if let Some(text) = content
            .get("inputTranscription")
            .and_then(|t| t.get("text"))
            .and_then(|v| v.as_str())
        {
            events.push(ServerEvent::InputTranscript(text.to_string()));
        }
        if let Some(text) = content
            .get("outputTranscription")
            .and_then(|t| t.get("text"))
            .and_then(|v| v.as_str())
        {
            events.push(ServerEvent::OutputTranscript(text.to_string()));
        }
        if let Some(parts) = content
            .get("modelTurn")
            .and_then(|t| t.get("parts"))
            .and_then(|p| p.as_array())
        {
            for part in parts {
                if let Some(data) = part
                    .get("inlineData")
                    .and_then(|d| d.get("data"))
                    .and_then(|v| v.as_str())
                {
                    match audio::decode_frame(data) {
                        Ok(samples) => events.push(ServerEvent::Audio(samples)),
                        Err(err) => eprintln!("[live] dropped audio frame: {err}"),
                    }
                }
            }
        }
        if content.get("turnComplete").and_then(|v| v.as_bool()) == Some(true) {
            events.push(ServerEvent::TurnComplete);
        }
    }

    if payload.get("goAway").is_some() {
        events.push(ServerEvent::GoAway);
    }

    events
}

// ── Tool responses on the stream ─────────────────────────────────────────

/// The stream cannot carry arbitrary payloads: strings are truncated, lists
/// capped, nesting bounded, and the top level is forced to a plain object.
pub(crate) fn sanitize_payload(value: &Value) -> Value {
    let cleaned = sanitize_value(value, 0);
    match cleaned {
        Value::Object(_) => cleaned,
        other => json!({ "value": other }),
    }
}

fn sanitize_value(value: &Value, depth: usize) -> Value {
    if depth > RESPONSE_DEPTH_MAX {
        return Value::Null;
    }
    match value {
        Value::String(s) => Value::String(truncate_chars(s, RESPONSE_STRING_MAX)),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .take(RESPONSE_LIST_MAX)
                .map(|item| sanitize_value(item, depth + 1))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, item)| (key.clone(), sanitize_value(item, depth + 1)))
                .collect(),
        ),
        other => other.clone(),
    }
}

pub(crate) fn tool_response_frame(responses: &[ToolResponse]) -> Value {
    let function_responses: Vec<Value> = responses
        .iter()
        .map(|response| {
            let payload = match &response.error {
                Some(error) => json!({ "error": error }),
                None => sanitize_payload(&response.result),
            };
            json!({ "id": response.id, "name": response.name, "response": payload })
        })
        .collect();
    json!({ "toolResponse": { "functionResponses": function_responses } })
}

// ── UI projection ────────────────────────────────────────────────────────

/// Folds a session event into the chat state the UI renders.
pub(crate) fn apply_to_session(session: &mut ChatSession, event: &SessionEvent) {
    match event {
        SessionEvent::Opened => session.push_system("Voice session started."),
        SessionEvent::PartialTranscript(text) => {
            session.live_transcription = text.clone();
        }
        SessionEvent::TurnFinalized { user, model } => {
            if !user.trim().is_empty() {
                session
                    .messages
                    .push(crate::types::ChatMessage::text(MessageRole::User, user.clone()));
            }
            if !model.trim().is_empty() {
                session
                    .messages
                    .push(crate::types::ChatMessage::text(MessageRole::Model, model.clone()));
            }
            session.live_transcription.clear();
        }
        SessionEvent::Ended { reason } => {
            session.push_system(format!("Voice session ended ({reason})."));
            session.live_transcription.clear();
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_on_idle_controller_is_a_noop() {
        let mut controller = LiveSessionController::new();
        assert!(!controller.is_active());
        controller.stop();
        controller.stop();
        assert!(!controller.is_active());
    }

    #[test]
    fn test_parse_composite_server_frame() {
        let samples = vec![100i16, -100, 200];
        let payload = json!({
            "serverContent": {
                "modelTurn": { "parts": [{ "inlineData": { "data": audio::encode_frame(&samples) } }] },
                "inputTranscription": { "text": "add a stu" },
                "outputTranscription": { "text": "Sure" },
                "turnComplete": true,
            }
        });
        let events = parse_server_frame(&payload);
        assert_eq!(events.len(), 4);
        assert!(matches!(&events[0], ServerEvent::InputTranscript(t) if t == "add a stu"));
        assert!(matches!(&events[1], ServerEvent::OutputTranscript(t) if t == "Sure"));
        assert!(matches!(&events[2], ServerEvent::Audio(s) if *s == samples));
        assert!(matches!(events[3], ServerEvent::TurnComplete));
    }

    #[test]
    fn test_parse_interruption_frame() {
        let payload = json!({ "serverContent": { "interrupted": true } });
        let events = parse_server_frame(&payload);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], ServerEvent::Interrupted));
    }

    #[test]
    fn test_parse_tool_call_frame_keeps_missing_id_empty() {
        let payload = json!({
            "toolCall": { "functionCalls": [
                { "id": "fn-1", "name": "listTasks", "args": {} },
                { "name": "addStudent", "args": { "name": "Olena" } }
            ] }
        });
        let events = parse_server_frame(&payload);
        let ServerEvent::ToolCalls(calls) = &events[0] else {
            panic!("expected tool calls");
        };
        assert_eq!(calls[0].id, "fn-1");
        // empty id: the dispatcher drops this call with a warning
        assert_eq!(calls[1].id, "");
    }

    #[test]
    fn test_sanitize_wraps_scalars_into_an_object() {
        let payload = sanitize_payload(&json!("plain text"));
        assert_eq!(payload["value"], "plain text");
    }

    #[test]
    fn test_sanitize_truncates_and_caps() {
        let long = "x".repeat(RESPONSE_STRING_MAX + 100);
        let list: Vec<i64> = (0..100).collect();
        let payload = sanitize_payload(&json!({ "text": long, "items": list }));
        assert!(payload["text"].as_str().unwrap().chars().count() <= RESPONSE_STRING_MAX + 1);
        assert_eq!(payload["items"].as_array().unwrap().len(), RESPONSE_LIST_MAX);
    }

    #[test]
    fn test_tool_response_frame_preserves_ids_and_errors() {
        let responses = vec![
            ToolResponse::ok("a", "listTasks", json!({ "message": "2 task(s), 1 open." })),
            ToolResponse::failed("b", "addStudent", "Function execution failed: boom"),
        ];
        let frame = tool_response_frame(&responses);
        let list = frame["toolResponse"]["functionResponses"].as_array().unwrap();
        assert_eq!(list[0]["id"], "a");
        assert_eq!(list[0]["response"]["message"], "2 task(s), 1 open.");
        assert_eq!(list[1]["id"], "b");
        assert!(list[1]["response"]["error"].as_str().unwrap().contains("boom"));
    }

    #[test]
    fn test_apply_partial_transcript_replaces_wholesale() {
        let mut session = ChatSession::new(ContextMode::Authenticated);
        apply_to_session(&mut session, &SessionEvent::PartialTranscript("add a".into()));
        apply_to_session(&mut session, &SessionEvent::PartialTranscript("add a student".into()));
        assert_eq!(session.live_transcription, "add a student");
        assert!(session.messages.is_empty());
    }

    #[test]
    fn test_apply_turn_finalized_flushes_once_and_clears() {
        let mut session = ChatSession::new(ContextMode::Authenticated);
        session.live_transcription = "add a student".into();
        apply_to_session(
            &mut session,
            &SessionEvent::TurnFinalized {
                user: "add a student".into(),
                model: "Which course?".into(),
            },
        );
        assert_eq!(session.messages.len(), 2);
        assert!(session.live_transcription.is_empty());

        // a completion with empty buffers adds nothing
        apply_to_session(
            &mut session,
            &SessionEvent::TurnFinalized { user: String::new(), model: String::new() },
        );
        assert_eq!(session.messages.len(), 2);
    }
}

mod audio;
mod cli;
mod config;
mod context;
mod dispatch;
mod gateway;
mod live;
mod resolver;
mod store;
mod tool_args;
mod tool_defs;
mod turn;
mod types;
mod util;

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use clap::Parser;

use cli::{Cli, Command};
use config::{
    config_file_path, load_file_config, resolve_data_dir, save_file_config, store_path,
    FileConfig, DEFAULT_SESSION_CAP,
};
use dispatch::ToolRegistry;
use gateway::HttpGateway;
use live::{LiveSessionController, SessionEvent};
use store::{DataStore, SqliteStore};
use turn::{load_session_messages, save_session_messages, ChatSession};
use types::{ContextMode, MessagePart, MessageRole};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let data_dir = resolve_data_dir(cli.data_dir);

    match cli.command {
        Command::Init { seed } => cmd_init(&data_dir, seed),
        Command::Tools { json } => cmd_tools(json),
        Command::Ask { prompt, image, guest, json } => {
            cmd_ask(&data_dir, &prompt, image, guest, json)
        }
        Command::Chat { session, guest } => cmd_chat(&data_dir, &session, guest),
        Command::Voice { guest } => cmd_voice(&data_dir, guest),
        Command::Summary { json } => cmd_summary(&data_dir, json),
    }
}

fn mode_for(guest: bool) -> ContextMode {
    if guest {
        ContextMode::Guest
    } else {
        ContextMode::Authenticated
    }
}

fn cmd_init(data_dir: &Path, seed: bool) -> Result<(), Box<dyn std::error::Error>> {
    let path = store_path(data_dir);
    let store = SqliteStore::open_or_create(&path)?;
    if !config_file_path(data_dir).exists() {
        save_file_config(data_dir, &FileConfig::default())?;
    }
    if seed {
        store.add_knowledge(
            "Enrollment",
            "New students can join a running course within its first two weeks.",
        )?;
        store.add_knowledge(
            "Refunds",
            "Full refund within 14 days of enrollment, 50% until the course midpoint.",
        )?;
        store.add_knowledge(
            "Opening hours",
            "Reception is open Monday to Saturday, 09:00 to 18:00.",
        )?;
    }
    println!("Created {}", path.display());
    Ok(())
}

fn cmd_tools(json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let catalog = tool_defs::tool_definitions_json();
    if json {
        println!("{}", serde_json::to_string_pretty(&catalog)?);
        return Ok(());
    }
    for tool in &catalog {
        let name = tool["name"].as_str().unwrap_or("?");
        let description = tool["description"].as_str().unwrap_or("");
        println!("{name:<20} {description}");
    }
    Ok(())
}

fn image_part_from_file(path: &Path) -> Result<MessagePart, Box<dyn std::error::Error>> {
    let bytes = std::fs::read(path)?;
    let mime_type = match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => return Err(format!("unsupported image type: {}", path.display()).into()),
    };
    Ok(MessagePart::Image {
        mime_type: mime_type.to_string(),
        data: B64.encode(&bytes),
    })
}

/// Prints messages appended since the last call; returns the new high mark.
fn render_new_messages(session: &ChatSession, rendered: &mut usize) {
    for message in &session.messages[*rendered..] {
        let text = message.text_content();
        if text.is_empty() {
            continue;
        }
        match message.role {
            MessageRole::User => println!("you: {text}"),
            MessageRole::Model => println!("mira: {text}"),
            MessageRole::System => println!("[{text}]"),
        }
    }
    *rendered = session.messages.len();
}

fn cmd_ask(
    data_dir: &Path,
    prompt: &str,
    image: Option<PathBuf>,
    guest: bool,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = SqliteStore::open(&store_path(data_dir))?;
    let file_config = load_file_config(data_dir);
    let gateway = HttpGateway::from_env(&file_config)?;
    let registry = ToolRegistry::new();

    let mut session = ChatSession::new(mode_for(guest));
    let image_part = image.as_deref().map(image_part_from_file).transpose()?;
    session.send_turn(&store, &registry, &gateway, prompt, image_part)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&session.messages)?);
    } else {
        let mut rendered = 1; // skip echoing the prompt back
        render_new_messages(&session, &mut rendered);
    }
    if session.needs_credential {
        eprintln!("[mira] set MIRA_API_KEY (or GEMINI_API_KEY) and retry");
    }
    Ok(())
}

fn cmd_chat(data_dir: &Path, session_id: &str, guest: bool) -> Result<(), Box<dyn std::error::Error>> {
    let store = SqliteStore::open(&store_path(data_dir))?;
    let file_config = load_file_config(data_dir);
    let gateway = HttpGateway::from_env(&file_config)?;
    let registry = ToolRegistry::new();
    let cap = file_config.session_cap.unwrap_or(DEFAULT_SESSION_CAP);

    let mut session = ChatSession::new(mode_for(guest));
    session.messages = load_session_messages(data_dir, session_id, cap);
    let mut rendered = session.messages.len();
    if rendered > 0 {
        println!("(resuming session \"{session_id}\" with {rendered} earlier messages)");
    }
    println!("Chat with Mira — /reset clears the session, /quit exits.");

    let stdin = io::stdin();
    loop {
        print!("you> ");
        io::stdout().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match line {
            "/quit" | "/exit" => break,
            "/reset" => {
                session.reset();
                rendered = 0;
                save_session_messages(data_dir, session_id, &session.messages, cap);
                println!("(session cleared)");
                continue;
            }
            _ => {}
        }

        if let Err(err) = session.send_turn(&store, &registry, &gateway, line, None) {
            eprintln!("[chat] {err}");
            continue;
        }
        rendered += 1; // the user line was just typed; don't echo it
        render_new_messages(&session, &mut rendered);
        if session.needs_credential {
            eprintln!("[mira] set MIRA_API_KEY (or GEMINI_API_KEY) and retry");
            session.needs_credential = false;
        }
        save_session_messages(data_dir, session_id, &session.messages, cap);
    }
    save_session_messages(data_dir, session_id, &session.messages, cap);
    Ok(())
}

fn cmd_voice(data_dir: &Path, guest: bool) -> Result<(), Box<dyn std::error::Error>> {
    let db_path = store_path(data_dir);
    if !db_path.exists() {
        return Err(format!("no store at {} (run `mira init` first)", db_path.display()).into());
    }
    let file_config = load_file_config(data_dir);
    let gateway = HttpGateway::from_env(&file_config)?;
    let mode = mode_for(guest);

    let (event_tx, event_rx) = mpsc::channel();
    let mut controller = LiveSessionController::new();
    controller
        .start(
            gateway.live_endpoint(),
            gateway.live_model(),
            db_path,
            mode,
            event_tx,
        )
        .map_err(|e| format!("could not start the voice session: {e}"))?;

    println!("Voice session open — speak, type a line to send text, /stop to end.");

    // stdin lines arrive via a helper thread so the event loop never blocks
    let (line_tx, line_rx) = mpsc::channel();
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if line_tx.send(line).is_err() {
                break;
            }
        }
    });

    let mut session = ChatSession::new(mode);
    let mut rendered = 0usize;
    let mut last_partial = String::new();

    loop {
        match event_rx.recv_timeout(Duration::from_millis(100)) {
            Ok(event) => {
                let ended = matches!(event, SessionEvent::Ended { .. });
                live::apply_to_session(&mut session, &event);
                if session.live_transcription != last_partial {
                    if !session.live_transcription.is_empty() {
                        println!("… {}", session.live_transcription);
                    }
                    last_partial = session.live_transcription.clone();
                }
                render_new_messages(&session, &mut rendered);
                if ended {
                    break;
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }

        while let Ok(line) = line_rx.try_recv() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if line == "/stop" || line == "/quit" {
                controller.stop();
                while let Ok(event) = event_rx.recv_timeout(Duration::from_millis(200)) {
                    live::apply_to_session(&mut session, &event);
                }
                render_new_messages(&session, &mut rendered);
                return Ok(());
            }
            controller.send_text(line);
        }
    }

    controller.stop();
    Ok(())
}

fn cmd_summary(data_dir: &Path, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let store = SqliteStore::open(&store_path(data_dir))?;
    let summary = store.financial_summary()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }
    let payments = store.list_payments()?;
    println!("income    {:>12.2}", summary.income_total);
    println!("tuition   {:>12.2}  ({} payments)", summary.payments_total, payments.len());
    println!("expenses  {:>12.2}", summary.expense_total);
    println!("net       {:>12.2}", summary.net);
    Ok(())
}

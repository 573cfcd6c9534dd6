use std::fs;
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use parley_contracts::chat::{
    parse_intent, strip_stamp, strip_stamp_markup, IntentAction, Message, Role,
    CHAT_HELP_COMMANDS,
};
use parley_contracts::config::{ChatConfig, DEFAULT_TEMPERATURE};
use parley_contracts::events::{new_session_id, ChatEvent, EventWriter};
use parley_contracts::export::{last_assistant_reply, reply_preview, write_export, ExportFormat};
use parley_engine::{
    default_provider_registry, prepare_history_values, ChatEngine, TurnOutcome, TurnRequest,
    TurnStream,
};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "parley",
    version,
    about = "Streaming chat front-end for OpenAI-compatible endpoints"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Interactive chat session.
    Chat(ChatArgs),
    /// Send one message and stream the reply.
    Ask(AskArgs),
    /// Print the active model and limits.
    Info,
    /// Render a saved JSON transcript as a text export.
    Export(ExportArgs),
}

#[derive(Debug, Parser)]
struct ChatArgs {
    #[arg(long)]
    events: Option<PathBuf>,
    #[arg(long, default_value = ".")]
    export_dir: PathBuf,
    /// JSON transcript to resume from.
    #[arg(long)]
    history: Option<PathBuf>,
    #[arg(long, default_value_t = DEFAULT_TEMPERATURE)]
    temperature: f32,
    #[arg(long)]
    max_tokens: Option<u32>,
    /// Use the offline echo provider instead of the remote endpoint.
    #[arg(long)]
    dry_run: bool,
}

#[derive(Debug, Parser)]
struct AskArgs {
    #[arg(long)]
    prompt: String,
    #[arg(long)]
    attach: Option<PathBuf>,
    #[arg(long)]
    events: Option<PathBuf>,
    #[arg(long, default_value_t = DEFAULT_TEMPERATURE)]
    temperature: f32,
    #[arg(long)]
    max_tokens: Option<u32>,
    #[arg(long)]
    dry_run: bool,
}

#[derive(Debug, Parser)]
struct ExportArgs {
    #[arg(long)]
    history: PathBuf,
    #[arg(long)]
    out: PathBuf,
    #[arg(long, default_value = "txt")]
    format: String,
}

fn main() {
    let _ = dotenvy::dotenv();
    init_tracing();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("parley error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Chat(args) => {
            run_chat(args)?;
            Ok(0)
        }
        Command::Ask(args) => run_ask(args),
        Command::Info => {
            let config = ChatConfig::from_env()?;
            println!("{}", config.api_info());
            Ok(0)
        }
        Command::Export(args) => run_export(args),
    }
}

fn build_engine(config: ChatConfig, dry_run: bool, events: Option<PathBuf>) -> Result<ChatEngine> {
    let provider_name = if dry_run {
        "dryrun"
    } else {
        config.require_api_key()?;
        "openai"
    };
    let registry = default_provider_registry(&config);
    let provider = registry.get(provider_name);
    if provider.is_none() {
        tracing::warn!(provider = provider_name, "no completion client available");
    }

    let model = config.model.clone();
    let mut engine = ChatEngine::new(config, provider);
    if let Some(path) = events {
        let writer = EventWriter::new(path, new_session_id());
        writer
            .record(&ChatEvent::SessionStarted {
                provider: provider_name.to_string(),
                model,
            })
            .with_context(|| format!("failed to write {}", writer.path().display()))?;
        engine = engine.with_events(writer);
    }
    Ok(engine)
}

fn run_chat(args: ChatArgs) -> Result<()> {
    let config = ChatConfig::from_env()?;
    let transcript = match args.history.as_deref() {
        Some(path) => load_history(path, &config)?,
        None => Vec::new(),
    };
    let engine = build_engine(config, args.dry_run, args.events.clone())?;
    let mut session = ChatSession::new(&engine, args.export_dir.clone());
    session.transcript = transcript;
    session.temperature = ChatConfig::clamp_temperature(args.temperature);
    if let Some(max_tokens) = args.max_tokens {
        session.max_tokens = engine.config().clamp_output_tokens(max_tokens);
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut line = String::new();

    println!("Parley chat started. Type /help for commands.");
    if !session.transcript.is_empty() {
        println!("Resumed {} messages.", session.transcript.len());
    }

    loop {
        print!("> ");
        stdout.flush()?;

        line.clear();
        let read = match stdin.read_line(&mut line) {
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        if read == 0 {
            break;
        }

        let input = line.trim_end_matches(['\n', '\r']);
        if !session.handle_line(&engine, input, &mut stdout)? {
            break;
        }
    }
    Ok(())
}

fn run_ask(args: AskArgs) -> Result<i32> {
    let config = ChatConfig::from_env()?;
    let engine = build_engine(config, args.dry_run, args.events.clone())?;
    let mut request = TurnRequest::new(args.prompt.clone()).with_temperature(args.temperature);
    if let Some(max_tokens) = args.max_tokens {
        request = request.with_max_tokens(max_tokens);
    }
    if let Some(path) = args.attach.clone() {
        request = request.with_attachment(path);
    }

    let mut stream = engine.submit(request, Vec::new());
    let mut stdout = io::stdout();
    stream_reply(&mut stdout, &mut stream)?;
    match stream.outcome() {
        Some(TurnOutcome::Failed(_)) => Ok(1),
        _ => Ok(0),
    }
}

fn run_export(args: ExportArgs) -> Result<i32> {
    let Some(format) = ExportFormat::parse(&args.format) else {
        bail!("unknown export format {:?} (expected txt or json)", args.format);
    };
    let raw = fs::read_to_string(&args.history)
        .with_context(|| format!("failed to read {}", args.history.display()))?;
    let value: Value = serde_json::from_str(&raw)
        .with_context(|| format!("invalid transcript JSON in {}", args.history.display()))?;
    let messages: Vec<Message> = value
        .as_array()
        .map(|entries| entries.iter().filter_map(Message::from_value).collect())
        .unwrap_or_default();
    let path = write_export(&args.out, &messages, format, &Local::now())?;
    println!("Exported to {}", path.display());
    Ok(0)
}

/// Reads a JSON transcript and cleans it the same way history is cleaned
/// before every request.
fn load_history(path: &Path, config: &ChatConfig) -> Result<Vec<Message>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let value: Value = serde_json::from_str(&raw)
        .with_context(|| format!("invalid transcript JSON in {}", path.display()))?;
    let Some(entries) = value.as_array() else {
        bail!("{} must contain a JSON array of messages", path.display());
    };
    Ok(prepare_history_values(
        entries,
        config.max_history_length,
        config.max_message_length,
    ))
}

/// Prints each snapshot's new assistant text as it arrives.
///
/// When a snapshot rewrites the reply instead of extending it (a stream
/// failure notice, say), the new text goes on a fresh line.
fn stream_reply<W: Write>(out: &mut W, stream: &mut TurnStream<'_>) -> Result<Option<Vec<Message>>> {
    let mut printed = String::new();
    let mut last: Option<Vec<Message>> = None;
    for snapshot in stream.by_ref() {
        let body = snapshot
            .last()
            .filter(|message| message.role == Role::Assistant)
            .map(|message| strip_stamp(&message.content).to_string())
            .unwrap_or_default();
        if last.is_none() {
            write!(out, "AI: ")?;
        }
        match body.strip_prefix(printed.as_str()) {
            Some(suffix) => write!(out, "{suffix}")?,
            None => write!(out, "\n{body}")?,
        }
        out.flush()?;
        printed = body;
        last = Some(snapshot);
    }
    if last.is_some() {
        writeln!(out)?;
    }
    Ok(last)
}

/// REPL state: the transcript plus settings picked with slash commands.
struct ChatSession {
    transcript: Vec<Message>,
    attachment: Option<PathBuf>,
    temperature: f32,
    max_tokens: u32,
    export_dir: PathBuf,
}

impl ChatSession {
    fn new(engine: &ChatEngine, export_dir: PathBuf) -> Self {
        Self {
            transcript: Vec::new(),
            attachment: None,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: engine.config().default_output_tokens,
            export_dir,
        }
    }

    /// Returns `false` once the user asks to leave.
    fn handle_line<W: Write>(&mut self, engine: &ChatEngine, input: &str, out: &mut W) -> Result<bool> {
        let intent = parse_intent(input);
        match intent.action {
            IntentAction::Noop => {}
            IntentAction::Send { text } => {
                self.send(engine, &text, out)?;
            }
            IntentAction::Help => {
                writeln!(out, "Commands: {}", CHAT_HELP_COMMANDS.join(" "))?;
            }
            IntentAction::Attach { path } if path.is_empty() => {
                writeln!(out, "/attach requires a path")?;
            }
            IntentAction::Attach { path } => {
                writeln!(out, "Attached {path} (sent with the next message)")?;
                self.attachment = Some(PathBuf::from(path));
            }
            IntentAction::Detach => {
                self.attachment = None;
                writeln!(out, "Attachment cleared")?;
            }
            IntentAction::SetTemperature { value } => {
                if let Some(value) = value {
                    self.temperature = ChatConfig::clamp_temperature(value);
                }
                writeln!(out, "Temperature: {:.1}", self.temperature)?;
            }
            IntentAction::SetMaxTokens { value } => {
                if let Some(value) = value {
                    self.max_tokens = engine.config().clamp_output_tokens(value);
                }
                writeln!(out, "Max tokens: {}", self.max_tokens)?;
            }
            IntentAction::Export { format } => {
                self.export(engine, &format, out)?;
            }
            IntentAction::Copy => self.copy_last_reply(out)?,
            IntentAction::Clear => {
                self.transcript.clear();
                self.attachment = None;
                writeln!(out, "Conversation cleared")?;
            }
            IntentAction::Info => {
                writeln!(out, "{}", engine.config().api_info())?;
            }
            IntentAction::History => {
                if self.transcript.is_empty() {
                    writeln!(out, "No messages yet.")?;
                }
                for message in &self.transcript {
                    writeln!(
                        out,
                        "{}: {}",
                        message.role.export_label(),
                        strip_stamp_markup(&message.content)
                    )?;
                }
            }
            IntentAction::Quit => return Ok(false),
            IntentAction::Unknown { command, .. } => {
                writeln!(out, "Unknown command: /{command}. Type /help for commands.")?;
            }
        }
        Ok(true)
    }

    fn send<W: Write>(&mut self, engine: &ChatEngine, text: &str, out: &mut W) -> Result<TurnOutcome> {
        let mut request = TurnRequest::new(text)
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens);
        if let Some(path) = self.attachment.clone() {
            request = request.with_attachment(path);
        }

        let mut stream = engine.submit(request, self.transcript.clone());
        let last = stream_reply(out, &mut stream)?;
        let outcome = stream.outcome().cloned().unwrap_or(TurnOutcome::Completed);
        if let Some(transcript) = last {
            self.transcript = transcript;
        }
        if matches!(outcome, TurnOutcome::Completed | TurnOutcome::Truncated) {
            self.attachment = None;
        }
        Ok(outcome)
    }

    fn export<W: Write>(&self, engine: &ChatEngine, format: &str, out: &mut W) -> Result<()> {
        let Some(format) = ExportFormat::parse(format) else {
            writeln!(out, "Unknown export format {format:?} (expected txt or json)")?;
            return Ok(());
        };
        if self.transcript.is_empty() {
            writeln!(out, "Nothing to export yet.")?;
            return Ok(());
        }
        let path = write_export(&self.export_dir, &self.transcript, format, &Local::now())?;
        engine.emit(ChatEvent::TranscriptExported {
            path: path.clone(),
            format: format.extension().to_string(),
            messages: self.transcript.len(),
        });
        writeln!(out, "Exported to {}", path.display())?;
        Ok(())
    }

    fn copy_last_reply<W: Write>(&self, out: &mut W) -> Result<()> {
        let Some(reply) = last_assistant_reply(&self.transcript) else {
            writeln!(out, "No assistant reply to copy.")?;
            return Ok(());
        };
        match copy_to_clipboard(&reply) {
            Ok(()) => writeln!(out, "Copied: {}", reply_preview(&reply))?,
            Err(err) => {
                tracing::warn!("clipboard write failed: {err:#}");
                writeln!(out, "Clipboard unavailable; last reply:\n{reply}")?;
            }
        }
        Ok(())
    }
}

fn copy_to_clipboard(text: &str) -> Result<()> {
    let mut clipboard = arboard::Clipboard::new().context("failed to open the clipboard")?;
    clipboard
        .set_text(text.to_string())
        .context("failed to set clipboard text")?;
    Ok(())
}

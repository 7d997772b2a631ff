use std::io::Write;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use npvision::config::session::Session;
use npvision::gemini::{ApiKeyManager, Backend, GeminiClient, GeminiModel, ProxyClient, StreamEvent};
use npvision::orchestrator::{ActionError, Notification, Transport};
use npvision::workspace::export::{self, ImportTarget};
use npvision::workspace::{self as ws, GENERAL_NOTE, tree};
use npvision::{Config, Orchestrator, Workspace, WorkspaceStore};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "npvision")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP proxy in front of Gemini
    Serve {
        /// Port to listen on (defaults to the configured port)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Manage the Gemini API key
    Key {
        #[command(subcommand)]
        action: KeyAction,
    },
    /// Manage workspaces
    Workspace {
        #[command(subcommand)]
        action: WorkspaceAction,
    },
    /// Manage topics in the open workspace
    Topic {
        #[command(subcommand)]
        action: TopicAction,
    },
    /// Generate material for the selected topic
    Generate {
        #[command(subcommand)]
        action: GenerateAction,
        /// Stream the response and print it as it arrives
        #[arg(short, long, global = true)]
        stream: bool,
    },
    /// Apply a response obtained elsewhere to the selected topic
    Apply {
        /// File containing the raw response
        file: Option<PathBuf>,
        /// Read the response from the clipboard
        #[arg(long, conflicts_with = "file")]
        clipboard: bool,
    },
    /// Build a workspace from a syllabus
    Structure {
        /// Title used when the outline names no subject
        title: String,
        /// File containing the syllabus
        #[arg(short, long)]
        file: Option<PathBuf>,
        /// Syllabus text
        #[arg(short, long, conflicts_with = "file")]
        text: Option<String>,
    },
    /// Stream a live tutor explanation of the selected topic (Ctrl-C stops)
    Tutor,
    /// Workspace notes
    Notes {
        #[command(subcommand)]
        action: NotesAction,
    },
    /// Take the selected topic's quiz
    Quiz {
        /// Answers in question order: an option number (1-4), a letter
        /// (a-d) or `-` to skip. Prints the questions when omitted.
        answers: Vec<String>,
    },
    /// List known Gemini models
    Models,
}

#[derive(Subcommand)]
enum KeyAction {
    /// Store a key in the system keyring
    Set { key: String },
    /// Remove the stored key
    Delete,
    /// Show where the key comes from
    Status,
}

#[derive(Subcommand)]
enum WorkspaceAction {
    /// List workspaces
    List,
    /// Create a workspace with a starter hierarchy
    Create { title: String },
    /// Open a workspace
    Open { id: u64 },
    /// Delete a workspace
    Delete { id: u64 },
    /// Export the open workspace
    Export {
        /// Write a JSON document to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Write a directory tree of topic files under this directory
        #[arg(short, long, conflicts_with = "output")]
        dir: Option<PathBuf>,
    },
    /// Import a workspace JSON document
    Import { file: PathBuf },
    /// Show completion of the open workspace
    Progress,
}

#[derive(Subcommand)]
enum TopicAction {
    /// Print the topic tree
    List,
    /// Select a topic for generation
    Select { id: String },
    /// Add a topic under a unit or chapter, or a unit at the root
    Add {
        title: String,
        #[arg(short, long)]
        parent: Option<String>,
    },
    /// Rename a topic
    Rename { id: String, name: String },
    /// Delete a topic and its subtopics
    Delete { id: String },
    /// Export a topic as text
    Export {
        id: String,
        /// Directory to write into (prints to stdout when omitted)
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },
    /// Import a topic text file
    Import {
        file: PathBuf,
        /// Unit to use when the file names no known unit
        #[arg(long)]
        unit: Option<String>,
        /// Chapter to use when the file names no known chapter
        #[arg(long)]
        chapter: Option<String>,
    },
}

#[derive(Subcommand)]
enum GenerateAction {
    /// Visual and description
    Content,
    /// Multiple-choice quiz from existing content
    Quiz,
    /// Teaching context for the topic
    Context,
    /// Correct the last response
    Fix {
        /// What is wrong
        comment: String,
        /// Console errors reported by the visual
        #[arg(long, default_value = "")]
        console: String,
    },
    /// Send free-form context
    Send { context: String },
}

#[derive(Subcommand)]
enum NotesAction {
    /// Set a note (the general note by default)
    Set {
        text: String,
        #[arg(short, long, default_value = GENERAL_NOTE)]
        key: String,
    },
    /// Show notes
    Show,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "npvision=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let cli = Cli::parse();
    let config = Config::load()?;

    match cli.command {
        Commands::Serve { port } => {
            let port = port.unwrap_or(config.port);
            let addr = SocketAddr::from(([0, 0, 0, 0], port));
            let backend = backend(&config)?;
            tracing::info!("Serving with {}", backend.describe());
            npvision::server::serve(addr, backend).await?;
        }
        Commands::Key { action } => key(action)?,
        Commands::Workspace { action } => workspace(action)?,
        Commands::Topic { action } => topic(action)?,
        Commands::Notes { action } => notes(action)?,
        Commands::Generate { action, stream } => generate(&config, action, stream).await?,
        Commands::Apply { file, clipboard } => {
            let raw = if clipboard {
                arboard::Clipboard::new()
                    .and_then(|mut c| c.get_text())
                    .context("Failed to read the clipboard")?
            } else {
                let path = file.context("Pass a response file or --clipboard")?;
                read_file(&path)?
            };
            let orch = orchestrator(&config)?;
            let blocks = report(orch.apply_response(&raw).await)?;
            orch.session().await.save()?;
            println!("{}", describe_blocks(&blocks));
        }
        Commands::Structure { title, file, text } => {
            let syllabus = match (file, text) {
                (Some(path), _) => read_file(&path)?,
                (None, Some(text)) => text,
                (None, None) => bail!("Pass the syllabus with --file or --text"),
            };
            let orch = orchestrator(&config)?;
            let built = report(
                orch.create_workspace_from_syllabus(&title, &syllabus, Transport::Buffered).await,
            )?;
            orch.session().await.save()?;
            println!("Created workspace {} ({})", built.title, built.id);
            print_tree(&built);
        }
        Commands::Tutor => tutor(&config).await?,
        Commands::Quiz { answers } => quiz(&answers)?,
        Commands::Models => {
            for model in GeminiModel::all() {
                let id = model.model_id();
                let mut roles = Vec::new();
                if GeminiModel::resolve_id(&config.model) == id {
                    roles.push("buffered");
                }
                if GeminiModel::resolve_id(&config.stream_model) == id {
                    roles.push("streaming");
                }
                let roles = if roles.is_empty() { String::new() } else { format!("  ({})", roles.join(", ")) };
                println!("{:<18} {}{}", id, model.display_name(), roles);
            }
        }
    }

    Ok(())
}

/// Choose the generation backend from configuration
fn backend(config: &Config) -> Result<Backend> {
    if let Some(url) = &config.proxy_url {
        return Ok(Backend::Proxy(ProxyClient::new(url.clone())?));
    }
    let (api_key, source) = ApiKeyManager::resolve()?;
    tracing::debug!("Using API key from {}", source);
    let client = GeminiClient::new(api_key)?.with_models(&config.model, &config.stream_model);
    Ok(Backend::Direct(client))
}

fn open_store() -> Result<WorkspaceStore> {
    WorkspaceStore::open_dir(&Config::data_dir()?)
}

fn load_session() -> Session {
    Session::load().unwrap_or_else(|e| {
        tracing::warn!("Ignoring unreadable session: {:#}", e);
        Session::default()
    })
}

fn orchestrator(config: &Config) -> Result<Orchestrator<Backend>> {
    Ok(Orchestrator::new(backend(config)?, open_store()?, config.generation.clone())
        .with_session(load_session())
        .with_mirroring(config.mirror_files))
}

/// Convert an action failure into a printed notification
fn report<T>(result: Result<T, ActionError>) -> Result<T> {
    result.map_err(|e| {
        if let Some(raw) = e.raw_response() {
            tracing::debug!("Raw response:\n{}", raw);
        }
        anyhow::anyhow!(Notification::from(&e))
    })
}

fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))
}

/// Open workspace from the session, falling back to the primary one
fn current(store: &mut WorkspaceStore, session: &mut Session) -> Result<Workspace> {
    if let Some(id) = session.workspace_id {
        if let Some(found) = store.get(id)? {
            return Ok(found);
        }
    }
    let primary = store.primary()?;
    session.open_workspace(primary.id);
    Ok(primary)
}

fn key(action: KeyAction) -> Result<()> {
    match action {
        KeyAction::Set { key } => {
            ApiKeyManager::set_api_key(&key)?;
            println!("Stored {}", ApiKeyManager::mask_key(key.trim()));
        }
        KeyAction::Delete => {
            ApiKeyManager::delete_api_key()?;
            println!("API key removed");
        }
        KeyAction::Status => match ApiKeyManager::resolve() {
            Ok((key, source)) => println!("{} (from {})", ApiKeyManager::mask_key(&key), source),
            Err(e) => println!("{}", e),
        },
    }
    Ok(())
}

fn workspace(action: WorkspaceAction) -> Result<()> {
    let mut store = open_store()?;
    let mut session = load_session();

    match action {
        WorkspaceAction::List => {
            for w in store.list()? {
                let marker = if session.workspace_id == Some(w.id) { "*" } else { " " };
                let progress = tree::progress(&w.topics);
                println!("{} {:>14}  {:<40} {:>5.1}%", marker, w.id, w.title, progress);
            }
        }
        WorkspaceAction::Create { title } => {
            let created = store.create(&title)?;
            session.open_workspace(created.id);
            println!("Created workspace {} ({})", created.title, created.id);
        }
        WorkspaceAction::Open { id } => {
            let found = store.get(id)?.with_context(|| format!("Workspace {} not found", id))?;
            session.open_workspace(found.id);
            println!("Opened {}", found.title);
        }
        WorkspaceAction::Delete { id } => {
            if store.delete(id)? {
                if session.workspace_id == Some(id) {
                    session = Session::default();
                }
                println!("Deleted workspace {}", id);
            } else {
                println!("Workspace {} not found", id);
            }
        }
        WorkspaceAction::Export { output, dir } => {
            let open = current(&mut store, &mut session)?;
            match (output, dir) {
                (_, Some(dir)) => {
                    let root = export::export_directory(&open, &dir)?;
                    println!("Exported to {}", root.display());
                }
                (Some(output), None) => {
                    std::fs::write(&output, export::export_json(&open)?)
                        .with_context(|| format!("Failed to write {:?}", output))?;
                    println!("Exported to {}", output.display());
                }
                (None, None) => println!("{}", export::export_json(&open)?),
            }
        }
        WorkspaceAction::Import { file } => {
            let imported = store.import(export::import_json(&read_file(&file)?)?)?;
            session.open_workspace(imported.id);
            println!("Imported workspace {} ({})", imported.title, imported.id);
        }
        WorkspaceAction::Progress => {
            let open = current(&mut store, &mut session)?;
            println!("{}: {:.1}% ready", open.title, tree::progress(&open.topics));
        }
    }

    session.save()
}

fn topic(action: TopicAction) -> Result<()> {
    let mut store = open_store()?;
    let mut session = load_session();
    let mut open = current(&mut store, &mut session)?;

    match action {
        TopicAction::List => print_tree(&open),
        TopicAction::Select { id } => {
            let path = tree::label_path(&open.topics, &id)
                .with_context(|| format!("Topic {} not found", id))?;
            session.select(open.id, &id);
            println!("Selected {}", path);
        }
        TopicAction::Add { title, parent } => {
            let id = ws::add_topic(&mut open, parent.as_deref(), &title)?;
            store.save(&open)?;
            println!("Added {}", id);
        }
        TopicAction::Rename { id, name } => {
            if name.trim().is_empty() {
                bail!("Enter topic title");
            }
            if !tree::rename(&mut open.topics, &id, name.trim()) {
                bail!("Topic {} not found", id);
            }
            store.save(&open)?;
        }
        TopicAction::Delete { id } => {
            if !tree::remove(&mut open.topics, &id) {
                bail!("Topic {} not found", id);
            }
            if session.topic_id.as_deref() == Some(id.as_str()) {
                session.topic_id = None;
            }
            store.save(&open)?;
        }
        TopicAction::Export { id, dir } => {
            let text = export::export_topic(&open, &id)
                .with_context(|| format!("Topic {} not found", id))?;
            match dir {
                Some(dir) => {
                    let path = dir.join(text.file_name());
                    std::fs::write(&path, text.render())
                        .with_context(|| format!("Failed to write {:?}", path))?;
                    println!("Exported to {}", path.display());
                }
                None => print!("{}", text.render()),
            }
        }
        TopicAction::Import { file, unit, chapter } => {
            let stem = file.file_stem().and_then(|s| s.to_str()).unwrap_or("Imported Topic");
            let target = ImportTarget { unit_id: unit.as_deref(), chapter_id: chapter.as_deref() };
            let id = export::import_topic(&mut open, stem, &read_file(&file)?, target);
            store.save(&open)?;
            println!("Imported {}", id);
        }
    }

    session.save()
}

fn notes(action: NotesAction) -> Result<()> {
    let mut store = open_store()?;
    let mut session = load_session();
    let mut open = current(&mut store, &mut session)?;

    match action {
        NotesAction::Set { text, key } => {
            open.set_note(key, text);
            store.save(&open)?;
        }
        NotesAction::Show => {
            for (key, text) in &open.notes {
                println!("[{}]\n{}\n", key, text);
            }
        }
    }

    session.save()
}

/// Parse a quiz answer: `1`-`4`, `a`-`d` or `-` for a skipped question
fn parse_answer(answer: &str) -> Result<Option<usize>> {
    let answer = answer.trim().to_ascii_lowercase();
    if answer == "-" {
        return Ok(None);
    }
    if let Ok(n) = answer.parse::<usize>() {
        anyhow::ensure!(n >= 1, "Answers are numbered from 1");
        return Ok(Some(n - 1));
    }
    match answer.as_bytes() {
        [c @ b'a'..=b'z'] => Ok(Some(usize::from(c - b'a'))),
        _ => bail!("Unrecognized answer {:?}", answer),
    }
}

fn quiz(answers: &[String]) -> Result<()> {
    let mut store = open_store()?;
    let mut session = load_session();
    let open = current(&mut store, &mut session)?;
    let topic_id = session.topic_id.clone().context("Select a topic first")?;
    let topic = tree::find_by_id(&open.topics, &topic_id)
        .with_context(|| format!("Topic {} not found", topic_id))?;
    let quiz = topic.quiz.as_ref().context("Generate a quiz first")?;

    if answers.is_empty() {
        for (i, q) in quiz.questions.iter().enumerate() {
            println!("{}. {}", i + 1, q.question);
            for (j, option) in q.options.iter().enumerate() {
                println!("   {}) {}", char::from(b'a' + j as u8), option);
            }
        }
        return Ok(());
    }

    let answers = answers.iter().map(|a| parse_answer(a)).collect::<Result<Vec<_>>>()?;
    let max = quiz.questions.len() as i64 * 2;
    println!("Score: {} / {}", quiz.score(&answers), max);
    Ok(())
}

/// Transport for a CLI action; streamed chunks are printed as they arrive
/// and Ctrl-C cancels the stream
fn transport(stream: bool) -> (Transport, Option<tokio::task::JoinHandle<()>>) {
    if !stream {
        return (Transport::Buffered, None);
    }

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel();
        }
    });

    let (tx, mut rx) = mpsc::channel::<String>(32);
    let printer = tokio::spawn(async move {
        let mut stdout = std::io::stdout();
        while let Some(chunk) = rx.recv().await {
            print!("{}", chunk);
            let _ = stdout.flush();
        }
        println!();
    });

    (Transport::streamed_with_progress(cancel, tx), Some(printer))
}

/// Wait for the stream printer; returns `false` when it panicked or was
/// cancelled
async fn finish_printer(printer: tokio::task::JoinHandle<()>) -> bool {
    match printer.await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!("Stream printer stopped: {}", e);
            false
        }
    }
}

async fn generate(config: &Config, action: GenerateAction, stream: bool) -> Result<()> {
    let orch = orchestrator(config)?;
    let (transport, printer) = transport(stream);

    let outcome = match action {
        GenerateAction::Content => {
            orch.generate_content(transport).await.map(|blocks| describe_blocks(&blocks))
        }
        GenerateAction::Fix { comment, console } => orch
            .fix_content(&comment, &console, transport)
            .await
            .map(|blocks| describe_blocks(&blocks)),
        GenerateAction::Quiz => orch
            .generate_quiz(transport)
            .await
            .map(|quiz| format!("Stored {} questions", quiz.questions.len())),
        GenerateAction::Context => orch.generate_auto_context(transport).await,
        GenerateAction::Send { context } => orch.send_context(&context, transport).await,
    };

    if let Some(printer) = printer {
        finish_printer(printer).await;
    }
    // The raw response is kept even when parsing failed, for a later fix
    orch.session().await.save()?;

    println!("{}", Notification::info(report(outcome)?));
    Ok(())
}

async fn tutor(config: &Config) -> Result<()> {
    let orch = orchestrator(config)?;
    let mut call = report(orch.start_tutor().await)?;
    let cancel = call.cancel_token();

    let mut stdout = std::io::stdout();
    loop {
        tokio::select! {
            event = call.events.recv() => match event {
                Some(StreamEvent::Chunk { text, .. }) => {
                    print!("{}", text);
                    let _ = stdout.flush();
                }
                Some(StreamEvent::Error { message }) => {
                    eprintln!("\n{}", message);
                    break;
                }
                Some(StreamEvent::Done) | None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                cancel.cancel();
                break;
            }
        }
    }
    println!();

    match call.finish().await {
        Ok(()) | Err(npvision::gemini::GeminiError::Cancelled) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn describe_blocks(blocks: &npvision::extract::ExtractedBlocks) -> String {
    let mut parts = Vec::new();
    if let Some(kind) = &blocks.visual_type {
        parts.push(format!("visual ({})", kind));
    }
    if blocks.description.is_some() {
        parts.push("description".to_string());
    }
    if let Some(quiz) = &blocks.quiz {
        parts.push(format!("quiz ({} questions)", quiz.questions.len()));
    }
    format!("Applied {}", parts.join(", "))
}

fn print_tree(open: &Workspace) {
    println!("{} ({})", open.title, open.id);
    for node in tree::collect_all(&open.topics) {
        let depth = tree::depth_of(&open.topics, &node.id).unwrap_or(0);
        let mark = if node.is_ready() { "✓" } else { "·" };
        println!("{}{} {} [{}]", "  ".repeat(depth + 1), mark, node.name, node.id);
    }
}

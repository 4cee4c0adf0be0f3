use std::fs;
use std::io::{self, BufRead, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use cucaypy_contracts::chat::{
    parse_intent, ChatMessage, ChatTranscript, Role, CHAT_HELP_COMMANDS, QUICK_ACTIONS,
};
use cucaypy_contracts::events::EventWriter;
use cucaypy_contracts::models::{Capability, ModelSelector};
use cucaypy_contracts::project::{read_project_dir, unified_diff, DocumentStore, ProjectFile};
use cucaypy_contracts::prompts::ImageAttachment;
use cucaypy_contracts::session::{
    AnalysisCache, BlobStore, JsonFileBlobStore, ProjectSnapshot, RestoredSession,
};
use cucaypy_engine::{
    default_gateway_registry, generate_content, resolve_gateway, GatewayConfig, InferenceGateway,
    ModifyReport, SessionController,
};

const STATE_DIR: &str = ".cucaypy";
const SNAPSHOT_FILE: &str = "project_data.json";
const EVENTS_FILE: &str = "events.jsonl";

#[derive(Debug, Parser)]
#[command(name = "cucaypy", version, about = "AI-assisted editing for small web projects")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List the files of a project directory.
    Files(FilesArgs),
    /// Explain a file, reusing a cached analysis when the file is unchanged.
    Analyze(AnalyzeArgs),
    /// Rewrite a file from instructions and an optional reference image.
    Modify(ModifyArgs),
    /// Relay a bare prompt to the model.
    Generate(GenerateArgs),
    /// Interactive session over a project.
    Chat(ChatArgs),
}

#[derive(Debug, Args)]
struct ProjectArgs {
    #[arg(long, default_value = ".")]
    project: PathBuf,
    /// Defaults to `<project>/.cucaypy/events.jsonl`.
    #[arg(long)]
    events: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct GatewayArgs {
    #[arg(long, default_value = "gemini")]
    provider: String,
    #[arg(long)]
    model: Option<String>,
}

#[derive(Debug, Parser)]
struct FilesArgs {
    #[arg(long, default_value = ".")]
    project: PathBuf,
}

#[derive(Debug, Parser)]
struct AnalyzeArgs {
    #[command(flatten)]
    project: ProjectArgs,
    #[arg(long)]
    file: Option<String>,
    #[command(flatten)]
    gateway: GatewayArgs,
}

#[derive(Debug, Parser)]
struct ModifyArgs {
    #[command(flatten)]
    project: ProjectArgs,
    #[arg(long)]
    file: Option<String>,
    #[arg(long, default_value = "")]
    instructions: String,
    #[arg(long)]
    image: Option<PathBuf>,
    /// Print the diff without writing the file back.
    #[arg(long)]
    no_write: bool,
    #[command(flatten)]
    gateway: GatewayArgs,
}

#[derive(Debug, Parser)]
struct GenerateArgs {
    #[arg(long)]
    prompt: String,
    #[arg(long)]
    events: Option<PathBuf>,
    #[command(flatten)]
    gateway: GatewayArgs,
}

#[derive(Debug, Parser)]
struct ChatArgs {
    #[command(flatten)]
    project: ProjectArgs,
    /// Reopen the last active file and replay recent history.
    #[arg(long)]
    resume: bool,
    #[command(flatten)]
    gateway: GatewayArgs,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("cucaypy error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Files(args) => run_files(args),
        Command::Analyze(args) => run_analyze(args),
        Command::Modify(args) => run_modify(args),
        Command::Generate(args) => run_generate(args),
        Command::Chat(args) => run_chat(args),
    }
}

fn run_files(args: FilesArgs) -> Result<i32> {
    let files = read_project_dir(&args.project)?;
    if files.is_empty() {
        bail!("no files found in {}", args.project.display());
    }
    for file in &files {
        println!("{}", describe_file(file, false));
    }
    Ok(0)
}

fn run_analyze(args: AnalyzeArgs) -> Result<i32> {
    let (_, gateway) = build_gateway(&args.gateway)?;
    let workspace = Workspace::new(&args.project.project, args.project.events.as_deref());
    let session = workspace.open_session(gateway, false)?;
    if let Some(name) = args.file.as_deref() {
        session.select_file(name)?;
    }

    let result = session.analyze();
    session.save(&workspace.store)?;
    let report = result?;
    if report.cached {
        log::info!("{} is unchanged; using cached analysis", report.file_name);
    }
    println!("{}", report.content);
    Ok(0)
}

fn run_modify(args: ModifyArgs) -> Result<i32> {
    let image = args.image.as_deref().map(load_image).transpose()?;
    let (_, gateway) = build_gateway(&args.gateway)?;
    let workspace = Workspace::new(&args.project.project, args.project.events.as_deref());
    let session = workspace.open_session(gateway, false)?;
    if let Some(name) = args.file.as_deref() {
        session.select_file(name)?;
    }

    let result = session.modify(&args.instructions, image);
    session.save(&workspace.store)?;
    let report = result?;
    print_diff(&report);
    if !args.no_write {
        workspace.write_back(&report)?;
    }
    Ok(0)
}

fn run_generate(args: GenerateArgs) -> Result<i32> {
    let (_, gateway) = build_gateway(&args.gateway)?;
    let events = args
        .events
        .as_ref()
        .map(|path| EventWriter::new(path, uuid::Uuid::new_v4().to_string()));
    let generated = generate_content(gateway.as_ref(), &args.prompt, events.as_ref())?;
    println!("{}", serde_json::to_string(&generated)?);
    Ok(0)
}

fn run_chat(args: ChatArgs) -> Result<i32> {
    let (config, gateway) = build_gateway(&args.gateway)?;
    let workspace = Workspace::new(&args.project.project, args.project.events.as_deref());
    let mut session = workspace.open_session(gateway, args.resume)?;

    println!(
        "Cucaypy chat on {} via {}. Type /help for commands.",
        workspace.dir.display(),
        session.gateway_name()
    );
    if args.resume {
        print_history(&session.transcript()?, 10);
    }

    let result = chat_loop(
        io::stdin().lock(),
        &mut session,
        &workspace,
        config,
        &args.gateway.provider,
    );
    session.save(&workspace.store)?;
    result?;
    Ok(0)
}

/// Reads commands until end of input. Failures of a single command are
/// printed and the loop continues.
fn chat_loop<R: BufRead>(
    mut input: R,
    session: &mut SessionController,
    workspace: &Workspace,
    mut config: GatewayConfig,
    provider: &str,
) -> Result<()> {
    let mut pending_image: Option<ImageAttachment> = None;
    let mut line = String::new();
    loop {
        print!("{}> ", session.active_file()?.name);
        io::stdout().flush()?;

        line.clear();
        let read = match input.read_line(&mut line) {
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        if read == 0 {
            break;
        }

        let input = line.trim_end_matches(['\n', '\r']);
        let intent = parse_intent(input);
        if intent.action == "noop" {
            continue;
        }

        match intent.action.as_str() {
            "help" => print_help(),
            "list_files" => {
                let active = session.active_file()?.name;
                for file in session.files()? {
                    println!("{}", describe_file(&file, file.name == active));
                }
            }
            "select_file" => match intent.arg_str("path") {
                Some(name) => match session.select_file(name) {
                    Ok(view) => println!(
                        "Active file: {} (analysis: {})",
                        view.file.name,
                        view.analysis_status.as_str()
                    ),
                    Err(err) => println!("{err}"),
                },
                None => println!("/open requires a file name"),
            },
            "analyze" => match session.analyze() {
                Ok(report) => println!("{}", report.content),
                Err(err) => println!("{err}"),
            },
            "attach_image" => match intent.arg_str("path") {
                Some(path) => match load_image(Path::new(path)) {
                    Ok(image) => {
                        println!(
                            "Image attached: {path} ({}, {} bytes)",
                            image.mime_type,
                            image.bytes.len()
                        );
                        pending_image = Some(image);
                    }
                    Err(err) => println!("{err:#}"),
                },
                None => println!("/image requires a path"),
            },
            "clear_image" => {
                pending_image = None;
                println!("Image cleared.");
            }
            "status" => print_status(session, &config, pending_image.is_some())?,
            "history" => print_history(&session.transcript()?, usize::MAX),
            "set_model" => match intent.arg_str("model") {
                Some(model) => {
                    let switched = select_model(config.clone(), Some(model)).and_then(|next| {
                        let gateway =
                            resolve_gateway(&default_gateway_registry(&next), provider, &next)?;
                        Ok((next, gateway))
                    });
                    match switched {
                        Ok((next, gateway)) => {
                            session.set_gateway(gateway);
                            config = next;
                            println!("Model set to {}", config.model);
                        }
                        Err(err) => println!("{err:#}"),
                    }
                }
                None => println!("Model: {}", config.model),
            },
            "save" => match session.save(&workspace.store) {
                Ok(()) => println!("Saved {}", workspace.store.path().display()),
                Err(err) => println!("{err:#}"),
            },
            "modify" => {
                let prompt = intent.prompt.clone().unwrap_or_default();
                if let Some(quick) = intent.arg_str("quick_action") {
                    println!("Quick action: {quick}");
                }
                match session.modify(&prompt, pending_image.take()) {
                    Ok(report) => {
                        print_diff(&report);
                        if let Err(err) = workspace.write_back(&report) {
                            println!("{err:#}");
                        }
                    }
                    Err(err) => println!("{err}"),
                }
            }
            _ => println!("Unknown command: {}", intent.raw.trim()),
        }
    }
    Ok(())
}

/// Project directory plus the state files kept under `.cucaypy/`.
struct Workspace {
    dir: PathBuf,
    store: JsonFileBlobStore,
    events_path: PathBuf,
}

impl Workspace {
    fn new(dir: &Path, events: Option<&Path>) -> Self {
        let state_dir = dir.join(STATE_DIR);
        Self {
            dir: dir.to_path_buf(),
            store: JsonFileBlobStore::new(state_dir.join(SNAPSHOT_FILE)),
            events_path: events
                .map(Path::to_path_buf)
                .unwrap_or_else(|| state_dir.join(EVENTS_FILE)),
        }
    }

    /// Files come from disk. The saved snapshot contributes the chat history
    /// and any cached analysis whose file is unchanged, plus the active file
    /// when `resume` is set.
    fn open_session(
        &self,
        gateway: Arc<dyn InferenceGateway>,
        resume: bool,
    ) -> Result<SessionController> {
        let files = self.project_files()?;
        let mut documents = DocumentStore::new(files)
            .with_context(|| format!("cannot open project {}", self.dir.display()))?;

        let restored = match ProjectSnapshot::from_blob(&self.store.load()?)? {
            Some(snapshot) => {
                if resume && documents.contains(&snapshot.active_file) {
                    documents.set_active(&snapshot.active_file)?;
                }
                let mut analyses = AnalysisCache::from_entries(snapshot.analyses);
                let dropped_analyses = analyses.retain_fresh(&documents);
                RestoredSession {
                    documents,
                    analyses,
                    transcript: ChatTranscript::from_messages(snapshot.chat),
                    dropped_analyses,
                }
            }
            None => RestoredSession {
                documents,
                analyses: AnalysisCache::new(),
                transcript: ChatTranscript::new(),
                dropped_analyses: Vec::new(),
            },
        };

        let events = EventWriter::new(&self.events_path, uuid::Uuid::new_v4().to_string());
        Ok(SessionController::restore(restored, gateway).with_events(events))
    }

    /// Project files on disk, minus the event log when it lives in the project.
    fn project_files(&self) -> Result<Vec<ProjectFile>> {
        let events_path =
            fs::canonicalize(&self.events_path).unwrap_or_else(|_| self.events_path.clone());
        let mut files = read_project_dir(&self.dir)?;
        files.retain(|file| {
            let path = self.dir.join(&file.name);
            fs::canonicalize(&path).unwrap_or(path) != events_path
        });
        Ok(files)
    }

    fn write_back(&self, report: &ModifyReport) -> Result<()> {
        let path = self.dir.join(&report.file_name);
        fs::write(&path, &report.current)
            .with_context(|| format!("failed writing {}", path.display()))?;
        log::info!(
            "wrote {} (+{} -{})",
            path.display(),
            report.stats.lines_added,
            report.stats.lines_removed
        );
        Ok(())
    }
}

fn build_gateway(args: &GatewayArgs) -> Result<(GatewayConfig, Arc<dyn InferenceGateway>)> {
    let config = select_model(GatewayConfig::from_env(), args.model.as_deref())?;
    let gateway = resolve_gateway(&default_gateway_registry(&config), &args.provider, &config)?;
    log::info!("using {} gateway with model {}", gateway.name(), config.model);
    Ok((config, gateway))
}

/// Resolves the requested model, or the configured one, against the text
/// model registry.
fn select_model(config: GatewayConfig, requested: Option<&str>) -> Result<GatewayConfig> {
    let requested = requested.unwrap_or(config.model.as_str()).to_string();
    let selection = ModelSelector::default().select(Some(&requested), Capability::Text)?;
    if let Some(reason) = selection.fallback_reason.as_deref() {
        log::warn!("{reason}; using {}", selection.model.name);
    }
    Ok(config.with_model(selection.model.name))
}

fn load_image(path: &Path) -> Result<ImageAttachment> {
    let bytes = fs::read(path).with_context(|| format!("failed reading {}", path.display()))?;
    if bytes.is_empty() {
        bail!("{} is empty", path.display());
    }
    Ok(ImageAttachment::from_bytes(bytes))
}

fn describe_file(file: &ProjectFile, active: bool) -> String {
    format!(
        "{} {} ({}, {} lines)",
        if active { "*" } else { " " },
        file.name,
        file.language.as_str(),
        file.line_count()
    )
}

fn format_message(message: &ChatMessage) -> String {
    let role = match message.role {
        Role::User => "you",
        Role::Assistant => "assistant",
        Role::System => "system",
    };
    let image = if message.image.is_some() { " [image]" } else { "" };
    format!("[{role}] {}{image}", message.content)
}

fn print_history(messages: &[ChatMessage], limit: usize) {
    if messages.is_empty() {
        println!("No messages yet.");
        return;
    }
    let start = messages.len().saturating_sub(limit);
    for message in &messages[start..] {
        println!("{}", format_message(message));
    }
}

fn print_diff(report: &ModifyReport) {
    if report.stats.is_unchanged() {
        println!("No changes to {}.", report.file_name);
        return;
    }
    print!(
        "{}",
        unified_diff(&report.file_name, &report.previous, &report.current)
    );
    println!("I've updated {} based on your request.", report.file_name);
}

fn print_status(session: &SessionController, config: &GatewayConfig, has_image: bool) -> Result<()> {
    let view = session.active_view()?;
    println!("Gateway: {} ({})", session.gateway_name(), config.model);
    println!(
        "Active file: {} ({} lines)",
        view.file.name,
        view.file.line_count()
    );
    println!("Analysis: {}", view.analysis_status.as_str());
    println!("Builder: {}", view.builder_status.as_str());
    println!("Pending image: {}", if has_image { "yes" } else { "no" });
    Ok(())
}

fn print_help() {
    println!("Commands: {}", CHAT_HELP_COMMANDS.join(" "));
    for action in QUICK_ACTIONS {
        println!("  /{:<12} {}", action.command, action.label);
    }
    println!("Any other text is an edit request for the active file.");
}

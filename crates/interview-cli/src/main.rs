//! Interview CLI
//!
//! Runs one adaptive technical interview in the terminal, optionally serving
//! the HTTP/WebSocket API alongside, and writes the transcript when done.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use interview_engine::{
    create_router, AppState, ConfidenceFeed, Config, Difficulty, EventBroadcaster, GeminiBackend,
    InterviewConfig, JsonFileStore, ResilientClient, RetryPolicy, SessionActor, SessionEvent, SessionHandle,
    SessionSnapshot, SessionStatus, UserId,
};
use interview_report::{json::JsonGenerator, MarkdownGenerator, Transcript};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

/// Default port for the HTTP API server.
const DEFAULT_PORT: u16 = 3000;

/// Default interview length in minutes.
const DEFAULT_DURATION_MINUTES: u32 = 15;

/// Typed on its own line to finish early.
const END_COMMAND: &str = "/end";

/// Adaptive Interview - AI-driven technical interview practice
///
/// Asks questions about a chosen domain, evaluates each answer, and adapts the
/// next question to the conversation so far.
#[derive(Parser, Debug)]
#[command(name = "interview")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (default: interview.json in current directory)
    #[arg(short, long, value_name = "FILE")]
    config: Option<String>,

    /// Output directory for transcripts
    #[arg(short, long, value_name = "DIR")]
    output_dir: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long)]
    verbose: bool,

    /// Port for the HTTP API server
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Serve the HTTP/WebSocket API instead of prompting in the terminal
    #[arg(long)]
    serve: bool,

    /// Difficulty: beginner, intermediate or advanced
    #[arg(long, value_name = "LEVEL")]
    difficulty: Option<Difficulty>,

    /// Interview domain, e.g. "Web Development"
    #[arg(long, value_name = "DOMAIN")]
    domain: Option<String>,

    /// Interview length in minutes
    #[arg(long, value_name = "MINUTES")]
    duration: Option<u32>,

    /// Id recorded with the interview
    #[arg(long, value_name = "ID")]
    user: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if args.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Interview starting");
    tracing::debug!(config = ?args.config, "Config file");

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(1)
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(ref output_dir) = args.output_dir {
        config.output_dir.clone_from(output_dir);
    }
    config.validate()?;

    let interview = interview_config(&args)?;
    if interview.is_none() && !args.serve {
        anyhow::bail!(
            "No interview domain given\n\nSuggestion: Pass --domain \"Web Development\" or use --serve to configure over HTTP"
        );
    }

    let backend = GeminiBackend::from_config(&config)?;
    let client = ResilientClient::with_policy(Arc::new(backend), RetryPolicy::from(&config.retry));
    let store = Arc::new(JsonFileStore::new(&config.store_dir));
    let user_id = args.user.clone().map_or_else(UserId::default, UserId::new);

    let events = EventBroadcaster::default();
    let session = SessionActor::new(client, store, user_id)
        .with_events(events.clone())
        .spawn();
    let printer = tokio::spawn(print_events(session.clone()));

    if let Some(interview) = interview {
        session.configure(interview).await?;
    }

    let final_snapshot = if args.serve {
        serve(&session, events, &config, args.port).await?
    } else {
        run_terminal(&session).await?
    };

    printer.abort();
    print_summary(&final_snapshot);
    write_transcripts(&final_snapshot, Path::new(&config.output_dir))?;

    Ok(())
}

/// Builds the interview configuration from flags, if a domain was given.
fn interview_config(args: &Args) -> anyhow::Result<Option<InterviewConfig>> {
    let Some(domain) = args.domain.as_deref() else {
        return Ok(None);
    };
    let config = InterviewConfig::new(
        args.difficulty.unwrap_or(Difficulty::Intermediate),
        domain,
        args.duration.unwrap_or(DEFAULT_DURATION_MINUTES),
    );
    config.validate()?;
    Ok(Some(config))
}

/// Serves the API until the interview ends or Ctrl+C.
async fn serve(
    session: &SessionHandle,
    events: EventBroadcaster,
    config: &Config,
    port: u16,
) -> anyhow::Result<SessionSnapshot> {
    let confidence = Arc::new(ConfidenceFeed::from_config(&config.confidence).with_events(events));
    let router = create_router(AppState::new(session.clone(), confidence));

    let addr: SocketAddr = ([127, 0, 0, 1], port).into();
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        anyhow::anyhow!(
            "Failed to bind to {addr}: {e}\n\nSuggestion: Try a different port with --port"
        )
    })?;

    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            tracing::error!(error = %e, "HTTP server error");
        }
    });

    println!("API server running on http://{addr} (events at ws://{addr}/ws)");
    println!("Press Ctrl+C to stop");

    let snapshot = tokio::select! {
        ended = session.wait_until_ended() => ended?,
        Ok(()) = tokio::signal::ctrl_c() => {
            tracing::info!("Received Ctrl+C, shutting down");
            end_if_running(session).await?
        }
    };

    server.abort();
    Ok(snapshot)
}

/// Runs the interview interactively on stdin/stdout.
async fn run_terminal(session: &SessionHandle) -> anyhow::Result<SessionSnapshot> {
    println!("Preparing your first question...");
    let snapshot = session.start().await?;
    print_question(&snapshot);
    println!("(Type your answer on one line and press Enter. Type {END_COMMAND} to finish.)");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            ended = session.wait_until_ended() => {
                println!();
                println!("Time is up.");
                return Ok(ended?);
            }
            Ok(()) = tokio::signal::ctrl_c() => {
                tracing::info!("Received Ctrl+C, ending interview");
                return end_if_running(session).await;
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    return end_if_running(session).await;
                };
                if let Some(snapshot) = handle_line(session, line.trim()).await? {
                    return Ok(snapshot);
                }
            }
        }
    }
}

/// Applies one line of input. Returns the final snapshot once the
/// interview is over.
async fn handle_line(
    session: &SessionHandle,
    line: &str,
) -> anyhow::Result<Option<SessionSnapshot>> {
    if line.is_empty() {
        return Ok(None);
    }
    if line == END_COMMAND {
        return end_if_running(session).await.map(Some);
    }

    session.set_answer(line).await?;
    println!("Evaluating...");

    match session.submit_answer().await {
        Ok(snapshot) => {
            if let Some(turn) = snapshot.history.last() {
                println!();
                println!("Feedback ({}/10): {}", turn.score, turn.feedback);
            }
            if snapshot.status.is_terminal() {
                return Ok(Some(snapshot));
            }
            print_question(&snapshot);
            Ok(None)
        }
        Err(e) if e.is_fatal() => Err(e.into()),
        Err(e) => {
            eprintln!("{}", e.user_message());
            println!("Your answer was kept. Press Enter on an empty line to skip, or answer again.");
            Ok(None)
        }
    }
}

async fn end_if_running(session: &SessionHandle) -> anyhow::Result<SessionSnapshot> {
    let snapshot = session.snapshot();
    if snapshot.status.is_running() {
        return Ok(session.end().await?);
    }
    Ok(snapshot)
}

/// Mirrors out-of-band events on stderr.
async fn print_events(session: SessionHandle) {
    let mut events = session.subscribe();
    loop {
        match events.recv().await {
            Ok(SessionEvent::Retry(retry)) => eprintln!(
                "The interviewer is busy, retrying in {}s (attempt {})...",
                retry.delay_ms / 1000,
                retry.attempt + 1
            ),
            Ok(SessionEvent::Tick(tick)) if tick.remaining_seconds > 0 && tick.remaining_seconds % 60 == 0 => {
                eprintln!("[{} min left]", tick.remaining_seconds / 60);
            }
            Ok(SessionEvent::StatusChanged(change)) => {
                tracing::debug!(from = %change.from, to = %change.to, "Status changed");
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "Event printer lagged");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

/// Loads configuration from the specified path or default location.
fn load_config(config_path: Option<&str>) -> anyhow::Result<Config> {
    match config_path {
        Some(path_str) => {
            let path = Path::new(path_str);
            if !path.exists() {
                anyhow::bail!(
                    "Config file not found: '{}'\n\nSuggestion: Check the path or remove the --config flag to use defaults",
                    path.display()
                );
            }
            Config::load_from_file(path).map_err(|e| anyhow::anyhow!("{e}"))
        }
        None => Config::load().map_err(|e| anyhow::anyhow!("{e}")),
    }
}

fn print_question(snapshot: &SessionSnapshot) {
    println!();
    println!(
        "Question {} ({}:{:02} left):",
        snapshot.question_number,
        snapshot.remaining_seconds / 60,
        snapshot.remaining_seconds % 60
    );
    println!("{}", snapshot.current_question);
    print!("> ");
    let _ = std::io::Write::flush(&mut std::io::stdout());
}

fn print_summary(snapshot: &SessionSnapshot) {
    println!();
    println!("=== Interview Summary ===");
    println!("Status: {}", snapshot.status);
    println!("Questions answered: {}", snapshot.history.len());
    match snapshot.average_score {
        Some(avg) => println!("Average score: {avg:.1}/10"),
        None => println!("Average score: -"),
    }
    if let Some(error) = &snapshot.last_error {
        println!("Last error: {error}");
    }
}

/// Writes Markdown and JSON transcripts into `output_dir`.
fn write_transcripts(snapshot: &SessionSnapshot, output_dir: &Path) -> anyhow::Result<()> {
    if snapshot.status == SessionStatus::Unconfigured && snapshot.history.is_empty() {
        tracing::info!("Interview never started, no transcript written");
        return Ok(());
    }

    let transcript = Transcript::from_snapshot(snapshot);
    std::fs::create_dir_all(output_dir)?;

    let md_path: PathBuf = output_dir.join(format!("{}.md", transcript.file_stem()));
    std::fs::write(&md_path, MarkdownGenerator::new(&transcript).generate())?;
    println!("  Markdown transcript: {}", md_path.display());

    let json_path = output_dir.join(format!("{}.json", transcript.file_stem()));
    JsonGenerator::new(&transcript).write_to_file(&json_path, true)?;
    println!("  JSON transcript: {}", json_path.display());

    Ok(())
}

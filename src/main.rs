use std::fs::OpenOptions;
use std::io::{self, BufWriter, IsTerminal};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Mutex;

use anyhow::Result;
use chrono::Utc;
use clap::{Args as ClapArgs, Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use lokicli_logs::{
    ContextRequest, Highlighter, Presenter, QuerySpec, RetrievalPlan, retrieve, validate_request,
};
use lokicli_types::LokiError;
use lokicli_types::time::UtcRange;

mod config;
mod session;

use config::{Config, StatePaths};
use session::Session;

/// Loki CLI - query app logs behind an OAuth2 proxy
#[derive(Parser, Debug)]
#[command(name = "lokicli")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Login to the current or given project
    Login {
        /// Project to log into (also becomes the current project)
        #[arg(short, long)]
        project: Option<String>,
    },

    /// Set the project in which your app is present
    Set {
        #[arg(short, long)]
        project: String,
    },

    /// List all supported projects
    Projects,

    /// List apps that have logged in a time range [default = last 1 hour]
    Apps {
        #[command(flatten)]
        range: RangeArgs,

        #[arg(short, long)]
        project: Option<String>,
    },

    /// Get logs for an app in a time range [default = last 1 hour]
    Logs(LogsArgs),

    /// Show the CLI version
    Version,
}

#[derive(ClapArgs, Debug)]
struct RangeArgs {
    /// From date and time, eg: 2024-01-22T10:30:00Z
    #[arg(short = 'f', long = "from_time", alias = "from-time")]
    from_time: Option<String>,

    /// To date and time, eg: 2024-01-22T12:30:00Z
    #[arg(short = 't', long = "to_time", alias = "to-time")]
    to_time: Option<String>,

    /// Since, eg: 30m, 1h, 24h
    #[arg(short, long, default_value = "1h")]
    since: String,
}

#[derive(ClapArgs, Debug)]
struct LogsArgs {
    /// App name to retrieve logs for, eg: metro-default-prod
    #[arg(short, long)]
    app: String,

    /// Maximum number of lines to fetch (max 500000) [default from config]
    #[arg(short, long)]
    limit: Option<usize>,

    #[command(flatten)]
    range: RangeArgs,

    /// Regex filter (RE2 syntax)
    #[arg(short, long)]
    query: Option<String>,

    #[arg(short, long)]
    project: Option<String>,

    /// Show lines that do not match the query
    #[arg(short, long)]
    invert_match: bool,

    /// Lines of context before and after each match
    #[arg(short, long)]
    context: Option<usize>,

    /// Lines of context before each match
    #[arg(short, long)]
    older_context: Option<usize>,

    /// Lines of context after each match
    #[arg(short, long)]
    newer_context: Option<usize>,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let paths = match config::home_dir() {
        Ok(dir) => StatePaths::new(dir),
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    init_tracing(&paths.log_file());

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: Failed to start the async runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let cancel = CancellationToken::new();
    let result = block_on_detached(runtime, async {
        let interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                interrupt.cancel();
            }
        });
        run(args, paths, cancel).await
    });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if is_cancelled(&e) => {
            eprintln!("\nExiting...");
            ExitCode::from(130)
        }
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Run `future` to completion, then shut the runtime down without waiting
/// on blocking tasks. A terminal prompt abandoned by Ctrl-C would otherwise
/// hold the process until the user pressed Enter.
fn block_on_detached<F: Future>(runtime: tokio::runtime::Runtime, future: F) -> F::Output {
    let output = runtime.block_on(future);
    runtime.shutdown_background();
    output
}

/// Log to the append-only file so stdout carries nothing but log lines
fn init_tracing(log_file: &Path) {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::INFO.into());

    let file = log_file
        .parent()
        .map(std::fs::create_dir_all)
        .transpose()
        .and_then(|_| OpenOptions::new().create(true).append(true).open(log_file));

    match file {
        Ok(file) => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .init(),
        Err(_) => tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::from_default_env()
                    .add_directive(tracing::Level::WARN.into()),
            )
            .with_writer(io::stderr)
            .init(),
    }
}

fn is_cancelled(error: &anyhow::Error) -> bool {
    error
        .downcast_ref::<LokiError>()
        .is_some_and(LokiError::is_cancelled)
}

async fn run(args: Args, paths: StatePaths, cancel: CancellationToken) -> Result<()> {
    let config = Config::load(paths.dir())?;
    let mut session = Session::open(config, paths, cancel)?;

    match args.command {
        Command::Login { project } => {
            session.select(project.as_deref())?;
            session.login().await?;
        }
        Command::Set { project } => {
            session.set_project(&project)?;
        }
        Command::Projects => {
            for project in &session.config().projects {
                if Some(project.as_str()) == session.current_project() {
                    println!("{} (currently set)", project);
                } else {
                    println!("{}", project);
                }
            }
        }
        Command::Apps { range, project } => {
            let range = resolve_range(&range)?;
            session.select(project.as_deref())?;
            let token = session.login().await?;
            let client = session.client(&token)?;
            for name in session.catalog(&client, &range).await?.names() {
                println!("{}", name);
            }
        }
        Command::Logs(logs) => get_logs(&mut session, logs).await?,
        Command::Version => {
            println!("{}", version_line());
        }
    }

    Ok(())
}

fn version_line() -> String {
    format!("Loki CLI v{}", env!("CARGO_PKG_VERSION"))
}

fn resolve_range(range: &RangeArgs) -> Result<UtcRange> {
    Ok(UtcRange::resolve(
        range.from_time.as_deref(),
        range.to_time.as_deref(),
        &range.since,
        Utc::now(),
    )?)
}

async fn get_logs(session: &mut Session, args: LogsArgs) -> Result<()> {
    let context = ContextRequest::normalize(
        args.context.unwrap_or(0),
        args.older_context.unwrap_or(0),
        args.newer_context.unwrap_or(0),
    );
    let limit = args
        .limit
        .unwrap_or(session.config().log_reader.default_limit);

    // Fail fast, before any login or network round trip
    validate_request(limit, args.query.as_deref(), context)?;
    let range = resolve_range(&args.range)?;
    let window = range.window()?;

    let project = session.select(args.project.as_deref())?;
    let token = session.login().await?;
    let client = session.client(&token)?;
    let app = session
        .catalog(&client, &range)
        .await?
        .resolve(&args.app, &project)?
        .clone();

    let plan = RetrievalPlan {
        query: QuerySpec::new(app, args.query.clone(), args.invert_match),
        window,
        limit,
        batch_size: session.config().log_reader.batch_size,
        context,
    };

    let stdout = io::stdout();
    let highlighter = if stdout.is_terminal() {
        Highlighter::new(args.query.as_deref())
    } else {
        Highlighter::disabled()
    };
    let mut presenter = Presenter::new(BufWriter::new(stdout), highlighter);

    let summary = retrieve(&client, &plan, &mut presenter).await?;
    tracing::info!(
        app = %args.app,
        project = %project,
        lines = presenter.lines_written(),
        groups = summary.groups,
        "logs printed"
    );
    Ok(())
}

#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use pairwise_prioritizer::engine::{pairs, Progress};
use pairwise_prioritizer::{
    load_config_from_path, JsonlTraceSink, PrioritizerConfig, SessionDriver, SessionKey,
    SessionState, SqliteSessionStore, Stage, StageEvent, TraceWorker,
};

#[derive(Parser)]
#[command(name = "prioritize", version, about = "Forced-choice pairwise prioritization")]
struct Cli {
    /// JSON config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite session store (default: .prioritizer_sessions.sqlite)
    #[arg(long, global = true, env = "PRIORITIZER_STORE_PATH")]
    store: Option<PathBuf>,

    /// Universe file: JSON array or one item per line (default: built-in values)
    #[arg(long, global = true)]
    universe: Option<PathBuf>,

    #[arg(long, global = true)]
    selection_cap: Option<usize>,

    #[arg(long, global = true)]
    reduction_cap: Option<usize>,

    /// Append every action to this JSONL file
    #[arg(long, global = true)]
    trace: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args, Clone)]
struct SessionArgs {
    #[arg(long)]
    actor: String,
    /// Method name (default from config, else "values")
    #[arg(long)]
    method: Option<String>,
    #[arg(long)]
    group: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage registered methods
    Method {
        #[command(subcommand)]
        command: MethodCommands,
    },
    /// Print the candidate universe
    Universe,
    /// Show a session: stage, progress, and persisted state
    Show {
        #[command(flatten)]
        session: SessionArgs,
    },
    /// Toggle items in the shortlist
    Select {
        #[command(flatten)]
        session: SessionArgs,
        #[arg(required = true)]
        items: Vec<String>,
    },
    /// Toggle items in the final set
    Reduce {
        #[command(flatten)]
        session: SessionArgs,
        #[arg(required = true)]
        items: Vec<String>,
    },
    /// Advance to the next stage
    Advance {
        #[command(flatten)]
        session: SessionArgs,
    },
    /// List the comparison pairs of the final set
    Pairs {
        #[command(flatten)]
        session: SessionArgs,
        /// Only pairs without a recorded winner
        #[arg(long)]
        pending: bool,
    },
    /// Record the winner of one pair
    Choose {
        #[command(flatten)]
        session: SessionArgs,
        item_a: String,
        item_b: String,
        winner: String,
    },
    /// Score the completed matrix and store the ranking
    Finish {
        #[command(flatten)]
        session: SessionArgs,
    },
    /// List all sessions of an actor
    Sessions {
        #[arg(long)]
        actor: String,
    },
    /// Write the persisted session blob to a file
    Export {
        #[command(flatten)]
        session: SessionArgs,
        #[arg(long)]
        out: PathBuf,
    },
}

#[derive(Subcommand)]
enum MethodCommands {
    Register {
        name: String,
        #[arg(long)]
        description: Option<String>,
    },
    List,
}

#[derive(Serialize)]
struct SessionView {
    key: SessionKey,
    stage: Stage,
    progress: Progress,
    last_updated: Option<i64>,
    pending_pairs: Vec<(String, String)>,
    state: SessionState,
}

#[derive(Serialize)]
struct SessionListRow {
    key: SessionKey,
    stage: Stage,
    updated_at: i64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => load_config_from_path(path)?,
        None => PrioritizerConfig::default(),
    };
    if cli.store.is_some() {
        config.store_path = cli.store.clone();
    }
    if cli.universe.is_some() {
        config.universe_path = cli.universe.clone();
    }
    if cli.selection_cap.is_some() {
        config.selection_cap = cli.selection_cap;
    }
    if cli.reduction_cap.is_some() {
        config.reduction_cap = cli.reduction_cap;
    }

    let store = SqliteSessionStore::new(config.store_path())?;

    match cli.command {
        Commands::Method { command } => match command {
            MethodCommands::Register { name, description } => {
                let _lock = store.lock_exclusive()?;
                store.register_method(&name, description.as_deref()).await?;
                println!("registered method {name}");
            }
            MethodCommands::List => {
                for method in store.list_methods().await? {
                    match method.description {
                        Some(description) => println!("{}\t{description}", method.name),
                        None => println!("{}", method.name),
                    }
                }
            }
        },
        Commands::Universe => {
            let (universe, _) = config.resolve()?;
            for item in universe.items() {
                println!("{item}");
            }
        }
        Commands::Show { session } => {
            let (driver, worker) = open_driver(&store, &config, &session, cli.trace).await?;
            print_json(&session_view(&driver).await)?;
            finish_trace(driver, worker)?;
        }
        Commands::Select { session, items } => {
            let _lock = store.lock_exclusive()?;
            let (driver, worker) = open_driver(&store, &config, &session, cli.trace).await?;
            rewind_to(&driver, Stage::Selecting).await?;
            let mut events = Vec::new();
            let mut failed = None;
            for item in &items {
                match driver.toggle_selection(item).await {
                    Ok(event) => events.push(event),
                    Err(e) => {
                        failed = Some(e);
                        break;
                    }
                }
            }
            // Keep the toggles that went through even when a later one is refused.
            driver.save().await?;
            print_json(&events)?;
            finish_trace(driver, worker)?;
            if let Some(e) = failed {
                return Err(e.into());
            }
        }
        Commands::Reduce { session, items } => {
            let _lock = store.lock_exclusive()?;
            let (driver, worker) = open_driver(&store, &config, &session, cli.trace).await?;
            rewind_to(&driver, Stage::Reducing).await?;
            let mut events = Vec::new();
            let mut failed = None;
            for item in &items {
                match driver.toggle_final(item).await {
                    Ok(event) => events.push(event),
                    Err(e) => {
                        failed = Some(e);
                        break;
                    }
                }
            }
            // Keep the toggles that went through even when a later one is refused.
            driver.save().await?;
            print_json(&events)?;
            finish_trace(driver, worker)?;
            if let Some(e) = failed {
                return Err(e.into());
            }
        }
        Commands::Advance { session } => {
            let _lock = store.lock_exclusive()?;
            let (driver, worker) = open_driver(&store, &config, &session, cli.trace).await?;
            let event = driver.advance().await?;
            print_json(&event)?;
            finish_trace(driver, worker)?;
        }
        Commands::Pairs { session, pending } => {
            let (driver, worker) = open_driver(&store, &config, &session, cli.trace).await?;
            let current = driver.session().await;
            let list = if pending {
                current.pending_pairs()
            } else {
                pairs(&current.final_set)
            };
            print_json(&list)?;
            finish_trace(driver, worker)?;
        }
        Commands::Choose {
            session,
            item_a,
            item_b,
            winner,
        } => {
            let _lock = store.lock_exclusive()?;
            let (driver, worker) = open_driver(&store, &config, &session, cli.trace).await?;
            let event = driver.record_choice(&item_a, &item_b, &winner).await?;
            if !event.requires_save() {
                driver.save().await?;
            }
            print_json(&event)?;
            finish_trace(driver, worker)?;
        }
        Commands::Finish { session } => {
            let _lock = store.lock_exclusive()?;
            let (driver, worker) = open_driver(&store, &config, &session, cli.trace).await?;
            let stage = driver.stage().await;
            if stage != Stage::Comparing {
                finish_trace(driver, worker)?;
                return Err(
                    format!("finish requires the comparing stage, session is {stage}").into(),
                );
            }
            let event = driver.advance().await?;
            if let StageEvent::Completed { ranking } = &event {
                print_json(ranking)?;
            }
            finish_trace(driver, worker)?;
        }
        Commands::Sessions { actor } => {
            let caps = config.caps();
            let mut rows = Vec::new();
            for summary in store.list_sessions(&actor).await? {
                let stage = match summary.state.to_session() {
                    Ok(session) => session.infer_stage(caps),
                    Err(e) => {
                        tracing::warn!(
                            session = %summary.key,
                            error = %e,
                            "skipping corrupt session"
                        );
                        continue;
                    }
                };
                rows.push(SessionListRow {
                    key: summary.key,
                    stage,
                    updated_at: summary.updated_at,
                });
            }
            print_json(&rows)?;
        }
        Commands::Export { session, out } => {
            let key = session_key(&config, &session);
            let stored = store
                .get(&key)
                .await?
                .ok_or_else(|| format!("no session for {key}"))?;
            let json = serde_json::to_string_pretty(&stored.state)?;
            std::fs::write(&out, json)?;
        }
    }

    Ok(())
}

fn session_key(config: &PrioritizerConfig, args: &SessionArgs) -> SessionKey {
    let method = args
        .method
        .clone()
        .unwrap_or_else(|| config.method().to_string());
    let key = SessionKey::new(args.actor.clone(), method);
    match &args.group {
        Some(group) => key.with_group(group.clone()),
        None => key,
    }
}

async fn open_driver(
    store: &SqliteSessionStore,
    config: &PrioritizerConfig,
    args: &SessionArgs,
    trace: Option<PathBuf>,
) -> Result<(SessionDriver, Option<TraceWorker>), Box<dyn std::error::Error>> {
    let (universe, caps) = config.resolve()?;
    let key = session_key(config, args);
    let driver = SessionDriver::open(Arc::new(store.clone()), key, universe, caps).await?;
    match trace {
        Some(path) => {
            let (sink, worker) = JsonlTraceSink::open(path)?;
            Ok((driver.with_trace(Arc::new(sink)), Some(worker)))
        }
        None => Ok((driver, None)),
    }
}

/// Step back until the session is at `target`. A completed session cannot be reopened.
async fn rewind_to(
    driver: &SessionDriver,
    target: Stage,
) -> Result<(), Box<dyn std::error::Error>> {
    while stage_rank(driver.stage().await) > stage_rank(target) {
        driver.go_back().await?;
    }
    let stage = driver.stage().await;
    if stage != target {
        return Err(format!("session is {stage}; {target} is not reachable yet").into());
    }
    Ok(())
}

fn stage_rank(stage: Stage) -> u8 {
    match stage {
        Stage::Selecting => 0,
        Stage::Reducing => 1,
        Stage::Comparing => 2,
        Stage::Complete => 3,
    }
}

fn finish_trace(
    driver: SessionDriver,
    worker: Option<TraceWorker>,
) -> Result<(), Box<dyn std::error::Error>> {
    drop(driver);
    if let Some(worker) = worker {
        worker.join()?;
    }
    Ok(())
}

async fn session_view(driver: &SessionDriver) -> SessionView {
    let workflow = driver.workflow().await;
    let session = workflow.session();
    SessionView {
        key: driver.key().clone(),
        stage: workflow.stage(),
        progress: session.progress(workflow.caps()),
        last_updated: session.last_updated,
        pending_pairs: session.pending_pairs(),
        state: SessionState::from_session(session),
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

//! Entry point: a `serve` subcommand that runs the HTTP surface, plus a thin
//! CLI wrapper over the same orchestrator for scripting and CI use. Grounded
//! on `waypoint-cli/src/main.rs`'s `clap::Parser`/`Subcommand` structure,
//! its logging setup, and its `exit_code` match — narrowed to spec §6's four
//! exit codes (0 success, 1 validation failed, 2 startup failed, 3 partial).

mod callback_loader;
mod config;
mod dispatcher_tokio;
mod error;
mod executor_pg;
mod http;
mod store_redis;

use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use fleet_migrate_core::executor::ScriptExecutor;
use fleet_migrate_core::model::{Mode, Status, TenantSpec};
use fleet_migrate_core::orchestrator::{Orchestrator, StartJobRequest, StartOutcome};

use config::{AppConfig, CliOverrides};
use dispatcher_tokio::TokioDispatcher;
use error::ServerError;
use executor_pg::PgScriptExecutor;
use store_redis::RedisStateStore;

#[derive(Parser)]
#[command(name = "fleet-migrate-server", about = "Tenant migration job orchestrator", propagate_version = true)]
struct Cli {
    /// Config file path (defaults to ./fleet-migrate.toml if present)
    #[arg(short, long, value_name = "PATH", global = true)]
    config: Option<String>,

    /// State store connection URL (overrides REDIS_URL and the config file)
    #[arg(long, value_name = "URL", global = true)]
    redis_url: Option<String>,

    /// Path to a callback plugin (overrides SIMPLY_MIGRATE_CALLBACK_FILE)
    #[arg(long, value_name = "PATH", global = true)]
    callback_file: Option<String>,

    /// Enable verbose/debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP surface (default if no subcommand is given)
    Serve {
        /// Bind address, e.g. 0.0.0.0:8080
        #[arg(long, value_name = "ADDR")]
        bind: Option<String>,
    },
    /// Validate a migrations directory without creating a job
    Validate {
        /// Directory of .sql scripts
        dir: PathBuf,
        /// Emit the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Start a job and wait for it to reach a terminal state
    Migrate {
        /// Directory of .sql scripts
        #[arg(long, value_name = "PATH")]
        dir: PathBuf,
        /// JSON file containing an array of tenant specs
        #[arg(long, value_name = "PATH")]
        tenants_file: PathBuf,
        /// dry_run (default), apply, or validate_only
        #[arg(long, default_value = "dry_run")]
        mode: String,
        /// Run tenants one after another instead of concurrently
        #[arg(long)]
        sequential: bool,
        #[arg(long)]
        job_name: Option<String>,
        /// Emit the final job record as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print a job's current status
    Status {
        job_id: String,
        #[arg(long)]
        json: bool,
    },
    /// List recent jobs
    List {
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
    /// Delete a job record
    Delete { job_id: String },
}

type AppOrchestrator = Orchestrator<RedisStateStore, TokioDispatcher>;

async fn build_orchestrator(config: &AppConfig) -> Result<(AppOrchestrator, Option<callback_loader::CallbackPlugin>), ServerError> {
    let (registry, plugin) = callback_loader::load(config.callback_file.as_deref())?;
    let store = RedisStateStore::connect(&config.redis_url, config.job_ttl_secs).await?;
    let dispatcher = TokioDispatcher::new();
    let executor: Arc<dyn ScriptExecutor> = Arc::new(PgScriptExecutor::new());
    let orchestrator = Orchestrator::new(
        registry,
        Arc::new(store),
        Arc::new(dispatcher),
        executor,
        Duration::from_secs(config.soft_deadline_secs),
    );
    Ok((orchestrator, plugin))
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::new()
        .parse_env(env_logger::Env::default().default_filter_or(filter))
        .format_target(false)
        .format_timestamp(None)
        .init();

    if let Err(e) = run(cli).await {
        log::error!("{}", e);
        process::exit(error::exit_code(&e));
    }
}

async fn run(cli: Cli) -> Result<(), ServerError> {
    let overrides = CliOverrides {
        redis_url: cli.redis_url.clone(),
        callback_file: cli.callback_file.clone(),
        bind_addr: None,
    };
    let mut config = AppConfig::load(cli.config.as_deref(), &overrides)?;

    match cli.command.unwrap_or(Command::Serve { bind: None }) {
        Command::Serve { bind } => {
            if let Some(bind) = bind {
                config.bind_addr = bind;
            }
            serve(config).await
        }
        Command::Validate { dir, json } => cmd_validate(config, dir, json).await,
        Command::Migrate {
            dir,
            tenants_file,
            mode,
            sequential,
            job_name,
            json,
        } => cmd_migrate(config, dir, tenants_file, mode, sequential, job_name, json).await,
        Command::Status { job_id, json } => cmd_status(config, job_id, json).await,
        Command::List { limit } => cmd_list(config, limit).await,
        Command::Delete { job_id } => cmd_delete(config, job_id).await,
    }
}

async fn serve(config: AppConfig) -> Result<(), ServerError> {
    let bind_addr = config.bind_addr.clone();
    let default_list_limit = config.default_list_limit;
    let (orchestrator, _plugin) = build_orchestrator(&config).await?;

    let state = http::AppState {
        orchestrator: Arc::new(orchestrator),
        default_list_limit,
    };
    let app = http::router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| ServerError::Config(format!("failed to bind {}: {}", bind_addr, e)))?;
    log::info!("fleet-migrate-server listening on {}", bind_addr);

    axum::serve(listener, app)
        .await
        .map_err(|e| ServerError::Config(e.to_string()))?;
    Ok(())
}

async fn cmd_validate(config: AppConfig, dir: PathBuf, json: bool) -> Result<(), ServerError> {
    let (orchestrator, _plugin) = build_orchestrator(&config).await?;
    let report = orchestrator.validate(&dir).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report).expect("serializable"));
    } else {
        println!("{}", report.report);
        for w in &report.warnings {
            println!("warning: {}", w);
        }
        for e in &report.errors {
            println!("error: {}", e);
        }
    }
    if !report.valid {
        return Err(ServerError::Orchestrator(fleet_migrate_core::error::OrchestratorError::validation(
            "migration set has errors",
        )));
    }
    Ok(())
}

fn parse_mode(mode: &str) -> Result<Mode, ServerError> {
    match mode {
        "dry_run" => Ok(Mode::DryRun),
        "apply" => Ok(Mode::Apply),
        "validate_only" => Ok(Mode::ValidateOnly),
        other => Err(ServerError::Orchestrator(fleet_migrate_core::error::OrchestratorError::validation(format!(
            "unknown mode '{}': expected dry_run, apply, or validate_only",
            other
        )))),
    }
}

#[allow(clippy::too_many_arguments)]
async fn cmd_migrate(
    config: AppConfig,
    dir: PathBuf,
    tenants_file: PathBuf,
    mode: String,
    sequential: bool,
    job_name: Option<String>,
    json: bool,
) -> Result<(), ServerError> {
    let mode = parse_mode(&mode)?;
    let tenants_raw = std::fs::read_to_string(&tenants_file)
        .map_err(|e| ServerError::Config(format!("reading '{}': {}", tenants_file.display(), e)))?;
    let tenants: Vec<TenantSpec> = serde_json::from_str(&tenants_raw)
        .map_err(|e| ServerError::Config(format!("parsing '{}': {}", tenants_file.display(), e)))?;

    let (orchestrator, _plugin) = build_orchestrator(&config).await?;
    let outcome = orchestrator
        .start_job(StartJobRequest {
            tenants,
            migrations_dir: dir,
            mode,
            parallel: !sequential,
            job_name,
        })
        .await?;

    let job_id = match outcome {
        StartOutcome::Started(resp) => resp.job_id,
        StartOutcome::Validated(report) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&report).expect("serializable"));
            } else {
                println!("{}", report.report);
            }
            return Ok(());
        }
    };

    let (job, _progress) = loop {
        let (job, progress) = orchestrator.get_job(&job_id).await?;
        if job.is_terminal() {
            break (job, progress);
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&job).expect("serializable"));
    } else {
        println!("job {} finished with status {:?}", job.job_id, job.status);
    }

    match job.status {
        Status::Success => Ok(()),
        Status::Partial => Err(ServerError::Partial(format!(
            "{}/{} tenants succeeded",
            job.successful, job.total
        ))),
        _ => Err(ServerError::Orchestrator(fleet_migrate_core::error::OrchestratorError::ExecutionError(format!(
            "job finished with status {:?}",
            job.status
        )))),
    }
}

async fn cmd_status(config: AppConfig, job_id: String, json: bool) -> Result<(), ServerError> {
    let (orchestrator, _plugin) = build_orchestrator(&config).await?;
    let (job, progress) = orchestrator.get_job(&job_id).await?;
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({ "job": job, "progress": progress }))
                .expect("serializable")
        );
    } else {
        println!("job {}: {:?} ({}/{})", job.job_id, job.status, progress.completed, progress.total);
    }
    Ok(())
}

async fn cmd_list(config: AppConfig, limit: usize) -> Result<(), ServerError> {
    let (orchestrator, _plugin) = build_orchestrator(&config).await?;
    let jobs = orchestrator.list_jobs(limit).await?;
    for job in jobs {
        println!("{}\t{:?}\t{}/{}", job.job_id, job.status, job.completed, job.total);
    }
    Ok(())
}

async fn cmd_delete(config: AppConfig, job_id: String) -> Result<(), ServerError> {
    let (orchestrator, _plugin) = build_orchestrator(&config).await?;
    let deleted = orchestrator.delete_job(&job_id).await?;
    if !deleted {
        return Err(ServerError::Orchestrator(fleet_migrate_core::error::OrchestratorError::NotFoundError(job_id)));
    }
    println!("deleted");
    Ok(())
}

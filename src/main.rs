mod channel;
mod config;
mod containment;
mod engine;
mod errors;
mod logging;
mod security;
mod server;
mod syntax;
mod units;


use crate::{config::Config, engine::CopyEngine, errors::AppError};
use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing::{error, info, warn};

/// Copy data to workspace: copy folders from under a confined root into a build
/// workspace and clean them up afterwards.
#[derive(Debug, Parser)]
#[command(name = "confined-copy", version)]
struct Cli {
    #[arg(long, env = "CONFINED_COPY_CONFIG", default_value = "confined-copy.toml")]
    config: PathBuf,
    #[arg(long, value_enum, default_value_t = LogFormat::Json)]
    log_format: LogFormat,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the agent that executes work units against this machine's filesystem.
    Serve,
    /// Check a folder list without copying anything.
    Validate {
        /// Overrides `copy.folder_path`.
        #[arg(long)]
        folders: Option<String>,
        /// Also check that every folder exists under the allowed root.
        #[arg(long)]
        check_exists: bool,
    },
    /// Copy the folders into `--dest`, run the optional build command there, then tear down.
    Copy {
        #[arg(long)]
        dest: PathBuf,
        #[arg(long)]
        folders: Option<String>,
        #[arg(last = true)]
        build: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(matches!(cli.log_format, LogFormat::Json));

    let cfg = Config::load(&cli.config).context("loading config")?;
    cfg.validate().context("validating config")?;

    match cli.command {
        Command::Serve => {
            let agent = cfg.agent.clone().context("[agent] section is required to serve")?;
            server::serve(server::AppState::new(agent, cfg.authority())).await
        }
        Command::Validate { folders, check_exists } => {
            let raw = folders.unwrap_or_else(|| cfg.copy.folder_path.clone());
            let engine = build_engine(&cfg).await?;
            let verdict = if check_exists {
                engine.check_folder_path(&raw).await
            } else {
                syntax::validate_folder_path(&raw, &cfg.copy.delimiter, engine.platform()).map_err(AppError::from)
            };
            verdict.map_err(|e| rejected(e, "folder path rejected"))?;
            println!("ok");
            Ok(())
        }
        Command::Copy { dest, folders, build } => {
            let raw = folders.unwrap_or_else(|| cfg.copy.folder_path.clone());
            let (cancel_tx, cancel_rx) = tokio::sync::watch::channel(false);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    let _ = cancel_tx.send(true);
                }
            });

            let engine = build_engine(&cfg).await?.with_cancellation(cancel_rx);
            let handle = engine
                .begin(&raw, &dest)
                .await
                .map_err(|e| rejected(e, "copying data to workspace failed"))
                .context("copying data to workspace")?;
            if handle.manifest().is_empty() {
                warn!(destination = %handle.destination().display(), "nothing was copied");
            }
            println!("copied [{}]", handle.manifest().names().join(","));

            let build_result = run_build(&build, handle.destination()).await;
            let report = handle.end();
            info!(removed = report.removed, missing = report.missing, skipped = report.skipped, "end phase done");
            build_result
        }
    }
}

async fn build_engine(cfg: &Config) -> anyhow::Result<CopyEngine> {
    let channel = cfg.build_channel().context("building execution channel")?;
    CopyEngine::connect(channel, cfg.root.allowed_root.clone(), cfg.copy_options())
        .await
        .context("asking the hosting node for its platform")
}

fn rejected(e: AppError, what: &str) -> AppError {
    error!(class = ?e.class(), code = e.code(), error = %e, "{what}");
    e
}

async fn run_build(build: &[String], dest: &std::path::Path) -> anyhow::Result<()> {
    let Some((program, args)) = build.split_first() else {
        return Ok(());
    };
    let status = tokio::process::Command::new(program)
        .args(args)
        .current_dir(dest)
        .status()
        .await
        .with_context(|| format!("spawning {program}"))?;
    if !status.success() {
        error!(code = ?status.code(), "build command failed");
        anyhow::bail!("build command exited with {status}");
    }
    Ok(())
}

//! Snapshot CLI - main entry point

use clap::{ArgGroup, Args, Parser, Subcommand};
use snapshot_cli::commands::policy::{self, ExposeMetrics};
use snapshot_cli::commands::remote::{format_sources, format_status, ControlArgs, UserArgs};
use snapshot_cli::commands::{open_repository, snapshot};
use snapshot_cli::fs::walker::WalkOptions;
use snapshot_cli::{utils, CliError, Config};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Repository database file (overrides config)
    #[arg(long, env = "SNAPSHOT_REPO_PATH", global = true)]
    repo: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create, list and delete snapshots in the repository
    #[command(subcommand)]
    Snapshot(SnapshotCommand),

    /// Edit repository policies
    #[command(subcommand)]
    Policy(PolicyCommand),

    /// Control a running server
    #[command(subcommand)]
    Server(ServerCommand),

    /// Query a running server's sources
    #[command(subcommand)]
    Sources(SourcesCommand),
}

#[derive(Subcommand, Debug)]
enum SnapshotCommand {
    Create {
        path: PathBuf,

        /// Follow symbolic links while walking the source
        #[arg(long)]
        follow_links: bool,

        /// Skip entries with this name and everything below them
        #[arg(long = "exclude", value_name = "NAME")]
        exclude: Vec<String>,
    },
    List { path: PathBuf },
    Delete {
        #[arg(long, value_name = "PATH")]
        all_snapshots_for_source: PathBuf,

        /// Actually delete; without it only report what would be deleted
        #[arg(long)]
        delete: bool,
    },
}

#[derive(Args, Debug)]
#[command(group(ArgGroup::new("target").required(true).args(["global", "path"])))]
struct PolicyTargetArgs {
    /// Apply to the global policy
    #[arg(long)]
    global: bool,

    /// Apply to the source at this path
    path: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum PolicyCommand {
    Set {
        #[command(flatten)]
        target: PolicyTargetArgs,

        #[arg(long, value_enum)]
        expose_metrics: ExposeMetrics,
    },
    Show {
        #[command(flatten)]
        target: PolicyTargetArgs,
    },
}

#[derive(Subcommand, Debug)]
enum ServerCommand {
    /// Make the server reload sources and policies from the repository
    Refresh(ControlArgs),
    Shutdown(ControlArgs),
    Status(ControlArgs),
}

#[derive(Subcommand, Debug)]
enum SourcesCommand {
    List(UserArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("ERROR: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> snapshot_cli::Result<()> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(repo) = cli.repo {
        config.repository.path = repo;
    }

    let log_level = cli.log_level.as_deref().unwrap_or(&config.log.level);
    utils::logger::init(log_level).map_err(|e| CliError::Config(format!("logging: {e}")))?;

    match cli.command {
        Command::Snapshot(cmd) => {
            let repo = open_repository(&config)?;
            match cmd {
                SnapshotCommand::Create {
                    path,
                    follow_links,
                    exclude,
                } => {
                    let options = WalkOptions {
                        follow_links,
                        exclude_names: exclude,
                    };
                    let (source, summary) = snapshot::create(&repo, &config, &path, &options)?;
                    println!(
                        "Created snapshot {} of {} (dirs:{} files:{} bytes:{})",
                        summary.id,
                        source,
                        summary.stats.total_dirs,
                        summary.stats.total_files,
                        summary.stats.total_bytes
                    );
                }
                SnapshotCommand::List { path } => {
                    let (source, snapshots) = snapshot::list(&repo, &config, &path)?;
                    println!("{source}");
                    for s in snapshots {
                        println!(
                            "  {} {} dirs:{} files:{} bytes:{}",
                            s.start_time.format("%Y-%m-%d %H:%M:%S UTC"),
                            s.id,
                            s.stats.total_dirs,
                            s.stats.total_files,
                            s.stats.total_bytes
                        );
                    }
                }
                SnapshotCommand::Delete {
                    all_snapshots_for_source,
                    delete,
                } => {
                    let (source, count) =
                        snapshot::delete_all_for_source(&repo, &config, &all_snapshots_for_source, delete)?;
                    if delete {
                        println!("Deleted {count} snapshot(s) of {source}");
                    } else {
                        println!("Would delete {count} snapshot(s) of {source}; pass --delete to confirm");
                    }
                }
            }
        }
        Command::Policy(cmd) => {
            let repo = open_repository(&config)?;
            match cmd {
                PolicyCommand::Set {
                    target,
                    expose_metrics,
                } => {
                    let target = policy::target_for(&config, target.path.as_deref())?;
                    policy::set_expose_metrics(&repo, &target, expose_metrics)?;
                    println!("Updated policy for {}", policy::describe(&target));
                }
                PolicyCommand::Show { target } => {
                    let target = policy::target_for(&config, target.path.as_deref())?;
                    let (stored, effective) = policy::show(&repo, &target)?;
                    println!("Policy for {}", policy::describe(&target));
                    println!(
                        "  expose-metrics: {} (set: {})",
                        effective.expose_metrics,
                        stored
                            .expose_metrics
                            .map(|v| v.to_string())
                            .unwrap_or_else(|| "inherit".to_string())
                    );
                }
            }
        }
        Command::Server(cmd) => match cmd {
            ServerCommand::Refresh(args) => {
                let summary = args.client()?.refresh().await?;
                println!(
                    "Refreshed: {} added, {} updated, {} removed, {} unchanged",
                    summary.added, summary.updated, summary.removed, summary.unchanged
                );
            }
            ServerCommand::Shutdown(args) => {
                args.client()?.shutdown().await?;
                println!("Server is shutting down");
            }
            ServerCommand::Status(args) => {
                let status = args.client()?.status().await?;
                print!("{}", format_status(&status));
            }
        },
        Command::Sources(SourcesCommand::List(args)) => {
            let sources = args.client()?.list_sources().await?;
            print!("{}", format_sources(&sources));
        }
    }

    Ok(())
}

//! svcstat - deployed release history for a multi-component service
//!
//! The `svcstat` command reconstructs what each environment has run from the
//! history of the configuration repository.
//!
//! ## Commands
//!
//! - `environments`: List known environments
//! - `releases`: List releases, across the repository or for one environment
//! - `release`: Show one environment release
//! - `diff`: Attribute component changes between two environment releases
//! - `report`: Markdown summary of an environment's release history

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};

use svcstat_ci::{SippyClient, SippyConfig};
use svcstat_core::{
    render_environment_release_md, render_release_summary_md, CachingReleaseAccessor,
    ComponentChange, ComponentRegistry, Engine, EngineConfig, EnvironmentReleaseDiff,
    ReleaseAccessor, SystemClock,
};

#[derive(Parser)]
#[command(name = "svcstat")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Release history and component diffs per environment", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Output format for command results
    #[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,

    /// Clone of the configuration repository
    #[arg(long, global = true, env = "SVCSTAT_REPO_DIR")]
    repo_dir: Option<PathBuf>,

    /// Parent directory for component source clones
    #[arg(long, global = true, env = "SVCSTAT_COMPONENT_REPOS_DIR")]
    component_repos_dir: Option<PathBuf>,

    /// Directory holding registry credential files
    #[arg(long, global = true, env = "SVCSTAT_PULL_SECRET_DIR")]
    pull_secret_dir: Option<PathBuf>,

    /// How far back to look for releases, in days
    #[arg(long, global = true, env = "SVCSTAT_LOOKBACK_DAYS")]
    lookback_days: Option<i64>,

    /// Base URL of the CI results service
    #[arg(long, global = true, env = "SVCSTAT_SIPPY_URL")]
    sippy_url: Option<String>,

    /// Skip CI job-run lookups
    #[arg(long, global = true, env = "SVCSTAT_NO_CI")]
    no_ci: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// List known environments
    Environments,

    /// List releases, newest first
    Releases {
        /// Limit to one environment (default: all releases in the repository)
        #[arg(short, long)]
        environment: Option<String>,
    },

    /// Show one environment release by its composite name (env---release)
    Release {
        name: String,
    },

    /// Attribute component changes between two environment releases
    Diff {
        /// The newer environment release
        name: String,

        /// The environment release to compare against
        other: String,
    },

    /// Markdown summary of an environment's releases
    Report {
        environment: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    svcstat_core::telemetry::init_tracing(cli.json, level);

    let accessor = build_accessor(&cli)?;
    let output = cli.output;

    match cli.command {
        Commands::Environments => cmd_environments(&accessor, output).await,
        Commands::Releases { environment } => {
            cmd_releases(&accessor, environment.as_deref(), output).await
        }
        Commands::Release { name } => cmd_release(&accessor, &name, output).await,
        Commands::Diff { name, other } => cmd_diff(&accessor, &name, &other, output).await,
        Commands::Report { environment } => cmd_report(&accessor, &environment).await,
    }
}

fn engine_config(cli: &Cli) -> EngineConfig {
    let mut config = EngineConfig::from_env();
    if let Some(dir) = &cli.repo_dir {
        config = config.with_repo_dir(dir);
    }
    if let Some(dir) = &cli.component_repos_dir {
        config = config.with_component_repos_dir(dir);
    }
    if let Some(dir) = &cli.pull_secret_dir {
        config = config.with_pull_secret_dir(dir);
    }
    if let Some(days) = cli.lookback_days {
        config = config.with_lookback_days(days);
    }
    config
}

fn build_accessor(cli: &Cli) -> Result<CachingReleaseAccessor<Engine>> {
    let config = engine_config(cli);
    info!(
        repo_dir = %config.repo_dir.display(),
        lookback_days = config.lookback_days,
        "configuring release engine"
    );

    let mut engine = Engine::from_config(&config).context("Failed to configure release engine")?;
    if !cli.no_ci {
        let sippy = match &cli.sippy_url {
            Some(url) => SippyConfig::new(url),
            None => SippyConfig::from_env(),
        };
        let client = SippyClient::new(sippy).context("Failed to create CI results client")?;
        engine = engine.with_job_runs(Arc::new(client));
    }

    Ok(CachingReleaseAccessor::new(
        engine,
        config.cache_ttl(),
        Arc::new(SystemClock),
    ))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("Failed to serialize output")?
    );
    Ok(())
}

async fn cmd_environments(accessor: &impl ReleaseAccessor, output: OutputFormat) -> Result<()> {
    let environments = accessor.list_environments().await?;
    match output {
        OutputFormat::Json => print_json(&environments),
        OutputFormat::Text => {
            for environment in environments {
                println!("{environment}");
            }
            Ok(())
        }
    }
}

async fn cmd_releases(
    accessor: &impl ReleaseAccessor,
    environment: Option<&str>,
    output: OutputFormat,
) -> Result<()> {
    let Some(environment) = environment else {
        let releases = accessor
            .list_releases()
            .await
            .context("Failed to list releases")?;
        return match output {
            OutputFormat::Json => print_json(&releases),
            OutputFormat::Text => {
                if releases.is_empty() {
                    println!("No releases found");
                }
                for release in releases {
                    println!("{}  {}", release.name, release.sha);
                }
                Ok(())
            }
        };
    };

    let releases = accessor
        .list_environment_releases(environment)
        .await
        .with_context(|| format!("Failed to list releases for {environment}"))?;
    match output {
        OutputFormat::Json => print_json(&releases),
        OutputFormat::Text => {
            if releases.is_empty() {
                println!("No releases found for '{environment}'");
            }
            for release in releases {
                let failing = release
                    .blocking_job_run_results
                    .values()
                    .flatten()
                    .filter(|run| !run.overall_result.is_success())
                    .count();
                println!(
                    "{}  {}  components={}  blocking_failures={}",
                    release.name,
                    release.sha,
                    release.components.len(),
                    failing
                );
            }
            Ok(())
        }
    }
}

async fn cmd_release(accessor: &impl ReleaseAccessor, name: &str, output: OutputFormat) -> Result<()> {
    let release = accessor
        .get_environment_release(name)
        .await
        .with_context(|| format!("Failed to get environment release {name}"))?;
    if output == OutputFormat::Json {
        return print_json(&release);
    }

    let history = accessor
        .list_environment_releases(&release.environment)
        .await?;
    let previous = history
        .iter()
        .position(|r| r.name == release.name)
        .and_then(|i| history.get(i + 1));
    let registry = ComponentRegistry::builtin();
    print!(
        "{}",
        render_environment_release_md(&release, previous, &registry, chrono::Utc::now())
    );
    Ok(())
}

async fn cmd_diff(
    accessor: &impl ReleaseAccessor,
    name: &str,
    other: &str,
    output: OutputFormat,
) -> Result<()> {
    let diff = accessor
        .get_environment_release_diff(name, other)
        .await
        .with_context(|| format!("Failed to diff {name} against {other}"))?;
    match output {
        OutputFormat::Json => print_json(&diff),
        OutputFormat::Text => {
            print_diff(&diff);
            Ok(())
        }
    }
}

fn print_diff(diff: &EnvironmentReleaseDiff) {
    println!("{} vs {}", diff.name, diff.other_environment_release_name);
    if diff.different_components.is_empty() {
        println!("  no component changes");
        return;
    }
    for (name, component) in &diff.different_components {
        if component.is_unavailable() {
            println!("\n{name}: changes unavailable");
        } else {
            println!("\n{name}: {} change(s)", component.number_of_changes);
        }
        for change in &component.changes {
            match change {
                ComponentChange::PrMerge {
                    sha,
                    number,
                    summary,
                    issue_references,
                    ..
                } => {
                    let number = number.map(|n| format!("#{n} ")).unwrap_or_default();
                    let short = sha.get(..8).unwrap_or(sha);
                    if issue_references.is_empty() {
                        println!("  {number}{summary} ({short})");
                    } else {
                        println!(
                            "  {number}{summary} ({short}) [{}]",
                            issue_references.join(", ")
                        );
                    }
                }
                ComponentChange::Unavailable { reason } => println!("  {reason}"),
            }
        }
    }
}

async fn cmd_report(accessor: &impl ReleaseAccessor, environment: &str) -> Result<()> {
    let releases = accessor
        .list_environment_releases(environment)
        .await
        .with_context(|| format!("Failed to list releases for {environment}"))?;
    print!("{}", render_release_summary_md(environment, &releases));
    Ok(())
}

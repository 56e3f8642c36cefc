use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::io::AsyncReadExt;
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use repodock::paths::build_path;
use repodock::{Config, EnsureRequest, HealthCheck, RepoDock, RepositoryIdentity, SyncError, SyncResult};

#[derive(Parser)]
#[command(name = "repodock")]
#[command(about = "Materialize remote git repositories as local working copies")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (defaults to XDG config location)
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Clone a repository or bring an existing clone up to date
    Ensure {
        /// Repository reference (URL, host/owner/repo, owner/repo or SSH)
        repo: String,

        /// Branch, tag or commit to check out
        #[arg(long = "ref")]
        git_ref: Option<String>,

        /// Shallow clone depth
        #[arg(long)]
        depth: Option<u32>,

        /// ff-only, fetch-only or reset-clean
        #[arg(long)]
        update_mode: Option<String>,

        /// Clone root (defaults to the configured one)
        #[arg(long)]
        clone_root: Option<String>,

        /// Accept SSH references
        #[arg(long)]
        allow_ssh: bool,
    },

    /// Run one ensure from a JSON argument object
    Invoke {
        /// JSON arguments (read from stdin when omitted)
        #[arg(long)]
        args: Option<String>,
    },

    /// Show the canonical identity and local path for a reference
    Parse {
        /// Repository reference
        repo: String,

        /// Accept SSH references
        #[arg(long)]
        allow_ssh: bool,
    },

    /// System health check and diagnostics
    Doctor,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = load_config(cli.config).await?;

    init_logging(cli.verbose, &config.logging.level)?;
    debug!("Starting repodock v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Ensure {
            repo,
            git_ref,
            depth,
            update_mode,
            clone_root,
            allow_ssh,
        } => {
            let request = EnsureRequest {
                repo,
                git_ref,
                clone_root,
                depth,
                update_mode,
                allow_ssh: allow_ssh.then_some(true),
            };
            cmd_ensure(request, &config).await
        }
        Commands::Invoke { args } => cmd_invoke(args, &config).await,
        Commands::Parse { repo, allow_ssh } => cmd_parse(&repo, allow_ssh, &config),
        Commands::Doctor => cmd_doctor(&config),
    }
}

/// Initialize logging based on verbosity level
///
/// Logs go to stderr; stdout carries the JSON result.
fn init_logging(verbose: bool, level: &str) -> Result<()> {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    Ok(())
}

/// Load configuration from specified path or default location
async fn load_config(config_path: Option<std::path::PathBuf>) -> Result<Config> {
    match config_path {
        Some(path) => {
            let mut config = Config::load(&path)?;
            config.apply_env_overrides()?;
            Ok(config)
        }
        None => Config::load_or_default(),
    }
}

/// Clone or update one repository
async fn cmd_ensure(request: EnsureRequest, config: &Config) -> Result<()> {
    let dock = RepoDock::from_config(config)?;
    info!("Ensuring {}", request.repo);
    report_outcome(dock.handle(&request).await)
}

/// Run one ensure from JSON arguments
async fn cmd_invoke(args: Option<String>, config: &Config) -> Result<()> {
    let raw = match args {
        Some(args) => args,
        None => {
            let mut input = String::new();
            tokio::io::stdin()
                .read_to_string(&mut input)
                .await
                .context("Failed to read arguments from stdin")?;
            input
        }
    };

    let dock = RepoDock::from_config(config)?;
    report_outcome(dock.handle_raw(&raw).await)
}

/// Print where a reference would be materialized, without touching the filesystem
fn cmd_parse(repo: &str, allow_ssh: bool, config: &Config) -> Result<()> {
    #[derive(Serialize)]
    struct ParseOutput<'a> {
        identity: &'a RepositoryIdentity,
        local_path: std::path::PathBuf,
    }

    let clone_root = config.clone_root_path()?;
    let outcome = RepositoryIdentity::parse(repo, allow_ssh || config.allow_ssh).and_then(
        |identity| {
            let local_path = build_path(&clone_root, &identity)?;
            Ok((identity, local_path))
        },
    );

    match outcome {
        Ok((identity, local_path)) => print_json(&ParseOutput {
            identity: &identity,
            local_path,
        }),
        Err(e) => exit_with_report(&e),
    }
}

/// System health check and diagnostics
fn cmd_doctor(config: &Config) -> Result<()> {
    let health = HealthCheck::run(config);
    print_health_report(&health);

    if !health.all_passed() {
        std::process::exit(1);
    }
    Ok(())
}

/// Result JSON on stdout, or the error report on stderr with exit code 1
fn report_outcome(outcome: repodock::Result<SyncResult>) -> Result<()> {
    match outcome {
        Ok(result) => print_json(&result),
        Err(e) => exit_with_report(&e),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", json);
    Ok(())
}

fn exit_with_report(error: &SyncError) -> ! {
    match serde_json::to_string_pretty(&error.report()) {
        Ok(json) => eprintln!("{}", json),
        Err(_) => eprintln!("{}: {}", error.kind(), error),
    }
    std::process::exit(1);
}

/// Print health check report to stdout
fn print_health_report(health: &HealthCheck) {
    use repodock::health::CheckResult;

    fn print_check(name: &str, result: &CheckResult) {
        println!("{}:", name);
        let icon = if result.passed {
            if result.is_warning { "⚠️ " } else { "✅" }
        } else {
            "❌"
        };
        println!("  {} {}", icon, result.message);
        if let Some(details) = &result.details {
            for line in details.lines() {
                println!("     {}", line);
            }
        }
    }

    println!("🔍 repodock System Diagnostics");
    println!();

    for (name, result) in health.all_checks() {
        print_check(name, result);
        println!();
    }

    if health.all_passed() {
        println!("✅ All checks passed");
    } else {
        println!("❌ Some checks failed");
    }
}

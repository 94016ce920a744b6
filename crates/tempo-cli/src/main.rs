//! Schema migration tool for the tempo database.
//!
//! ```text
//! tempo migrate                  apply every pending migration
//! tempo status                   pending steps and ledger state per migration
//! tempo verify                   check post-conditions, read-only
//! tempo revert --to VERSION      undo everything newer than VERSION
//! tempo revert --all             undo every migration
//! tempo script [--down]          print the SQL script, no connection
//! ```

mod config;

use clap::{Parser, Subcommand};
use config::Config;
use owo_colors::OwoColorize;
use tempo_migrate::{MigrationRunner, PgCatalog, RunOptions};
use tokio_postgres::NoTls;
use tracing_subscriber::EnvFilter;

type BoxError = Box<dyn std::error::Error>;

const ENV_HELP: &str = "\
Environment:
  TEMPO_SCHEMA   Schema to migrate (default: public)
  TEMPO_LOCK     Hold an advisory lock while migrating (default: true)
  TEMPO_LEDGER   Use the applied-migrations ledger (default: true)";

/// Idempotent schema migrations for the tempo database.
#[derive(Debug, Parser)]
#[command(name = "tempo", version, after_help = ENV_HELP)]
#[command(arg_required_else_help = true)]
struct Cli {
    /// Postgres connection URL
    #[arg(long, global = true, env = "DATABASE_URL", hide_env_values = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, PartialEq, Eq, Subcommand)]
enum Command {
    /// Apply every pending migration
    Migrate,
    /// Show pending steps and ledger state per migration
    Status,
    /// Check every migration's post-conditions, read-only
    Verify,
    /// Undo migrations, newest first
    Revert {
        /// Keep migrations up to and including this version
        #[arg(long, value_name = "VERSION", required_unless_present = "all")]
        to: Option<String>,
        /// Undo every migration
        #[arg(long, conflicts_with = "to")]
        all: bool,
    },
    /// Print the idempotent SQL script without connecting
    Script {
        /// Print the revert script, newest migration first
        #[arg(long)]
        down: bool,
    },
}

fn main() {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();
    // Usage errors exit with status 2
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tempo=info")),
        )
        .init();

    match run(cli) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(err) => {
            eprintln!("{} {}", "error:".red().bold(), err);
            std::process::exit(1);
        }
    }
}

/// Returns `Ok(false)` when the command ran but found a problem worth a
/// non-zero exit (verification mismatches).
fn run(cli: Cli) -> Result<bool, BoxError> {
    if let Command::Script { down } = cli.command {
        let migrations = tempo_db::migrations();
        let script = if down {
            tempo_migrate::render_down_script(&migrations)
        } else {
            tempo_migrate::render_script(&migrations)
        };
        print!("{}", script);
        return Ok(true);
    }

    let mut config = Config::from_env()?;
    if let Some(url) = cli.database_url {
        config.database_url = Some(url);
    }
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(connected(cli.command, &config))
}

async fn connected(command: Command, config: &Config) -> Result<bool, BoxError> {
    let url = config.database_url()?;
    tracing::debug!(
        schema = %config.schema,
        lock = config.lock,
        ledger = config.ledger,
        "loaded config"
    );
    eprintln!(
        "{} {} (schema {})",
        "database:".dimmed(),
        mask_password(url),
        config.schema
    );

    let pg_config: tokio_postgres::Config = url.parse()?;
    let manager = deadpool_postgres::Manager::new(pg_config, NoTls);
    let pool = deadpool_postgres::Pool::builder(manager)
        .max_size(1)
        .build()?;
    let conn = pool.get().await.map_err(tempo_migrate::Error::from)?;
    let mut catalog = PgCatalog::new(conn, &config.schema).await?;

    let options = RunOptions {
        lock: config.lock,
        ledger: config.ledger,
        verify: true,
    };
    let migrations = tempo_db::migrations();
    let mut runner = MigrationRunner::new(&mut catalog).with_options(options);

    match command {
        Command::Migrate => {
            let report = runner.run(&migrations).await?;
            for m in &report.migrations {
                let id = format!("{} {}", m.version, m.name);
                if m.already_recorded {
                    println!("  {} {}", "·".dimmed(), id.dimmed());
                } else if m.is_noop() {
                    println!("  {} {} {}", "✓".green(), id, "(up to date)".dimmed());
                } else {
                    println!(
                        "  {} {} ({} applied, {} skipped)",
                        "✓".green(),
                        id.bold(),
                        m.applied,
                        m.skipped
                    );
                }
                for v in m.verifications.iter().filter(|v| !v.passed) {
                    println!("      {} {} ({})", "!".yellow(), v.description, v.detail);
                }
            }
            println!();
            println!(
                "{} statement(s) executed across {} migration(s)",
                report.applied_steps(),
                report.migrations.len()
            );
            Ok(true)
        }
        Command::Status => {
            for s in runner.status(&migrations).await? {
                let id = format!("{} {}", s.version, s.name);
                let state = if s.is_pending() {
                    format!("{}/{} steps pending", s.pending_steps, s.total_steps)
                        .yellow()
                        .to_string()
                } else {
                    "up to date".green().to_string()
                };
                let ledger = match &s.recorded {
                    Some(r) => format!("recorded {}", r.applied_at.format("%Y-%m-%d %H:%M:%S")),
                    None if options.ledger => "not recorded".to_string(),
                    None => String::new(),
                };
                println!("  {:<48} {}  {}", id, state, ledger.dimmed());
                if s.checksum_drift {
                    println!(
                        "      {} script changed since it was recorded",
                        "!".yellow()
                    );
                }
            }
            Ok(true)
        }
        Command::Verify => {
            let mut all_passed = true;
            for report in runner.verify(&migrations).await? {
                println!("{} {}", report.version, report.name.bold());
                for result in &report.results {
                    if result.passed {
                        println!("  {} {}", "✓".green(), result.description);
                    } else {
                        all_passed = false;
                        println!("  {} {} ({})", "✗".red(), result.description, result.detail);
                    }
                }
            }
            Ok(all_passed)
        }
        Command::Revert { to, all } => {
            let target = if all { None } else { to.as_deref() };
            let report = runner.revert(&migrations, target).await?;
            for m in &report.migrations {
                let id = format!("{} {}", m.version, m.name);
                if m.is_noop() {
                    println!("  {} {} {}", "↶".yellow(), id, "(nothing to undo)".dimmed());
                } else {
                    println!(
                        "  {} {} ({} reverted, {} skipped)",
                        "↶".yellow(),
                        id.bold(),
                        m.applied,
                        m.skipped
                    );
                }
            }
            println!();
            println!(
                "{} statement(s) executed reverting {} migration(s)",
                report.applied_steps(),
                report.migrations.len()
            );
            Ok(true)
        }
        Command::Script { .. } => Ok(true),
    }
}

/// Mask password in database URL for display
fn mask_password(url: &str) -> String {
    // Simple masking: replace password between :// and @
    if let Some(start) = url.find("://") {
        if let Some(at) = url.rfind('@') {
            if at > start {
                let prefix = &url[..start + 3];
                let suffix = &url[at..];
                if let Some(colon) = url[start + 3..at].find(':') {
                    let user = &url[start + 3..start + 3 + colon];
                    return format!("{}{}:***{}", prefix, user, suffix);
                }
            }
        }
    }
    url.to_string()
}

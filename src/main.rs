//! Rankmigrator CLI - moves rank data from a flat store into the users table

use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use rankmigrator::config;
use rankmigrator::migrator::{self, MigrateOptions, Migrator};
use rankmigrator::storage::SqliteSink;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "rankmigrator")]
#[command(version)]
#[command(about = "Migrate user experience and levels from a flat .toml store into SQLite")]
#[command(long_about = r#"
Reads `<id>.xp` and `<id>.level` entries from a flat store file, writes one
row per complete user into the users table and deletes the file afterwards.

Example usage:
  rankmigrator ranks.toml
  rankmigrator ranks.toml --database data/devcordbot.db --keep-existing
"#)]
struct Cli {
    /// Flat store file to migrate (must end in .toml)
    source: PathBuf,

    /// Path to the database file
    #[arg(short, long)]
    database: Option<PathBuf>,

    /// Path to the config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Keep users already in the database instead of clearing the table
    #[arg(long)]
    keep_existing: bool,

    /// Summary format
    #[arg(short, long, value_enum, default_value_t = Format::Text)]
    format: Format,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    // Argument checks happen before the database is touched
    migrator::source_store_name(&cli.source)?;
    if !cli.source.is_file() {
        anyhow::bail!("source file {} does not exist", cli.source.display());
    }

    let file_config = config::load_config(cli.config.as_deref())?;
    let database = config::resolve_database(
        cli.database,
        std::env::var(config::DATABASE_ENV).ok(),
        file_config.as_ref(),
    );
    let keep_existing = cli.keep_existing
        || file_config
            .as_ref()
            .and_then(|c| c.keep_existing)
            .unwrap_or(false);

    config::ensure_db_dir(&database)?;
    let sink = SqliteSink::open(&database)?;

    let mut migrator = Migrator::new(
        sink,
        MigrateOptions {
            clear_existing: !keep_existing,
        },
    );
    let report = migrator.run(&cli.source)?;

    match cli.format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        Format::Text if !rankmigrator::ui::is_quiet() => {
            rankmigrator::ui::print_report(&report, &database);
        }
        Format::Text => {}
    }

    Ok(())
}

//! aiodb — run keyed SQL statements from the command line
//!
//! # Usage
//!
//! ```bash
//! # List the statements in a query file
//! aiodb keys queries.sql
//!
//! # Lint a query file
//! aiodb check queries.sql
//!
//! # Run a statement against the configured database
//! aiodb --config config.yml --queries queries.sql exec add_user --bind ada,42
//! aiodb fetch get_user --named id=1 --format json
//! ```

use aiodb::prelude::*;
use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "aiodb")]
#[command(version)]
#[command(about = "Run keyed SQL statements against SQLite or MySQL", long_about = None)]
#[command(after_help = "EXAMPLES:
    aiodb keys queries.sql
    aiodb show queries.sql get_user
    aiodb exec add_user --bind ada,42
    aiodb fetch get_user --named id=1 --one --format json")]
struct Cli {
    /// YAML configuration file
    #[arg(long, env = "AIODB_CONFIG", default_value = aiodb::config::DEFAULT_CONFIG_PATH, global = true)]
    config: PathBuf,

    /// Keyed SQL file
    #[arg(long, env = "AIODB_QUERIES", default_value = "queries.sql", global = true)]
    queries: PathBuf,

    /// Don't run the `create_table` statement after connecting
    #[arg(long, global = true)]
    no_bootstrap: bool,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(clap::Args)]
struct Bindings {
    /// Positional parameters (?), comma separated
    #[arg(short, long, value_delimiter = ',', conflicts_with = "named")]
    bind: Vec<String>,

    /// Named parameters (:name), as name=value
    #[arg(short, long, value_parser = parse_named)]
    named: Vec<(String, String)>,
}

#[derive(Subcommand)]
enum Commands {
    /// List the keys defined in a query file
    Keys {
        /// Query file (defaults to --queries)
        file: Option<PathBuf>,
    },
    /// Print one statement
    Show {
        file: PathBuf,
        key: String,
    },
    /// Report malformed blocks in a query file
    Check {
        /// Query file (defaults to --queries)
        file: Option<PathBuf>,
    },
    /// Execute a statement and commit
    Exec {
        key: String,
        #[command(flatten)]
        bindings: Bindings,
    },
    /// Run a query and print its rows
    Fetch {
        key: String,
        #[command(flatten)]
        bindings: Bindings,
        /// Only fetch the first row
        #[arg(long)]
        one: bool,
        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },
}

fn parse_named(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected name=value, got '{}'", s))
}

impl Bindings {
    fn to_params(&self) -> Params {
        if !self.named.is_empty() {
            Params::named(
                self.named
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::parse_literal(v))),
            )
        } else if !self.bind.is_empty() {
            Params::positional(self.bind.iter().map(|b| Value::parse_literal(b)))
        } else {
            Params::None
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(&cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            std::process::exit(1);
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "aiodb=debug" } else { "aiodb=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: &Cli) -> anyhow::Result<i32> {
    match &cli.command {
        Commands::Keys { file } => {
            let table = load_table(file.as_ref().unwrap_or(&cli.queries))?;
            for key in table.keys() {
                println!("{}", key);
            }
            Ok(0)
        }
        Commands::Show { file, key } => {
            let table = load_table(file)?;
            let sql = table.get(key).ok_or_else(|| DbError::query_not_found(key))?;
            println!("{}", sql);
            Ok(0)
        }
        Commands::Check { file } => {
            let path = file.as_ref().unwrap_or(&cli.queries);
            let table = load_table(path)?;
            Ok(report_warnings(path, &table))
        }
        Commands::Exec { key, bindings } => {
            let mut db = open(cli).await?;
            let affected = db.execute(key, bindings.to_params()).await;
            db.close().await?;
            let affected = affected?;
            println!("{} {} rows affected", "✓".green(), affected);
            Ok(0)
        }
        Commands::Fetch {
            key,
            bindings,
            one,
            format,
        } => {
            let mut db = open(cli).await?;
            let rows = if *one {
                db.fetch_one(key, bindings.to_params())
                    .await
                    .map(|row| row.into_iter().collect::<Vec<_>>())
            } else {
                db.fetch_all(key, bindings.to_params()).await
            };
            db.close().await?;
            let rows = rows?;
            format_output(&rows, format);
            Ok(0)
        }
    }
}

fn load_table(path: &Path) -> anyhow::Result<QueryTable> {
    QueryTable::load(path).with_context(|| format!("loading {}", path.display()))
}

async fn open(cli: &Cli) -> anyhow::Result<Database> {
    if cli.verbose {
        eprintln!("{} {}", "Config:".dimmed(), cli.config.display());
        eprintln!("{} {}", "Queries:".dimmed(), cli.queries.display());
    }

    let mut builder = Database::builder()
        .config_path(&cli.config)
        .queries_path(&cli.queries);
    if cli.no_bootstrap {
        builder = builder.no_bootstrap();
    }
    let db = builder.connect().await?;

    if cli.verbose {
        eprintln!("{} {}", "Connected:".dimmed(), db.driver_name().cyan());
    }
    Ok(db)
}

fn report_warnings(path: &Path, table: &QueryTable) -> i32 {
    let warnings = table.warnings();
    if warnings.is_empty() {
        println!(
            "{} {} ({} queries)",
            "✓".green(),
            path.display(),
            table.len()
        );
        return 0;
    }

    for warning in warnings {
        println!(
            "{}:{} {}",
            path.display().to_string().white(),
            warning.line,
            warning.kind.to_string().yellow()
        );
    }
    println!();
    println!("{} warning(s)", warnings.len().to_string().yellow());
    1
}

fn format_output(rows: &[Row], format: &OutputFormat) {
    if rows.is_empty() {
        println!("{}", "(no results)".dimmed());
        return;
    }

    match format {
        OutputFormat::Json => {
            let objects: Vec<BTreeMap<&str, serde_json::Value>> = rows
                .iter()
                .map(|row| {
                    row.columns()
                        .iter()
                        .map(String::as_str)
                        .zip(row.values().iter().map(Value::to_json))
                        .collect()
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&objects).unwrap_or_default());
        }
        OutputFormat::Table => {
            let columns = rows[0].columns();

            let mut widths: Vec<usize> = columns.iter().map(|c| c.len()).collect();
            for row in rows {
                for (i, val) in row.values().iter().enumerate() {
                    if let Some(w) = widths.get_mut(i) {
                        *w = (*w).max(val.to_string().len());
                    }
                }
            }

            let header: Vec<String> = columns
                .iter()
                .zip(&widths)
                .map(|(c, w)| format!("{:width$}", c, width = w))
                .collect();
            println!("{}", header.join(" │ ").white().bold());

            let sep: Vec<String> = widths.iter().map(|w| "─".repeat(*w)).collect();
            println!("{}", sep.join("─┼─").dimmed());

            for row in rows {
                let cells: Vec<String> = row
                    .values()
                    .iter()
                    .zip(&widths)
                    .map(|(v, w)| format!("{:width$}", v.to_string(), width = w))
                    .collect();
                println!("{}", cells.join(" │ "));
            }

            println!();
            println!("{} row(s) returned", rows.len().to_string().cyan());
        }
    }
}

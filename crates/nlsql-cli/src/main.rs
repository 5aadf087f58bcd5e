//! nlsql CLI
//!
//! Natural-language access to a PostgreSQL database:
//! - `serve` runs the HTTP API
//! - `ask` runs a single command through the pipeline
//! - `schema`, `classify` and `extract` inspect things without touching the LLM
//! - `create-database` provisions a database and its tables

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::fs;
use std::io::{self, Read};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use nlsql_db::{
    connect_pool, DatabaseProvisioner, DbConfig, PgCatalog, PgExecutor, PgProvisioner, PgUserStore,
    SchemaIntrospector,
};
use nlsql_llm::{OpenRouterClient, Translator};
use nlsql_pipeline::CommandPipeline;
use nlsql_sql::{classify, contains_create_database, extract_table_statements};

mod server;

#[derive(Parser)]
#[command(name = "nlsql")]
#[command(author, version, about = "Natural-language commands for PostgreSQL")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server.
    Serve {
        #[arg(long, env = "HOST", default_value = "0.0.0.0")]
        host: IpAddr,
        #[arg(long, env = "PORT", default_value_t = 5000)]
        port: u16,
    },

    /// Translate and run one natural-language command, printing the JSON response.
    Ask {
        /// e.g. "show the five oldest users"
        command: String,
    },

    /// Print the schema description handed to the model.
    Schema,

    /// Classify a SQL statement (offline).
    Classify { sql: String },

    /// Split a `CREATE DATABASE` script into database name and table statements.
    Extract {
        /// SQL file, or `-` / nothing for stdin
        input: Option<PathBuf>,
    },

    /// Create a database, optionally with tables.
    CreateDatabase {
        name: String,
        /// A `CREATE TABLE` statement to run in the new database (repeatable)
        #[arg(long = "table")]
        tables: Vec<String>,
    },
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { host, port } => cmd_serve(SocketAddr::new(host, port)).await,
        Commands::Ask { command } => cmd_ask(&command).await,
        Commands::Schema => cmd_schema().await,
        Commands::Classify { sql } => {
            cmd_classify(&sql);
            Ok(())
        }
        Commands::Extract { input } => cmd_extract(input),
        Commands::CreateDatabase { name, tables } => cmd_create_database(&name, &tables).await,
    }
}

fn db_config() -> Result<DbConfig> {
    DbConfig::from_env().context("invalid database configuration")
}

fn translator() -> Result<Translator> {
    let client = OpenRouterClient::from_env().context("failed to configure the translation client")?;
    Ok(Translator::new(Arc::new(client)))
}

async fn cmd_serve(listen: SocketAddr) -> Result<()> {
    let config = db_config()?;
    let translator = translator()?;
    let pool = connect_pool(&config)
        .await
        .context("failed to connect to PostgreSQL")?;

    let pipeline = CommandPipeline::new(
        SchemaIntrospector::new(Arc::new(PgCatalog::new(pool.clone()))),
        translator,
        Arc::new(PgExecutor::new(pool.clone())),
    );
    let state = server::ServerState {
        pipeline,
        provisioner: Arc::new(PgProvisioner::new(config)),
        users: Arc::new(PgUserStore::new(pool)),
    };
    server::serve(listen, state).await
}

async fn cmd_ask(command: &str) -> Result<()> {
    let config = db_config()?;
    let translator = translator()?;
    let pool = connect_pool(&config)
        .await
        .context("failed to connect to PostgreSQL")?;

    let pipeline = CommandPipeline::new(
        SchemaIntrospector::new(Arc::new(PgCatalog::new(pool.clone()))),
        translator,
        Arc::new(PgExecutor::new(pool)),
    );

    match pipeline.run(command).await {
        Ok(response) => {
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(())
        }
        Err(e) => {
            println!("{}", serde_json::to_string_pretty(&e.to_json())?);
            Err(e).context("command failed")
        }
    }
}

async fn cmd_schema() -> Result<()> {
    let pool = connect_pool(&db_config()?)
        .await
        .context("failed to connect to PostgreSQL")?;
    let introspector = SchemaIntrospector::new(Arc::new(PgCatalog::new(pool)));
    print!("{}", introspector.describe_schema().await);
    Ok(())
}

fn cmd_classify(sql: &str) {
    let category = classify(sql);
    println!("{} {}", "category:".bold(), category.as_str().cyan());
    if contains_create_database(sql) {
        println!(
            "{} {}",
            "unsafe:".bold(),
            "CREATE DATABASE detected; use create-database instead".red()
        );
    } else {
        println!("{} {}", "unsafe:".bold(), "no".green());
    }
}

fn read_input(input: Option<PathBuf>) -> Result<String> {
    match input {
        Some(path) if path.as_os_str() != "-" => {
            fs::read_to_string(&path).with_context(|| format!("failed to read {}", path.display()))
        }
        _ => {
            let mut text = String::new();
            io::stdin()
                .read_to_string(&mut text)
                .context("failed to read stdin")?;
            Ok(text)
        }
    }
}

fn cmd_extract(input: Option<PathBuf>) -> Result<()> {
    let sql = read_input(input)?;
    let extraction = extract_table_statements(&sql)?;

    eprintln!(
        "{} database {} ({})",
        "✓".green(),
        extraction.database_name.bold(),
        extraction.message()
    );
    let body = serde_json::json!({
        "dbName": extraction.database_name,
        "tables": extraction.table_statements,
        "message": extraction.message(),
    });
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

async fn cmd_create_database(name: &str, tables: &[String]) -> Result<()> {
    let provisioner = PgProvisioner::new(db_config()?);
    match provisioner.create_database(name, tables).await {
        Ok(message) => {
            println!("{} {}", "✓".green(), message);
            Ok(())
        }
        Err(e) => {
            if let Some(detail) = e.detail() {
                eprintln!("{} {}", "✗".red(), detail);
            }
            Err(e.into())
        }
    }
}

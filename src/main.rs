use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use aimem::{config, db};

#[derive(Parser)]
#[command(name = "aimem", version, about = "Semantic memory MCP server for AI assistants")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the MCP server (stdio transport)
    Serve,
    /// Check database health and schema version
    Doctor,
    /// Show stored chunk/session/project counts
    Stats,
    /// Delete the database and start fresh
    Reset {
        /// Skip the confirmation prompt
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = config::AimemConfig::load()?;

    // Log to stderr so stdout stays clean for MCP JSON-RPC.
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Serve => {
            aimem::server::serve_stdio(config).await?;
        }
        Command::Doctor => {
            let conn = db::open_database(config.resolved_db_path())?;
            let report = db::check_database_health(&conn)?;
            println!("schema version:  {}", report.schema_version);
            println!(
                "integrity:       {}",
                if report.integrity_ok {
                    "ok".to_string()
                } else {
                    report.integrity_details
                }
            );
            println!("chunks:          {}", report.chunk_count);
            println!("sessions:        {}", report.session_count);
            println!("projects:        {}", report.project_count);
        }
        Command::Stats => {
            let conn = db::open_database(config.resolved_db_path())?;
            let report = db::check_database_health(&conn)?;
            println!(
                "{} chunks across {} sessions in {} projects",
                report.chunk_count, report.session_count, report.project_count
            );
        }
        Command::Reset { force } => {
            let db_path = config.resolved_db_path();
            if !db_path.exists() {
                println!("nothing to reset: {} does not exist", db_path.display());
                return Ok(());
            }
            if !force {
                println!(
                    "This deletes {} and all stored context. Re-run with --force to confirm.",
                    db_path.display()
                );
                return Ok(());
            }
            std::fs::remove_file(&db_path)?;
            // WAL sidecars go with the main file
            let _ = std::fs::remove_file(db_path.with_extension("db-wal"));
            let _ = std::fs::remove_file(db_path.with_extension("db-shm"));
            println!("removed {}", db_path.display());
        }
    }

    Ok(())
}

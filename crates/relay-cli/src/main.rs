//! Relay CLI — command-line interface for the campaign pipeline.
//!
//! Reuses the same core domain logic (relay-core) and server bootstrap
//! (relay-server) that back the HTTP API.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use relay_cli::commands::{self, traces::TraceFilter};

/// Relay CLI — Email campaign specialist pipeline
#[derive(Parser)]
#[command(name = "relay", version, about = "Relay CLI — Email campaign specialist pipeline")]
pub struct Cli {
    /// Path to a YAML configuration file
    #[arg(long, env = "RELAY_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the Relay HTTP backend server
    Server {
        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        /// Port to listen on
        #[arg(long, default_value_t = 3220)]
        port: u16,
    },

    /// Register a campaign brief (JSON file) and run the full pipeline
    Run {
        /// Path to the brief JSON
        brief: PathBuf,
    },

    /// Resume a failed campaign from its latest handoff
    Resume {
        /// Campaign ID
        campaign_id: String,
    },

    /// Inspect handoff documents
    Handoffs {
        #[command(subcommand)]
        action: HandoffAction,
    },

    /// Query and prune traces
    Traces {
        #[command(subcommand)]
        action: TraceAction,
    },

    /// Export persisted logs
    Logs {
        #[command(subcommand)]
        action: LogAction,
    },
}

#[derive(Subcommand)]
enum HandoffAction {
    /// List all handoffs for a campaign, oldest first
    List { campaign_id: String },
    /// Show one handoff, by id or by stage pair
    Get {
        campaign_id: String,
        #[arg(long)]
        id: Option<String>,
        #[arg(long, requires = "to")]
        from: Option<String>,
        #[arg(long, requires = "from")]
        to: Option<String>,
    },
}

#[derive(Subcommand)]
enum TraceAction {
    /// Query traces with optional filters
    List {
        /// Minimum level (debug|info|warn|error|all)
        #[arg(long)]
        level: Option<String>,
        /// RFC 3339 timestamp
        #[arg(long)]
        since: Option<String>,
        #[arg(long)]
        tool: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        campaign_id: Option<String>,
        /// active|completed|failed
        #[arg(long)]
        status: Option<String>,
    },
    /// Show a single trace
    Get { trace_id: String },
    /// Delete finished traces older than N days
    Prune {
        #[arg(long, default_value_t = 30)]
        older_than_days: i64,
    },
}

#[derive(Subcommand)]
enum LogAction {
    /// Print persisted and pending entries
    Export {
        /// json|text
        #[arg(long, default_value = "json")]
        format: String,
    },
}

#[tokio::main]
async fn main() {
    // Logs go to stderr so command output stays parseable JSON.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "relay_core=warn,relay_server=info,relay_cli=info".into()),
        )
        .init();

    let cli = Cli::parse();

    if let Err(e) = dispatch(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn dispatch(cli: Cli) -> Result<(), String> {
    let config = cli.config;

    let output = match cli.command {
        Commands::Server { host, port } => {
            return commands::server::run(host, port, config).await;
        }

        Commands::Run { brief } => {
            let state = commands::init_state(config.as_deref()).await?;
            commands::run::run(&state, &brief).await?
        }

        Commands::Resume { campaign_id } => {
            let state = commands::init_state(config.as_deref()).await?;
            commands::run::resume(&state, &campaign_id).await?
        }

        Commands::Handoffs { action } => {
            let state = commands::init_state(config.as_deref()).await?;
            match action {
                HandoffAction::List { campaign_id } => {
                    commands::handoffs::list(&state, &campaign_id).await?
                }
                HandoffAction::Get {
                    campaign_id,
                    id,
                    from,
                    to,
                } => {
                    let stages = from.as_deref().zip(to.as_deref());
                    commands::handoffs::get(&state, &campaign_id, id.as_deref(), stages).await?
                }
            }
        }

        Commands::Traces { action } => {
            let state = commands::init_state(config.as_deref()).await?;
            match action {
                TraceAction::List {
                    level,
                    since,
                    tool,
                    limit,
                    campaign_id,
                    status,
                } => {
                    let filter = TraceFilter {
                        level,
                        since,
                        tool,
                        limit,
                        campaign_id,
                        status,
                    };
                    commands::traces::query(&state, &filter).await?
                }
                TraceAction::Get { trace_id } => commands::traces::get(&state, &trace_id).await?,
                TraceAction::Prune { older_than_days } => {
                    commands::traces::prune(&state, older_than_days).await?
                }
            }
        }

        Commands::Logs { action } => {
            let state = commands::init_state(config.as_deref()).await?;
            match action {
                LogAction::Export { format } => {
                    println!("{}", commands::logs::export(&state, &format).await?);
                    return Ok(());
                }
            }
        }
    };

    commands::print_json(&output);
    Ok(())
}

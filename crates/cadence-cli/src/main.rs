//! Cadence CLI — run engagement sequences, answer HITL checkpoints, and
//! chat with the copilot, all on top of the cadence-core engine.

mod commands;

use clap::{Parser, Subcommand};

/// Cadence CLI — sequence execution with human-in-the-loop checkpoints
#[derive(Parser)]
#[command(name = "cadence", version, about = "Cadence CLI — sequence execution engine")]
pub struct Cli {
    /// Path to the SQLite database file
    #[arg(long, env = "CADENCE_DB_PATH", default_value = "cadence.db")]
    db: String,

    /// Organization the commands act on behalf of
    #[arg(long, env = "CADENCE_ORG_ID", default_value = "default")]
    organization_id: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a sequence from a YAML file
    Run {
        /// Path to the sequence YAML file
        file: String,

        /// Simulate: mock outputs, nothing hits the backend
        #[arg(long)]
        simulate: bool,

        /// Hand the whole sequence to the backend in one call
        #[arg(long)]
        delegate: bool,

        /// Fire HITL gates even in simulation mode
        #[arg(long)]
        gates_in_simulation: bool,

        /// Trigger parameters as key=value pairs
        #[arg(long = "param", value_parser = parse_key_val)]
        params: Vec<(String, String)>,

        /// User the execution runs as
        #[arg(long, env = "CADENCE_USER_ID", default_value = "cli-user")]
        user_id: String,
    },

    /// Resolve a pending HITL request and continue its execution
    Resume {
        /// HITL request id
        request_id: String,

        /// Path to the sequence YAML file the request belongs to
        #[arg(long)]
        file: String,

        /// Response value (parsed as JSON when possible, else a string)
        #[arg(long)]
        response: String,
    },

    /// Inspect persisted executions
    Executions {
        #[command(subcommand)]
        action: ExecutionsAction,
    },

    /// Interactive copilot chat session
    Chat {
        /// Persist the conversation to the database
        #[arg(long)]
        persist: bool,
    },
}

#[derive(Subcommand)]
enum ExecutionsAction {
    /// List recent executions
    List {
        /// Maximum rows to show
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    /// Show one execution in full
    Show {
        /// Execution id
        id: String,
    },
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("invalid key=value pair: '{}'", s))?;
    Ok((key.to_string(), value.to_string()))
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cadence_core=warn,cadence_cli=info".into()),
        )
        .init();

    let result = match cli.command {
        Commands::Run {
            file,
            simulate,
            delegate,
            gates_in_simulation,
            params,
            user_id,
        } => {
            let state = commands::init_state(&cli.db);
            commands::run::run(
                &state,
                &file,
                simulate,
                delegate,
                gates_in_simulation,
                params,
                &user_id,
                &cli.organization_id,
            )
            .await
        }

        Commands::Resume {
            request_id,
            file,
            response,
        } => {
            let state = commands::init_state(&cli.db);
            commands::resume::run(&state, &request_id, &file, &response).await
        }

        Commands::Executions { action } => {
            let state = commands::init_state(&cli.db);
            match action {
                ExecutionsAction::List { limit } => {
                    commands::executions::list(&state, &cli.organization_id, limit).await
                }
                ExecutionsAction::Show { id } => commands::executions::show(&state, &id).await,
            }
        }

        Commands::Chat { persist } => {
            let state = commands::init_state(&cli.db);
            commands::chat::run(&state, &cli.organization_id, persist).await
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

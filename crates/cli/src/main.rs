//! cadence CLI — the main entry point.
//!
//! Commands:
//! - `chat`          — Run the conversation loop (single message or interactive)
//! - `explain`       — Ask the recovery advisor about a tool failure
//! - `classify-llm`  — Classify an LLM backend error
//! - `cache-policy`  — Show the effective tool cache policy
//! - `config`        — Show, validate or initialize configuration

use cadence_config::AppConfig;
use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "cadence",
    about = "cadence — agent conversation loop with cached, parallel tool execution",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the agent (offline mock backend)
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Approve every tool call that needs confirmation
        #[arg(short, long)]
        yes: bool,

        /// Override agent.max_iterations
        #[arg(long)]
        max_iterations: Option<u32>,

        /// Override agent.max_tokens
        #[arg(long)]
        max_tokens: Option<u64>,

        /// Print loop events as JSON lines
        #[arg(long)]
        json: bool,
    },

    /// Explain how to recover from a tool failure
    Explain {
        /// Name of the tool that failed
        #[arg(short, long)]
        tool: String,

        /// Failure kind, e.g. FileNotFound
        #[arg(short, long, default_value = "Unknown")]
        kind: String,

        /// Ancestor kinds of the failure, e.g. --lineage Io
        #[arg(long)]
        lineage: Vec<String>,

        /// Failure message
        #[arg(short, long)]
        message: String,

        /// Tool arguments as JSON
        #[arg(short, long)]
        args: Option<String>,
    },

    /// Classify an LLM backend error message
    ClassifyLlm {
        /// Error message returned by the backend
        message: String,

        /// HTTP status code, when known
        #[arg(short, long)]
        status: Option<u16>,
    },

    /// Show the effective tool cache policy
    CachePolicy,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Print the config file path
    Path,
    /// Validate the config file
    Validate,
    /// Write a default config file if none exists
    Init,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // A broken config still gets reported by the command itself.
    let logging = AppConfig::load().map(|c| c.logging).unwrap_or_default();
    init_tracing(cli.verbose, &logging);

    match cli.command {
        Commands::Chat {
            message,
            yes,
            max_iterations,
            max_tokens,
            json,
        } => {
            let args = commands::chat::ChatArgs {
                message,
                yes,
                max_iterations,
                max_tokens,
                json,
            };
            commands::chat::run(args).await?
        }
        Commands::Explain {
            tool,
            kind,
            lineage,
            message,
            args,
        } => commands::explain::run(&tool, &kind, lineage, &message, args.as_deref())?,
        Commands::ClassifyLlm { message, status } => commands::classify::run(&message, status)?,
        Commands::CachePolicy => commands::cache_policy::run()?,
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show()?,
            ConfigAction::Path => commands::config_cmd::path()?,
            ConfigAction::Validate => commands::config_cmd::validate()?,
            ConfigAction::Init => commands::config_cmd::init()?,
        },
    }

    Ok(())
}

fn init_tracing(verbose: bool, logging: &cadence_config::LoggingConfig) {
    let level = if verbose { "debug" } else { logging.level.as_str() };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

//! Docent CLI - queue text documents for analysis and inspect the results.

mod commands;

use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Docent - asynchronous document analysis backed by a local model
#[derive(Parser)]
#[command(name = "docent")]
#[command(author = "Lalo Morales <lalomorales22@github.com>")]
#[command(version)]
#[command(about = "Asynchronous document analysis backed by a local model", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize Docent (create config and database)
    Init,

    /// Inspect configuration
    #[command(subcommand)]
    Config(ConfigCommands),

    /// Submit a text document for analysis
    Submit {
        /// Path to the document
        file: String,
    },

    /// Show the status of a job
    Status {
        /// Job ID
        job_id: String,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// List jobs, newest first
    Jobs {
        /// Filter by state (processing, completed, failed)
        #[arg(short, long)]
        state: Option<String>,

        /// Maximum number of jobs to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Show work queue totals
    Queue {
        /// List dead-lettered messages
        #[arg(long)]
        dead: bool,

        /// Delete delivered messages
        #[arg(long)]
        purge: bool,
    },

    /// Run analysis workers
    Worker {
        /// Number of concurrent consumers (default: from config)
        #[arg(short, long)]
        concurrency: Option<usize>,

        /// Process everything currently deliverable, then exit
        #[arg(long)]
        once: bool,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Print the config file location
    Path,
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("docent=debug,info"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("docent=info,warn"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Init => commands::init::run(),
        Commands::Config(cmd) => match cmd {
            ConfigCommands::Show => commands::config::show(),
            ConfigCommands::Path => commands::config::path(),
        },
        Commands::Submit { file } => commands::submit::run(&file),
        Commands::Status { job_id, json } => commands::status::run(&job_id, json),
        Commands::Jobs { state, limit } => commands::jobs::run(state, limit),
        Commands::Queue { dead, purge } => commands::queue::run(dead, purge),
        Commands::Worker { concurrency, once } => commands::worker::run(concurrency, once),
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

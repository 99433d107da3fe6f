//! Tether command-line runner
//!
//! Evaluates scripts against the sample host classes, pumps the host main
//! loop so timers get a chance to fire, and prints the completion value.

mod commands;
mod output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tether")]
#[command(about = "Run scripts against a reflective host", long_about = None)]
#[command(version)]
struct Cli {
    /// Tracing filter, e.g. `debug` or `tether_runtime=trace` (overrides RUST_LOG)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Color output: auto, always, never
    #[arg(long, global = true)]
    color: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a script file
    Run {
        /// Script file
        file: PathBuf,
        /// Bridge configuration (tether.toml)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// How long to pump the main loop for timers, in milliseconds
        #[arg(long, default_value_t = 1000)]
        wait_ms: u64,
    },

    /// Evaluate inline code
    Eval {
        /// Source to evaluate
        code: String,
        /// Bridge configuration (tether.toml)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// How long to pump the main loop for timers, in milliseconds
        #[arg(long, default_value_t = 1000)]
        wait_ms: u64,
    },

    /// List the host classes scripts can reach
    Classes,
}

fn init_logging(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref());
    let choice = output::resolve_color_choice(cli.color.as_deref());

    let result = match cli.command {
        Commands::Run {
            file,
            config,
            wait_ms,
        } => commands::run::execute(&file, config.as_deref(), wait_ms, choice),
        Commands::Eval {
            code,
            config,
            wait_ms,
        } => commands::eval::execute(&code, config.as_deref(), wait_ms, choice),
        Commands::Classes => commands::classes::execute(choice),
    };

    if let Err(e) = result {
        let mut out = output::StyledOutput::new(choice);
        out.stderr_error("error: ");
        out.stderr_plain(&format!("{:#}\n", e));
        std::process::exit(1);
    }
}

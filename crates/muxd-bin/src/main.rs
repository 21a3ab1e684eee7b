//! muxd - batch request multiplexing daemon.

mod app;
mod handlers;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use muxd_config_and_utils::{init_logging, parse_level, Config, Paths};

/// muxd command-line interface.
#[derive(Parser)]
#[command(name = "muxd")]
#[command(about = "Batch request multiplexing daemon")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error). Defaults to the configured level.
    #[arg(short, long, global = true, env = "MUXD_LOG_LEVEL")]
    log_level: Option<String>,

    /// Base directory for runtime files (socket, logs, config). Defaults to ~/.muxd
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon in the foreground
    Start,
    /// Check whether the daemon answers a health request
    Status,
    /// Send a single request and print its result
    Call {
        /// Request type, e.g. `echo` or `kv.get`
        request_type: String,
        /// JSON arguments (defaults to null)
        args: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let paths = match cli.base_dir {
        Some(base) => Paths::with_base_dir(base),
        None => Paths::new()?,
    };
    let config = Config::load(&paths)?;
    let level = parse_level(cli.log_level.as_deref().unwrap_or(&config.log_level))?;

    match cli.command {
        Some(Commands::Start) | None => {
            init_logging(level, Some(paths.log_file()));
            app::run_daemon(config, paths).await?;
        }
        Some(Commands::Status) => {
            init_logging(level, None);
            app::check_status(&config, &paths).await?;
        }
        Some(Commands::Call { request_type, args }) => {
            init_logging(level, None);
            app::call(&config, &paths, &request_type, args.as_deref()).await?;
        }
    }

    Ok(())
}

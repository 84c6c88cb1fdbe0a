use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use langchurn::config::Config;
use langchurn::credentials::{CredentialProvider, EnvCredentials};
use langchurn::display::DisplayManager;
use langchurn::logging::init_logging;
use langchurn::{FailurePolicy, FanOutAggregator, FanOutOptions, HttpForgeClient};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "langchurn")]
#[command(about = "Per-language lines added and deleted from a user's recent pushes")]
#[command(version)]
struct Cli {
    /// Path to a TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute churn statistics (default)
    Stats {
        /// User whose events are analysed (defaults to the authenticated user)
        #[arg(long)]
        user: Option<String>,
        /// Maximum concurrent commit fetches
        #[arg(long)]
        concurrency: Option<usize>,
        /// Abort on the first commit that cannot be fetched
        #[arg(long)]
        fail_fast: bool,
        /// Give up after this many seconds
        #[arg(long)]
        timeout: Option<u64>,
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
    /// Show the extension to language table
    Languages {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let command = cli.command.unwrap_or(Commands::Stats {
        user: None,
        concurrency: None,
        fail_fast: false,
        timeout: None,
        json: false,
    });

    let json = match &command {
        Commands::Stats { json, .. } | Commands::Languages { json } => *json,
    };

    let mut config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => return handle_error(e, json),
    };

    match command {
        Commands::Stats {
            user,
            concurrency,
            fail_fast,
            timeout,
            json,
        } => {
            if let Some(n) = concurrency {
                config.fanout.concurrency = n;
            }
            if fail_fast {
                config.fanout.fail_fast = true;
            }
            if timeout.is_some() {
                config.fanout.run_timeout_secs = timeout;
            }
            if let Err(e) = config.validate() {
                return handle_error(e, json);
            }

            let _guard = init_logging(&config.logging, &config.paths.log_directory);

            match run_stats(&config, user, json).await {
                Ok(()) => Ok(()),
                Err(e) => handle_error(e, json),
            }
        }
        Commands::Languages { json } => {
            DisplayManager::new().display_languages(&config.languages.classifier(), json);
            Ok(())
        }
    }
}

async fn run_stats(config: &Config, user: Option<String>, json: bool) -> Result<()> {
    let credentials = EnvCredentials.credentials()?;
    let user = user.unwrap_or_else(|| credentials.username.clone());

    let client = HttpForgeClient::new(&config.api, credentials)
        .context("Failed to build HTTP client")?;
    let options = FanOutOptions::from_config(config);
    let fail_fast = options.failure_policy == FailurePolicy::FailFast;
    let aggregator = FanOutAggregator::new(
        Arc::new(client),
        Arc::new(config.languages.classifier()),
        options,
    );

    let shutdown = async {
        if tokio::signal::ctrl_c().await.is_err() {
            // No signal handler available; never cancel
            std::future::pending::<()>().await;
        }
    };

    let outcome = aggregator
        .run_until(&user, shutdown)
        .await
        .with_context(|| format!("Failed to compute churn for {user}"))?;

    DisplayManager::new().display_outcome(&outcome, json);

    // Under fail-fast a truncated feed still prints, then exits non-zero
    if fail_fast && !outcome.is_complete() {
        anyhow::bail!("event feed could not be read completely");
    }
    Ok(())
}

fn handle_error(e: anyhow::Error, json: bool) -> Result<(), anyhow::Error> {
    if json {
        println!("{}", serde_json::json!({ "error": format!("{:#}", e) }));
    } else {
        eprintln!("Error: {:#}", e);
    }
    process::exit(1);
}

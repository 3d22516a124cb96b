use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use repostbot::adapter::AdapterClient;
use repostbot::config::Settings;
use repostbot::pipeline::{self, LoopPolicy};
use repostbot::state::CursorStore;
use repostbot::telegram::TelegramClient;

#[derive(Parser)]
#[command(
    name = "repostbot",
    about = "Mirrors channel posts through a rewriting service"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check the source channel once and publish any new posts
    PollOnce {
        /// Path of the JSON state file holding the last consumed update id
        #[arg(long, default_value = ".repostbot_state.json")]
        state_file: PathBuf,
    },
    /// Poll the source channel forever
    RunLoop {
        /// Seconds to sleep between polls
        #[arg(long, default_value_t = 60)]
        interval: u64,
        /// Log cycle failures and keep polling instead of exiting
        #[arg(long)]
        keep_going: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,repostbot=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    // Configuration problems are reported before anything touches the network.
    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(1);
        }
    };

    let masked = settings
        .masked()
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join(", ");
    info!("loaded settings: {masked}");

    let telegram = TelegramClient::new(
        &settings.telegram_bot_token,
        settings.telegram_source_chat_id,
        &settings.telegram_target_channel,
    )?;
    let adapter = AdapterClient::new(&settings.deepseek_api_key)?;

    match cli.command {
        Command::PollOnce { state_file } => {
            let store = CursorStore::new(state_file);
            pipeline::poll_once(&telegram, &adapter, &telegram, &store).await?;
        }
        Command::RunLoop {
            interval,
            keep_going,
        } => {
            let on_error = if keep_going {
                LoopPolicy::KeepGoing
            } else {
                LoopPolicy::Stop
            };
            info!("polling every {interval}s");
            pipeline::poll_loop(
                &telegram,
                &adapter,
                &telegram,
                Duration::from_secs(interval),
                on_error,
            )
            .await?;
        }
    }

    Ok(())
}

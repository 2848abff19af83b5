mod config;
mod feedback;
mod input;
mod preferences;
mod shell;

use std::{path::PathBuf, sync::Arc};

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use client_core::{
    ColorizeSession, HttpColorizeBackend, SessionOptions, ThemeSink, HISTORY_CAPACITY,
};
use shared::domain::Theme;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::{
    config::{load_config, timeout_from_secs},
    feedback::{describe_download_failure, describe_failure},
    preferences::PreferencesStore,
};

#[derive(Parser, Debug)]
#[command(name = "colorizer", about = "Colorize black-and-white photos with a remote service")]
struct Cli {
    /// TOML config file; defaults to ./colorizer.toml when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[arg(long, global = true)]
    service_url: Option<String>,
    /// Request timeout in seconds; 0 disables it.
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,
    #[arg(long, global = true)]
    settings_file: Option<PathBuf>,
    /// Keep settings in memory only.
    #[arg(long, global = true)]
    ephemeral: bool,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Colorize one image and save the result.
    Colorize {
        input: PathBuf,
        /// File or directory to write to; defaults to the current directory.
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        low_quality: bool,
        #[arg(long)]
        no_auto_save: bool,
    },
    /// Interactive session (the default).
    Shell,
}

struct TerminalTheme;

impl ThemeSink for TerminalTheme {
    fn apply_theme(&self, theme: Theme) {
        info!(dark = theme.is_dark(), "theme applied");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref())?;
    if let Some(url) = cli.service_url {
        config.service_url = url;
    }
    if let Some(secs) = cli.timeout_secs {
        config.request_timeout = timeout_from_secs(secs);
    }

    let preferences = if cli.ephemeral {
        PreferencesStore::ephemeral()
    } else if let Some(path) = cli.settings_file {
        PreferencesStore::at(path)
    } else {
        PreferencesStore::user_default().unwrap_or_else(|err| {
            warn!("settings will not be saved: {err:#}");
            PreferencesStore::ephemeral()
        })
    };

    let backend = HttpColorizeBackend::new(&config.service_url, config.request_timeout)?;
    info!(endpoint = %backend.endpoint(), "using colorization service");
    let session = ColorizeSession::new_with_options(
        Arc::new(backend),
        SessionOptions {
            settings: preferences.load(),
            progress: config.progress,
            history_capacity: HISTORY_CAPACITY,
            theme_sink: Arc::new(TerminalTheme),
        },
    );

    match cli.command.unwrap_or(Command::Shell) {
        Command::Colorize {
            input,
            output,
            low_quality,
            no_auto_save,
        } => {
            if low_quality {
                session.set_high_quality(false);
            }
            if no_auto_save {
                session.set_auto_save(false);
            }
            let upload = input::load_upload(&input, config.max_upload_bytes).await?;
            session.select_image(upload);

            let progress_task = shell::spawn_progress_printer(&session, true);
            let outcome = session.submit().await;
            if outcome.is_ok() {
                // The final 100% is already published; let the printer report it.
                let _ = progress_task.await;
            } else {
                progress_task.abort();
            }
            let result = outcome.map_err(|err| anyhow!(describe_failure(&err)))?;

            let destination = output.unwrap_or_else(|| PathBuf::from("."));
            let path = session
                .download_result(&result.colorized, &destination)
                .await
                .map_err(|err| anyhow!(describe_download_failure(&err)))?;
            println!("saved {}", path.display());
        }
        Command::Shell => {
            shell::run_shell(session, preferences, config.max_upload_bytes).await?;
        }
    }

    Ok(())
}

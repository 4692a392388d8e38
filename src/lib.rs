pub mod classifier;
pub mod cli;
pub mod commands;
pub mod db;
pub mod frames;
pub mod scan;
pub mod settings;
mod utils;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;

use cli::{Cli, Command, ConfigAction};
use db::{Database, HistoryFilter};
use settings::{resolve_data_dir, SettingsStore, DATABASE_FILE, SETTINGS_FILE};

/// Everything the front end needs, built once at startup and passed down.
pub struct AppState {
    pub db: Database,
    pub settings: SettingsStore,
    data_dir: PathBuf,
}

impl AppState {
    pub fn open(data_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;

        let database = Database::new(data_dir.join(DATABASE_FILE))?;
        let settings = SettingsStore::new(data_dir.join(SETTINGS_FILE))?;

        Ok(Self {
            db: database,
            settings,
            data_dir,
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

pub fn run() -> Result<()> {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let cli = Cli::parse();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    runtime.block_on(async move {
        let data_dir = resolve_data_dir(cli.data_dir)?;
        let state = AppState::open(data_dir)?;
        log::info!("fruitscan using data directory {}", state.data_dir().display());

        match cli.command {
            Command::Scan { images } => commands::scan(&state, &images).await,
            Command::History {
                filter,
                search,
                json,
            } => {
                let filter = HistoryFilter {
                    freshness: filter.into(),
                    search,
                };
                commands::history(&state, filter, json).await
            }
            Command::Show { id } => commands::show(&state, id).await,
            Command::Pin { id } => commands::set_pinned(&state, id, true).await,
            Command::Unpin { id } => commands::set_pinned(&state, id, false).await,
            Command::Delete { id } => commands::delete(&state, id).await,
            Command::Clear => commands::clear(&state).await,
            Command::Watch => commands::watch(&state).await,
            Command::Config { action } => match action {
                ConfigAction::Show => commands::config_show(&state),
                ConfigAction::Set(changes) => commands::config_set(&state, &changes),
            },
        }
    })
}

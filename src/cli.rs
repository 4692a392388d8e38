use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::db::FreshnessFilter;
use crate::settings::ScannerSettings;

/// Command line front end for scanning produce and browsing scan history.
#[derive(Parser, Debug, Clone)]
#[command(name = "fruitscan", author, version, about, long_about = None)]
pub struct Cli {
    /// Data directory holding the database, settings and models
    /// (defaults to $FRUITSCAN_DATA_DIR, then the platform data dir).
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Feed images through the live pipeline and capture one scan per image.
    Scan {
        #[arg(required = true)]
        images: Vec<PathBuf>,
    },
    /// List scan history, pinned first then newest first.
    History {
        #[arg(long, value_enum, default_value_t = FilterArg::All)]
        filter: FilterArg,
        /// Case-insensitive fruit name search.
        #[arg(long)]
        search: Option<String>,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Show one scan record.
    Show { id: i64 },
    /// Pin a record to the top of the history (at most 3).
    Pin { id: i64 },
    Unpin { id: i64 },
    /// Delete one record.
    Delete { id: i64 },
    /// Delete the whole history.
    Clear,
    /// Print the history again every time it changes, until Ctrl-C.
    Watch,
    /// Show or change scanner settings.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigAction {
    /// Print the settings and the files in use.
    Show,
    /// Change one or more settings and save them.
    Set(SettingsArgs),
}

#[derive(Args, Debug, Clone, Default, PartialEq)]
pub struct SettingsArgs {
    /// Species model file, relative to the data directory unless absolute.
    #[arg(long)]
    pub species_model: Option<PathBuf>,
    #[arg(long)]
    pub freshness_model: Option<PathBuf>,
    /// Minimum species confidence, within [0, 1].
    #[arg(long)]
    pub confidence_threshold: Option<f32>,
    #[arg(long)]
    pub freshness_threshold: Option<f32>,
    #[arg(long)]
    pub frame_wait_ms: Option<u64>,
}

impl SettingsArgs {
    /// Copies every given flag into `settings`. Returns whether any was given.
    pub fn apply(&self, settings: &mut ScannerSettings) -> bool {
        let mut changed = false;
        if let Some(path) = &self.species_model {
            settings.species_model = path.clone();
            changed = true;
        }
        if let Some(path) = &self.freshness_model {
            settings.freshness_model = path.clone();
            changed = true;
        }
        if let Some(value) = self.confidence_threshold {
            settings.confidence_threshold = value;
            changed = true;
        }
        if let Some(value) = self.freshness_threshold {
            settings.freshness_threshold = value;
            changed = true;
        }
        if let Some(value) = self.frame_wait_ms {
            settings.frame_wait_ms = value;
            changed = true;
        }
        changed
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterArg {
    All,
    Fresh,
    Rotten,
    NotChecked,
}

impl From<FilterArg> for FreshnessFilter {
    fn from(value: FilterArg) -> Self {
        match value {
            FilterArg::All => FreshnessFilter::All,
            FilterArg::Fresh => FreshnessFilter::Fresh,
            FilterArg::Rotten => FreshnessFilter::Rotten,
            FilterArg::NotChecked => FreshnessFilter::NotChecked,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_history_filters() {
        let cli = Cli::try_parse_from([
            "fruitscan",
            "history",
            "--filter",
            "not-checked",
            "--search",
            "ban",
        ])
        .unwrap();

        match cli.command {
            Command::History {
                filter,
                search,
                json,
            } => {
                assert_eq!(FreshnessFilter::from(filter), FreshnessFilter::NotChecked);
                assert_eq!(search.as_deref(), Some("ban"));
                assert!(!json);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn scan_requires_images() {
        assert!(Cli::try_parse_from(["fruitscan", "scan"]).is_err());
    }

    #[test]
    fn config_set_applies_only_given_flags() {
        let cli = Cli::try_parse_from([
            "fruitscan",
            "config",
            "set",
            "--confidence-threshold",
            "0.8",
            "--frame-wait-ms",
            "500",
        ])
        .unwrap();

        let Command::Config {
            action: ConfigAction::Set(args),
        } = cli.command
        else {
            panic!("expected config set");
        };

        let mut settings = ScannerSettings::default();
        assert!(args.apply(&mut settings));
        assert_eq!(settings.confidence_threshold, 0.8);
        assert_eq!(settings.frame_wait_ms, 500);
        assert_eq!(
            settings.freshness_threshold,
            ScannerSettings::default().freshness_threshold
        );

        assert!(!SettingsArgs::default().apply(&mut settings));
    }

    #[test]
    fn data_dir_is_global() {
        let cli = Cli::try_parse_from(["fruitscan", "pin", "4", "--data-dir", "/tmp/x"]).unwrap();
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/x")));
        assert!(matches!(cli.command, Command::Pin { id: 4 }));
    }
}

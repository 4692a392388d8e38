//! Handlers behind each CLI subcommand. They only orchestrate and render;
//! all state changes go through [`Database`](crate::db::Database) and
//! [`ScanController`].

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local};
use log::warn;

use crate::{
    classifier::{FreshnessClassifier, SpeciesClassifier},
    cli::SettingsArgs,
    db::{HistoryFilter, PinOutcome, ScanRecord},
    frames::{FrameFeed, FrameStore, RawFrame},
    scan::{CaptureOutcome, ScanController, ScanDecision},
    AppState,
};

const NOT_CHECKED: &str = "Not Checked";

pub fn render_decision(decision: &ScanDecision) -> String {
    format!(
        "{} | {} | {:.1}%",
        decision.species,
        decision.freshness.map(|f| f.as_str()).unwrap_or(NOT_CHECKED),
        decision.confidence * 100.0
    )
}

pub fn render_record(record: &ScanRecord) -> String {
    let when = DateTime::from_timestamp_millis(record.timestamp)
        .map(|dt| {
            dt.with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
        })
        .unwrap_or_else(|| record.timestamp.to_string());

    format!(
        "#{:<5} {:<14} {:<12} {:>5.1}%  {}{}",
        record.id.map(|id| id.to_string()).unwrap_or_else(|| "-".into()),
        record.fruit_name,
        record.freshness.map(|f| f.as_str()).unwrap_or(NOT_CHECKED),
        record.confidence * 100.0,
        when,
        if record.pinned { "  [pinned]" } else { "" }
    )
}

fn print_history(records: &[ScanRecord]) {
    if records.is_empty() {
        println!("No scans yet.");
        return;
    }
    for record in records {
        println!("{}", render_record(record));
    }
}

pub async fn scan(state: &AppState, images: &[PathBuf]) -> Result<()> {
    let settings = state.settings.current();

    // Without both models there is no scan capability at all.
    let species = SpeciesClassifier::load(&state.settings.model_path(&settings.species_model))?;
    let freshness =
        FreshnessClassifier::load(&state.settings.model_path(&settings.freshness_model))?;

    let frames = FrameStore::new();
    let mut feed = FrameFeed::new();
    let sink = feed.start(frames.clone())?;
    let (controller, mut failures) = ScanController::new(
        frames.clone(),
        species,
        freshness,
        settings.policy(),
        state.db.clone(),
    );

    let frame_wait = Duration::from_millis(settings.frame_wait_ms);
    let mut last_frame_id = None;

    for path in images {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!("Skipping {}: {err}", path.display());
                println!("{}: unreadable, skipped", path.display());
                continue;
            }
        };

        if !sink.push(RawFrame::Encoded(bytes)) {
            bail!("frame feed stopped before {} could be scanned", path.display());
        }

        match frames.wait_for_frame_after(last_frame_id, frame_wait).await {
            Some(frame) => last_frame_id = Some(frame.id),
            None => {
                println!("{}: could not decode a frame, skipped", path.display());
                continue;
            }
        }

        match controller.capture().await? {
            CaptureOutcome::NoFrame => println!("{}: no frame available", path.display()),
            CaptureOutcome::Decided(decision) => {
                println!("{}: {}", path.display(), render_decision(&decision))
            }
        }
    }

    controller.drain().await;
    feed.stop().await?;

    let mut unsaved = 0usize;
    while let Ok(failure) = failures.try_recv() {
        eprintln!(
            "not saved: {} ({})",
            render_decision(&failure.decision),
            failure.error
        );
        unsaved += 1;
    }
    if unsaved > 0 {
        bail!("{unsaved} scan result(s) could not be saved");
    }

    Ok(())
}

pub async fn history(state: &AppState, filter: HistoryFilter, json: bool) -> Result<()> {
    let records = state.db.search_scan_records(&filter).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
    } else {
        print_history(&records);
    }
    Ok(())
}

pub async fn show(state: &AppState, id: i64) -> Result<()> {
    match state.db.get_scan_record(id).await? {
        Some(record) => println!(
            "{}",
            serde_json::to_string_pretty(&record).context("failed to render record")?
        ),
        None => println!("No scan #{id}."),
    }
    Ok(())
}

pub fn describe_pin(id: i64, pinned: bool, outcome: PinOutcome) -> String {
    match outcome {
        PinOutcome::Updated if pinned => format!("Pinned #{id}."),
        PinOutcome::Updated => format!("Unpinned #{id}."),
        PinOutcome::NotFound => format!("No scan #{id}."),
        PinOutcome::LimitReached { limit } => {
            format!("Only {limit} pins are allowed. Please unpin an item first.")
        }
    }
}

pub async fn set_pinned(state: &AppState, id: i64, pinned: bool) -> Result<()> {
    let outcome = state.db.set_scan_pinned(id, pinned).await?;
    println!("{}", describe_pin(id, pinned, outcome));
    Ok(())
}

pub async fn delete(state: &AppState, id: i64) -> Result<()> {
    if state.db.delete_scan_record(id).await? {
        println!("Deleted #{id}.");
    } else {
        println!("No scan #{id}.");
    }
    Ok(())
}

pub async fn clear(state: &AppState) -> Result<()> {
    let removed = state.db.delete_all_scan_records().await?;
    println!("Cleared {removed} scan(s).");
    Ok(())
}

pub async fn watch(state: &AppState) -> Result<()> {
    let mut subscription = state.db.subscribe_history();
    print_history(&subscription.current());

    loop {
        tokio::select! {
            snapshot = subscription.changed() => {
                let Some(snapshot) = snapshot else {
                    break;
                };
                println!("--");
                print_history(&snapshot);
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    Ok(())
}

pub fn config_show(state: &AppState) -> Result<()> {
    println!("settings: {}", state.settings.path().display());
    println!("database: {}", state.db.path().display());
    println!(
        "{}",
        serde_json::to_string_pretty(&state.settings.current())
            .context("failed to render settings")?
    );
    Ok(())
}

pub fn config_set(state: &AppState, changes: &SettingsArgs) -> Result<()> {
    let mut settings = state.settings.current();
    if !changes.apply(&mut settings) {
        bail!("nothing to change; pass at least one setting flag");
    }
    state.settings.update(settings)?;
    config_show(state)
}

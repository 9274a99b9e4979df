// src/main.rs

use anyhow::{Context, Result};
use hazard_trajectory::analytics::{build_history, prepare_heatmap, CoverageFilter};
use hazard_trajectory::commit::{CommitCoordinator, CommitReport, RecorderMetrics};
use hazard_trajectory::geofence::{load_perimeter_or_none, load_zones_or_empty};
use hazard_trajectory::recording::{RecordingSession, SessionEvent};
use hazard_trajectory::replay::{
    find_track_logs, load_track_log, replay_entries, write_unsaved, TrackEntry,
};
use hazard_trajectory::storage::{HttpStore, InMemoryStore, TrajectoryStore};
use hazard_trajectory::types::{Config, LatLng, StorageBackend};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.yaml".to_string());
    let config = Config::load(&config_path)?;

    tracing_subscriber::fmt()
        .with_env_filter(format!("hazard_trajectory={}", config.logging.level))
        .init();

    info!("🛰️  Hazard Trajectory Recorder Starting");
    info!("✓ Configuration loaded from {}", config_path);
    info!(
        "Snapshot interval: {}s, storage: {:?}, user: {}",
        config.recording.snapshot_interval_secs, config.storage.backend, config.storage.user_id
    );

    let source_timeout = Duration::from_secs(config.storage.timeout_secs);
    let zones = Arc::new(load_zones_or_empty(config.sources.zones.as_deref(), source_timeout).await);
    let perimeter =
        load_perimeter_or_none(config.sources.perimeter.as_deref(), source_timeout).await;
    info!(
        "✓ {} hazard zone(s) armed, perimeter {}",
        zones.len(),
        if perimeter.is_some() { "loaded" } else { "absent" }
    );

    let store: Arc<dyn TrajectoryStore> = match config.storage.backend {
        StorageBackend::Memory => Arc::new(InMemoryStore::new()),
        StorageBackend::Http => Arc::new(
            HttpStore::new(&config.storage.base_url, config.storage.timeout_secs)
                .context("Failed to build HTTP storage client")?,
        ),
    };

    let metrics = RecorderMetrics::new();
    let coordinator =
        CommitCoordinator::new(Arc::clone(&store), config.storage.user_id.clone(), metrics.clone());
    let mut session = RecordingSession::new(
        Arc::clone(&zones),
        config.recording.event_bus_capacity,
        metrics.clone(),
    );

    let logs = find_track_logs(&config.replay.input_dir);
    if logs.is_empty() {
        warn!("No track logs found in {}", config.replay.input_dir);
    }

    for (idx, path) in logs.iter().enumerate() {
        info!("========================================");
        info!("Replaying track log {}/{}: {}", idx + 1, logs.len(), path.display());
        info!("========================================");

        match process_track_log(path, &mut session, &coordinator, &config).await {
            Ok(Some(report)) => {
                info!(
                    "✓ Stored as {}: {} point(s), {} observation(s){}",
                    report.trajectory_id,
                    report.points_persisted,
                    report.observations_persisted,
                    if report.is_degraded() { " (degraded)" } else { "" }
                );
            }
            Ok(None) => info!("Track log was empty, nothing recorded"),
            Err(e) => error!("❌ Track log {} failed: {:#}", path.display(), e),
        }
    }

    // Fire-and-forget danger index tasks get a moment to land
    tokio::time::sleep(Duration::from_millis(200)).await;

    let filter = CoverageFilter::new(
        perimeter.clone(),
        config.analytics.coverage_threshold_percent,
    );
    match build_history(store.as_ref(), &config.storage.user_id, &filter).await {
        Ok(report) => {
            info!("📜 History for {}", config.storage.user_id);
            for entry in &report.entries {
                let index = entry
                    .danger_index
                    .map(|d| format!("{:.2}", d.value))
                    .unwrap_or_else(|| "no data".to_string());
                let relative = entry
                    .relative_to(&report.population)
                    .map(|r| format!("{:+.2}", r))
                    .unwrap_or_else(|| "n/a".to_string());
                info!(
                    "  {} started {}: {} point(s), danger index {} ({} vs. average)",
                    entry.trajectory_id, entry.started_at, entry.point_count, index, relative
                );
            }
            info!(
                "  {} excluded by coverage, population average {:?} over {} trajectory(ies)",
                report.excluded, report.population.average, report.population.count
            );
        }
        Err(e) => error!("❌ Failed to load history: {}", e),
    }

    match store.heatmap_points().await {
        Ok(points) => {
            let samples = prepare_heatmap(&points, perimeter.as_ref());
            info!("🔥 Heatmap: {} sample(s) from {} report(s)", samples.len(), points.len());
        }
        Err(e) => warn!("Heatmap unavailable: {}", e),
    }

    let summary = serde_json::to_string_pretty(&metrics.summary())?;
    info!("📊 Recorder metrics:\n{}", summary);

    Ok(())
}

async fn process_track_log(
    path: &Path,
    session: &mut RecordingSession,
    coordinator: &CommitCoordinator,
    config: &Config,
) -> Result<Option<CommitReport>> {
    let entries = load_track_log(path)?;
    if entries.is_empty() {
        return Ok(None);
    }

    let fallback = entries
        .iter()
        .find_map(|e| match e {
            TrackEntry::Position {
                latitude,
                longitude,
                ..
            } => Some(LatLng::new(*latitude, *longitude)),
            TrackEntry::Observation { .. } => None,
        })
        .unwrap_or_else(|| LatLng::new(0.0, 0.0));
    let interval = chrono::Duration::seconds(config.recording.snapshot_interval_secs as i64);

    let summary = replay_entries(session, &entries, interval, fallback)?;
    info!(
        "Replayed {} entries: {} tick sample(s), {} zone prompt(s), {} observation(s) ({} rejected)",
        summary.entries,
        summary.ticks,
        summary.zone_entries,
        summary.observations,
        summary.rejected_observations
    );
    log_events(session.drain_events());

    let mut result = session.commit(coordinator).await;
    log_events(session.drain_events());
    if let Err(e) = &result {
        warn!("Commit failed ({}); retrying once", e);
        result = session.commit(coordinator).await;
        log_events(session.drain_events());
    }

    match result {
        Ok(report) => Ok(Some(report)),
        Err(e) => {
            // The session must be Idle for the next log; keep the buffer on disk
            match session.snapshot() {
                Some(trajectory) => match write_unsaved(path, &trajectory) {
                    Ok(saved) => warn!("Unsaved trajectory written to {}", saved.display()),
                    Err(write_err) => error!(
                        "❌ Dropping unsaved trajectory ({} point(s)): {:#}",
                        trajectory.points.len(),
                        write_err
                    ),
                },
                None => warn!("No buffered trajectory left after failed commit"),
            }
            if let Err(discard_err) = session.discard() {
                warn!("Could not discard after failed commit: {}", discard_err);
            }
            Err(e.into())
        }
    }
}

fn log_events(events: Vec<SessionEvent>) {
    for event in events {
        match event {
            SessionEvent::Status(message) => debug!("status: {}", message),
            SessionEvent::PromptRequested { zone_index, at } => {
                info!("⚠️  Hazard prompt for zone {} at {}", zone_index, at)
            }
            other => debug!("event: {:?}", other),
        }
    }
}

// src/replay.rs
//
// Deterministic replay of recorded track logs. A track log is JSON lines,
// one entry per line:
//
//   {"kind":"position","latitude":47.3,"longitude":8.5,"accuracy":4.0,"captured_at":"..."}
//   {"kind":"observation","description":"tram rails","severity":3,"captured_at":"..."}
//
// Time is the log's own clock: snapshot ticks fire at every interval
// boundary after the first entry, before any entry at or past that instant.

use crate::error::SessionError;
use crate::geofence::ZoneTransition;
use crate::recording::RecordingSession;
use crate::types::{LatLng, Position, Trajectory};
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TrackEntry {
    Position {
        latitude: f64,
        longitude: f64,
        #[serde(default)]
        accuracy: f64,
        captured_at: DateTime<Utc>,
    },
    Observation {
        description: String,
        severity: i64,
        captured_at: DateTime<Utc>,
    },
}

impl TrackEntry {
    pub fn captured_at(&self) -> DateTime<Utc> {
        match self {
            Self::Position { captured_at, .. } | Self::Observation { captured_at, .. } => {
                *captured_at
            }
        }
    }

    fn as_position(&self) -> Option<Position> {
        match self {
            Self::Position {
                latitude,
                longitude,
                accuracy,
                captured_at,
            } => Some(Position {
                latitude: *latitude,
                longitude: *longitude,
                accuracy: *accuracy,
                captured_at: *captured_at,
            }),
            Self::Observation { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReplaySummary {
    pub entries: usize,
    pub ticks: usize,
    pub zone_entries: usize,
    pub observations: usize,
    pub rejected_observations: usize,
}

/// All `*.jsonl` files below `dir`, sorted by path.
pub fn find_track_logs(dir: impl AsRef<Path>) -> Vec<PathBuf> {
    let mut logs: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| p.extension().and_then(|ext| ext.to_str()) == Some("jsonl"))
        .collect();
    logs.sort();
    info!("Found {} track log(s)", logs.len());
    logs
}

/// Parse a track log; blank lines are skipped. Entries come back in time
/// order (stable for equal timestamps).
pub fn parse_track_log(contents: &str) -> Result<Vec<TrackEntry>> {
    let mut entries = Vec::new();
    for (idx, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let entry: TrackEntry = serde_json::from_str(line)
            .with_context(|| format!("Invalid track entry on line {}", idx + 1))?;
        entries.push(entry);
    }
    entries.sort_by_key(|e| e.captured_at());
    Ok(entries)
}

pub fn load_track_log(path: impl AsRef<Path>) -> Result<Vec<TrackEntry>> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read track log {}", path.display()))?;
    parse_track_log(&contents).with_context(|| format!("In {}", path.display()))
}

/// Persist a trajectory whose commit failed next to its track log as
/// `<stem>.unsaved.json`, so discarding the session loses nothing.
pub fn write_unsaved(log_path: &Path, trajectory: &Trajectory) -> Result<PathBuf> {
    let stem = log_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("trajectory");
    let target = log_path.with_file_name(format!("{}.unsaved.json", stem));
    let json = serde_json::to_string_pretty(trajectory)?;
    fs::write(&target, json)
        .with_context(|| format!("Failed to write {}", target.display()))?;
    Ok(target)
}

/// Drive an idle session through `entries` and leave it Stopped at the time
/// of the last entry. The first position, if it opens the log, is the
/// initial fix. Observations before any position fall back to `fallback`.
pub fn replay_entries(
    session: &mut RecordingSession,
    entries: &[TrackEntry],
    interval: Duration,
    fallback: LatLng,
) -> Result<ReplaySummary, SessionError> {
    let mut summary = ReplaySummary::default();
    let Some(first) = entries.first() else {
        return Ok(summary);
    };

    let started_at = first.captured_at();
    session.start(started_at, first.as_position())?;

    let mut next_tick = started_at + interval;
    for entry in entries {
        let at = entry.captured_at();
        while next_tick <= at {
            if session.on_snapshot_tick(next_tick).is_some() {
                summary.ticks += 1;
            }
            next_tick += interval;
        }

        match entry {
            TrackEntry::Position { .. } => {
                if let Some(position) = entry.as_position() {
                    if matches!(session.on_position(position), ZoneTransition::Entered(_)) {
                        summary.zone_entries += 1;
                    }
                }
            }
            TrackEntry::Observation {
                description,
                severity,
                ..
            } => match session.append_observation(description, *severity, fallback, at) {
                Ok(_) => summary.observations += 1,
                Err(SessionError::Validation(e)) => {
                    warn!("Skipping observation at {}: {}", at, e);
                    summary.rejected_observations += 1;
                }
                Err(e) => return Err(e),
            },
        }
        summary.entries += 1;
    }

    let ended_at = entries
        .last()
        .map(|e| e.captured_at())
        .unwrap_or(started_at);
    session.stop(ended_at)?;
    debug!("Replay summary: {:?}", summary);
    Ok(summary)
}

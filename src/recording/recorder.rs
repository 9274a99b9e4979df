// src/recording/recorder.rs
//
// Live driver around a RecordingSession. One task multiplexes:
//   - position updates from the sensor subscription
//   - snapshot timer ticks (only armed while recording)
//   - shell commands (start / stop / continue / discard / commit / observe)
//
// Everything runs on that single task, so the session needs no locking.
// Missed ticks are skipped rather than bursted, so one tick never runs on
// top of another.

use super::event_bus::SessionEvent;
use super::session::{RecordingSession, SessionState};
use crate::commit::CommitCoordinator;
use crate::error::SensorError;
use crate::sensor::{PositionSensor, PositionUpdate, Subscription};
use crate::types::LatLng;
use chrono::Utc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub enum ShellCommand {
    Start,
    Stop,
    Continue,
    Discard,
    Commit,
    Observe {
        description: String,
        severity: i64,
        /// Used when no position has been seen yet (e.g. the map center)
        fallback: LatLng,
    },
}

pub struct Recorder<S: PositionSensor> {
    session: RecordingSession,
    sensor: S,
    coordinator: CommitCoordinator,
    snapshot_interval: Duration,
    subscription: Option<Subscription>,
    events: mpsc::UnboundedSender<SessionEvent>,
}

fn snapshot_timer(period: Duration) -> Interval {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

async fn next_update(subscription: &mut Option<Subscription>) -> Option<PositionUpdate> {
    match subscription {
        Some(sub) => sub.updates.recv().await,
        None => std::future::pending().await,
    }
}

impl<S: PositionSensor> Recorder<S> {
    pub fn new(
        session: RecordingSession,
        sensor: S,
        coordinator: CommitCoordinator,
        snapshot_interval: Duration,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        Self {
            session,
            sensor,
            coordinator,
            snapshot_interval,
            subscription: None,
            events,
        }
    }

    pub fn session(&self) -> &RecordingSession {
        &self.session
    }

    /// Run until the command channel closes.
    pub async fn run(&mut self, mut commands: mpsc::Receiver<ShellCommand>) {
        let mut ticker = snapshot_timer(self.snapshot_interval);

        loop {
            let recording = self.session.state() == SessionState::Recording;

            tokio::select! {
                update = next_update(&mut self.subscription) => {
                    self.on_update(update);
                }
                _ = ticker.tick(), if recording => {
                    self.session.on_snapshot_tick(Utc::now());
                }
                command = commands.recv() => match command {
                    Some(command) => {
                        if self.handle(command).await {
                            ticker = snapshot_timer(self.snapshot_interval);
                        }
                    }
                    None => break,
                },
            }

            self.flush_events();
        }

        debug!("Command channel closed; recorder exiting");
        self.unsubscribe();
        self.flush_events();
    }

    fn on_update(&mut self, update: Option<PositionUpdate>) {
        match update {
            Some(Ok(position)) => {
                self.session.on_position(position);
            }
            Some(Err(e)) => {
                self.unsubscribe();
                self.session.sensor_failed(e, Utc::now());
            }
            None => {
                self.unsubscribe();
                self.session
                    .sensor_failed(SensorError::StreamClosed, Utc::now());
            }
        }
    }

    /// Returns true when the snapshot timer must be re-armed: only after a
    /// successful start or continue.
    async fn handle(&mut self, command: ShellCommand) -> bool {
        debug!("Shell command {:?} while {}", command, self.session.state().as_str());
        let rearm = matches!(command, ShellCommand::Start | ShellCommand::Continue);

        let result = match command {
            ShellCommand::Start => {
                let initial_fix = match self.sensor.current_position().await {
                    Ok(fix) => Some(fix),
                    Err(e) => {
                        warn!("No initial fix for new trajectory: {}", e);
                        None
                    }
                };
                self.session
                    .start(Utc::now(), initial_fix)
                    .map(|()| self.subscribe())
            }
            ShellCommand::Stop => {
                self.unsubscribe();
                self.session.stop(Utc::now())
            }
            ShellCommand::Continue => self
                .session
                .continue_recording()
                .map(|()| self.subscribe()),
            ShellCommand::Discard => self.session.discard(),
            ShellCommand::Commit => self
                .session
                .commit(&self.coordinator)
                .await
                .map(|report| {
                    info!(
                        "Commit finished for {} (degraded: {})",
                        report.trajectory_id,
                        report.is_degraded()
                    )
                }),
            ShellCommand::Observe {
                description,
                severity,
                fallback,
            } => self
                .session
                .append_observation(&description, severity, fallback, Utc::now())
                .map(|_| ()),
        };

        if let Err(e) = result {
            warn!("Shell command rejected: {}", e);
            return false;
        }
        rearm && self.session.state() == SessionState::Recording
    }

    fn subscribe(&mut self) {
        match self.sensor.subscribe() {
            Ok(subscription) => self.subscription = Some(subscription),
            Err(e) => self.session.sensor_failed(e, Utc::now()),
        }
    }

    /// Synchronous from the caller's view: the receiver is dropped here, so
    /// no buffered position is delivered afterwards.
    fn unsubscribe(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            self.sensor.unsubscribe(subscription.id);
        }
    }

    fn flush_events(&mut self) {
        for event in self.session.drain_events() {
            // A shell that went away does not stop recording
            let _ = self.events.send(event);
        }
    }
}

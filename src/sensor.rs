// src/sensor.rs
//
// Positioning sensor seam. A subscription is a channel of fixes or errors;
// an error is terminal for the subscription. Unsubscribing drops the
// sender side, and the recorder drops its receiver, so nothing already
// buffered is delivered after stop.

use crate::error::SensorError;
use crate::types::Position;
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tracing::{debug, warn};

pub type PositionUpdate = Result<Position, SensorError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(pub u64);

pub struct Subscription {
    pub id: SubscriptionId,
    pub updates: mpsc::Receiver<PositionUpdate>,
}

#[async_trait]
pub trait PositionSensor: Send {
    /// One-shot fix.
    async fn current_position(&mut self) -> Result<Position, SensorError>;

    fn subscribe(&mut self) -> Result<Subscription, SensorError>;

    fn unsubscribe(&mut self, id: SubscriptionId);
}

#[derive(Default)]
struct FeedState {
    active: Option<(SubscriptionId, mpsc::Sender<PositionUpdate>)>,
    last: Option<Position>,
    next_id: u64,
}

fn lock(state: &Mutex<FeedState>) -> MutexGuard<'_, FeedState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

/// Sensor driven by the shell: the platform positioning callback pushes
/// fixes into the paired [`SensorFeed`].
pub struct ChannelSensor {
    state: Arc<Mutex<FeedState>>,
    capacity: usize,
}

#[derive(Clone)]
pub struct SensorFeed {
    state: Arc<Mutex<FeedState>>,
}

impl SensorFeed {
    /// Returns true if an active subscription received the fix.
    pub fn push(&self, position: Position) -> bool {
        let mut state = lock(&self.state);
        state.last = Some(position);
        match &state.active {
            Some((_, tx)) => match tx.try_send(Ok(position)) {
                Ok(()) => true,
                Err(e) => {
                    debug!("Dropping position update: {}", e);
                    false
                }
            },
            None => false,
        }
    }

    /// Report a terminal sensor error to the active subscription.
    pub fn fail(&self, error: SensorError) -> bool {
        let mut state = lock(&self.state);
        match state.active.take() {
            Some((_, tx)) => tx.try_send(Err(error)).is_ok(),
            None => {
                warn!("Sensor error without subscriber: {}", error);
                false
            }
        }
    }
}

impl ChannelSensor {
    pub fn new(capacity: usize) -> (Self, SensorFeed) {
        let state = Arc::new(Mutex::new(FeedState::default()));
        (
            Self {
                state: Arc::clone(&state),
                capacity: capacity.max(1),
            },
            SensorFeed { state },
        )
    }
}

#[async_trait]
impl PositionSensor for ChannelSensor {
    async fn current_position(&mut self) -> Result<Position, SensorError> {
        lock(&self.state)
            .last
            .ok_or_else(|| SensorError::Unavailable("no fix yet".to_string()))
    }

    fn subscribe(&mut self) -> Result<Subscription, SensorError> {
        let mut state = lock(&self.state);
        if state.active.is_some() {
            return Err(SensorError::AlreadySubscribed);
        }
        state.next_id += 1;
        let id = SubscriptionId(state.next_id);
        let (tx, rx) = mpsc::channel(self.capacity);
        state.active = Some((id, tx));
        Ok(Subscription { id, updates: rx })
    }

    fn unsubscribe(&mut self, id: SubscriptionId) {
        let mut state = lock(&self.state);
        if matches!(&state.active, Some((active, _)) if *active == id) {
            state.active = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn fix(lat: f64) -> Position {
        Position {
            latitude: lat,
            longitude: 8.5,
            accuracy: 3.0,
            captured_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_fixes_reach_active_subscription_only() {
        let (mut sensor, feed) = ChannelSensor::new(8);
        assert!(!feed.push(fix(47.0)));

        let mut sub = sensor.subscribe().unwrap();
        assert!(feed.push(fix(47.1)));
        assert_eq!(sub.updates.recv().await.unwrap().unwrap().latitude, 47.1);

        sensor.unsubscribe(sub.id);
        assert!(!feed.push(fix(47.2)));
        assert!(sub.updates.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_current_position_is_last_fix() {
        let (mut sensor, feed) = ChannelSensor::new(8);
        assert!(sensor.current_position().await.is_err());
        feed.push(fix(47.3));
        assert_eq!(sensor.current_position().await.unwrap().latitude, 47.3);
    }

    #[tokio::test]
    async fn test_error_ends_subscription() {
        let (mut sensor, feed) = ChannelSensor::new(8);
        let mut sub = sensor.subscribe().unwrap();
        assert!(sensor.subscribe().is_err());

        assert!(feed.fail(SensorError::PermissionDenied));
        assert_eq!(
            sub.updates.recv().await.unwrap(),
            Err(SensorError::PermissionDenied)
        );
        assert!(sub.updates.recv().await.is_none());
        assert!(sensor.subscribe().is_ok());
    }
}

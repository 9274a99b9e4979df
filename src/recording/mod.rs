// src/recording/mod.rs

pub mod buffer;
pub mod event_bus;
pub mod recorder;
pub mod session;

pub use buffer::TrajectoryBuffer;
pub use event_bus::{EventBus, SessionEvent};
pub use recorder::{Recorder, ShellCommand};
pub use session::{RecordingSession, SessionState};

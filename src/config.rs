use crate::types::Config;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use std::time::Duration;

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&contents)
            .with_context(|| format!("Invalid config {}", path.display()))?;
        if config.recording.snapshot_interval_secs == 0 {
            anyhow::bail!("recording.snapshot_interval_secs must be positive");
        }
        Ok(config)
    }

    pub fn snapshot_interval(&self) -> Duration {
        Duration::from_secs(self.recording.snapshot_interval_secs)
    }
}

//! Engine configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;

use super::ids::{EngineId, StateFrame};
use crate::{Result, SyncError};

/// Parameters shared by every component of one engine.
///
/// Loaded from YAML or built in code. A missing `id` gets a random one; a
/// joining engine has its id replaced by the one its host assigns.
///
/// ```rust
/// use tandem::EngineParams;
///
/// let params = EngineParams::from_yaml_str("frame_ms: 16\nmax_frames: 30\n").unwrap();
/// assert_eq!(params.frame_ms, 16);
/// assert_eq!(params.delay, 0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineParams {
    pub id: EngineId,
    /// Frames between collecting an event and the frame it is dated for.
    pub delay: StateFrame,
    /// Milliseconds per frame.
    pub frame_ms: i64,
    /// How far the unresolved frontier may run ahead of the last resolved frame.
    pub max_frames: usize,
}

impl Default for EngineParams {
    fn default() -> Self {
        Self { id: EngineId::random(), delay: 0, frame_ms: 17, max_frames: 25 }
    }
}

impl EngineParams {
    pub fn new(id: EngineId, delay: StateFrame, frame_ms: i64, max_frames: usize) -> Self {
        Self { id, delay, frame_ms, max_frames }
    }

    /// Number of slots the history window needs.
    pub fn window_capacity(&self) -> usize {
        self.max_frames + 1
    }

    /// Check the invariants every component relies on.
    pub fn validate(&self) -> Result<()> {
        if self.frame_ms <= 0 {
            return Err(SyncError::invalid_config(
                "frame_ms",
                format!("must be positive, got {}", self.frame_ms),
            ));
        }
        if self.max_frames == 0 {
            return Err(SyncError::invalid_config("max_frames", "must be at least 1"));
        }
        if self.delay < 0 || self.delay as u64 >= self.max_frames as u64 {
            return Err(SyncError::invalid_config(
                "delay",
                format!("must be in [0, {}), got {}", self.max_frames, self.delay),
            ));
        }
        Ok(())
    }

    /// Parse and validate parameters from a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let params: Self = serde_yaml_ng::from_str(yaml).map_err(|e| SyncError::Parse {
            context: "EngineParams YAML".to_string(),
            details: e.to_string(),
        })?;
        params.validate()?;
        Ok(params)
    }

    /// Read, parse and validate parameters from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| SyncError::file_error(path.to_path_buf(), e))?;
        Self::from_yaml_str(&yaml)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Result, ensure};

    #[test]
    fn parses_full_document() -> Result<()> {
        let params = EngineParams::from_yaml_str(
            "id: 1234\ndelay: 2\nframe_ms: 5\nmax_frames: 10\n",
        )?;
        ensure!(params == EngineParams::new(EngineId::new(1234), 2, 5, 10));
        ensure!(params.window_capacity() == 11);
        Ok(())
    }

    #[test]
    fn missing_fields_take_defaults() -> Result<()> {
        let params = EngineParams::from_yaml_str("frame_ms: 10\n")?;
        ensure!(params.delay == 0);
        ensure!(params.max_frames == 25);
        ensure!(params.id.get() < 1 << 62);
        Ok(())
    }

    #[test]
    fn rejects_invalid_values() {
        let cases = [
            ("frame_ms: 0\n", "frame_ms"),
            ("max_frames: 0\n", "max_frames"),
            ("delay: 25\nmax_frames: 25\n", "delay"),
            ("delay: -1\n", "delay"),
        ];
        for (yaml, field) in cases {
            match EngineParams::from_yaml_str(yaml) {
                Err(SyncError::Config { field: f, .. }) => assert_eq!(f, field, "{yaml}"),
                other => panic!("expected config error for {yaml}, got {other:?}"),
            }
        }
    }

    #[test]
    fn malformed_yaml_is_parse_error() {
        let err = EngineParams::from_yaml_str("frame_ms: [not, a, number]\n").unwrap_err();
        assert!(matches!(err, SyncError::Parse { .. }));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = EngineParams::from_yaml_file("/nonexistent/tandem.yaml").unwrap_err();
        match err {
            SyncError::File { path, .. } => assert!(path.ends_with("tandem.yaml")),
            other => panic!("expected file error, got {other:?}"),
        }
    }

    #[test]
    fn loads_from_file() -> Result<()> {
        let path = std::env::temp_dir().join(format!("tandem-params-{}.yaml", std::process::id()));
        std::fs::write(&path, "id: 9\nframe_ms: 8\nmax_frames: 12\n")?;
        let params = EngineParams::from_yaml_file(&path);
        std::fs::remove_file(&path)?;
        let params = params?;
        ensure!(params.id == EngineId::new(9));
        ensure!(params.frame_ms == 8);
        Ok(())
    }
}

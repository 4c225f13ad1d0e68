//! StateStore — whole-document YAML persistence for config and tick state.
//!
//! The config document is read once at startup. The state document is
//! loaded at startup (absent file → empty state) and replaced in full
//! after every tick, so partial writes never mix two ticks' state.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{ScaleError, ScaleResult};
use crate::types::{GlobalState, ScalerConfig};

/// Loads the config document and owns the state document's path.
pub struct StateStore {
    state_path: PathBuf,
}

impl StateStore {
    /// Create a store persisting state at the given path.
    pub fn new(state_path: impl Into<PathBuf>) -> Self {
        Self {
            state_path: state_path.into(),
        }
    }

    /// Load the configuration document. A missing or unparseable file is
    /// fatal: the controller must not start without valid config.
    pub fn load_config(path: &Path) -> ScaleResult<ScalerConfig> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ScaleError::State(format!("cannot read config file {}: {e}", path.display()))
        })?;
        let config = serde_yaml::from_str(&raw).map_err(|e| {
            ScaleError::State(format!("cannot parse config file {}: {e}", path.display()))
        })?;
        debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Load persisted state. A missing file means first run (empty state);
    /// an unparseable file is fatal rather than silently discarded.
    pub fn load_state(&self) -> ScaleResult<GlobalState> {
        if !self.state_path.exists() {
            debug!(path = %self.state_path.display(), "no state file, starting empty");
            return Ok(GlobalState::default());
        }
        let raw = std::fs::read_to_string(&self.state_path).map_err(|e| {
            ScaleError::State(format!(
                "cannot read state file {}: {e}",
                self.state_path.display()
            ))
        })?;
        serde_yaml::from_str(&raw).map_err(|e| {
            ScaleError::State(format!(
                "corrupt state file {}: {e}",
                self.state_path.display()
            ))
        })
    }

    /// Replace the state document wholesale.
    pub fn persist(&self, state: &GlobalState) -> ScaleResult<()> {
        let doc = serde_yaml::to_string(state).map_err(|e| {
            ScaleError::State(format!("cannot serialize state: {e}"))
        })?;
        std::fs::write(&self.state_path, doc).map_err(|e| {
            ScaleError::State(format!(
                "cannot write state file {}: {e}",
                self.state_path.display()
            ))
        })?;
        debug!(path = %self.state_path.display(), services = state.services.len(), "state persisted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ServiceKind;

    #[test]
    fn missing_state_file_is_empty_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("scaltainer.yml.state"));
        let state = store.load_state().unwrap();
        assert!(state.services.is_empty());
    }

    #[test]
    fn persist_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("scaltainer.yml.state"));

        let mut state = GlobalState::default();
        let web = state.entry("web");
        web.upscale_sensitivity = 2;
        web.last_metric = Some(120.0);
        web.last_kind = Some(ServiceKind::Web);
        web.last_replicas = Some(5);
        state.entry("mailer").downscale_sensitivity = 1;

        store.persist(&state).unwrap();
        let restored = store.load_state().unwrap();
        assert_eq!(restored, state);
    }

    #[test]
    fn persist_replaces_whole_document() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("s.state"));

        let mut first = GlobalState::default();
        first.entry("old").upscale_sensitivity = 9;
        store.persist(&first).unwrap();

        // Second persist without the old entry removes it from disk.
        let mut second = GlobalState::default();
        second.entry("new").downscale_sensitivity = 1;
        store.persist(&second).unwrap();

        let restored = store.load_state().unwrap();
        assert!(restored.get("old").is_none());
        assert_eq!(restored.get("new").unwrap().downscale_sensitivity, 1);
    }

    #[test]
    fn corrupt_state_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.state");
        std::fs::write(&path, ": not [ yaml {").unwrap();

        let store = StateStore::new(&path);
        let err = store.load_state().unwrap_err();
        assert!(matches!(err, ScaleError::State(_)));
    }

    #[test]
    fn missing_config_file_is_fatal() {
        let err = StateStore::load_config(Path::new("/nonexistent/scaltainer.yml")).unwrap_err();
        assert!(matches!(err, ScaleError::State(_)));
    }

    #[test]
    fn config_file_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scaltainer.yml");
        std::fs::write(
            &path,
            "stack_name: prod\nworker_services:\n  mailer:\n    ratio: 2\n",
        )
        .unwrap();

        let config = StateStore::load_config(&path).unwrap();
        assert_eq!(config.stack_name.as_deref(), Some("prod"));
        assert_eq!(config.worker_services["mailer"].ratio, Some(2.0));
    }
}

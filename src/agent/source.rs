//! Where agent code comes from
//!
//! The engine only needs the latest published version of each agent. Storage
//! is behind [`AgentSource`]; two implementations ship with the crate: an
//! in-memory registry for tests and embedding, and a directory of `.rhai`
//! files for the command-line runner.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use thiserror::Error;
use uuid::Uuid;

/// File extension for agent scripts
pub const AGENT_FILE_EXTENSION: &str = "rhai";

/// One published version of an agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentVersion {
    pub agent_id: String,
    pub version_id: String,
    pub code: String,
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("No version published for agent '{0}'")]
    NotFound(String),

    #[error("Invalid agent id '{0}'")]
    InvalidId(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Supplier of agent code
pub trait AgentSource: Send + Sync {
    /// Latest published version of an agent
    fn fetch_latest_agent_version(&self, agent_id: &str) -> Result<AgentVersion, SourceError>;
}

/// Agent registry held in memory
#[derive(Debug, Default, Clone)]
pub struct InMemoryAgentSource {
    versions: AHashMap<String, Vec<AgentVersion>>,
}

impl InMemoryAgentSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a new version; it becomes the latest. Returns its version id.
    pub fn publish(&mut self, agent_id: impl Into<String>, code: impl Into<String>) -> String {
        let agent_id = agent_id.into();
        let version = AgentVersion {
            agent_id: agent_id.clone(),
            version_id: Uuid::new_v4().to_string(),
            code: code.into(),
        };
        let version_id = version.version_id.clone();
        self.versions.entry(agent_id).or_default().push(version);
        version_id
    }

    /// Builder-style [`publish`](Self::publish)
    pub fn with_agent(mut self, agent_id: impl Into<String>, code: impl Into<String>) -> Self {
        self.publish(agent_id, code);
        self
    }

    pub fn version_count(&self, agent_id: &str) -> usize {
        self.versions.get(agent_id).map_or(0, Vec::len)
    }
}

impl AgentSource for InMemoryAgentSource {
    fn fetch_latest_agent_version(&self, agent_id: &str) -> Result<AgentVersion, SourceError> {
        self.versions
            .get(agent_id)
            .and_then(|versions| versions.last())
            .cloned()
            .ok_or_else(|| SourceError::NotFound(agent_id.to_string()))
    }
}

/// Agents stored as `<root>/<agent_id>.rhai`
///
/// The version id is derived from the file's modification time, so editing
/// a script publishes a new version.
#[derive(Debug, Clone)]
pub struct DirectoryAgentSource {
    root: PathBuf,
}

impl DirectoryAgentSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn script_path(&self, agent_id: &str) -> Result<PathBuf, SourceError> {
        let valid = !agent_id.is_empty()
            && agent_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(SourceError::InvalidId(agent_id.to_string()));
        }
        Ok(self
            .root
            .join(agent_id)
            .with_extension(AGENT_FILE_EXTENSION))
    }

    /// Ids of every agent script in the directory, sorted
    pub fn list_agents(&self) -> Result<Vec<String>, SourceError> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(AGENT_FILE_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                ids.push(stem.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }
}

impl AgentSource for DirectoryAgentSource {
    fn fetch_latest_agent_version(&self, agent_id: &str) -> Result<AgentVersion, SourceError> {
        let path = self.script_path(agent_id)?;
        let code = match fs::read_to_string(&path) {
            Ok(code) => code,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(SourceError::NotFound(agent_id.to_string()))
            }
            Err(err) => return Err(err.into()),
        };

        let modified = fs::metadata(&path)?
            .modified()
            .ok()
            .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
            .map_or(0, |since| since.as_millis());

        Ok(AgentVersion {
            agent_id: agent_id.to_string(),
            version_id: format!("{}-{}", agent_id, modified),
            code,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_in_memory_latest_wins() {
        let mut source = InMemoryAgentSource::new();
        let first = source.publish("alpha", "fn tick(game, me, output) {}");
        let second = source.publish("alpha", "fn tick(game, me, output) { log(1); }");
        assert_ne!(first, second);

        let latest = source.fetch_latest_agent_version("alpha").unwrap();
        assert_eq!(latest.version_id, second);
        assert!(latest.code.contains("log"));
        assert_eq!(source.version_count("alpha"), 2);
    }

    #[test]
    fn test_in_memory_unknown_agent() {
        let source = InMemoryAgentSource::new();
        assert!(matches!(
            source.fetch_latest_agent_version("ghost"),
            Err(SourceError::NotFound(_))
        ));
    }

    #[test]
    fn test_directory_source_reads_script() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("hunter.rhai"), "fn tick(game, me, output) {}").unwrap();
        fs::write(dir.path().join("notes.txt"), "not an agent").unwrap();

        let source = DirectoryAgentSource::new(dir.path());
        let version = source.fetch_latest_agent_version("hunter").unwrap();
        assert_eq!(version.agent_id, "hunter");
        assert!(version.version_id.starts_with("hunter-"));
        assert_eq!(source.list_agents().unwrap(), vec!["hunter".to_string()]);
    }

    #[test]
    fn test_directory_source_missing_file() {
        let dir = TempDir::new().unwrap();
        let source = DirectoryAgentSource::new(dir.path());
        assert!(matches!(
            source.fetch_latest_agent_version("nobody"),
            Err(SourceError::NotFound(_))
        ));
    }

    #[test]
    fn test_directory_source_rejects_path_tricks() {
        let dir = TempDir::new().unwrap();
        let source = DirectoryAgentSource::new(dir.path());
        assert!(matches!(
            source.fetch_latest_agent_version("../etc/passwd"),
            Err(SourceError::InvalidId(_))
        ));
    }
}

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A store namespace, e.g. one application id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Namespace(String);

impl Namespace {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Namespace {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Namespace {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Which kind of structure a target is scanned as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScanMode {
    /// Index entries whose primary entity no longer exists.
    OrphanIndex,
    /// Operator-selected rewrites of directed-edge shard metadata.
    ShardRepair,
    /// Cross-references that share a dedup key with an older canonical target.
    DuplicateReference,
}

impl ScanMode {
    pub const ALL: [ScanMode; 3] = [
        ScanMode::OrphanIndex,
        ScanMode::ShardRepair,
        ScanMode::DuplicateReference,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ScanMode::OrphanIndex => "orphan-index",
            ScanMode::ShardRepair => "shard-repair",
            ScanMode::DuplicateReference => "duplicate-reference",
        }
    }
}

impl fmt::Display for ScanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScanMode {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ScanMode::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| ParseEnumError::new("scan mode", s))
    }
}

/// Shard metadata rewrite selected by the operator for shard-repair runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ShardTask {
    /// Clear the boundary of the first shard in scan order only.
    RemoveLastShardEnd,
    /// Clear the boundary of every shard in the chain.
    RemoveAllShardEnds,
    /// Mark every shard in the chain as not compacted.
    ResetAllCompactionStatus,
}

impl ShardTask {
    pub const ALL: [ShardTask; 3] = [
        ShardTask::RemoveLastShardEnd,
        ShardTask::RemoveAllShardEnds,
        ShardTask::ResetAllCompactionStatus,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ShardTask::RemoveLastShardEnd => "remove-last-shard-end",
            ShardTask::RemoveAllShardEnds => "remove-all-shard-ends",
            ShardTask::ResetAllCompactionStatus => "reset-all-compaction-status",
        }
    }
}

impl fmt::Display for ShardTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ShardTask {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ShardTask::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ParseEnumError::new("shard task", s))
    }
}

/// Returned when a mode or task name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

impl fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {}: '{}'", self.kind, self.value)
    }
}

impl std::error::Error for ParseEnumError {}

/// One scan scope. Immutable once a run starts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Target {
    pub namespace: Namespace,
    /// Collection name, or the edge-meta identifier of a shard chain.
    pub structure: String,
    pub mode: ScanMode,
}

impl Target {
    pub fn new(namespace: impl Into<Namespace>, structure: impl Into<String>, mode: ScanMode) -> Self {
        Self {
            namespace: namespace.into(),
            structure: structure.into(),
            mode,
        }
    }

    /// Stable key used for checkpoints and report ordering.
    pub fn key(&self) -> String {
        format!("{}/{}/{}", self.namespace, self.structure, self.mode)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_mode_parses_its_own_names() {
        for mode in ScanMode::ALL {
            assert_eq!(mode.as_str().parse::<ScanMode>(), Ok(mode));
        }
        let err = "orphans".parse::<ScanMode>().unwrap_err();
        assert_eq!(err.to_string(), "unknown scan mode: 'orphans'");
    }

    #[test]
    fn shard_task_parses_its_own_names() {
        for task in ShardTask::ALL {
            assert_eq!(task.as_str().parse::<ShardTask>(), Ok(task));
        }
        assert!("remove-last".parse::<ShardTask>().is_err());
    }

    #[test]
    fn target_key_joins_parts() {
        let t = Target::new("app-1", "users", ScanMode::OrphanIndex);
        assert_eq!(t.key(), "app-1/users/orphan-index");
        assert_eq!(t.to_string(), t.key());
    }
}

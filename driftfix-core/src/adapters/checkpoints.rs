//! Checkpoint persistence: one JSON file per target, or in memory.

use super::snapshot::write_atomic;
use crate::ports::CheckpointPort;
use anyhow::Context;
use camino::Utf8PathBuf;
use driftfix_types::{Checkpoint, Target};
use fs_err as fs;
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Stores checkpoints as `<dir>/<encoded target key>.json`.
#[derive(Debug, Clone)]
pub struct FsCheckpointStore {
    pub dir: Utf8PathBuf,
}

impl FsCheckpointStore {
    pub fn new(dir: impl Into<Utf8PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, target: &Target) -> Utf8PathBuf {
        self.dir.join(format!("{}.json", encode_key(&target.key())))
    }
}

/// Filesystem-safe form of a target key. Alphanumerics, `-`, `_` and `.` are kept.
fn encode_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for b in key.bytes() {
        match b {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_' | b'.' => out.push(b as char),
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}

impl CheckpointPort for FsCheckpointStore {
    fn load(&self, target: &Target) -> anyhow::Result<Option<Checkpoint>> {
        let path = self.path_for(target);
        if !path.exists() {
            return Ok(None);
        }
        let contents =
            fs::read_to_string(&path).with_context(|| format!("read checkpoint {}", path))?;
        let checkpoint: Checkpoint = serde_json::from_str(&contents)
            .with_context(|| format!("parse checkpoint {}", path))?;
        if checkpoint.target != *target {
            anyhow::bail!(
                "checkpoint {} belongs to {}, not {}",
                path,
                checkpoint.target,
                target
            );
        }
        Ok(Some(checkpoint))
    }

    fn save(&self, checkpoint: &Checkpoint) -> anyhow::Result<()> {
        let path = self.path_for(&checkpoint.target);
        let json = serde_json::to_vec_pretty(checkpoint).context("serialize checkpoint")?;
        write_atomic(&path, &json)?;
        debug!(path = %path, cursor = %checkpoint.cursor, "checkpoint saved");
        Ok(())
    }

    fn clear(&self, target: &Target) -> anyhow::Result<()> {
        let path = self.path_for(target);
        if path.exists() {
            fs::remove_file(&path).with_context(|| format!("remove checkpoint {}", path))?;
        }
        Ok(())
    }
}

/// In-memory checkpoints for embedding and testing.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    entries: Mutex<BTreeMap<String, Checkpoint>>,
    saves: AtomicU64,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, target: &Target) -> Option<Checkpoint> {
        self.lock().get(&target.key()).cloned()
    }

    pub fn insert(&self, checkpoint: Checkpoint) {
        self.lock().insert(checkpoint.target.key(), checkpoint);
    }

    pub fn save_count(&self) -> u64 {
        self.saves.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Checkpoint>> {
        self.entries.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl CheckpointPort for MemoryCheckpointStore {
    fn load(&self, target: &Target) -> anyhow::Result<Option<Checkpoint>> {
        Ok(self.get(target))
    }

    fn save(&self, checkpoint: &Checkpoint) -> anyhow::Result<()> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.insert(checkpoint.clone());
        Ok(())
    }

    fn clear(&self, target: &Target) -> anyhow::Result<()> {
        self.lock().remove(&target.key());
        Ok(())
    }
}

use crate::target::ScanMode;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque resumable position in a paginated sequence.
///
/// Only the store that produced a cursor can interpret it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageCursor(String);

impl PageCursor {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PageCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque identifier of a primary entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// An entry found in a secondary index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRecord {
    pub id: EntityId,
    pub bucket: String,

    /// When the entry was written, if the store knows it (epoch millis).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indexed_at_ms: Option<i64>,
}

impl IndexRecord {
    pub fn new(id: impl Into<EntityId>, bucket: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            bucket: bucket.into(),
            indexed_at_ms: None,
        }
    }
}

/// One metadata row describing a contiguous key range of a directed-edge structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardRecord {
    pub shard_id: i64,

    /// Boundary edge key; `None` means the shard is open-ended.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shard_end: Option<String>,

    #[serde(default)]
    pub compacted: bool,
}

/// A cross-reference such as org→admin or app→org.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceRecord {
    pub source_id: EntityId,
    pub target_id: EntityId,

    /// Natural key the target is deduplicated by (email, username, org name).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dedup_key: Option<String>,

    /// Creation timestamp of the target; compared lexicographically.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
}

/// A record of any scan mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Record {
    Index(IndexRecord),
    Shard(ShardRecord),
    Reference(ReferenceRecord),
}

impl Record {
    /// The scan mode this record variant belongs to.
    pub fn mode(&self) -> ScanMode {
        match self {
            Record::Index(_) => ScanMode::OrphanIndex,
            Record::Shard(_) => ScanMode::ShardRepair,
            Record::Reference(_) => ScanMode::DuplicateReference,
        }
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Record::Index(r) => write!(f, "index {}:{}", r.bucket, r.id),
            Record::Shard(r) => write!(f, "shard {}", r.shard_id),
            Record::Reference(r) => write!(f, "reference {}->{}", r.source_id, r.target_id),
        }
    }
}

impl From<IndexRecord> for Record {
    fn from(value: IndexRecord) -> Self {
        Record::Index(value)
    }
}

impl From<ShardRecord> for Record {
    fn from(value: ShardRecord) -> Self {
        Record::Shard(value)
    }
}

impl From<ReferenceRecord> for Record {
    fn from(value: ReferenceRecord) -> Self {
        Record::Reference(value)
    }
}

/// An ordered batch of records plus the continuation cursor.
///
/// An absent cursor marks the final page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<R = Record> {
    pub records: Vec<R>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<PageCursor>,
}

impl<R> Page<R> {
    pub fn new(records: Vec<R>, cursor: Option<PageCursor>) -> Self {
        Self { records, cursor }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// True when no further page should be requested after this one.
    pub fn is_final(&self, page_size: usize) -> bool {
        self.cursor.is_none() || self.records.len() < page_size
    }

    pub fn map<T>(self, f: impl FnMut(R) -> T) -> Page<T> {
        Page {
            records: self.records.into_iter().map(f).collect(),
            cursor: self.cursor,
        }
    }
}

impl<R: Into<Record>> Page<R> {
    pub fn into_records(self) -> Page<Record> {
        self.map(Into::into)
    }
}

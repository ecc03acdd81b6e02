use crate::record::PageCursor;
use crate::summary::RunCounts;
use crate::target::Target;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Durable resume point for one target.
///
/// Cursor, position and counts are always written together so a resumed run
/// never counts a re-delivered page twice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub schema: String,
    pub target: Target,

    /// Cursor of the next page to fetch.
    pub cursor: PageCursor,

    /// Records already scanned before `cursor`.
    pub position: u64,

    /// Cumulative counts up to `cursor`.
    pub counts: RunCounts,

    pub updated_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(target: Target, cursor: PageCursor, counts: RunCounts) -> Self {
        Self {
            schema: crate::schema::DRIFTFIX_CHECKPOINT_V1.to_string(),
            target,
            cursor,
            position: counts.records_scanned,
            counts,
            updated_at: Utc::now(),
        }
    }
}

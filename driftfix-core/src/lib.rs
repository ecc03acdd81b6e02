//! Embeddable scan-compare-repair engine for driftfix.
//!
//! Walks a paginated secondary index, shard chain or reference collection,
//! compares each page against authoritative data, and applies idempotent
//! corrective writes.
//!
//! # Port traits
//!
//! All store access is abstracted behind port traits in [`ports`]:
//! - [`IndexPort`](ports::IndexPort): index pages, entity lookups, index deletes
//! - [`ShardPort`](ports::ShardPort): shard metadata pages and rewrites
//! - [`ReferencePort`](ports::ReferencePort): reference pages and upserts
//! - [`CatalogPort`](ports::CatalogPort): namespace and structure listing
//! - [`CheckpointPort`](ports::CheckpointPort): durable resume points
//!
//! The [`adapters`] module provides in-memory, snapshot-file and
//! fault-injecting implementations.
//!
//! # Entry points
//!
//! - [`AuditRunner::run`](runner::AuditRunner::run): scan and repair one target
//! - [`CampaignController::run`](campaign::CampaignController::run): every target in scope

pub mod adapters;
pub mod campaign;
pub mod cancel;
pub mod classifier;
pub mod error;
pub mod executor;
pub mod paginator;
pub mod ports;
pub mod render;
pub mod retry;
pub mod runner;
pub mod settings;

pub use campaign::{CampaignController, CampaignScope, ResolvedTargets};
pub use cancel::CancelToken;
pub use classifier::{CanonicalIndex, Classification, DataQualityWarning, DivergenceClassifier};
pub use error::{AuditError, StoreError};
pub use executor::RepairExecutor;
pub use paginator::Paginator;
pub use render::render_report_md;
pub use retry::RetryPolicy;
pub use runner::{AuditRunner, PageProgress, ProgressObserver, RunState};
pub use settings::{AuditSettings, OrphanWindow};

// Re-export the schema types so embedders don't need driftfix-types directly.
pub use driftfix_types as types;

//! Core types for the erwin supervisor.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Reserved prefix marking design documents.
pub const DESIGN_DOC_PREFIX: &str = "_design/";

/// Returns the suffix of a database or shard name: the stem of its final
/// path segment, with the trailing dot-extension (the creation timestamp
/// on shard files) stripped.
///
/// `shards/40000000-5fffffff/acct/invoices.1638412331` yields `invoices`;
/// a bare name with no path and no extension is its own suffix.
pub fn name_suffix(name: &str) -> &str {
    let base = name.rsplit('/').next().unwrap_or(name);
    match base.rsplit_once('.') {
        Some((stem, _)) => stem,
        None => base,
    }
}

/// Name of one shard of a sharded database.
///
/// Shard names are structured byte strings such as
/// `shards/40000000-5fffffff/acct/invoices.1638412331`. The supervisor
/// treats them as opaque except for [`ShardName::suffix`], its selection
/// filter.
#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShardName(pub String);

impl ShardName {
    /// Creates a shard name from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Returns the shard name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the shard suffix used for selection filtering.
    pub fn suffix(&self) -> &str {
        name_suffix(&self.0)
    }
}

impl std::fmt::Display for ShardName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ShardName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ShardName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Opaque resume token produced by a change feed.
///
/// [`Sequence::ZERO`] means "from the beginning". The supervisor only ever
/// compares sequences and passes them back to the feed; checkpointed values
/// are monotonically non-decreasing per shard.
#[derive(
    Clone, Copy, Debug, Default, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Sequence(pub u64);

impl Sequence {
    /// The beginning of a feed.
    pub const ZERO: Sequence = Sequence(0);

    /// Returns the raw token value.
    pub fn as_raw(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for Sequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a supervised task (the scanner or a change reader).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Creates a fresh task identity.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One row of a change feed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChangeRow {
    /// Document id.
    pub id: String,
    /// Sequence at which this change was recorded.
    pub seq: Sequence,
    /// Whether the document was deleted.
    #[serde(default)]
    pub deleted: bool,
    /// Document body, present when the feed was opened with include-docs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc: Option<serde_json::Value>,
}

impl ChangeRow {
    /// Whether this row belongs to a design document.
    pub fn is_design_doc(&self) -> bool {
        self.id.starts_with(DESIGN_DOC_PREFIX)
    }
}

/// Kind of a database lifecycle event on the cluster bus.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DbEventKind {
    Created,
    Deleted,
    Updated,
    Compacted,
}

/// A database lifecycle event published on the cluster bus.
#[derive(Clone, Debug, PartialEq)]
pub struct DbEvent {
    /// Name of the database the event is about.
    pub name: ShardName,
    /// What happened to it.
    pub kind: DbEventKind,
}

/// Why a supervised task terminated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExitReason {
    /// The task ran to completion.
    Normal,
    /// The task returned an error.
    Failed(String),
    /// The task panicked or was cancelled.
    Panicked(String),
}

impl ExitReason {
    /// Whether the task completed without error.
    pub fn is_normal(&self) -> bool {
        matches!(self, ExitReason::Normal)
    }
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitReason::Normal => write!(f, "normal"),
            ExitReason::Failed(e) => write!(f, "failed: {}", e),
            ExitReason::Panicked(e) => write!(f, "panicked: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suffix_of_shard_name() {
        let shard = ShardName::from_string("shards/40000000-5fffffff/acct/suff.0123456789");
        assert_eq!(shard.suffix(), "suff");
    }

    #[test]
    fn suffix_of_pathless_name() {
        assert_eq!(name_suffix("_replicator"), "_replicator");
        assert_eq!(name_suffix("invoices.1638412331"), "invoices");
    }

    #[test]
    fn suffix_strips_only_last_extension() {
        assert_eq!(name_suffix("shards/00-ff/a/b.c.123"), "b.c");
    }

    #[test]
    fn suffix_of_nested_db_name() {
        assert_eq!(name_suffix("acct/_replicator"), "_replicator");
    }

    #[test]
    fn design_doc_detection() {
        let row = ChangeRow {
            id: "_design/views".to_string(),
            seq: Sequence(3),
            deleted: false,
            doc: None,
        };
        assert!(row.is_design_doc());

        let row = ChangeRow {
            id: "doc1".to_string(),
            seq: Sequence(4),
            deleted: false,
            doc: None,
        };
        assert!(!row.is_design_doc());
    }

    #[test]
    fn task_ids_are_unique() {
        assert_ne!(TaskId::new(), TaskId::new());
    }

    #[test]
    fn sequence_zero_is_beginning() {
        assert_eq!(Sequence::ZERO.as_raw(), 0);
        assert!(Sequence::ZERO < Sequence(1));
    }
}

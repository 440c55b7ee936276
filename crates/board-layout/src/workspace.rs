//! Persisted workspace record: the flat layout list plus metadata and history.
//!
//! # Schema versioning
//!
//! - Additive data may ride in `extensions` without a version bump.
//! - Breaking changes bump [`WORKSPACE_SCHEMA_VERSION`] and add a migration
//!   step to [`migrate_workspace`].
//!
//! ```
//! use board_layout::workspace::{WorkspaceMetadata, WorkspaceSnapshot};
//! use board_layout::{Direction, Forest, LayoutNodeKind};
//!
//! let (forest, _) = Forest::new()
//!     .add_root(LayoutNodeKind::workspace(Direction::Row))
//!     .expect("root");
//! let snapshot = WorkspaceSnapshot::new(&forest, WorkspaceMetadata::new("ops"));
//! assert!(snapshot.validate().is_ok());
//!
//! let json = snapshot.to_json().expect("serialize");
//! let back = WorkspaceSnapshot::from_json(&json).expect("parse");
//! assert_eq!(back.state_hash(), snapshot.state_hash());
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use rustc_hash::FxHasher;
use serde::{Deserialize, Serialize};

use crate::forest::Forest;
use crate::id::NodeId;
use crate::node::LayoutNode;
use crate::snapshot::{FOREST_SCHEMA_VERSION, ForestSnapshot};
use crate::timeline::LayoutTimeline;

/// Current workspace schema version.
pub const WORKSPACE_SCHEMA_VERSION: u16 = 1;

/// Persisted dashboard workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceSnapshot {
    #[serde(default = "default_workspace_version")]
    pub schema_version: u16,
    pub metadata: WorkspaceMetadata,
    #[serde(default)]
    pub next_id: NodeId,
    /// Every node of the forest, parents referenced by id.
    #[serde(default)]
    pub layout: Vec<LayoutNode>,
    #[serde(default)]
    pub timeline: LayoutTimeline,
    /// Forward-compatible extension bag.
    #[serde(default)]
    pub extensions: BTreeMap<String, String>,
}

fn default_workspace_version() -> u16 {
    WORKSPACE_SCHEMA_VERSION
}

impl WorkspaceSnapshot {
    #[must_use]
    pub fn new(forest: &Forest, metadata: WorkspaceMetadata) -> Self {
        let snapshot = forest.to_snapshot();
        Self {
            schema_version: WORKSPACE_SCHEMA_VERSION,
            metadata,
            next_id: snapshot.next_id,
            layout: snapshot.nodes,
            timeline: LayoutTimeline::default(),
            extensions: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_timeline(mut self, timeline: LayoutTimeline) -> Self {
        self.timeline = timeline;
        self
    }

    /// Layout part of the record as a forest snapshot.
    #[must_use]
    pub fn forest_snapshot(&self) -> ForestSnapshot {
        ForestSnapshot {
            schema_version: FOREST_SCHEMA_VERSION,
            next_id: self.next_id,
            nodes: self.layout.clone(),
        }
    }

    /// Strict validation of schema, layout and history bounds.
    pub fn validate(&self) -> Result<(), WorkspaceValidationError> {
        if self.schema_version != WORKSPACE_SCHEMA_VERSION {
            return Err(WorkspaceValidationError::UnsupportedVersion {
                found: self.schema_version,
                expected: WORKSPACE_SCHEMA_VERSION,
            });
        }

        let report = self.forest_snapshot().invariant_report();
        if report.has_errors() {
            return Err(WorkspaceValidationError::LayoutInvalid {
                issue_count: report.issues.len(),
                first_issue: report
                    .issues
                    .first()
                    .map(|issue| issue.message.clone())
                    .unwrap_or_default(),
            });
        }

        if self.metadata.name.trim().is_empty() {
            return Err(WorkspaceValidationError::EmptyWorkspaceName);
        }

        if self.timeline.cursor > self.timeline.entries.len() {
            return Err(WorkspaceValidationError::TimelineCursorOutOfRange {
                cursor: self.timeline.cursor,
                len: self.timeline.entries.len(),
            });
        }

        Ok(())
    }

    pub fn canonicalize(&mut self) {
        self.layout.sort_by_key(|node| node.id);
    }

    /// Deterministic hash over layout, metadata name and extensions.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        let mut hasher = FxHasher::default();
        self.schema_version.hash(&mut hasher);
        self.forest_snapshot().state_hash().hash(&mut hasher);
        self.metadata.name.hash(&mut hasher);
        self.extensions.hash(&mut hasher);
        hasher.finish()
    }

    /// Pretty JSON with nodes in id order.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let mut canonical = self.clone();
        canonical.canonicalize();
        serde_json::to_string_pretty(&canonical)
    }

    /// Parse and migrate to the current schema. Layout validity is left to
    /// the caller, which may choose to repair instead of reject.
    pub fn from_json(input: &str) -> Result<Self, WorkspaceLoadError> {
        let snapshot: Self = serde_json::from_str(input).map_err(WorkspaceLoadError::Json)?;
        let migrated = migrate_workspace(snapshot).map_err(WorkspaceLoadError::Migration)?;
        for warning in &migrated.warnings {
            tracing::warn!(%warning, "workspace migration");
        }
        Ok(migrated.snapshot)
    }
}

/// Workspace metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceMetadata {
    pub name: String,
    /// Incremented on every save.
    #[serde(default)]
    pub saved_generation: u64,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl WorkspaceMetadata {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            saved_generation: 0,
            tags: BTreeMap::new(),
        }
    }

    pub fn increment_generation(&mut self) {
        self.saved_generation = self.saved_generation.saturating_add(1);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkspaceValidationError {
    UnsupportedVersion {
        found: u16,
        expected: u16,
    },
    LayoutInvalid {
        issue_count: usize,
        first_issue: String,
    },
    EmptyWorkspaceName,
    TimelineCursorOutOfRange {
        cursor: usize,
        len: usize,
    },
}

impl fmt::Display for WorkspaceValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedVersion { found, expected } => write!(
                f,
                "unsupported workspace schema version {found} (expected {expected})"
            ),
            Self::LayoutInvalid {
                issue_count,
                first_issue,
            } => write!(
                f,
                "layout has {issue_count} invariant violation(s), first: {first_issue}"
            ),
            Self::EmptyWorkspaceName => write!(f, "workspace name must not be empty"),
            Self::TimelineCursorOutOfRange { cursor, len } => write!(
                f,
                "timeline cursor {cursor} out of bounds for history length {len}"
            ),
        }
    }
}

impl std::error::Error for WorkspaceValidationError {}

/// Result of bringing a workspace up to the current schema.
#[derive(Debug, Clone)]
pub struct MigrationResult {
    pub snapshot: WorkspaceSnapshot,
    pub from_version: u16,
    pub to_version: u16,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkspaceMigrationError {
    /// Written by a newer release.
    UnsupportedVersion { version: u16 },
    NoMigrationPath { from: u16, to: u16 },
}

impl fmt::Display for WorkspaceMigrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedVersion { version } => {
                write!(f, "unsupported schema version {version} for migration")
            }
            Self::NoMigrationPath { from, to } => {
                write!(f, "no migration path from v{from} to v{to}")
            }
        }
    }
}

impl std::error::Error for WorkspaceMigrationError {}

/// Migrate a workspace to [`WORKSPACE_SCHEMA_VERSION`].
pub fn migrate_workspace(
    snapshot: WorkspaceSnapshot,
) -> Result<MigrationResult, WorkspaceMigrationError> {
    match snapshot.schema_version {
        WORKSPACE_SCHEMA_VERSION => Ok(MigrationResult {
            from_version: WORKSPACE_SCHEMA_VERSION,
            to_version: WORKSPACE_SCHEMA_VERSION,
            warnings: Vec::new(),
            snapshot,
        }),
        v if v > WORKSPACE_SCHEMA_VERSION => {
            Err(WorkspaceMigrationError::UnsupportedVersion { version: v })
        }
        v => Err(WorkspaceMigrationError::NoMigrationPath {
            from: v,
            to: WORKSPACE_SCHEMA_VERSION,
        }),
    }
}

#[must_use]
pub fn needs_migration(snapshot: &WorkspaceSnapshot) -> bool {
    snapshot.schema_version != WORKSPACE_SCHEMA_VERSION
}

/// Failures while reading a persisted workspace.
#[derive(Debug)]
pub enum WorkspaceLoadError {
    Json(serde_json::Error),
    Migration(WorkspaceMigrationError),
    Validation(WorkspaceValidationError),
}

impl fmt::Display for WorkspaceLoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json(err) => write!(f, "workspace JSON parse error: {err}"),
            Self::Migration(err) => write!(f, "workspace migration failed: {err}"),
            Self::Validation(err) => write!(f, "workspace is invalid: {err}"),
        }
    }
}

impl std::error::Error for WorkspaceLoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Json(err) => Some(err),
            Self::Migration(err) => Some(err),
            Self::Validation(err) => Some(err),
        }
    }
}

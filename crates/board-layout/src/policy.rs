//! Editor policy loaded from TOML or JSON.
//!
//! ```toml
//! [grid]
//! default_rows = 3
//! max_row_height = 4
//!
//! [history]
//! max_entries = 50
//! ```
//!
//! Every field has a default, so a partial file (or none) is fine.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::GridError;
use crate::grid::{DEFAULT_ROW_UNIT, GridSpec, MAX_SPLIT_COUNT, MIN_SPLIT_COUNT};

/// Tunables for [`crate::editor::LayoutEditor`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutPolicy {
    pub grid: GridPolicy,
    pub history: HistoryPolicy,
    pub load: LoadPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridPolicy {
    /// Dimensions of a freshly added grid.
    pub default_rows: u32,
    pub default_cols: u32,
    /// Pixel height of a row with multiplier 1.
    pub default_row_unit: u32,
    /// Largest split the editor offers; at most the model's own limit.
    pub max_split_count: u32,
    /// Largest row height multiplier the editor accepts.
    pub max_row_height: u32,
}

impl Default for GridPolicy {
    fn default() -> Self {
        Self {
            default_rows: 2,
            default_cols: 2,
            default_row_unit: DEFAULT_ROW_UNIT,
            max_split_count: MAX_SPLIT_COUNT,
            max_row_height: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryPolicy {
    /// Undo entries kept before the oldest are folded away.
    pub max_entries: usize,
}

impl Default for HistoryPolicy {
    fn default() -> Self {
        Self { max_entries: 100 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadPolicy {
    /// Repair damaged layouts on load instead of rejecting them.
    pub repair_on_load: bool,
}

impl Default for LoadPolicy {
    fn default() -> Self {
        Self {
            repair_on_load: true,
        }
    }
}

impl LayoutPolicy {
    pub fn from_toml_str(s: &str) -> Result<Self, PolicyConfigError> {
        toml::from_str(s).map_err(PolicyConfigError::Toml)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, PolicyConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(PolicyConfigError::Io)?;
        Self::from_toml_str(&content)
    }

    pub fn from_json_str(s: &str) -> Result<Self, PolicyConfigError> {
        serde_json::from_str(s).map_err(PolicyConfigError::Json)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, PolicyConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(PolicyConfigError::Io)?;
        Self::from_json_str(&content)
    }

    /// Range problems, one message each. Empty means valid.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.grid.default_rows == 0 {
            errors.push("grid.default_rows must be > 0".into());
        }
        if self.grid.default_cols == 0 {
            errors.push("grid.default_cols must be > 0".into());
        }
        if self.grid.default_row_unit == 0 {
            errors.push("grid.default_row_unit must be > 0".into());
        }
        if !(MIN_SPLIT_COUNT..=MAX_SPLIT_COUNT).contains(&self.grid.max_split_count) {
            errors.push(format!(
                "grid.max_split_count must be in {MIN_SPLIT_COUNT}..={MAX_SPLIT_COUNT}, got {}",
                self.grid.max_split_count
            ));
        }
        if self.grid.max_row_height == 0 {
            errors.push("grid.max_row_height must be > 0".into());
        }
        if self.history.max_entries == 0 {
            errors.push("history.max_entries must be > 0".into());
        }

        errors
    }

    /// [`Self::validate`] as a `Result`.
    pub fn validated(self) -> Result<Self, PolicyConfigError> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(self)
        } else {
            Err(PolicyConfigError::Validation(errors))
        }
    }

    /// Empty grid with the configured defaults.
    pub fn default_grid(&self) -> Result<GridSpec, GridError> {
        Ok(GridSpec::new(self.grid.default_rows, self.grid.default_cols)?
            .with_row_unit(self.grid.default_row_unit))
    }
}

/// Errors that can occur when loading a policy.
#[derive(Debug)]
pub enum PolicyConfigError {
    Io(std::io::Error),
    Toml(toml::de::Error),
    Json(serde_json::Error),
    Validation(Vec<String>),
}

impl std::fmt::Display for PolicyConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Toml(e) => write!(f, "TOML parse error: {e}"),
            Self::Json(e) => write!(f, "JSON parse error: {e}"),
            Self::Validation(errors) => {
                write!(f, "validation errors: {}", errors.join("; "))
            }
        }
    }
}

impl std::error::Error for PolicyConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Toml(e) => Some(e),
            Self::Json(e) => Some(e),
            Self::Validation(_) => None,
        }
    }
}

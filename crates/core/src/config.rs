//! Binding configuration.
//!
//! Says which native library to bind and which grid kind's symbol family to
//! resolve from it. Deserializable so it can live inside a larger
//! application config; `from_env` covers the common case of picking the
//! library at deploy time.

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Environment variable overriding [`BindingConfig::library_path`].
pub const LIBRARY_ENV: &str = "BFIELD_LIBRARY";

/// Environment variable overriding [`BindingConfig::kind`].
pub const GRID_KIND_ENV: &str = "BFIELD_GRID_KIND";

/// Library stem of the reference engine shipped with this workspace.
pub const DEFAULT_LIBRARY_STEM: &str = "bfield_ffi";

/// Symbol family exported by a native library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GridKind {
    /// Block-sparse grid.
    #[default]
    BGrid,
    /// Dense grid.
    DGrid,
    /// Element-sparse grid.
    EGrid,
}

impl GridKind {
    /// Prefix shared by every symbol of this family.
    #[must_use]
    pub fn symbol_prefix(self) -> &'static str {
        match self {
            GridKind::BGrid => "bGrid",
            GridKind::DGrid => "dGrid",
            GridKind::EGrid => "eGrid",
        }
    }

    /// Full symbol name for `suffix`, e.g. `bGrid_bField_read`.
    #[must_use]
    pub fn symbol(self, suffix: &str) -> String {
        format!("{}_{suffix}", self.symbol_prefix())
    }
}

impl fmt::Display for GridKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol_prefix())
    }
}

impl FromStr for GridKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bgrid" | "b" => Ok(GridKind::BGrid),
            "dgrid" | "d" => Ok(GridKind::DGrid),
            "egrid" | "e" => Ok(GridKind::EGrid),
            other => Err(format!("unknown grid kind '{other}', expected bgrid, dgrid or egrid")),
        }
    }
}

/// Which library to bind and how.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BindingConfig {
    /// Path (or bare file name, resolved by the platform loader) of the library.
    pub library_path: PathBuf,
    /// Symbol family to resolve.
    pub kind: GridKind,
}

impl Default for BindingConfig {
    fn default() -> Self {
        Self {
            library_path: PathBuf::from(libloading::library_filename(DEFAULT_LIBRARY_STEM)),
            kind: GridKind::default(),
        }
    }
}

impl BindingConfig {
    #[must_use]
    pub fn new(library_path: impl Into<PathBuf>) -> Self {
        Self {
            library_path: library_path.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_kind(mut self, kind: GridKind) -> Self {
        self.kind = kind;
        self
    }

    /// Defaults overridden by `BFIELD_LIBRARY` and `BFIELD_GRID_KIND`.
    ///
    /// An unparsable grid kind is reported and ignored.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(path) = env::var_os(LIBRARY_ENV).filter(|p| !p.is_empty()) {
            config.library_path = PathBuf::from(path);
        }
        if let Ok(kind) = env::var(GRID_KIND_ENV) {
            match kind.parse::<GridKind>() {
                Ok(kind) => config.kind = kind,
                Err(e) => tracing::warn!("Ignoring {GRID_KIND_ENV}: {e}"),
            }
        }
        config
    }
}

//! Elevation asset resolution.
//!
//! Lookup goes through an explicit [`AssetContext`] passed to each load call,
//! so two worlds in the same process can resolve the same relative name
//! against different directories.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Result, TerrainError};

/// URI scheme for plain file paths.
const FILE_SCHEME: &str = "file://";
/// URI scheme for paths inside a model search directory.
const MODEL_SCHEME: &str = "model://";

/// Directories used to resolve relative elevation asset paths.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetContext {
    /// Directory of the scene description; tried first.
    pub base_dir: Option<PathBuf>,
    /// Additional search directories, tried in order.
    pub search_paths: Vec<PathBuf>,
}

impl AssetContext {
    /// Context with no directories. Only absolute paths resolve.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Context rooted at a base directory.
    #[must_use]
    pub fn with_base_dir(base: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: Some(base.into()),
            search_paths: Vec::new(),
        }
    }

    /// Append a search directory.
    #[must_use]
    pub fn with_search_path(mut self, dir: impl Into<PathBuf>) -> Self {
        self.search_paths.push(dir.into());
        self
    }

    /// Candidate locations for `requested`, in lookup order.
    #[must_use]
    pub fn candidates(&self, requested: &Path) -> Vec<PathBuf> {
        let text = requested.to_string_lossy();
        if let Some(stripped) = text.strip_prefix(FILE_SCHEME) {
            return self.candidates(Path::new(stripped));
        }
        if let Some(stripped) = text.strip_prefix(MODEL_SCHEME) {
            // model:// never resolves against the base directory
            return self
                .search_paths
                .iter()
                .map(|dir| dir.join(stripped))
                .collect();
        }
        if requested.is_absolute() {
            return vec![requested.to_path_buf()];
        }
        self.base_dir
            .iter()
            .chain(self.search_paths.iter())
            .map(|dir| dir.join(requested))
            .collect()
    }

    /// Resolve `requested` to an existing file.
    ///
    /// # Errors
    ///
    /// Returns [`TerrainError::AssetNotFound`] listing every location tried.
    pub fn resolve(&self, requested: &Path) -> Result<PathBuf> {
        let searched = self.candidates(requested);
        if let Some(found) = searched.iter().find(|p| p.is_file()) {
            debug!(requested = %requested.display(), resolved = %found.display(), "resolved elevation asset");
            return Ok(found.clone());
        }
        Err(TerrainError::AssetNotFound {
            path: requested.to_path_buf(),
            searched,
        })
    }
}

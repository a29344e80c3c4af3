//! Non-destructive variant tracking
//!
//! Inpainting never touches the source image. Each run produces a new file and
//! the map records it as the latest variant of its source; later runs read the
//! variant so edits accumulate.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// `source -> latest inpainted variant`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariantMap {
    entries: BTreeMap<PathBuf, PathBuf>,
}

impl VariantMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `output` as the latest variant of `source`
    ///
    /// Ignored when `output` does not exist on disk. Returns whether it was recorded.
    pub fn record(&mut self, source: &Path, output: &Path) -> bool {
        if !output.is_file() {
            debug!(output = %output.display(), "Variant file missing, not recorded");
            return false;
        }
        self.entries
            .insert(source.to_path_buf(), output.to_path_buf());
        true
    }

    /// Drop the variant for `source`, restoring the original
    pub fn clear(&mut self, source: &Path) -> Option<PathBuf> {
        self.entries.remove(source)
    }

    /// Latest variant for `source`, if any
    pub fn get(&self, source: &Path) -> Option<&Path> {
        self.entries.get(source).map(PathBuf::as_path)
    }

    /// Image a new inpaint run should read: the latest existing variant, else the source
    pub fn input_for(&self, source: &Path) -> PathBuf {
        match self.get(source) {
            Some(variant) if variant.is_file() => variant.to_path_buf(),
            _ => source.to_path_buf(),
        }
    }

    /// Image to show for `source`; the variant only when preview is on
    pub fn display_path(&self, source: &Path, preview: bool) -> PathBuf {
        if preview {
            self.input_for(source)
        } else {
            source.to_path_buf()
        }
    }

    /// Image to export for `source`
    pub fn export_path(&self, source: &Path) -> PathBuf {
        self.input_for(source)
    }

    pub fn has_any(&self) -> bool {
        !self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate `(source, variant)` pairs in path order
    pub fn iter(&self) -> impl Iterator<Item = (&Path, &Path)> {
        self.entries
            .iter()
            .map(|(s, v)| (s.as_path(), v.as_path()))
    }

    /// Load from a JSON file; a missing file is an empty map
    pub fn load(path: &Path) -> std::io::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// Save as pretty JSON
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, json)
    }
}

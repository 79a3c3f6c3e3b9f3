use std::path::Path;

use anyhow::{Context, Result};

use crate::store::{load_settings, Settings, ToolkitLayout};

/// Convenience wrapper bundling the layout and loaded settings of a toolkit root.
#[derive(Debug, Clone)]
pub struct ToolkitContext {
    pub layout: ToolkitLayout,
    pub settings: Settings,
}

impl ToolkitContext {
    /// Load settings and compute the layout for a given root.
    pub fn from_root(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let settings = load_settings(root)
            .with_context(|| format!("Failed to load toolkit settings in {}", root.display()))?;
        let layout = ToolkitLayout::new(root, &settings);
        Ok(Self { layout, settings })
    }

    /// Path of the identification document for `binary`.
    pub fn document_path(&self, binary: &Path) -> std::path::PathBuf {
        crate::identify::document_path(binary, &self.settings.document_suffix)
    }
}

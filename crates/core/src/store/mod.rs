//! Signature toolkit on disk: settings, directory layout and atomic writes.
//!
//! - `Settings`: serializable toolkit settings (`libid.yaml`, `libid.yml` or
//!   `libid.json` in the toolkit root; every field optional).
//! - `ToolkitLayout`: computed paths for the per-CPU library, pattern and
//!   signature directories and the alias files.
//! - `ToolkitContext`: layout plus loaded settings for a given root.

pub mod config;
pub mod context;
pub mod layout;
pub mod util;

pub use config::{EngineSettings, Settings, SettingsError, SETTINGS_FILES};
pub use context::ToolkitContext;
pub use layout::ToolkitLayout;
pub use util::{load_settings, write_atomic};

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::debug;

use crate::store::{Settings, SettingsError, SETTINGS_FILES};

/// Write `contents` to a temporary sibling of `path`, then rename it over `path`.
///
/// Readers never observe a partially written file, and a failed write leaves no
/// temporary file behind.
pub fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Load toolkit settings from the first settings file present in `root`.
///
/// Without any settings file the defaults apply.
pub fn load_settings(root: &Path) -> Result<Settings, SettingsError> {
    for name in SETTINGS_FILES {
        let path = root.join(name);
        let body = match fs::read_to_string(&path) {
            Ok(body) => body,
            Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
            Err(err) => return Err(SettingsError::Io(path, err)),
        };
        debug!(path = %path.display(), "loading settings");
        if body.trim().is_empty() {
            return Ok(Settings::default());
        }
        return if name.ends_with(".json") {
            serde_json::from_str(&body).map_err(|e| SettingsError::Json(path, e))
        } else {
            serde_yaml::from_str(&body).map_err(|e| SettingsError::Yaml(path, e))
        };
    }
    Ok(Settings::default())
}

//! Catalog persistence.
//!
//! The on-disk format is a pretty-printed JSON object with sorted keys, so saving an app that was
//! just loaded produces byte-identical output.

use crate::error::{CatalogError, Result};
use crate::model::{App, SourceParams};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Suffix used for config files when no explicit basename is given.
pub const DEFAULT_FILE_SUFFIX: &str = "_makemcp";

/// Config filename for an app: `{file}.json` when set, else `{name}_makemcp.json`.
///
/// Path separators in the app name are replaced so the file always lands in the target directory.
#[must_use]
pub fn config_file_name(app_name: &str, file: Option<&str>) -> String {
    match file.map(str::trim).filter(|f| !f.is_empty()) {
        Some(f) => format!("{f}.json"),
        None => {
            let safe: String = app_name
                .chars()
                .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
                .collect();
            format!("{safe}{DEFAULT_FILE_SUFFIX}.json")
        }
    }
}

/// Encode an app to its canonical JSON bytes.
///
/// # Errors
///
/// Returns [`CatalogError::ConfigEncode`] if serialization fails.
pub fn encode_app<C: SourceParams>(app: &App<C>) -> Result<Vec<u8>> {
    // Round-trip through `Value` so object keys come out sorted.
    let value = serde_json::to_value(app).map_err(CatalogError::ConfigEncode)?;
    let mut out = serde_json::to_vec_pretty(&value).map_err(CatalogError::ConfigEncode)?;
    out.push(b'\n');
    Ok(out)
}

/// Write an app's config under `dir`, creating intermediate directories (mode 0755).
///
/// Returns the path that was written.
///
/// # Errors
///
/// Returns an error if encoding fails or the file cannot be written.
pub fn save_app<C: SourceParams>(app: &App<C>, dir: &Path) -> Result<PathBuf> {
    let file_name = config_file_name(&app.name, app.shared().file.as_deref());
    let path = dir.join(file_name);
    if let Some(parent) = path.parent() {
        create_dir_all(parent)?;
    }

    let bytes = encode_app(app)?;
    std::fs::write(&path, bytes).map_err(|e| CatalogError::io(&path, e))?;

    tracing::info!(
        app = %app.name,
        tools = app.tools.len(),
        path = %path.display(),
        "Saved tool catalog"
    );
    Ok(path)
}

fn create_dir_all(dir: &Path) -> Result<()> {
    if dir.as_os_str().is_empty() {
        return Ok(());
    }
    let mut builder = std::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt as _;
        builder.mode(0o755);
    }
    builder.create(dir).map_err(|e| CatalogError::io(dir, e))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope {
    source_type: String,
}

/// First load phase: read only the `sourceType` tag.
///
/// # Errors
///
/// Returns [`CatalogError::ConfigDecode`] if the bytes are not a JSON object with a string
/// `sourceType`.
pub fn read_source_type(bytes: &[u8], origin: &str) -> Result<String> {
    let envelope: Envelope =
        serde_json::from_slice(bytes).map_err(|e| CatalogError::decode(origin, e))?;
    Ok(envelope.source_type)
}

/// Second load phase: decode the full app for a known source type and check its invariants.
///
/// # Errors
///
/// Returns [`CatalogError::ConfigDecode`] on shape mismatch, or the invariant error reported by
/// [`App::validate`].
pub fn decode_app<C: SourceParams>(bytes: &[u8], origin: &str) -> Result<App<C>> {
    let app: App<C> =
        serde_json::from_slice(bytes).map_err(|e| CatalogError::decode(origin, e))?;
    app.validate().map_err(|e| match e {
        CatalogError::ConfigDecode { message, .. } => CatalogError::decode(origin, message),
        other => other,
    })?;
    Ok(app)
}

//! Test fixtures: static content directories served by the test server.

use super::constants::*;
use std::path::PathBuf;
use tempfile::TempDir;

/// Creates a temp dir with `templates/index.html` and `public/app.js`.
///
/// Returns (temp_dir, templates_dir, public_dir). Keep the TempDir alive
/// for as long as the server runs.
pub fn create_static_dirs() -> anyhow::Result<(TempDir, PathBuf, PathBuf)> {
    let temp_dir = TempDir::new()?;

    let templates_dir = temp_dir.path().join("templates");
    let public_dir = temp_dir.path().join("public");
    std::fs::create_dir_all(&templates_dir)?;
    std::fs::create_dir_all(&public_dir)?;

    std::fs::write(templates_dir.join("index.html"), INDEX_HTML)?;
    std::fs::write(public_dir.join(APP_JS_NAME), APP_JS)?;

    Ok((temp_dir, templates_dir, public_dir))
}

//! Side-effecting collaborators: config files, processes, oracle, exports.

pub mod config;
pub mod executor;
pub mod oracle;
pub mod process;
pub mod report;

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

fn create_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    Ok(())
}

/// Write `contents` through a sibling temp file and rename it into place.
pub(crate) fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    create_parent(path)?;
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = Path::new(&tmp_name);
    fs::write(tmp_path, contents)
        .with_context(|| format!("write temp file {}", tmp_path.display()))?;
    fs::rename(tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}

pub(crate) fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value)?;
    buf.push('\n');
    write_atomic(path, &buf)
}

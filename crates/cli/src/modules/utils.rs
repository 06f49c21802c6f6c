use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};

/// Read a file, or standard input when `path` is `-`.
pub fn read_source(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut raw = String::new();
        std::io::stdin()
            .read_to_string(&mut raw)
            .context("failed to read standard input")?;
        return Ok(raw);
    }

    std::fs::read_to_string(path).with_context(|| format!("failed to read '{}'", path.display()))
}

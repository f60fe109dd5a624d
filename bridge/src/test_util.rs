use std::io::Write;

use tempfile::{NamedTempFile, TempPath};

/// A script written to a temporary file, removed when dropped.
pub struct ScriptFile {
    path: TempPath,
}

impl ScriptFile {
    pub fn path(&self) -> &str {
        self.path.to_str().unwrap_or_default()
    }
}

pub fn script_file(code: &str) -> anyhow::Result<ScriptFile> {
    let mut file = NamedTempFile::with_suffix(".lua")?;
    file.write_all(code.as_bytes())?;
    Ok(ScriptFile {
        path: file.into_temp_path(),
    })
}

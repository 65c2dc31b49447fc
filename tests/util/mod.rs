#![allow(dead_code)]

use paged_input::{InputStream, Result};
use std::path::{Path, PathBuf};

pub fn fixture_path(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests").join(name)
}

/// A file in the OS temp directory, removed when the value drops.
pub struct TempFile {
    path: PathBuf,
}

impl TempFile {
    pub fn with_bytes(tag: &str, bytes: &[u8]) -> TempFile {
        let path = std::env::temp_dir().join(format!(
            "paged-input-test-{}-{tag}",
            std::process::id()
        ));
        std::fs::write(&path, bytes).unwrap();
        TempFile { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Reads the stream to EOF one byte at a time, counting newlines.
pub fn count_lines(stream: &mut InputStream<'_>) -> Result<usize> {
    let mut lines = 0;
    while stream.readable()? {
        if stream.read_byte() == b'\n' {
            lines += 1;
        }
    }
    Ok(lines)
}

/// Reads the stream to EOF one byte at a time.
pub fn drain(stream: &mut InputStream<'_>) -> Result<Vec<u8>> {
    let mut all = Vec::new();
    while stream.readable()? {
        all.push(stream.read_byte());
    }
    Ok(all)
}

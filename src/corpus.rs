//! # Corpus loading
//!
//! The first two stages of indexing: find the source files under a root directory
//! and read each one into an ordered list of paragraphs (one per non-blank line).

use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::BoxError;

/// A corpus file found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// File name including extension.
    pub file: String,
    /// Directory containing the file.
    pub dir: PathBuf,
    /// Full path to the file.
    pub path: PathBuf,
}

impl SourceFile {
    /// Document identifier: the file name without its extension.
    pub fn document(&self) -> String {
        Path::new(&self.file)
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.file.clone())
    }
}

/// Recursively list files under `root` whose extension is `extension` (no dot).
///
/// Only the extension is checked, never the content. Results are sorted by path
/// so chunk ordinals are stable between runs.
pub fn load_sources(root: impl AsRef<Path>, extension: &str) -> Result<Vec<SourceFile>, BoxError> {
    let root = root.as_ref();
    let mut sources = Vec::new();

    for entry in WalkDir::new(root) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let matches = path
            .extension()
            .map(|ext| ext.to_string_lossy() == extension)
            .unwrap_or(false);
        if !matches {
            continue;
        }

        sources.push(SourceFile {
            file: entry.file_name().to_string_lossy().into_owned(),
            dir: path.parent().map(Path::to_path_buf).unwrap_or_default(),
            path: path.to_path_buf(),
        });
    }

    sources.sort_by(|a, b| a.path.cmp(&b.path));
    info!("Found {} .{} files under {}", sources.len(), extension, root.display());

    Ok(sources)
}

/// A source document split into paragraphs.
#[derive(Debug, Clone)]
pub struct Book {
    pub path: PathBuf,
    pub paragraphs: Vec<String>,
}

impl Book {
    /// Read a whole file and split it into paragraphs.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, BoxError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let book = Self::from_text(path, &text);
        debug!(
            "Read {} paragraphs from {}",
            book.paragraphs.len(),
            path.display()
        );
        Ok(book)
    }

    /// Split `text` on line breaks, dropping blank lines and keeping order.
    pub fn from_text(path: impl AsRef<Path>, text: &str) -> Self {
        let paragraphs = text
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(str::to_string)
            .collect();

        Self {
            path: path.as_ref().to_path_buf(),
            paragraphs,
        }
    }
}

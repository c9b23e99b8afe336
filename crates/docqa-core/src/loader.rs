//! Reads page text produced by an external PDF text extractor.
//!
//! Extractors such as `pdftotext` emit one `.txt` per PDF with pages separated
//! by form feeds; PDF parsing itself happens outside this workspace.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::types::Page;

pub const PAGE_BREAK: char = '\x0c';

/// Split extracted text into 1-based pages on form feeds.
pub fn split_pages(content: &str) -> Vec<Page> {
    let mut parts: Vec<&str> = content.split(PAGE_BREAK).collect();
    // pdftotext terminates the last page with a form feed as well
    if parts.len() > 1 && parts.last().is_some_and(|p| p.trim().is_empty()) {
        parts.pop();
    }
    parts.into_iter().enumerate().map(|(i, text)| Page::new(i as u32 + 1, text)).collect()
}

pub fn load_pages(path: &Path) -> Result<Vec<Page>> {
    let io_err = |source| Error::Io { path: path.display().to_string(), source };
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(_) => String::from_utf8_lossy(&fs::read(path).map_err(io_err)?).to_string(),
    };
    Ok(split_pages(&content))
}

/// Expand files and directories into the sorted list of `.txt` files to ingest.
pub fn collect_text_files(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for root in paths {
        if root.is_file() {
            files.push(root.clone());
            continue;
        }
        let entries = walkdir::WalkDir::new(root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file());
        for entry in entries {
            let path = entry.path();
            let ext = path.extension().and_then(|s| s.to_str());
            if ext.is_some_and(|ext| ext.eq_ignore_ascii_case("txt")) {
                files.push(path.to_path_buf());
            }
        }
    }
    files.sort();
    files.dedup();
    files
}

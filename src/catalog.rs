use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::debug;
use walkdir::WalkDir;

use crate::filename::{self, Recording};

/// One file found under the destination root.
#[derive(Debug, Clone)]
pub struct LocalFile {
    pub recording: Recording,
    pub path: PathBuf,
    pub size: u64,
}

/// Snapshot of the destination directory, keyed by recording filename.
///
/// Completed files are matched by name alone, wherever they sit: recordings
/// placed under a previously-configured grouping scheme still count as
/// downloaded. Partial files are the dot-prefixed leftovers of interrupted
/// transfers, always in the destination root, recorded with their on-disk
/// byte count so transfers can resume from that offset.
#[derive(Debug, Default)]
pub struct LocalCatalog {
    complete: HashMap<String, LocalFile>,
    partial: HashMap<String, LocalFile>,
}

impl LocalCatalog {
    pub fn complete_size(&self, filename: &str) -> Option<u64> {
        self.complete.get(filename).map(|f| f.size)
    }

    pub fn partial_size(&self, filename: &str) -> Option<u64> {
        self.partial.get(filename).map(|f| f.size)
    }

    pub fn complete_count(&self) -> usize {
        self.complete.len()
    }

    pub fn partial_names(&self) -> impl Iterator<Item = &str> {
        self.partial.keys().map(String::as_str)
    }

    /// Every file in the destination, completed and partial alike.
    pub fn files(&self) -> impl Iterator<Item = &LocalFile> {
        self.complete.values().chain(self.partial.values())
    }
}

/// Scan the destination tree into a catalog.
///
/// Walks the root plus one grouping level deep, so both flat and grouped
/// layouts are seen. Files that are not recordings (the lock file, stray
/// user files) are ignored.
pub fn scan(destination: &Path) -> Result<LocalCatalog> {
    let mut catalog = LocalCatalog::default();

    for entry in WalkDir::new(destination)
        .min_depth(1)
        .max_depth(2)
        .follow_links(true)
    {
        let entry = entry.with_context(|| {
            format!("cannot read destination directory : {}", destination.display())
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let Some(name) = entry.file_name().to_str() else {
            continue;
        };
        let size = entry
            .metadata()
            .with_context(|| format!("cannot stat file : {}", entry.path().display()))?
            .len();

        if let Some(stripped) = name.strip_prefix('.') {
            // temporary files only ever live in the destination root
            if entry.depth() == 1 {
                if let Some(recording) = filename::parse(stripped) {
                    debug!("found incomplete download : {} ({size} bytes)", name);
                    catalog.partial.insert(
                        recording.filename.clone(),
                        LocalFile {
                            recording,
                            path: entry.path().to_path_buf(),
                            size,
                        },
                    );
                }
            }
            continue;
        }

        if let Some(recording) = filename::parse(name) {
            // a name seen twice (e.g. under two grouping schemes) keeps the
            // first hit
            catalog
                .complete
                .entry(recording.filename.clone())
                .or_insert(LocalFile {
                    recording,
                    path: entry.path().to_path_buf(),
                    size,
                });
        }
    }

    Ok(catalog)
}

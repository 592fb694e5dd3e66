//! Migration Directory - Read-only view of the migrations on disk
//!
//! Each migration lives in its own sub-directory named
//! `<timestamp>_<description>` and containing a `migration.sql` file.
//! Only names and checksums are exposed; the SQL itself is never executed here.

use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{MigrateError, MigrateResult};

/// Script file expected inside every migration directory
pub const MIGRATION_SCRIPT_FILENAME: &str = "migration.sql";

/// A migration found on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationEntry {
    pub name: String,
    /// Lowercase hex SHA-256 of the migration script
    pub checksum: String,
}

impl MigrationEntry {
    pub fn new(name: impl Into<String>, checksum: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            checksum: checksum.into(),
        }
    }
}

/// Ordered list of migrations available on disk
#[derive(Debug, Clone, Default)]
pub struct MigrationDirectory {
    path: Option<PathBuf>,
    entries: Vec<MigrationEntry>,
}

impl MigrationDirectory {
    /// Build a directory from already known entries
    pub fn from_entries(mut entries: Vec<MigrationEntry>) -> Self {
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Self { path: None, entries }
    }

    /// Load all migrations below `path`
    ///
    /// A missing directory yields an empty list, as does a directory with no
    /// migration sub-directories. Plain files (lock files, READMEs) and
    /// sub-directories without a script are skipped.
    pub fn load(path: impl AsRef<Path>) -> MigrateResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "migrations directory does not exist");
            return Ok(Self {
                path: Some(path.to_path_buf()),
                entries: Vec::new(),
            });
        }

        let dir_entries = fs::read_dir(path).map_err(|e| {
            MigrateError::directory(format!(
                "Failed to read migrations directory {}: {}",
                path.display(),
                e
            ))
        })?;

        let mut entries = Vec::new();
        for entry in dir_entries {
            let entry = entry.map_err(|e| {
                MigrateError::directory(format!("Failed to read directory entry: {}", e))
            })?;

            let entry_path = entry.path();
            if !entry_path.is_dir() {
                continue;
            }

            let script = entry_path.join(MIGRATION_SCRIPT_FILENAME);
            if !script.is_file() {
                tracing::debug!(path = %entry_path.display(), "skipping directory without migration script");
                continue;
            }

            let name = entry.file_name().to_str().map(str::to_string).ok_or_else(|| {
                MigrateError::directory(format!(
                    "Migration directory name is not valid UTF-8: {}",
                    entry_path.display()
                ))
            })?;

            let checksum = checksum_file(&script)?;
            entries.push(MigrationEntry { name, checksum });
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        tracing::debug!(path = %path.display(), count = entries.len(), "loaded migrations directory");

        Ok(Self {
            path: Some(path.to_path_buf()),
            entries,
        })
    }

    /// Where the migrations were loaded from, if they came from disk
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn entries(&self) -> &[MigrationEntry] {
        &self.entries
    }

    /// Exact-match lookup by full directory name
    pub fn find(&self, name: &str) -> Option<&MigrationEntry> {
        self.entries
            .binary_search_by(|entry| entry.name.as_str().cmp(name))
            .ok()
            .map(|index| &self.entries[index])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Hex encoded SHA-256 of a migration script
pub fn checksum_script(contents: &[u8]) -> String {
    hex::encode(Sha256::digest(contents))
}

fn checksum_file(path: &Path) -> MigrateResult<String> {
    let contents = fs::read(path).map_err(|e| {
        MigrateError::directory(format!(
            "Failed to read migration script {}: {}",
            path.display(),
            e
        ))
    })?;
    Ok(checksum_script(&contents))
}

// Copyright 2025 Eric Jingryd (tidynest@proton.me)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Rule document save transaction with automatic backups
//!
//! A save first copies the current document into `backups/` next to it,
//! then replaces the document atomically (temp file + rename), so a failed
//! save never leaves a half-written rules file behind.

use atomic_write_file::AtomicWriteFile;
use chrono::Local;
use std::{
    fs::{self, File, OpenOptions},
    io::{self, ErrorKind, Write},
    path::{Path, PathBuf},
};
use tracing::{debug, warn};

use crate::config::StorageError;

/// Directory, next to the document, that backups are written to
pub const BACKUP_DIR: &str = "backups";

/// Backups of one document allowed within the same second
const MAX_BACKUPS_PER_SECOND: u32 = 99;

/// Atomic write of one rule document with a backup of the previous content.
///
/// # Lifecycle
///
/// 1. `begin()` - Creates a timestamped backup if the document exists
/// 2. `commit()` - Writes the new content atomically
/// 3. `rollback()` - Restores the backed up content if the write failed
///
/// # Example
///
/// ```no_run
/// use diversion_rules::config::SaveTransaction;
/// use std::path::Path;
///
/// let tx = SaveTransaction::begin(Path::new("rules.yaml"))?;
/// tx.commit("- Rule: []\n")?;
/// # Ok::<(), diversion_rules::config::StorageError>(())
/// ```
#[derive(Debug)]
pub struct SaveTransaction {
    path: PathBuf,
    backup_path: Option<PathBuf>,
}

impl SaveTransaction {
    /// Begins a save by backing up the current document.
    ///
    /// A document that does not exist yet has nothing to back up; the
    /// transaction then carries no backup and `rollback()` removes the file.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::BackupFailed` if the backup directory or the
    /// backup file cannot be written. The document is untouched.
    pub fn begin(path: &Path) -> Result<Self, StorageError> {
        let backup_path = if path.is_file() {
            Some(create_timestamped_backup(path)?)
        } else {
            None
        };

        Ok(Self {
            path: path.to_path_buf(),
            backup_path,
        })
    }

    /// Path of the backup taken by `begin()`, if there was anything to back up
    pub fn backup_path(&self) -> Option<&Path> {
        self.backup_path.as_deref()
    }

    /// Commits the transaction by atomically writing `new_content` to the document.
    ///
    /// Creates the document's directory if needed. The backup stays on disk.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::WriteFailed` if the temp file cannot be
    /// created, written or renamed over the document. The document then
    /// still holds its previous content.
    pub fn commit(&self, new_content: &str) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                StorageError::WriteFailed(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }

        write_atomically(&self.path, new_content)?;
        debug!(path = %self.path.display(), bytes = new_content.len(), "rules written");
        Ok(())
    }

    /// Restores the document to its state when the transaction began.
    ///
    /// # Errors
    ///
    /// Returns an error if the backup cannot be read or written back.
    pub fn rollback(&self) -> Result<(), StorageError> {
        match &self.backup_path {
            Some(backup_path) => {
                let backup_content = fs::read_to_string(backup_path)?;
                write_atomically(&self.path, &backup_content)
            }
            None => {
                if self.path.is_file() {
                    fs::remove_file(&self.path)?;
                }
                Ok(())
            }
        }
    }
}

/// Back up, write and, if the write fails, restore the document
pub fn save_with_backup(path: &Path, content: &str) -> Result<(), StorageError> {
    let tx = SaveTransaction::begin(path)?;
    if let Err(e) = tx.commit(content) {
        if let Err(restore) = tx.rollback() {
            warn!(path = %path.display(), error = %restore, "rollback after failed save failed");
        }
        return Err(e);
    }
    Ok(())
}

fn write_atomically(path: &Path, content: &str) -> Result<(), StorageError> {
    let mut file = AtomicWriteFile::options().open(path).map_err(|e| {
        StorageError::WriteFailed(format!("Failed to open for atomic write: {}", e))
    })?;

    file.write_all(content.as_bytes())
        .map_err(|e| StorageError::WriteFailed(format!("Failed to write content: {}", e)))?;

    file.commit()
        .map_err(|e| StorageError::WriteFailed(format!("Failed to commit atomic write: {}", e)))
}

/// Copy `path` to `backups/<name>.<YYYY-MM-DD_HHMMSS>` next to it
///
/// A second backup within the same second gets a `-NN` suffix; an existing
/// backup is never overwritten.
fn create_timestamped_backup(path: &Path) -> Result<PathBuf, StorageError> {
    let backup_dir = path
        .parent()
        .map(|p| p.join(BACKUP_DIR))
        .unwrap_or_else(|| PathBuf::from(BACKUP_DIR));
    fs::create_dir_all(&backup_dir).map_err(|e| {
        StorageError::BackupFailed(format!("{}: {}", backup_dir.display(), e))
    })?;

    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| StorageError::BackupFailed(format!("{} has no file name", path.display())))?;
    let timestamp = Local::now().format("%Y-%m-%d_%H%M%S").to_string();

    let mut attempt = 0u32;
    loop {
        let backup_name = match attempt {
            0 => format!("{}.{}", name, timestamp),
            n => format!("{}.{}-{:02}", name, timestamp, n),
        };
        let backup_path = backup_dir.join(backup_name);

        match OpenOptions::new().write(true).create_new(true).open(&backup_path) {
            Ok(mut backup) => {
                let copied = File::open(path).and_then(|mut original| io::copy(&mut original, &mut backup));
                return match copied {
                    Ok(_) => Ok(backup_path),
                    Err(e) => {
                        let _ = fs::remove_file(&backup_path);
                        Err(StorageError::BackupFailed(format!("{}: {}", backup_path.display(), e)))
                    }
                };
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists && attempt < MAX_BACKUPS_PER_SECOND => {
                attempt += 1;
            }
            Err(e) => {
                return Err(StorageError::BackupFailed(format!("{}: {}", backup_path.display(), e)))
            }
        }
    }
}

/// Backups of `path`, oldest first
pub fn list_backups(path: &Path) -> Result<Vec<PathBuf>, StorageError> {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return Ok(Vec::new());
    };
    let backup_dir = path
        .parent()
        .map(|p| p.join(BACKUP_DIR))
        .unwrap_or_else(|| PathBuf::from(BACKUP_DIR));
    if !backup_dir.is_dir() {
        return Ok(Vec::new());
    }

    let prefix = format!("{}.", name);
    let mut backups = fs::read_dir(&backup_dir)?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(&prefix))
        })
        .collect::<Vec<_>>();
    backups.sort();
    Ok(backups)
}

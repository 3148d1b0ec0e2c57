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

//! Pluggable reader/writer for rule documents

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::config::{save_with_backup, StorageError};

/// Where rule documents are read from and written to
pub trait DocumentStore {
    /// Content of the document, `Ok(None)` when it does not exist
    fn read(&self, path: &Path) -> Result<Option<String>, StorageError>;

    /// Replace the document with `content`
    fn write(&mut self, path: &Path, content: &str) -> Result<(), StorageError>;
}

/// Rule documents on the local filesystem
///
/// Writes go through `SaveTransaction`: the previous content is backed up,
/// the new content replaces it atomically, and a failed write is rolled back.
#[derive(Clone, Debug, Default)]
pub struct FileStore;

impl FileStore {
    pub fn new() -> Self {
        Self
    }
}

impl DocumentStore for FileStore {
    fn read(&self, path: &Path) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::ReadFailed {
                path: path.to_path_buf(),
                source: e,
            }),
        }
    }

    fn write(&mut self, path: &Path, content: &str) -> Result<(), StorageError> {
        save_with_backup(path, content)
    }
}

/// Rule documents held in memory
///
/// A read-only store refuses every write, which is how callers exercise
/// their save-failure paths.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    documents: HashMap<PathBuf, String>,
    read_only: bool,
    writes: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(mut self, path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        self.documents.insert(path.into(), content.into());
        self
    }

    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    pub fn document(&self, path: &Path) -> Option<&str> {
        self.documents.get(path).map(String::as_str)
    }

    /// Number of successful writes
    pub fn writes(&self) -> usize {
        self.writes
    }
}

impl DocumentStore for MemoryStore {
    fn read(&self, path: &Path) -> Result<Option<String>, StorageError> {
        Ok(self.documents.get(path).cloned())
    }

    fn write(&mut self, path: &Path, content: &str) -> Result<(), StorageError> {
        if self.read_only {
            return Err(StorageError::WriteFailed(format!(
                "{} is read-only",
                path.display()
            )));
        }
        self.documents.insert(path.to_path_buf(), content.to_string());
        self.writes += 1;
        Ok(())
    }
}

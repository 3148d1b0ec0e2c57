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

//! Rule document storage with atomic writes and backup support.
//!
//! Loads the built-in rules and the user's rules document, merges them into
//! one `RuleSet`, and writes the user's part back. Key features:
//!
//! - **Forgiving loads**: a broken document is logged and skipped, the
//!   rest of the file and every other source still load
//! - **Validated saves**: rules that cannot be evaluated are never written
//! - **Atomic writes with backups**: through `FileStore`
//!
//! # Example
//!
//! ```no_run
//! use diversion_rules::config::{FileStore, RuleStorage};
//!
//! let mut storage = RuleStorage::standard(FileStore::new(), "/home/user/.config/diversion/rules.yaml");
//! let rules = storage.load_config();
//! storage.save(&rules)?;
//! # Ok::<(), diversion_rules::config::StorageError>(())
//! ```

pub mod error;
pub mod store;
pub mod transaction;
pub mod validator;

pub use error::StorageError;
pub use store::{DocumentStore, FileStore, MemoryStore};
pub use transaction::{list_backups, save_with_backup, SaveTransaction};
pub use validator::{RuleValidator, ValidationIssue, ValidationLevel, ValidationReport};

use serde_yaml::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::core::{Rule, RuleComponent, RuleSet, RuleSource};

/// Reserved path the embedded built-in rules are loaded from
pub const BUILTIN_RULES_PATH: &str = "<builtin>";

/// Rules shipped with the binary, one document per rule
pub const BUILTIN_RULES: &str = "\
%YAML 1.3
---
- Key: [Brightness Down, pressed]
- KeyPress: XF86_MonBrightnessDown
...
---
- Key: [Brightness Up, pressed]
- KeyPress: XF86_MonBrightnessUp
...
";

/// Source of the embedded built-in rules
pub fn builtin_source() -> RuleSource {
    RuleSource::new(BUILTIN_RULES_PATH, false)
}

/// Split a multi-document file into the text of each document.
///
/// A line starting with `---` opens a document (text after the marker
/// belongs to it), a `...` line closes one, and `%` directive lines are
/// dropped. Chunks holding nothing but blank lines and comments are skipped.
pub fn split_documents(text: &str) -> Vec<String> {
    fn is_marker(line: &str, marker: &str) -> bool {
        line.strip_prefix(marker)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with(char::is_whitespace))
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    for line in text.lines() {
        if is_marker(line, "---") {
            chunks.push(std::mem::take(&mut current));
            current.push_str(&line[3..]);
            current.push('\n');
        } else if is_marker(line, "...") {
            chunks.push(std::mem::take(&mut current));
        } else if !line.starts_with('%') {
            current.push_str(line);
            current.push('\n');
        }
    }
    chunks.push(current);

    chunks
        .into_iter()
        .filter(|chunk| {
            chunk
                .lines()
                .map(str::trim)
                .any(|line| !line.is_empty() && !line.starts_with('#'))
        })
        .collect()
}

/// Parse every document of `text` into a `Rule` tagged with `source`.
///
/// A document that fails to parse, or is not a sequence of components, is
/// logged and skipped; `null` documents are skipped silently.
pub fn parse_documents(text: &str, source: &RuleSource) -> Vec<Rule> {
    let mut rules = Vec::new();
    for (index, chunk) in split_documents(text).iter().enumerate() {
        match serde_yaml::from_str::<Value>(chunk) {
            Ok(Value::Sequence(items)) => {
                let components = items.iter().map(RuleComponent::compile).collect();
                rules.push(Rule::with_source(components, source.clone()));
            }
            Ok(Value::Null) => {}
            Ok(_) => warn!(
                path = %source.path.display(),
                document = index,
                "rule document is not a list of components, skipping"
            ),
            Err(e) => warn!(
                path = %source.path.display(),
                document = index,
                error = %e,
                "failed to parse rule document, skipping"
            ),
        }
    }
    rules
}

/// Render document rules as a multi-document YAML file
pub fn render_documents(documents: &[RuleComponent]) -> Result<String, StorageError> {
    let mut out = String::new();
    for document in documents {
        let items = match document {
            RuleComponent::Rule(rule) => rule.components.iter().map(RuleComponent::to_data).collect(),
            other => vec![other.to_data()],
        };
        out.push_str("---\n");
        out.push_str(&serde_yaml::to_string(&Value::Sequence(items))?);
    }
    Ok(out)
}

/// Load and merge `sources`, in order, into one rule set.
///
/// Each source that exists and holds at least one document contributes one
/// top-level `Rule` whose children are its documents. Missing and
/// unreadable sources contribute nothing; the latter are logged.
pub fn load_config<S: DocumentStore + ?Sized>(store: &S, sources: &[RuleSource]) -> RuleSet {
    let mut entries = Vec::new();
    for source in sources {
        let text = if source.path == Path::new(BUILTIN_RULES_PATH) {
            Some(BUILTIN_RULES.to_string())
        } else {
            match store.read(&source.path) {
                Ok(text) => text,
                Err(e) => {
                    warn!(path = %source.path.display(), error = %e, "cannot read rule file");
                    None
                }
            }
        };

        let Some(text) = text else {
            debug!(path = %source.path.display(), "no rule file");
            continue;
        };

        let documents = parse_documents(&text, source);
        debug!(path = %source.path.display(), documents = documents.len(), "loaded rules");
        if !documents.is_empty() {
            let components = documents.into_iter().map(RuleComponent::Rule).collect();
            entries.push(Rule::with_source(components, source.clone()));
        }
    }
    RuleSet::new(entries)
}

/// Write the entry of `rules` that came from `source` back to its document.
///
/// The entry is validated first; Error-level issues block the write and
/// warnings are logged. When `rules` has no entry for `source` an empty
/// document is written.
///
/// # Errors
///
/// Returns `StorageError::ValidationFailed` if validation found errors, or
/// the store's error if the write failed. Nothing is retried.
pub fn save<S: DocumentStore + ?Sized>(
    store: &mut S,
    rules: &RuleSet,
    source: &RuleSource,
    validator: &RuleValidator,
) -> Result<(), StorageError> {
    let entry = rules.entries().iter().find_map(|c| match c {
        RuleComponent::Rule(rule) if rule.source.as_ref() == Some(source) => Some(rule),
        _ => None,
    });
    let documents = entry.map(|rule| rule.components.as_slice()).unwrap_or(&[]);

    let report = validator.validate_rule(&Rule::new(documents.to_vec()));
    for issue in report.warnings() {
        warn!(path = %source.path.display(), "{}", issue);
    }
    if report.has_errors() {
        let errors = report.errors().collect::<Vec<_>>();
        for issue in &errors {
            warn!(path = %source.path.display(), "save blocked: {}", issue);
        }
        return Err(StorageError::ValidationFailed(format!(
            "{} validation error(s) detected",
            errors.len()
        )));
    }

    let content = render_documents(documents)?;
    store.write(&source.path, &content)?;
    debug!(path = %source.path.display(), documents = documents.len(), "saved rules");
    Ok(())
}

/// A document store plus the ordered rule sources it serves
#[derive(Debug)]
pub struct RuleStorage<S: DocumentStore> {
    store: S,
    sources: Vec<RuleSource>,
    validator: RuleValidator,
}

impl<S: DocumentStore> RuleStorage<S> {
    /// Storage over any ordered list of sources
    pub fn new(store: S, sources: Vec<RuleSource>) -> Self {
        Self {
            store,
            sources,
            validator: RuleValidator::new(),
        }
    }

    /// The user's document (editable) followed by the built-in rules
    pub fn standard(store: S, user_path: impl Into<PathBuf>) -> Self {
        Self::new(store, vec![RuleSource::new(user_path, true), builtin_source()])
    }

    pub fn sources(&self) -> &[RuleSource] {
        &self.sources
    }

    /// The first writable source, where saves go
    pub fn user_source(&self) -> Option<&RuleSource> {
        self.sources.iter().find(|s| s.editable)
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn load_config(&self) -> RuleSet {
        load_config(&self.store, &self.sources)
    }

    /// Save the user's part of `rules`
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NoEditableSource` when no source is writable,
    /// otherwise whatever `save` reports.
    pub fn save(&mut self, rules: &RuleSet) -> Result<(), StorageError> {
        let source = self
            .sources
            .iter()
            .find(|s| s.editable)
            .cloned()
            .ok_or(StorageError::NoEditableSource)?;
        save(&mut self.store, rules, &source, &self.validator)
    }
}

#[cfg(test)]
mod tests;

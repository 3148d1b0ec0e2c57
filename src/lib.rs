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

//! Diversion Rules
//!
//! A rule tree engine deciding what happens to input events diverted from
//! HID devices: key presses, wheel movements, gestures and notifications.
//!
//! # Features
//!
//! - **Component Model:** Conditions, actions and combinators as one tree type
//! - **Lossless Loading:** Unknown components survive a load/save round trip
//! - **Evaluation:** First matching rule wins, actions go to a pluggable handler
//! - **Structural Editing:** Insert, delete, cut/paste, wrap, negate and flatten
//! - **Automatic Backups:** Timestamped backups before every rules change
//! - **Atomic Operations:** Safe file writes with rollback on failure
//!
//! # Architecture
//!
//! - **`core`:** Business logic (component types, compiler, evaluation, key table)
//! - **`config`:** Rule documents (loading, merging, validation, atomic saves)
//! - **`editor`:** Arena projection of the rules and the editing controller
//!
//! # Examples
//!
//! ## Evaluating an event
//!
//! ```
//! use diversion_rules::config::{MemoryStore, RuleStorage};
//! use diversion_rules::core::{evaluate, ActionRecorder, EvalContext, Event, KeyAction, KeyTable};
//!
//! let storage = RuleStorage::standard(MemoryStore::new(), "rules.yaml");
//! let rules = storage.load_config();
//!
//! let event = Event::new().with_key("Brightness Down", KeyAction::Pressed);
//! let mut recorder = ActionRecorder::new();
//! let keys = KeyTable::new();
//! let mut ctx = EvalContext::new(&event, &mut recorder, &keys);
//!
//! assert!(evaluate(&rules, &mut ctx).diverted);
//! assert_eq!(recorder.actions.len(), 1);
//! ```
//!
//! ## Editing and saving
//!
//! ```no_run
//! use diversion_rules::config::{FileStore, RuleStorage};
//! use diversion_rules::editor::RuleEditor;
//!
//! let storage = RuleStorage::standard(FileStore::new(), "/home/user/.config/diversion/rules.yaml");
//! let mut editor = RuleEditor::new(storage);
//!
//! let rows = editor.rows();
//! let first = rows.iter().find(|r| r.level == 2 && r.editable).map(|r| r.id);
//! if let Some(id) = first {
//!     editor.negate(id)?;
//!     editor.save()?;
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod core;
pub mod editor;

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

//! src/core/mod.rs
//!
//! Core rule engine module
//!
//! This module contains the rule tree data model and the algorithms that
//! run over it:
//! - Type definitions for rule components, rules and rule sets
//! - Compilation between the tagged-value text form and components
//! - Evaluation of a rule set against a device event
//! - The table of key symbols key presses may synthesise
//!
//! Nothing here touches the filesystem or the device transport, so the
//! whole engine is unit tested without either.

pub mod compile;
pub mod evaluate;
pub mod keys;
pub mod types;

pub use compile::{compile, try_compile, DecodeError};
pub use evaluate::{
    evaluate, ActionHandler, ActionRecorder, Decision, DeviceInfo, EvalContext, Event, KeyEvent,
    RecordedAction,
};
pub use keys::{default_keys, KeyTable};
pub use types::*;

#[cfg(test)]
mod tests;

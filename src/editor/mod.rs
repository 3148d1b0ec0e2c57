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

//! Structural rule editing
//!
//! `RuleTree` projects a rule set into an arena of nodes with levels,
//! editability and placeholder rows; `RuleEditor` applies the editing
//! operations to it and keeps the rule set in step.

pub mod controller;
pub mod tree;

pub use controller::{Combinator, EditError, Row, RuleEditor};
pub use tree::{NodeId, NodeKind, RuleTree};

#[cfg(test)]
mod tests;

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

//! Rule editor controller - mediates between storage and a presentation layer
//!
//! # Responsibilities
//!
//! - Load rules from `RuleStorage` and keep the arena projection in sync
//! - Check the preconditions of every structural edit before touching the tree
//! - Own the clipboard used by cut, copy and paste
//! - Track unsaved changes and notify the presentation layer
//!
//! # Architecture
//!
//! The controller owns the `RuleSet` the evaluator reads and the `RuleTree`
//! projection of it. Every successful edit changes the tree, rebuilds the
//! rule set from it, marks the editor unsaved and fires the change listener
//! once. A rejected edit changes nothing.

use thiserror::Error;
use tracing::{debug, info};

use crate::config::{DocumentStore, RuleStorage, StorageError};
use crate::core::{Rule, RuleComponent, RuleSet, RuleSource};
use crate::editor::tree::{NodeId, NodeKind, RuleTree};

/// Reasons an edit was refused
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum EditError {
    #[error("node {0} does not exist")]
    UnknownNode(NodeId),

    #[error("node {0} belongs to read-only rules")]
    ReadOnly(NodeId),

    #[error("node {0} is an empty placeholder")]
    Placeholder(NodeId),

    #[error("operation not allowed on a level {0} node")]
    WrongLevel(usize),

    #[error("a Not holds a single component")]
    NotParent,

    #[error("clipboard is empty")]
    EmptyClipboard,

    #[error("only a whole rule can be placed here")]
    NotARule,

    #[error("node {0} is not a container that can be flattened")]
    NotFlattenable(NodeId),

    #[error("container {0} has no components")]
    EmptyContainer(NodeId),

    #[error("node {0} is not a condition or action")]
    NotALeaf(NodeId),
}

/// Containers a component can be wrapped in
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Combinator {
    Rule,
    And,
    Or,
}

impl Combinator {
    fn kind(self) -> NodeKind {
        match self {
            Combinator::Rule => NodeKind::Rule(None),
            Combinator::And => NodeKind::And,
            Combinator::Or => NodeKind::Or,
        }
    }
}

/// One row of the projection as a presentation layer shows it
#[derive(Clone, Debug, PartialEq)]
pub struct Row {
    pub id: NodeId,
    pub level: usize,
    pub editable: bool,
    pub placeholder: bool,
    /// One-line description of the component
    pub label: String,
}

/// Structural editor over the merged rules
pub struct RuleEditor<S: DocumentStore> {
    storage: RuleStorage<S>,
    rules: RuleSet,
    tree: RuleTree,
    clipboard: Option<RuleComponent>,
    unsaved: bool,
    on_change: Option<Box<dyn FnMut()>>,
}

impl<S: DocumentStore> RuleEditor<S> {
    /// Creates an editor and loads the rules from `storage`
    ///
    /// When the storage has a writable source but no rules were loaded
    /// from it, an empty user rule is added so there is somewhere to insert.
    ///
    /// # Example
    ///
    /// ```
    /// use diversion_rules::config::{MemoryStore, RuleStorage};
    /// use diversion_rules::editor::RuleEditor;
    ///
    /// let editor = RuleEditor::new(RuleStorage::standard(MemoryStore::new(), "rules.yaml"));
    /// // user rule + built-in rules
    /// assert_eq!(editor.rules().entries().len(), 2);
    /// assert!(!editor.unsaved());
    /// ```
    pub fn new(storage: RuleStorage<S>) -> Self {
        let rules = Self::load(&storage);
        let tree = RuleTree::from_ruleset(&rules);
        Self {
            storage,
            rules,
            tree,
            clipboard: None,
            unsaved: false,
            on_change: None,
        }
    }

    fn load(storage: &RuleStorage<S>) -> RuleSet {
        let mut rules = storage.load_config();
        if rules.ensure_user_rule(storage.sources()) {
            debug!("no user rules loaded, starting empty");
        }
        rules
    }

    /// Registers the callback fired once after every successful edit
    pub fn set_change_listener(&mut self, listener: impl FnMut() + 'static) {
        self.on_change = Some(Box::new(listener));
    }

    /// The rules as currently edited
    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn tree(&self) -> &RuleTree {
        &self.tree
    }

    pub fn storage(&self) -> &RuleStorage<S> {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut RuleStorage<S> {
        &mut self.storage
    }

    pub fn clipboard(&self) -> Option<&RuleComponent> {
        self.clipboard.as_ref()
    }

    /// True when there are edits that have not been saved
    pub fn unsaved(&self) -> bool {
        self.unsaved
    }

    pub fn level(&self, id: NodeId) -> Option<usize> {
        self.tree.level(id)
    }

    pub fn is_editable(&self, id: NodeId) -> bool {
        self.tree.is_editable(id)
    }

    pub fn component(&self, id: NodeId) -> Option<RuleComponent> {
        self.tree.component(id)
    }

    /// The projection, depth first
    pub fn rows(&self) -> Vec<Row> {
        self.tree
            .walk()
            .into_iter()
            .map(|(id, level)| {
                let placeholder = self.tree.is_placeholder(id);
                let label = match self.tree.component(id) {
                    Some(component) => component.to_string(),
                    None => "(empty)".to_string(),
                };
                Row {
                    id,
                    level,
                    editable: self.tree.is_editable(id),
                    placeholder,
                    label,
                }
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Edits
    // ------------------------------------------------------------------

    /// Inserts `component` above or below `target`
    ///
    /// At a placeholder the component takes the placeholder's place.
    ///
    /// # Returns
    ///
    /// * `Ok(NodeId)` - The new node
    /// * `Err(EditError)` - Target above level 2, read-only, or next to the child of a `Not`
    pub fn insert(&mut self, target: NodeId, component: RuleComponent, below: bool) -> Result<NodeId, EditError> {
        self.check_editable(target)?;
        let level = self.check_level(target, 2)?;
        let (parent, index) = self.insertion_point(target, below)?;
        if matches!(self.tree.kind(parent), Some(NodeKind::Not)) && !self.tree.is_placeholder(target) {
            return Err(EditError::NotParent);
        }

        let id = self
            .tree
            .insert(parent, index, &component)
            .ok_or(EditError::UnknownNode(parent))?;
        debug!(node = %id, level, "inserted {}", component);
        self.changed();
        Ok(id)
    }

    /// Inserts a new empty rule
    ///
    /// On a level 1 row the rule goes above or below it; on a level 0 row
    /// it becomes the first rule of that entry. The new rule is saved with
    /// the entry it belongs to.
    pub fn insert_rule(&mut self, target: NodeId, below: bool) -> Result<NodeId, EditError> {
        self.insert_whole_rule(target, Rule::default(), below)
    }

    /// Removes `target` and returns the component it held
    ///
    /// Removing the last component of a container leaves its placeholder.
    pub fn delete(&mut self, target: NodeId) -> Result<RuleComponent, EditError> {
        self.check_component(target)?;
        self.check_editable(target)?;
        self.check_level(target, 1)?;
        self.check_parent_not_negation(target)?;

        let component = self.tree.remove(target).ok_or(EditError::UnknownNode(target))?;
        debug!(node = %target, "deleted {}", component);
        self.changed();
        Ok(component)
    }

    /// Deletes `target` and keeps it on the clipboard
    pub fn cut(&mut self, target: NodeId) -> Result<(), EditError> {
        let component = self.delete(target)?;
        self.clipboard = Some(component);
        Ok(())
    }

    /// Puts an independent copy of `target` on the clipboard
    pub fn copy(&mut self, target: NodeId) -> Result<(), EditError> {
        self.check_component(target)?;
        self.check_level(target, 1)?;
        let component = self.tree.component(target).ok_or(EditError::UnknownNode(target))?;
        self.clipboard = Some(component.deep_copy());
        Ok(())
    }

    /// Inserts a fresh copy of the clipboard above or below `target`
    ///
    /// The clipboard keeps its content, so pasting again inserts another
    /// independent copy. On level 0 and 1 rows only a whole rule can be
    /// pasted.
    pub fn paste(&mut self, target: NodeId, below: bool) -> Result<NodeId, EditError> {
        let pasted = self
            .clipboard
            .as_ref()
            .ok_or(EditError::EmptyClipboard)?
            .deep_copy();
        let level = self.tree.level(target).ok_or(EditError::UnknownNode(target))?;

        if level <= 1 {
            match pasted {
                RuleComponent::Rule(rule) => self.insert_whole_rule(target, rule, below),
                _ => Err(EditError::NotARule),
            }
        } else {
            self.insert(target, pasted, below)
        }
    }

    /// Wraps `target` in a new `Rule`, `And` or `Or`
    ///
    /// Under a `Not` the wrapper takes the place of the `Not`'s child.
    pub fn wrap(&mut self, target: NodeId, combinator: Combinator) -> Result<NodeId, EditError> {
        self.check_component(target)?;
        self.check_editable(target)?;
        self.check_level(target, 2)?;

        let id = self
            .tree
            .wrap(target, combinator.kind())
            .ok_or(EditError::UnknownNode(target))?;
        self.changed();
        Ok(id)
    }

    /// Negates `target` without stacking negations
    ///
    /// - A `Not` is replaced by its component
    /// - The component of a `Not` replaces that `Not`
    /// - Anything else is wrapped in a new `Not`
    ///
    /// # Returns
    ///
    /// The node now holding the negated result.
    pub fn negate(&mut self, target: NodeId) -> Result<NodeId, EditError> {
        self.check_component(target)?;
        self.check_editable(target)?;
        self.check_level(target, 2)?;

        let parent = self.tree.parent(target).ok_or(EditError::UnknownNode(target))?;
        let result = if matches!(self.tree.kind(target), Some(NodeKind::Not)) {
            if self.tree.is_empty_container(target) {
                return Err(EditError::EmptyContainer(target));
            }
            self.tree
                .splice(target)
                .and_then(|moved| moved.first().copied())
                .ok_or(EditError::UnknownNode(target))?
        } else if matches!(self.tree.kind(parent), Some(NodeKind::Not)) {
            self.tree.splice(parent).ok_or(EditError::UnknownNode(parent))?;
            target
        } else {
            self.tree
                .wrap(target, NodeKind::Not)
                .ok_or(EditError::UnknownNode(target))?
        };

        self.changed();
        Ok(result)
    }

    /// Replaces a container by its components, in place
    ///
    /// # Returns
    ///
    /// The spliced components, in order.
    pub fn flatten(&mut self, target: NodeId) -> Result<Vec<NodeId>, EditError> {
        self.check_component(target)?;
        self.check_editable(target)?;
        self.check_level(target, 2)?;
        self.check_parent_not_negation(target)?;

        match self.tree.kind(target) {
            Some(NodeKind::Rule(_) | NodeKind::And | NodeKind::Or | NodeKind::Not) => {}
            _ => return Err(EditError::NotFlattenable(target)),
        }
        if self.tree.is_empty_container(target) {
            return Err(EditError::EmptyContainer(target));
        }

        let moved = self.tree.splice(target).ok_or(EditError::UnknownNode(target))?;
        self.changed();
        Ok(moved)
    }

    /// Swaps the condition or action at `target` for `component`
    ///
    /// On a `Later` node only the delay is taken from `component` (which
    /// must be a `Later` too); the deferred components stay and so does the
    /// node id.
    pub fn replace(&mut self, target: NodeId, component: RuleComponent) -> Result<NodeId, EditError> {
        self.check_component(target)?;
        self.check_editable(target)?;
        let is_later = matches!(self.tree.kind(target), Some(NodeKind::Later(_)));
        if let (true, RuleComponent::Later { delay, .. }) = (is_later, &component) {
            self.tree
                .set_delay(target, *delay)
                .ok_or(EditError::UnknownNode(target))?;
            debug!(node = %target, delay = *delay, "changed delay");
            self.changed();
            return Ok(target);
        }
        if !matches!(self.tree.kind(target), Some(NodeKind::Leaf(_))) || component.is_container() {
            return Err(EditError::NotALeaf(target));
        }

        let id = self
            .tree
            .replace(target, &component)
            .ok_or(EditError::UnknownNode(target))?;
        self.changed();
        Ok(id)
    }

    // ------------------------------------------------------------------
    // Storage
    // ------------------------------------------------------------------

    /// Drops every unsaved edit and loads the rules again
    ///
    /// Node ids from before the reload are no longer valid.
    pub fn reload(&mut self) {
        self.rules = Self::load(&self.storage);
        self.tree = RuleTree::from_ruleset_at(&self.rules, self.tree.next_base());
        self.unsaved = false;
        info!("rules reloaded, unsaved edits discarded");
    }

    /// Writes the user's rules back to their document
    ///
    /// # Errors
    ///
    /// Returns the storage error on failure; the rules and the unsaved
    /// flag are left as they were so the save can be retried.
    pub fn save(&mut self) -> Result<(), StorageError> {
        self.storage.save(&self.rules)?;
        self.unsaved = false;
        info!("rules saved");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn changed(&mut self) {
        self.rules = self.tree.to_ruleset();
        self.unsaved = true;
        if let Some(listener) = self.on_change.as_mut() {
            listener();
        }
    }

    fn insert_whole_rule(&mut self, target: NodeId, mut rule: Rule, below: bool) -> Result<NodeId, EditError> {
        self.check_editable(target)?;
        let level = self.tree.level(target).ok_or(EditError::UnknownNode(target))?;
        let (parent, index) = match level {
            0 => (target, 0),
            1 => self.insertion_point(target, below)?,
            other => return Err(EditError::WrongLevel(other)),
        };

        rule.source = self.entry_source(parent);
        let id = self
            .tree
            .insert(parent, index, &RuleComponent::Rule(rule))
            .ok_or(EditError::UnknownNode(parent))?;
        debug!(node = %id, "inserted rule");
        self.changed();
        Ok(id)
    }

    /// Source of the level 0 entry a node lives under
    fn entry_source(&self, id: NodeId) -> Option<RuleSource> {
        let entry = self.tree.entry_of(id)?;
        match self.tree.kind(entry) {
            Some(NodeKind::Rule(source)) => source.clone(),
            _ => None,
        }
    }

    /// Parent and child index a new sibling of `target` goes to
    fn insertion_point(&self, target: NodeId, below: bool) -> Result<(NodeId, usize), EditError> {
        let parent = self.tree.parent(target).ok_or(EditError::UnknownNode(target))?;
        if self.tree.is_placeholder(target) {
            return Ok((parent, 0));
        }
        let index = self
            .tree
            .index_in_parent(target)
            .ok_or(EditError::UnknownNode(target))?;
        Ok((parent, if below { index + 1 } else { index }))
    }

    fn check_editable(&self, id: NodeId) -> Result<(), EditError> {
        if !self.tree.contains(id) || id == self.tree.root() {
            return Err(EditError::UnknownNode(id));
        }
        if !self.tree.is_editable(id) {
            return Err(EditError::ReadOnly(id));
        }
        Ok(())
    }

    fn check_level(&self, id: NodeId, min: usize) -> Result<usize, EditError> {
        let level = self.tree.level(id).ok_or(EditError::UnknownNode(id))?;
        if level < min {
            return Err(EditError::WrongLevel(level));
        }
        Ok(level)
    }

    /// The node exists and holds a component
    fn check_component(&self, id: NodeId) -> Result<(), EditError> {
        if !self.tree.contains(id) || id == self.tree.root() {
            return Err(EditError::UnknownNode(id));
        }
        if self.tree.is_placeholder(id) {
            return Err(EditError::Placeholder(id));
        }
        Ok(())
    }

    fn check_parent_not_negation(&self, id: NodeId) -> Result<(), EditError> {
        match self.tree.parent(id).and_then(|p| self.tree.kind(p)) {
            Some(NodeKind::Not) => Err(EditError::NotParent),
            _ => Ok(()),
        }
    }
}

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

//! src/editor/tree.rs
//!
//! Arena projection of a rule set for structural editing
//!
//! Every component of the rule set becomes a node addressed by a `NodeId`
//! with index links to its parent and children. Containers without
//! components hold exactly one `Placeholder` node so there is always a row
//! to insert at.
//!
//! The hidden root node stands for the rule set itself; its children are
//! the per-source entries at level 0, their documents are at level 1 and
//! everything below is at level 2 or deeper.
//!
//! Ids are never reused: a removed node's slot stays empty, and a tree
//! rebuilt with `from_ruleset_at` continues numbering after the old one.
//!
//! This layer performs structural changes only. Whether a change is
//! allowed is decided by the controller.

use std::fmt;

use crate::core::{Rule, RuleComponent, RuleSet, RuleSource};

/// Stable handle of a node in a `RuleTree`
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct NodeId(usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a node stands for
#[derive(Clone, Debug, PartialEq)]
pub enum NodeKind {
    /// The rule set itself, never shown
    Root,
    Rule(Option<RuleSource>),
    And,
    Or,
    Not,
    /// Deferred components with their delay in seconds
    Later(f64),
    Leaf(RuleComponent),
    /// Stand-in row of a container with no components
    Placeholder,
}

impl NodeKind {
    pub fn is_container(&self) -> bool {
        matches!(
            self,
            NodeKind::Rule(_) | NodeKind::And | NodeKind::Or | NodeKind::Not | NodeKind::Later(_)
        )
    }

    fn of(component: &RuleComponent) -> NodeKind {
        match component {
            RuleComponent::Rule(rule) => NodeKind::Rule(rule.source.clone()),
            RuleComponent::And(_) => NodeKind::And,
            RuleComponent::Or(_) => NodeKind::Or,
            RuleComponent::Not(_) => NodeKind::Not,
            RuleComponent::Later { delay, .. } => NodeKind::Later(*delay),
            leaf => NodeKind::Leaf(leaf.clone()),
        }
    }
}

#[derive(Clone, Debug)]
struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Mutable projection of a `RuleSet`
#[derive(Clone, Debug)]
pub struct RuleTree {
    base: usize,
    nodes: Vec<Option<Node>>,
}

impl RuleTree {
    pub fn from_ruleset(rules: &RuleSet) -> Self {
        Self::from_ruleset_at(rules, 0)
    }

    /// Project `rules`, numbering nodes from `base`
    pub fn from_ruleset_at(rules: &RuleSet, base: usize) -> Self {
        let mut tree = Self {
            base,
            nodes: Vec::new(),
        };
        let root = tree.alloc(NodeKind::Root, None);
        let entries = rules
            .entries()
            .iter()
            .map(|entry| tree.build(root, entry))
            .collect();
        tree.set_children(root, entries);
        tree
    }

    /// First id a tree rebuilt after this one should use
    pub fn next_base(&self) -> usize {
        self.base + self.nodes.len()
    }

    pub fn root(&self) -> NodeId {
        NodeId(self.base)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    pub fn kind(&self, id: NodeId) -> Option<&NodeKind> {
        self.node(id).map(|n| &n.kind)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).and_then(|n| n.parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    pub fn is_placeholder(&self, id: NodeId) -> bool {
        matches!(self.kind(id), Some(NodeKind::Placeholder))
    }

    /// True when the node is a container holding only its placeholder
    pub fn is_empty_container(&self, id: NodeId) -> bool {
        match self.children(id) {
            [only] => self.is_placeholder(*only),
            _ => false,
        }
    }

    /// Depth below the hidden root: entries are level 0, `None` for the root
    pub fn level(&self, id: NodeId) -> Option<usize> {
        let mut node = self.node(id)?;
        let mut depth = 0usize;
        while let Some(parent) = node.parent {
            depth += 1;
            node = self.node(parent)?;
        }
        depth.checked_sub(1)
    }

    /// True when the node or an ancestor is a rule from a writable source
    pub fn is_editable(&self, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(node) = current.and_then(|id| self.node(id)) {
            if let NodeKind::Rule(Some(source)) = &node.kind {
                if source.editable {
                    return true;
                }
            }
            current = node.parent;
        }
        false
    }

    pub fn index_in_parent(&self, id: NodeId) -> Option<usize> {
        let parent = self.parent(id)?;
        self.children(parent).iter().position(|c| *c == id)
    }

    /// The level-0 entry the node lives under
    pub fn entry_of(&self, id: NodeId) -> Option<NodeId> {
        let mut current = id;
        loop {
            let parent = self.parent(current)?;
            if parent == self.root() {
                return Some(current);
            }
            current = parent;
        }
    }

    /// Rebuild the component a node stands for, `None` for the root and placeholders
    pub fn component(&self, id: NodeId) -> Option<RuleComponent> {
        let node = self.node(id)?;
        let children = || {
            node.children
                .iter()
                .filter_map(|c| self.component(*c))
                .collect::<Vec<_>>()
        };

        let component = match &node.kind {
            NodeKind::Root | NodeKind::Placeholder => return None,
            NodeKind::Rule(source) => RuleComponent::Rule(Rule {
                components: children(),
                source: source.clone(),
            }),
            NodeKind::And => RuleComponent::And(children()),
            NodeKind::Or => RuleComponent::Or(children()),
            NodeKind::Not => RuleComponent::Not(children().into_iter().next().map(Box::new)),
            NodeKind::Later(delay) => RuleComponent::Later {
                delay: *delay,
                components: children(),
            },
            NodeKind::Leaf(leaf) => leaf.clone(),
        };
        Some(component)
    }

    /// Rebuild the whole rule set
    pub fn to_ruleset(&self) -> RuleSet {
        let entries = self
            .children(self.root())
            .iter()
            .filter_map(|c| self.component(*c))
            .collect();
        RuleSet {
            root: Rule::new(entries),
        }
    }

    /// Nodes below the root, depth first, with their levels
    pub fn walk(&self) -> Vec<(NodeId, usize)> {
        fn visit(tree: &RuleTree, id: NodeId, level: usize, out: &mut Vec<(NodeId, usize)>) {
            out.push((id, level));
            for child in tree.children(id) {
                visit(tree, *child, level + 1, out);
            }
        }

        let mut out = Vec::new();
        for entry in self.children(self.root()) {
            visit(self, *entry, 0, &mut out);
        }
        out
    }

    /// Insert `component` as child `index` of `parent`, replacing a placeholder
    pub fn insert(&mut self, parent: NodeId, index: usize, component: &RuleComponent) -> Option<NodeId> {
        let kind = self.kind(parent)?;
        if !kind.is_container() && *kind != NodeKind::Root {
            return None;
        }

        if self.is_empty_container(parent) {
            let placeholders = std::mem::take(&mut self.node_mut(parent)?.children);
            placeholders.into_iter().for_each(|p| self.free(p));
        }

        let child = self.build(parent, component);
        let children = &mut self.node_mut(parent)?.children;
        let index = index.min(children.len());
        children.insert(index, child);
        Some(child)
    }

    /// Remove a node and its subtree, returning the component it stood for
    pub fn remove(&mut self, id: NodeId) -> Option<RuleComponent> {
        let component = self.component(id)?;
        self.detach(id)?;
        self.free(id);
        Some(component)
    }

    /// Put `component` where `id` was
    pub fn replace(&mut self, id: NodeId, component: &RuleComponent) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let index = self.index_in_parent(id)?;
        let new = self.build(parent, component);
        self.node_mut(parent)?.children[index] = new;
        self.free(id);
        Some(new)
    }

    /// Change the delay of a `Later` node, keeping its components
    pub fn set_delay(&mut self, id: NodeId, delay: f64) -> Option<()> {
        match &mut self.node_mut(id)?.kind {
            NodeKind::Later(current) => {
                *current = delay;
                Some(())
            }
            _ => None,
        }
    }

    /// Put a new container of `kind` where `id` was, holding `id`
    pub fn wrap(&mut self, id: NodeId, kind: NodeKind) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let index = self.index_in_parent(id)?;
        let wrapper = self.alloc(kind, Some(parent));
        self.set_children(wrapper, vec![id]);
        self.node_mut(id)?.parent = Some(wrapper);
        self.node_mut(parent)?.children[index] = wrapper;
        Some(wrapper)
    }

    /// Replace a container by its components, returning them in order
    pub fn splice(&mut self, id: NodeId) -> Option<Vec<NodeId>> {
        let parent = self.parent(id)?;
        let index = self.index_in_parent(id)?;

        let children = std::mem::take(&mut self.node_mut(id)?.children);
        let (placeholders, moved): (Vec<_>, Vec<_>) =
            children.into_iter().partition(|c| self.is_placeholder(*c));
        placeholders.into_iter().for_each(|p| self.free(p));
        for child in &moved {
            self.node_mut(*child)?.parent = Some(parent);
        }

        let siblings = &mut self.node_mut(parent)?.children;
        siblings.remove(index);
        for (offset, child) in moved.iter().enumerate() {
            siblings.insert(index + offset, *child);
        }
        self.free(id);
        self.ensure_placeholder(parent);
        Some(moved)
    }

    fn node(&self, id: NodeId) -> Option<&Node> {
        let index = id.0.checked_sub(self.base)?;
        self.nodes.get(index).and_then(Option::as_ref)
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        let index = id.0.checked_sub(self.base)?;
        self.nodes.get_mut(index).and_then(Option::as_mut)
    }

    fn alloc(&mut self, kind: NodeKind, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.next_base());
        self.nodes.push(Some(Node {
            kind,
            parent,
            children: Vec::new(),
        }));
        id
    }

    fn set_children(&mut self, id: NodeId, children: Vec<NodeId>) {
        if let Some(node) = self.node_mut(id) {
            node.children = children;
        }
    }

    /// Allocate the subtree for `component` under `parent` without linking it in
    fn build(&mut self, parent: NodeId, component: &RuleComponent) -> NodeId {
        let kind = NodeKind::of(component);
        let container = kind.is_container();
        let id = self.alloc(kind, Some(parent));

        let mut children = component
            .children()
            .iter()
            .map(|child| self.build(id, child))
            .collect::<Vec<_>>();
        if container && children.is_empty() {
            children.push(self.alloc(NodeKind::Placeholder, Some(id)));
        }
        self.set_children(id, children);
        id
    }

    /// Unlink a node from its parent, keeping the parent's placeholder invariant
    fn detach(&mut self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        self.node_mut(parent)?.children.retain(|c| *c != id);
        self.ensure_placeholder(parent);
        Some(parent)
    }

    fn ensure_placeholder(&mut self, id: NodeId) {
        let needs = self
            .node(id)
            .is_some_and(|n| n.kind.is_container() && n.children.is_empty());
        if needs {
            let placeholder = self.alloc(NodeKind::Placeholder, Some(id));
            self.set_children(id, vec![placeholder]);
        }
    }

    fn free(&mut self, id: NodeId) {
        let children = match self.node_mut(id) {
            Some(node) => std::mem::take(&mut node.children),
            None => return,
        };
        for child in children {
            self.free(child);
        }
        if let Some(slot) = id.0.checked_sub(self.base).and_then(|i| self.nodes.get_mut(i)) {
            *slot = None;
        }
    }
}

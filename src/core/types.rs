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

//! src/core/types.rs
//!
//! Core type definitions for diversion rules
//!
//! This module defines the rule tree data model:
//! - `RuleComponent`: the closed set of conditions, actions and combinators
//! - `Rule`: a named container that may carry the document it came from
//! - `RuleSet`: the merged root handed to the evaluator and the editor
//! - `Tag`: the textual tag of every supported component, with its template
//!
//! Conversion to and from the textual tagged-value form lives in
//! `compile.rs`; these types are plain data.

use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Keyboard modifier keys
///
/// The four modifiers a `Modifiers` condition can require. Names follow
/// the rule file spelling (`Shift`, `Control`, `Alt`, `Super`).
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum Modifier {
    /// Shift key
    Shift,
    /// Control key
    Control,
    /// Alt key (MOD1)
    Alt,
    /// Super/Windows/Command key (MOD4)
    Super,
}

impl fmt::Display for Modifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Modifier::Shift => write!(f, "Shift"),
            Modifier::Control => write!(f, "Control"),
            Modifier::Alt => write!(f, "Alt"),
            Modifier::Super => write!(f, "Super"),
        }
    }
}

impl FromStr for Modifier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Shift" => Ok(Modifier::Shift),
            "Control" => Ok(Modifier::Control),
            "Alt" => Ok(Modifier::Alt),
            "Super" => Ok(Modifier::Super),
            other => Err(format!("unknown modifier '{}'", other)),
        }
    }
}

/// Whether a `Key` condition matches a press or a release
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyAction {
    #[default]
    Pressed,
    Released,
}

impl KeyAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyAction::Pressed => "pressed",
            KeyAction::Released => "released",
        }
    }
}

impl FromStr for KeyAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pressed" => Ok(KeyAction::Pressed),
            "released" => Ok(KeyAction::Released),
            other => Err(format!("unknown key action '{}'", other)),
        }
    }
}

/// How a `KeyPress` action drives its keys
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum PressAction {
    /// Press then release every key
    #[default]
    Click,
    /// Press only
    Depress,
    /// Release only
    Release,
}

impl PressAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            PressAction::Click => "click",
            PressAction::Depress => "depress",
            PressAction::Release => "release",
        }
    }
}

impl FromStr for PressAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "click" => Ok(PressAction::Click),
            "depress" => Ok(PressAction::Depress),
            "release" => Ok(PressAction::Release),
            other => Err(format!("unknown press action '{}'", other)),
        }
    }
}

/// Click count of a `MouseClick` action
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ClickCount {
    /// Click the button this many times
    Times(u32),
    /// Hold the button down
    Depress,
    /// Let the button go
    Release,
}

impl fmt::Display for ClickCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClickCount::Times(n) => write!(f, "{}", n),
            ClickCount::Depress => write!(f, "depress"),
            ClickCount::Release => write!(f, "release"),
        }
    }
}

/// Device setting reference shared by the `Setting` condition and the `Set` action
///
/// `device` of `None` means the device that raised the event.
/// `key` selects one entry of a map-valued setting.
#[derive(Clone, Debug, PartialEq)]
pub struct SettingRef {
    pub device: Option<String>,
    pub setting: String,
    pub key: Option<Value>,
    pub value: Value,
}

/// Built-in notification test with an optional threshold parameter
#[derive(Clone, Debug, PartialEq)]
pub struct TestSpec {
    pub name: String,
    pub parameter: Option<i64>,
}

/// Compare a byte range of the notification payload
///
/// The range `begin..end` is read big-endian; with a mask the bytes are
/// ANDed with it before comparing against `value`.
#[derive(Clone, Debug, PartialEq)]
pub struct ByteTest {
    pub begin: usize,
    pub end: usize,
    pub mask: Option<u64>,
    pub value: u64,
}

/// Where a rule was loaded from
///
/// Only rules whose source is `editable` (the user document) may be
/// changed by the editor or written back on save.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct RuleSource {
    pub path: PathBuf,
    pub editable: bool,
}

impl RuleSource {
    pub fn new(path: impl Into<PathBuf>, editable: bool) -> Self {
        Self {
            path: path.into(),
            editable,
        }
    }
}

/// A rule: an ordered list of components evaluated as an implicit And
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Rule {
    pub components: Vec<RuleComponent>,
    pub source: Option<RuleSource>,
}

impl Rule {
    pub fn new(components: Vec<RuleComponent>) -> Self {
        Self {
            components,
            source: None,
        }
    }

    pub fn with_source(components: Vec<RuleComponent>, source: RuleSource) -> Self {
        Self {
            components,
            source: Some(source),
        }
    }

    /// True when this rule belongs to a user-writable document
    pub fn is_editable(&self) -> bool {
        self.source.as_ref().is_some_and(|s| s.editable)
    }
}

/// One node of a diversion rule tree
///
/// Containers hold ordered children, conditions read the event and actions
/// act through the capability handles. `Unsupported` keeps the raw value of
/// anything the compiler did not understand so it can be written back as is.
#[derive(Clone, Debug, PartialEq)]
pub enum RuleComponent {
    // Containers
    Rule(Rule),
    And(Vec<RuleComponent>),
    Or(Vec<RuleComponent>),
    Not(Option<Box<RuleComponent>>),

    // Conditions
    Feature(String),
    Report(i64),
    Process(String),
    MouseProcess(String),
    Modifiers(Vec<Modifier>),
    Key { key: String, action: KeyAction },
    KeyIsDown(String),
    Active(String),
    Device(String),
    Host(String),
    Setting(SettingRef),
    Test(TestSpec),
    TestBytes(ByteTest),
    MouseGesture(Vec<String>),

    // Actions
    KeyPress { keys: Vec<String>, action: PressAction },
    MouseScroll { horizontal: f64, vertical: f64 },
    MouseClick { button: String, count: ClickCount },
    Set(SettingRef),
    Execute(Vec<String>),
    Later { delay: f64, components: Vec<RuleComponent> },

    /// Anything the compiler could not decode, kept verbatim
    Unsupported(Value),
}

impl RuleComponent {
    /// The tag this component is written under, `None` for unsupported values
    pub fn tag(&self) -> Option<Tag> {
        let tag = match self {
            RuleComponent::Rule(_) => Tag::Rule,
            RuleComponent::And(_) => Tag::And,
            RuleComponent::Or(_) => Tag::Or,
            RuleComponent::Not(_) => Tag::Not,
            RuleComponent::Feature(_) => Tag::Feature,
            RuleComponent::Report(_) => Tag::Report,
            RuleComponent::Process(_) => Tag::Process,
            RuleComponent::MouseProcess(_) => Tag::MouseProcess,
            RuleComponent::Modifiers(_) => Tag::Modifiers,
            RuleComponent::Key { .. } => Tag::Key,
            RuleComponent::KeyIsDown(_) => Tag::KeyIsDown,
            RuleComponent::Active(_) => Tag::Active,
            RuleComponent::Device(_) => Tag::Device,
            RuleComponent::Host(_) => Tag::Host,
            RuleComponent::Setting(_) => Tag::Setting,
            RuleComponent::Test(_) => Tag::Test,
            RuleComponent::TestBytes(_) => Tag::TestBytes,
            RuleComponent::MouseGesture(_) => Tag::MouseGesture,
            RuleComponent::KeyPress { .. } => Tag::KeyPress,
            RuleComponent::MouseScroll { .. } => Tag::MouseScroll,
            RuleComponent::MouseClick { .. } => Tag::MouseClick,
            RuleComponent::Set(_) => Tag::Set,
            RuleComponent::Execute(_) => Tag::Execute,
            RuleComponent::Later { .. } => Tag::Later,
            RuleComponent::Unsupported(_) => return None,
        };
        Some(tag)
    }

    /// True for components that hold other components
    pub fn is_container(&self) -> bool {
        matches!(
            self,
            RuleComponent::Rule(_)
                | RuleComponent::And(_)
                | RuleComponent::Or(_)
                | RuleComponent::Not(_)
                | RuleComponent::Later { .. }
        )
    }

    /// Child components in order (the single child of a `Not`, if any)
    pub fn children(&self) -> &[RuleComponent] {
        match self {
            RuleComponent::Rule(rule) => &rule.components,
            RuleComponent::And(c) | RuleComponent::Or(c) => c,
            RuleComponent::Later { components, .. } => components,
            RuleComponent::Not(Some(inner)) => std::slice::from_ref(inner.as_ref()),
            _ => &[],
        }
    }

    /// Deep copy through the textual form, sharing nothing with `self`
    ///
    /// A `Rule`'s source does not survive the trip; it is reassigned when
    /// the copy is inserted.
    pub fn deep_copy(&self) -> RuleComponent {
        RuleComponent::compile(&self.to_data())
    }
}

fn join_display(items: &[String]) -> String {
    items.join(" ")
}

impl fmt::Display for RuleComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleComponent::Rule(rule) => match &rule.source {
                Some(source) => write!(f, "Rule ({})", source.path.display()),
                None => write!(f, "Rule"),
            },
            RuleComponent::And(_) => write!(f, "And"),
            RuleComponent::Or(_) => write!(f, "Or"),
            RuleComponent::Not(_) => write!(f, "Not"),
            RuleComponent::Feature(name) => write!(f, "Feature: {}", name),
            RuleComponent::Report(n) => write!(f, "Report: {}", n),
            RuleComponent::Process(p) => write!(f, "Process: {}", p),
            RuleComponent::MouseProcess(p) => write!(f, "MouseProcess: {}", p),
            RuleComponent::Modifiers(mods) => {
                let mods = mods.iter().map(|m| m.to_string()).collect::<Vec<_>>();
                write!(f, "Modifiers: {}", mods.join("+"))
            }
            RuleComponent::Key { key, action } => write!(f, "Key: {} ({})", key, action.as_str()),
            RuleComponent::KeyIsDown(key) => write!(f, "KeyIsDown: {}", key),
            RuleComponent::Active(dev) => write!(f, "Active: {}", dev),
            RuleComponent::Device(dev) => write!(f, "Device: {}", dev),
            RuleComponent::Host(host) => write!(f, "Host: {}", host),
            RuleComponent::Setting(s) => write!(f, "Setting: {}", s.setting),
            RuleComponent::Test(t) => match t.parameter {
                Some(p) => write!(f, "Test: {} {}", t.name, p),
                None => write!(f, "Test: {}", t.name),
            },
            RuleComponent::TestBytes(t) => write!(f, "TestBytes: [{}:{}] == {:#x}", t.begin, t.end, t.value),
            RuleComponent::MouseGesture(moves) => write!(f, "MouseGesture: {}", moves.join(" -> ")),
            RuleComponent::KeyPress { keys, action } => {
                write!(f, "KeyPress: {} ({})", join_display(keys), action.as_str())
            }
            RuleComponent::MouseScroll { horizontal, vertical } => {
                write!(f, "MouseScroll: {} {}", horizontal, vertical)
            }
            RuleComponent::MouseClick { button, count } => write!(f, "MouseClick: {} {}", button, count),
            RuleComponent::Set(s) => write!(f, "Set: {}", s.setting),
            RuleComponent::Execute(args) => write!(f, "Execute: {}", join_display(args)),
            RuleComponent::Later { delay, .. } => write!(f, "Later: {}s", delay),
            RuleComponent::Unsupported(_) => write!(f, "Unsupported component"),
        }
    }
}

/// Tag of every supported component
///
/// The string form is the key the component is written under in rule files.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Tag {
    Rule,
    And,
    Or,
    Not,
    Feature,
    Report,
    Process,
    MouseProcess,
    Modifiers,
    Key,
    KeyIsDown,
    Active,
    Device,
    Host,
    Setting,
    Test,
    TestBytes,
    MouseGesture,
    KeyPress,
    MouseScroll,
    MouseClick,
    Set,
    Execute,
    Later,
}

impl Tag {
    pub const ALL: [Tag; 24] = [
        Tag::Rule,
        Tag::And,
        Tag::Or,
        Tag::Not,
        Tag::Feature,
        Tag::Report,
        Tag::Process,
        Tag::MouseProcess,
        Tag::Modifiers,
        Tag::Key,
        Tag::KeyIsDown,
        Tag::Active,
        Tag::Device,
        Tag::Host,
        Tag::Setting,
        Tag::Test,
        Tag::TestBytes,
        Tag::MouseGesture,
        Tag::KeyPress,
        Tag::MouseScroll,
        Tag::MouseClick,
        Tag::Set,
        Tag::Execute,
        Tag::Later,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Tag::Rule => "Rule",
            Tag::And => "And",
            Tag::Or => "Or",
            Tag::Not => "Not",
            Tag::Feature => "Feature",
            Tag::Report => "Report",
            Tag::Process => "Process",
            Tag::MouseProcess => "MouseProcess",
            Tag::Modifiers => "Modifiers",
            Tag::Key => "Key",
            Tag::KeyIsDown => "KeyIsDown",
            Tag::Active => "Active",
            Tag::Device => "Device",
            Tag::Host => "Host",
            Tag::Setting => "Setting",
            Tag::Test => "Test",
            Tag::TestBytes => "TestBytes",
            Tag::MouseGesture => "MouseGesture",
            Tag::KeyPress => "KeyPress",
            Tag::MouseScroll => "MouseScroll",
            Tag::MouseClick => "MouseClick",
            Tag::Set => "Set",
            Tag::Execute => "Execute",
            Tag::Later => "Later",
        }
    }

    /// Default instance offered when inserting a new component of this tag
    pub fn template(&self) -> RuleComponent {
        let empty_setting = || SettingRef {
            device: None,
            setting: String::new(),
            key: None,
            value: Value::Null,
        };

        match self {
            Tag::Rule => RuleComponent::Rule(Rule::default()),
            Tag::And => RuleComponent::And(Vec::new()),
            Tag::Or => RuleComponent::Or(Vec::new()),
            Tag::Not => RuleComponent::Not(None),
            Tag::Feature => RuleComponent::Feature("REPROG CONTROLS V4".to_string()),
            Tag::Report => RuleComponent::Report(0),
            Tag::Process => RuleComponent::Process(String::new()),
            Tag::MouseProcess => RuleComponent::MouseProcess(String::new()),
            Tag::Modifiers => RuleComponent::Modifiers(Vec::new()),
            Tag::Key => RuleComponent::Key {
                key: String::new(),
                action: KeyAction::Pressed,
            },
            Tag::KeyIsDown => RuleComponent::KeyIsDown(String::new()),
            Tag::Active => RuleComponent::Active(String::new()),
            Tag::Device => RuleComponent::Device(String::new()),
            Tag::Host => RuleComponent::Host(String::new()),
            Tag::Setting => RuleComponent::Setting(empty_setting()),
            Tag::Test => RuleComponent::Test(TestSpec {
                name: "thumb_wheel_up".to_string(),
                parameter: None,
            }),
            Tag::TestBytes => RuleComponent::TestBytes(ByteTest {
                begin: 0,
                end: 1,
                mask: None,
                value: 0,
            }),
            Tag::MouseGesture => RuleComponent::MouseGesture(Vec::new()),
            Tag::KeyPress => RuleComponent::KeyPress {
                keys: vec!["space".to_string()],
                action: PressAction::Click,
            },
            Tag::MouseScroll => RuleComponent::MouseScroll {
                horizontal: 0.0,
                vertical: 0.0,
            },
            Tag::MouseClick => RuleComponent::MouseClick {
                button: "left".to_string(),
                count: ClickCount::Times(1),
            },
            Tag::Set => RuleComponent::Set(empty_setting()),
            Tag::Execute => RuleComponent::Execute(vec![String::new()]),
            Tag::Later => RuleComponent::Later {
                delay: 1.0,
                components: Vec::new(),
            },
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The merged rules of every loaded source
///
/// Each top-level entry of `root` is a `Rule` holding one source's
/// documents; each document is itself a `Rule`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RuleSet {
    pub root: Rule,
}

impl RuleSet {
    pub fn new(entries: Vec<Rule>) -> Self {
        Self {
            root: Rule::new(entries.into_iter().map(RuleComponent::Rule).collect()),
        }
    }

    /// Top-level entries in evaluation order
    pub fn entries(&self) -> &[RuleComponent] {
        &self.root.components
    }

    /// The first entry loaded from a writable source
    pub fn user_rule(&self) -> Option<&Rule> {
        self.root.components.iter().find_map(|c| match c {
            RuleComponent::Rule(rule) if rule.is_editable() => Some(rule),
            _ => None,
        })
    }

    /// Insert an empty entry for the first writable source when none was loaded
    ///
    /// The entry goes where that source sits in `sources`, after the
    /// entries of every source listed before it. Returns true when an entry
    /// had to be synthesised.
    pub fn ensure_user_rule(&mut self, sources: &[RuleSource]) -> bool {
        let Some(position) = sources.iter().position(|s| s.editable) else {
            return false;
        };
        if self.user_rule().is_some() {
            return false;
        }

        let (earlier, rest) = sources.split_at(position);
        let Some(user) = rest.first() else {
            return false;
        };
        let index = self
            .root
            .components
            .iter()
            .filter(|c| match c {
                RuleComponent::Rule(rule) => rule.source.as_ref().is_some_and(|s| earlier.contains(s)),
                _ => false,
            })
            .count();
        self.root
            .components
            .insert(index, RuleComponent::Rule(Rule::with_source(Vec::new(), user.clone())));
        true
    }}

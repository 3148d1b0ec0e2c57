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

//! src/core/evaluate.rs
//!
//! Rule evaluation against a device event
//!
//! Walks a compiled rule tree and decides whether the event is diverted.
//! Conditions only read the `Event` snapshot; actions only act through the
//! `ActionHandler` the caller injects. The tree itself is never mutated, the
//! only state evaluation writes is the per-evaluation scratch map that lets a
//! `Set` be observed by a later `Setting` in the same pass.
//!
//! # Semantics
//! - `And` stops at the first false child, `Or` at the first true one
//! - `Not` inverts its child; an empty `Not` is vacuously true
//! - `Rule` is an implicit And, except that a nested rule which does not
//!   match lets its siblings continue, and a nested rule that fired an
//!   action ends the parent (first matching rule wins)
//! - Missing event data makes a condition false, never an error

use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tracing::{debug, warn};

use crate::core::keys::KeyTable;
use crate::core::types::{
    ByteTest, ClickCount, KeyAction, Modifier, PressAction, Rule, RuleComponent, RuleSet,
    SettingRef, TestSpec,
};

/// Identity of a device as rules may refer to it
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct DeviceInfo {
    pub name: String,
    pub serial: Option<String>,
    pub unit_id: Option<String>,
}

impl DeviceInfo {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// A device matches an identifier by name, serial or unit id
    pub fn matches(&self, id: &str) -> bool {
        self.name == id
            || self.serial.as_deref() == Some(id)
            || self.unit_id.as_deref() == Some(id)
    }
}

/// A diverted key press or release
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct KeyEvent {
    pub key: String,
    #[serde(default)]
    pub action: KeyAction,
}

/// Snapshot of everything conditions may read about one device event
///
/// Every field is optional in the serialised form; absent data makes the
/// conditions that need it evaluate to false.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct Event {
    /// Device that raised the event
    pub device: Option<DeviceInfo>,
    /// Feature name of the notification (e.g. `THUMB WHEEL`)
    pub feature: Option<String>,
    /// Report number of the notification
    pub report: Option<i64>,
    /// Raw notification payload
    pub payload: Vec<u8>,
    /// Diverted key that changed state, if any
    pub key: Option<KeyEvent>,
    /// Diverted keys currently held down
    pub keys_down: Vec<String>,
    /// Keyboard modifiers currently held
    pub modifiers: Vec<Modifier>,
    /// Process owning the focused window
    pub process: Option<String>,
    /// Process owning the window under the pointer
    pub mouse_process: Option<String>,
    /// Completed mouse gesture, as movement names
    pub gesture: Option<Vec<String>>,
    /// Host name of this machine
    pub host: Option<String>,
    /// Identifiers of the devices currently online
    pub active_devices: Vec<String>,
    /// Current setting values, per device name then setting name
    pub settings: BTreeMap<String, BTreeMap<String, Value>>,
}

impl Event {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device(mut self, device: DeviceInfo) -> Self {
        self.device = Some(device);
        self
    }

    pub fn with_feature(mut self, feature: impl Into<String>, payload: Vec<u8>) -> Self {
        self.feature = Some(feature.into());
        self.payload = payload;
        self
    }

    pub fn with_report(mut self, report: i64) -> Self {
        self.report = Some(report);
        self
    }

    pub fn with_key(mut self, key: impl Into<String>, action: KeyAction) -> Self {
        self.key = Some(KeyEvent {
            key: key.into(),
            action,
        });
        self
    }

    pub fn with_modifiers(mut self, modifiers: Vec<Modifier>) -> Self {
        self.modifiers = modifiers;
        self
    }

    pub fn with_process(mut self, process: impl Into<String>) -> Self {
        self.process = Some(process.into());
        self
    }

    pub fn with_setting(
        mut self,
        device: impl Into<String>,
        setting: impl Into<String>,
        value: Value,
    ) -> Self {
        self.settings
            .entry(device.into())
            .or_default()
            .insert(setting.into(), value);
        self
    }
}

/// Capability handles actions fire through
///
/// Each method returns whether the action took effect. Implementations may
/// queue the work and return immediately; evaluation never blocks on them.
pub trait ActionHandler {
    /// Synthesise key symbols
    fn key_press(&mut self, keys: &[String], action: PressAction) -> bool;

    /// Synthesise a scroll, in wheel clicks
    fn mouse_scroll(&mut self, horizontal: f64, vertical: f64) -> bool;

    /// Synthesise mouse button clicks
    fn mouse_click(&mut self, button: &str, count: ClickCount) -> bool;

    /// Change a device setting
    fn set_setting(&mut self, device: &str, setting: &str, key: Option<&Value>, value: &Value) -> bool;

    /// Spawn an external process
    fn execute(&mut self, command: &[String]) -> bool;

    /// Evaluate `rule` again once `delay` has passed
    fn schedule(&mut self, delay: Duration, rule: Rule) -> bool;
}

/// One action call recorded by `ActionRecorder`
#[derive(Clone, Debug, PartialEq)]
pub enum RecordedAction {
    KeyPress {
        keys: Vec<String>,
        action: PressAction,
    },
    MouseScroll {
        horizontal: f64,
        vertical: f64,
    },
    MouseClick {
        button: String,
        count: ClickCount,
    },
    Set {
        device: String,
        setting: String,
        key: Option<Value>,
        value: Value,
    },
    Execute(Vec<String>),
    Schedule {
        delay: Duration,
        rule: Rule,
    },
}

/// Action handler that only records what it was asked to do
///
/// Used for dry runs: every action reports success.
#[derive(Debug, Default)]
pub struct ActionRecorder {
    pub actions: Vec<RecordedAction>,
}

impl ActionRecorder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ActionHandler for ActionRecorder {
    fn key_press(&mut self, keys: &[String], action: PressAction) -> bool {
        self.actions.push(RecordedAction::KeyPress {
            keys: keys.to_vec(),
            action,
        });
        true
    }

    fn mouse_scroll(&mut self, horizontal: f64, vertical: f64) -> bool {
        self.actions.push(RecordedAction::MouseScroll { horizontal, vertical });
        true
    }

    fn mouse_click(&mut self, button: &str, count: ClickCount) -> bool {
        self.actions.push(RecordedAction::MouseClick {
            button: button.to_string(),
            count,
        });
        true
    }

    fn set_setting(&mut self, device: &str, setting: &str, key: Option<&Value>, value: &Value) -> bool {
        self.actions.push(RecordedAction::Set {
            device: device.to_string(),
            setting: setting.to_string(),
            key: key.cloned(),
            value: value.clone(),
        });
        true
    }

    fn execute(&mut self, command: &[String]) -> bool {
        self.actions.push(RecordedAction::Execute(command.to_vec()));
        true
    }

    fn schedule(&mut self, delay: Duration, rule: Rule) -> bool {
        self.actions.push(RecordedAction::Schedule { delay, rule });
        true
    }
}

/// Scratch key: device, setting and optional setting key
type ScratchKey = (String, String, Option<Value>);

/// Everything one evaluation pass reads and writes
pub struct EvalContext<'a> {
    event: &'a Event,
    actions: &'a mut dyn ActionHandler,
    keys: &'a KeyTable,
    scratch: HashMap<ScratchKey, Value>,
}

impl<'a> EvalContext<'a> {
    pub fn new(event: &'a Event, actions: &'a mut dyn ActionHandler, keys: &'a KeyTable) -> Self {
        Self {
            event,
            actions,
            keys,
            scratch: HashMap::new(),
        }
    }

    /// Value written by a `Set` earlier in this pass
    pub fn scratch(&self, device: &str, setting: &str, key: Option<&Value>) -> Option<&Value> {
        self.scratch
            .get(&(device.to_string(), setting.to_string(), key.cloned()))
    }

    /// Name of the device a setting reference points at
    fn device_name(&self, device: Option<&str>) -> Option<String> {
        match device {
            Some(id) => Some(id.to_string()),
            None => self.event.device.as_ref().map(|d| d.name.clone()),
        }
    }
}

/// Result of evaluating one component
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Outcome {
    /// Truth value seen by the enclosing combinator
    pub value: bool,
    /// Whether any action fired inside the component
    pub fired: bool,
}

impl Outcome {
    fn condition(value: bool) -> Self {
        Self { value, fired: false }
    }

    fn action(fired: bool) -> Self {
        Self { value: fired, fired }
    }
}

/// Final answer for one event
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Decision {
    /// True when a rule consumed the event
    pub diverted: bool,
}

/// Evaluate every rule in `rules` against the context
pub fn evaluate(rules: &RuleSet, ctx: &mut EvalContext<'_>) -> Decision {
    let outcome = eval_rule(&rules.root, ctx);
    debug!(diverted = outcome.fired, "evaluated diversion rules");
    Decision {
        diverted: outcome.fired,
    }
}

/// Evaluate a single component, as the engine does for each tree node
pub fn eval_component(component: &RuleComponent, ctx: &mut EvalContext<'_>) -> Outcome {
    match component {
        RuleComponent::Rule(rule) => eval_rule(rule, ctx),
        RuleComponent::And(children) => {
            let mut fired = false;
            for child in children {
                let outcome = eval_component(child, ctx);
                fired |= outcome.fired;
                if !outcome.value {
                    return Outcome { value: false, fired };
                }
            }
            Outcome { value: true, fired }
        }
        RuleComponent::Or(children) => {
            let mut fired = false;
            for child in children {
                let outcome = eval_component(child, ctx);
                fired |= outcome.fired;
                if outcome.value {
                    return Outcome { value: true, fired };
                }
            }
            Outcome { value: false, fired }
        }
        RuleComponent::Not(inner) => match inner {
            Some(inner) => {
                let outcome = eval_component(inner, ctx);
                Outcome {
                    value: !outcome.value,
                    fired: outcome.fired,
                }
            }
            None => Outcome::condition(true),
        },

        RuleComponent::Feature(name) => Outcome::condition(ctx.event.feature.as_deref() == Some(name.as_str())),
        RuleComponent::Report(report) => Outcome::condition(ctx.event.report == Some(*report)),
        RuleComponent::Process(prefix) => {
            Outcome::condition(ctx.event.process.as_deref().is_some_and(|p| p.starts_with(prefix.as_str())))
        }
        RuleComponent::MouseProcess(prefix) => Outcome::condition(
            ctx.event
                .mouse_process
                .as_deref()
                .is_some_and(|p| p.starts_with(prefix.as_str())),
        ),
        RuleComponent::Modifiers(wanted) => {
            let mut wanted = wanted.clone();
            let mut held = ctx.event.modifiers.clone();
            wanted.sort();
            wanted.dedup();
            held.sort();
            held.dedup();
            Outcome::condition(wanted == held)
        }
        RuleComponent::Key { key, action } => Outcome::condition(
            ctx.event
                .key
                .as_ref()
                .is_some_and(|k| k.key == *key && k.action == *action),
        ),
        RuleComponent::KeyIsDown(key) => Outcome::condition(ctx.event.keys_down.iter().any(|k| k == key)),
        RuleComponent::Active(id) => Outcome::condition(ctx.event.active_devices.iter().any(|d| d == id)),
        RuleComponent::Device(id) => {
            Outcome::condition(ctx.event.device.as_ref().is_some_and(|d| d.matches(id)))
        }
        RuleComponent::Host(prefix) => {
            Outcome::condition(ctx.event.host.as_deref().is_some_and(|h| h.starts_with(prefix.as_str())))
        }
        RuleComponent::Setting(setting) => Outcome::condition(setting_matches(setting, ctx)),
        RuleComponent::Test(test) => Outcome::condition(run_test(test, ctx.event)),
        RuleComponent::TestBytes(test) => Outcome::condition(test_bytes(test, &ctx.event.payload)),
        RuleComponent::MouseGesture(moves) => {
            Outcome::condition(ctx.event.gesture.as_ref().is_some_and(|g| g == moves))
        }

        RuleComponent::KeyPress { keys, action } => {
            let unknown = ctx.keys.unknown(keys);
            if !unknown.is_empty() {
                warn!(keys = ?unknown, "key press names unknown keys, not sending");
                return Outcome::action(false);
            }
            Outcome::action(ctx.actions.key_press(keys, *action))
        }
        RuleComponent::MouseScroll { horizontal, vertical } => {
            Outcome::action(ctx.actions.mouse_scroll(*horizontal, *vertical))
        }
        RuleComponent::MouseClick { button, count } => Outcome::action(ctx.actions.mouse_click(button, *count)),
        RuleComponent::Set(setting) => Outcome::action(apply_setting(setting, ctx)),
        RuleComponent::Execute(command) => {
            if command.first().is_none_or(|c| c.trim().is_empty()) {
                return Outcome::action(false);
            }
            Outcome::action(ctx.actions.execute(command))
        }
        RuleComponent::Later { delay, components } => match Duration::try_from_secs_f64(*delay) {
            Ok(delay) => Outcome::action(ctx.actions.schedule(delay, Rule::new(components.clone()))),
            Err(e) => {
                warn!(delay = *delay, error = %e, "invalid delay, not scheduling");
                Outcome::action(false)
            }
        },

        RuleComponent::Unsupported(_) => Outcome::condition(false),
    }
}

fn eval_rule(rule: &Rule, ctx: &mut EvalContext<'_>) -> Outcome {
    let mut fired = false;
    for component in &rule.components {
        let outcome = eval_component(component, ctx);
        fired |= outcome.fired;
        match component {
            RuleComponent::Rule(_) if outcome.fired => return Outcome { value: true, fired },
            RuleComponent::Rule(_) => {}
            _ if !outcome.value => return Outcome { value: false, fired },
            _ => {}
        }
    }
    Outcome { value: true, fired }
}

fn setting_matches(setting: &SettingRef, ctx: &EvalContext<'_>) -> bool {
    let Some(device) = ctx.device_name(setting.device.as_deref()) else {
        return false;
    };
    if let Some(written) = ctx.scratch(&device, &setting.setting, setting.key.as_ref()) {
        return *written == setting.value;
    }
    let current = ctx
        .event
        .settings
        .get(&device)
        .and_then(|settings| settings.get(&setting.setting));
    let current = match (&setting.key, current) {
        (Some(key), Some(value)) => value.as_mapping().and_then(|m| m.get(key)),
        (None, current) => current,
        (Some(_), None) => None,
    };
    current == Some(&setting.value)
}

fn apply_setting(setting: &SettingRef, ctx: &mut EvalContext<'_>) -> bool {
    let Some(device) = ctx.device_name(setting.device.as_deref()) else {
        return false;
    };
    let done = ctx
        .actions
        .set_setting(&device, &setting.setting, setting.key.as_ref(), &setting.value);
    if done {
        ctx.scratch.insert(
            (device, setting.setting.clone(), setting.key.clone()),
            setting.value.clone(),
        );
    }
    done
}

/// Names accepted by the `Test` condition
pub const TESTS: &[&str] = &[
    "True",
    "False",
    "thumb_wheel_up",
    "thumb_wheel_down",
    "hires_wheel_up",
    "hires_wheel_down",
    "lowres_wheel_up",
    "lowres_wheel_down",
    "crown_right",
    "crown_left",
    "crown_pressed",
];

fn signed16(payload: &[u8], at: usize) -> Option<i64> {
    let bytes = payload.get(at..at + 2)?;
    Some(i64::from(i16::from_be_bytes([bytes[0], bytes[1]])))
}

fn signed8(payload: &[u8], at: usize) -> Option<i64> {
    payload.get(at).map(|b| i64::from(*b as i8))
}

fn run_test(test: &TestSpec, event: &Event) -> bool {
    let threshold = test.parameter.unwrap_or(1).max(1);
    let feature = event.feature.as_deref();
    let data = &event.payload;

    let movement = |wanted: &str, value: Option<i64>, up: bool| {
        feature == Some(wanted)
            && value.is_some_and(|v| if up { v >= threshold } else { v <= -threshold })
    };

    match test.name.as_str() {
        "True" => true,
        "False" => false,
        "thumb_wheel_up" => movement("THUMB WHEEL", signed16(data, 0), true),
        "thumb_wheel_down" => movement("THUMB WHEEL", signed16(data, 0), false),
        "hires_wheel_up" => movement("HIRES WHEEL", signed16(data, 1), true),
        "hires_wheel_down" => movement("HIRES WHEEL", signed16(data, 1), false),
        "lowres_wheel_up" => movement("LOWRES WHEEL", signed8(data, 0), true),
        "lowres_wheel_down" => movement("LOWRES WHEEL", signed8(data, 0), false),
        "crown_right" => movement("CROWN", signed8(data, 1), true),
        "crown_left" => movement("CROWN", signed8(data, 1), false),
        "crown_pressed" => feature == Some("CROWN") && data.get(5) == Some(&1),
        _ => false,
    }
}

fn test_bytes(test: &ByteTest, payload: &[u8]) -> bool {
    if test.end <= test.begin || test.end - test.begin > 8 {
        return false;
    }
    let Some(bytes) = payload.get(test.begin..test.end) else {
        return false;
    };
    let read = bytes.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b));
    match test.mask {
        Some(mask) => read & mask == test.value,
        None => read == test.value,
    }
}

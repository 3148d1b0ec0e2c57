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

//! src/core/compile.rs
//!
//! Rule component compiler
//!
//! Converts between the textual tagged-value form used in rule documents
//! (a single-key mapping such as `KeyPress: [[Control_L, Tab], click]`) and
//! `RuleComponent`.
//!
//! # Architecture
//! Decoding is table driven: `DECODERS` maps each tag name to the function
//! that validates its payload. A value that is not a tagged mapping, names an
//! unknown tag, or carries a malformed payload never fails the caller.
//! `compile` logs the problem and keeps the raw value as
//! `RuleComponent::Unsupported`, which encodes back to exactly what was read.
//!
//! `to_data` is the left inverse of `compile` for every supported variant:
//! decoding accepts shorthand payloads, encoding always emits the canonical one.

use serde_yaml::{Mapping, Value};
use thiserror::Error;
use tracing::warn;

use crate::core::keys::default_keys;
use crate::core::types::{
    ByteTest, ClickCount, KeyAction, Modifier, PressAction, Rule, RuleComponent, SettingRef, Tag,
    TestSpec,
};

/// Reasons a value could not be decoded into a supported component
#[derive(Debug, Error, PartialEq)]
pub enum DecodeError {
    #[error("expected a mapping with a single component tag")]
    NotATaggedValue,

    #[error("unknown component tag '{0}'")]
    UnknownTag(String),

    #[error("invalid {tag} payload: {reason}")]
    InvalidPayload { tag: &'static str, reason: String },
}

type Decoder = fn(&Value) -> Result<RuleComponent, DecodeError>;

/// Tag name to payload decoder
const DECODERS: &[(&str, Decoder)] = &[
    ("Rule", decode_rule),
    ("And", decode_and),
    ("Or", decode_or),
    ("Not", decode_not),
    ("Feature", decode_feature),
    ("Report", decode_report),
    ("Process", decode_process),
    ("MouseProcess", decode_mouse_process),
    ("Modifiers", decode_modifiers),
    ("Key", decode_key),
    ("KeyIsDown", decode_key_is_down),
    ("Active", decode_active),
    ("Device", decode_device),
    ("Host", decode_host),
    ("Setting", decode_setting),
    ("Test", decode_test),
    ("TestBytes", decode_test_bytes),
    ("MouseGesture", decode_mouse_gesture),
    ("KeyPress", decode_key_press),
    ("MouseScroll", decode_mouse_scroll),
    ("MouseClick", decode_mouse_click),
    ("Set", decode_set),
    ("Execute", decode_execute),
    ("Later", decode_later),
];

impl RuleComponent {
    /// Compile a tagged value, falling back to `Unsupported` on any error
    pub fn compile(raw: &Value) -> RuleComponent {
        compile(raw)
    }
}

/// Compile a tagged value into a component
///
/// Never fails: anything that cannot be decoded becomes
/// `RuleComponent::Unsupported` holding the original value.
pub fn compile(raw: &Value) -> RuleComponent {
    match try_compile(raw) {
        Ok(component) => component,
        Err(e) => {
            warn!(error = %e, "keeping unsupported rule component as is");
            RuleComponent::Unsupported(raw.clone())
        }
    }
}

/// Compile a tagged value, reporting why it could not be decoded
///
/// Children of containers always go through `compile`, so a bad child
/// never fails its parent.
pub fn try_compile(raw: &Value) -> Result<RuleComponent, DecodeError> {
    let mapping = raw.as_mapping().ok_or(DecodeError::NotATaggedValue)?;
    if mapping.len() != 1 {
        return Err(DecodeError::NotATaggedValue);
    }
    let (tag, payload) = mapping.iter().next().ok_or(DecodeError::NotATaggedValue)?;
    let tag = tag.as_str().ok_or(DecodeError::NotATaggedValue)?;

    let (_, decode) = DECODERS
        .iter()
        .find(|(name, _)| *name == tag)
        .ok_or_else(|| DecodeError::UnknownTag(tag.to_string()))?;

    decode(payload)
}

// Payload helpers

fn invalid(tag: Tag, reason: impl Into<String>) -> DecodeError {
    DecodeError::InvalidPayload {
        tag: tag.name(),
        reason: reason.into(),
    }
}

fn components(tag: Tag, payload: &Value) -> Result<Vec<RuleComponent>, DecodeError> {
    match payload {
        Value::Null => Ok(Vec::new()),
        Value::Sequence(items) => Ok(items.iter().map(compile).collect()),
        _ => Err(invalid(tag, "expected a list of components")),
    }
}

fn string(tag: Tag, payload: &Value) -> Result<String, DecodeError> {
    payload
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| invalid(tag, "expected a string"))
}

/// A string or a list of strings
fn strings(tag: Tag, payload: &Value) -> Result<Vec<String>, DecodeError> {
    match payload {
        Value::String(s) => Ok(vec![s.clone()]),
        Value::Sequence(items) => items
            .iter()
            .map(|item| string(tag, item))
            .collect::<Result<Vec<_>, _>>(),
        _ => Err(invalid(tag, "expected a string or a list of strings")),
    }
}

fn sequence(tag: Tag, payload: &Value) -> Result<&[Value], DecodeError> {
    payload
        .as_sequence()
        .map(Vec::as_slice)
        .ok_or_else(|| invalid(tag, "expected a list"))
}

fn unsigned(tag: Tag, value: &Value) -> Result<u64, DecodeError> {
    value
        .as_u64()
        .ok_or_else(|| invalid(tag, format!("expected a non-negative integer, got {:?}", value)))
}

fn number(tag: Tag, value: &Value) -> Result<f64, DecodeError> {
    value
        .as_f64()
        .ok_or_else(|| invalid(tag, format!("expected a number, got {:?}", value)))
}

/// Write whole numbers as integers so `[0, 1]` stays `[0, 1]`
fn number_value(x: f64) -> Value {
    if x.fract() == 0.0 && x.abs() < 1e15 {
        Value::from(x as i64)
    } else {
        Value::from(x)
    }
}

fn string_list(items: &[String]) -> Value {
    Value::Sequence(items.iter().map(|s| Value::from(s.as_str())).collect())
}

fn tagged(tag: Tag, payload: Value) -> Value {
    let mut mapping = Mapping::new();
    mapping.insert(Value::from(tag.name()), payload);
    Value::Mapping(mapping)
}

// Containers

fn decode_rule(payload: &Value) -> Result<RuleComponent, DecodeError> {
    Ok(RuleComponent::Rule(Rule::new(components(Tag::Rule, payload)?)))
}

fn decode_and(payload: &Value) -> Result<RuleComponent, DecodeError> {
    Ok(RuleComponent::And(components(Tag::And, payload)?))
}

fn decode_or(payload: &Value) -> Result<RuleComponent, DecodeError> {
    Ok(RuleComponent::Or(components(Tag::Or, payload)?))
}

fn decode_not(payload: &Value) -> Result<RuleComponent, DecodeError> {
    match payload {
        Value::Null => Ok(RuleComponent::Not(None)),
        Value::Sequence(items) if items.len() == 1 => {
            Ok(RuleComponent::Not(Some(Box::new(compile(&items[0])))))
        }
        Value::Sequence(_) => Err(invalid(Tag::Not, "negates exactly one component")),
        other => Ok(RuleComponent::Not(Some(Box::new(compile(other))))),
    }
}

// Conditions

fn decode_feature(payload: &Value) -> Result<RuleComponent, DecodeError> {
    Ok(RuleComponent::Feature(string(Tag::Feature, payload)?))
}

fn decode_report(payload: &Value) -> Result<RuleComponent, DecodeError> {
    payload
        .as_i64()
        .map(RuleComponent::Report)
        .ok_or_else(|| invalid(Tag::Report, "expected an integer"))
}

fn decode_process(payload: &Value) -> Result<RuleComponent, DecodeError> {
    Ok(RuleComponent::Process(string(Tag::Process, payload)?))
}

fn decode_mouse_process(payload: &Value) -> Result<RuleComponent, DecodeError> {
    Ok(RuleComponent::MouseProcess(string(Tag::MouseProcess, payload)?))
}

fn decode_modifiers(payload: &Value) -> Result<RuleComponent, DecodeError> {
    let modifiers = strings(Tag::Modifiers, payload)?
        .iter()
        .map(|name| name.parse::<Modifier>().map_err(|e| invalid(Tag::Modifiers, e)))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(RuleComponent::Modifiers(modifiers))
}

fn decode_key(payload: &Value) -> Result<RuleComponent, DecodeError> {
    let (key, action) = match payload {
        Value::String(key) => (key.clone(), KeyAction::Pressed),
        Value::Sequence(items) => match items.as_slice() {
            [key] => (string(Tag::Key, key)?, KeyAction::Pressed),
            [key, action] => (
                string(Tag::Key, key)?,
                string(Tag::Key, action)?
                    .parse::<KeyAction>()
                    .map_err(|e| invalid(Tag::Key, e))?,
            ),
            _ => return Err(invalid(Tag::Key, "expected [key, pressed|released]")),
        },
        _ => return Err(invalid(Tag::Key, "expected a key name")),
    };
    Ok(RuleComponent::Key { key, action })
}

fn decode_key_is_down(payload: &Value) -> Result<RuleComponent, DecodeError> {
    Ok(RuleComponent::KeyIsDown(string(Tag::KeyIsDown, payload)?))
}

fn decode_active(payload: &Value) -> Result<RuleComponent, DecodeError> {
    Ok(RuleComponent::Active(string(Tag::Active, payload)?))
}

fn decode_device(payload: &Value) -> Result<RuleComponent, DecodeError> {
    Ok(RuleComponent::Device(string(Tag::Device, payload)?))
}

fn decode_host(payload: &Value) -> Result<RuleComponent, DecodeError> {
    Ok(RuleComponent::Host(string(Tag::Host, payload)?))
}

fn setting_ref(tag: Tag, payload: &Value) -> Result<SettingRef, DecodeError> {
    let items = sequence(tag, payload)?;
    let (device, setting, key, value) = match items {
        [device, setting, value] => (device, setting, None, value),
        [device, setting, key, value] => (device, setting, Some(key.clone()), value),
        _ => return Err(invalid(tag, "expected [device, setting, (key,) value]")),
    };
    let device = match device {
        Value::Null => None,
        other => Some(string(tag, other)?),
    };
    Ok(SettingRef {
        device,
        setting: string(tag, setting)?,
        key,
        value: value.clone(),
    })
}

fn setting_data(setting: &SettingRef) -> Value {
    let mut items = vec![
        setting
            .device
            .as_deref()
            .map(Value::from)
            .unwrap_or(Value::Null),
        Value::from(setting.setting.as_str()),
    ];
    if let Some(key) = &setting.key {
        items.push(key.clone());
    }
    items.push(setting.value.clone());
    Value::Sequence(items)
}

fn decode_setting(payload: &Value) -> Result<RuleComponent, DecodeError> {
    Ok(RuleComponent::Setting(setting_ref(Tag::Setting, payload)?))
}

fn decode_test(payload: &Value) -> Result<RuleComponent, DecodeError> {
    let (name, parameter) = match payload {
        Value::String(name) => (name.clone(), None),
        Value::Sequence(items) => match items.as_slice() {
            [name] => (string(Tag::Test, name)?, None),
            [name, parameter] => (
                string(Tag::Test, name)?,
                Some(
                    parameter
                        .as_i64()
                        .ok_or_else(|| invalid(Tag::Test, "parameter must be an integer"))?,
                ),
            ),
            _ => return Err(invalid(Tag::Test, "expected [test, parameter]")),
        },
        _ => return Err(invalid(Tag::Test, "expected a test name")),
    };
    Ok(RuleComponent::Test(TestSpec { name, parameter }))
}

fn decode_test_bytes(payload: &Value) -> Result<RuleComponent, DecodeError> {
    let items = sequence(Tag::TestBytes, payload)?;
    let (begin, end, mask, value) = match items {
        [begin, end, value] => (begin, end, None, value),
        [begin, end, mask, value] => (begin, end, Some(unsigned(Tag::TestBytes, mask)?), value),
        _ => return Err(invalid(Tag::TestBytes, "expected [begin, end, (mask,) value]")),
    };
    Ok(RuleComponent::TestBytes(ByteTest {
        begin: unsigned(Tag::TestBytes, begin)? as usize,
        end: unsigned(Tag::TestBytes, end)? as usize,
        mask,
        value: unsigned(Tag::TestBytes, value)?,
    }))
}

fn decode_mouse_gesture(payload: &Value) -> Result<RuleComponent, DecodeError> {
    Ok(RuleComponent::MouseGesture(strings(Tag::MouseGesture, payload)?))
}

// Actions

fn decode_key_press(payload: &Value) -> Result<RuleComponent, DecodeError> {
    // [keys, action] only when the second item really is an action name
    let explicit = match payload {
        Value::Sequence(items) => match items.as_slice() {
            [keys, Value::String(action)] => action.parse::<PressAction>().ok().map(|a| (keys, a)),
            _ => None,
        },
        _ => None,
    };
    let (keys, action) = match explicit {
        Some((keys, action)) => (strings(Tag::KeyPress, keys)?, action),
        None => (strings(Tag::KeyPress, payload)?, PressAction::Click),
    };

    let unknown = default_keys().unknown(&keys);
    if !unknown.is_empty() {
        warn!(keys = ?unknown, "key press names unknown keys, keeping them as written");
    }
    Ok(RuleComponent::KeyPress { keys, action })
}

fn decode_mouse_scroll(payload: &Value) -> Result<RuleComponent, DecodeError> {
    match sequence(Tag::MouseScroll, payload)? {
        [horizontal, vertical] => Ok(RuleComponent::MouseScroll {
            horizontal: number(Tag::MouseScroll, horizontal)?,
            vertical: number(Tag::MouseScroll, vertical)?,
        }),
        _ => Err(invalid(Tag::MouseScroll, "expected [horizontal, vertical]")),
    }
}

fn decode_mouse_click(payload: &Value) -> Result<RuleComponent, DecodeError> {
    let (button, count) = match payload {
        Value::String(button) => (button.clone(), ClickCount::Times(1)),
        Value::Sequence(items) => match items.as_slice() {
            [button] => (string(Tag::MouseClick, button)?, ClickCount::Times(1)),
            [button, count] => {
                let count = match count {
                    Value::String(s) => match s.as_str() {
                        "click" => ClickCount::Times(1),
                        "depress" => ClickCount::Depress,
                        "release" => ClickCount::Release,
                        other => {
                            return Err(invalid(Tag::MouseClick, format!("unknown count '{}'", other)))
                        }
                    },
                    other => {
                        let times = unsigned(Tag::MouseClick, other)?;
                        ClickCount::Times(
                            u32::try_from(times).map_err(|_| invalid(Tag::MouseClick, "count too large"))?,
                        )
                    }
                };
                (string(Tag::MouseClick, button)?, count)
            }
            _ => return Err(invalid(Tag::MouseClick, "expected [button, count]")),
        },
        _ => return Err(invalid(Tag::MouseClick, "expected a button name")),
    };
    Ok(RuleComponent::MouseClick { button, count })
}

fn decode_set(payload: &Value) -> Result<RuleComponent, DecodeError> {
    Ok(RuleComponent::Set(setting_ref(Tag::Set, payload)?))
}

fn decode_execute(payload: &Value) -> Result<RuleComponent, DecodeError> {
    Ok(RuleComponent::Execute(strings(Tag::Execute, payload)?))
}

fn decode_later(payload: &Value) -> Result<RuleComponent, DecodeError> {
    let items = match payload {
        Value::Sequence(items) => items.as_slice(),
        delay @ Value::Number(_) => std::slice::from_ref(delay),
        _ => return Err(invalid(Tag::Later, "expected [delay, component...]")),
    };
    let (delay, rest) = items
        .split_first()
        .ok_or_else(|| invalid(Tag::Later, "missing delay"))?;
    Ok(RuleComponent::Later {
        delay: number(Tag::Later, delay)?,
        components: rest.iter().map(compile).collect(),
    })
}

impl RuleComponent {
    /// Encode this component in its canonical tagged-value form
    pub fn to_data(&self) -> Value {
        fn children(items: &[RuleComponent]) -> Value {
            Value::Sequence(items.iter().map(RuleComponent::to_data).collect())
        }

        let (tag, payload) = match self {
            RuleComponent::Rule(rule) => (Tag::Rule, children(&rule.components)),
            RuleComponent::And(items) => (Tag::And, children(items)),
            RuleComponent::Or(items) => (Tag::Or, children(items)),
            RuleComponent::Not(inner) => {
                let payload = match inner.as_deref().map(RuleComponent::to_data) {
                    None => Value::Null,
                    // A bare list or null would read back as the list form or an empty Not
                    Some(data @ (Value::Sequence(_) | Value::Null)) => Value::Sequence(vec![data]),
                    Some(data) => data,
                };
                (Tag::Not, payload)
            }
            RuleComponent::Feature(name) => (Tag::Feature, Value::from(name.as_str())),
            RuleComponent::Report(n) => (Tag::Report, Value::from(*n)),
            RuleComponent::Process(p) => (Tag::Process, Value::from(p.as_str())),
            RuleComponent::MouseProcess(p) => (Tag::MouseProcess, Value::from(p.as_str())),
            RuleComponent::Modifiers(mods) => (
                Tag::Modifiers,
                Value::Sequence(mods.iter().map(|m| Value::from(m.to_string())).collect()),
            ),
            RuleComponent::Key { key, action } => (
                Tag::Key,
                Value::Sequence(vec![Value::from(key.as_str()), Value::from(action.as_str())]),
            ),
            RuleComponent::KeyIsDown(key) => (Tag::KeyIsDown, Value::from(key.as_str())),
            RuleComponent::Active(dev) => (Tag::Active, Value::from(dev.as_str())),
            RuleComponent::Device(dev) => (Tag::Device, Value::from(dev.as_str())),
            RuleComponent::Host(host) => (Tag::Host, Value::from(host.as_str())),
            RuleComponent::Setting(setting) => (Tag::Setting, setting_data(setting)),
            RuleComponent::Test(test) => match test.parameter {
                Some(p) => (
                    Tag::Test,
                    Value::Sequence(vec![Value::from(test.name.as_str()), Value::from(p)]),
                ),
                None => (Tag::Test, Value::from(test.name.as_str())),
            },
            RuleComponent::TestBytes(test) => {
                let mut items = vec![Value::from(test.begin as u64), Value::from(test.end as u64)];
                if let Some(mask) = test.mask {
                    items.push(Value::from(mask));
                }
                items.push(Value::from(test.value));
                (Tag::TestBytes, Value::Sequence(items))
            }
            RuleComponent::MouseGesture(moves) => (Tag::MouseGesture, string_list(moves)),
            RuleComponent::KeyPress { keys, action } => (
                Tag::KeyPress,
                Value::Sequence(vec![string_list(keys), Value::from(action.as_str())]),
            ),
            RuleComponent::MouseScroll { horizontal, vertical } => (
                Tag::MouseScroll,
                Value::Sequence(vec![number_value(*horizontal), number_value(*vertical)]),
            ),
            RuleComponent::MouseClick { button, count } => {
                let count = match count {
                    ClickCount::Times(n) => Value::from(u64::from(*n)),
                    ClickCount::Depress => Value::from("depress"),
                    ClickCount::Release => Value::from("release"),
                };
                (
                    Tag::MouseClick,
                    Value::Sequence(vec![Value::from(button.as_str()), count]),
                )
            }
            RuleComponent::Set(setting) => (Tag::Set, setting_data(setting)),
            RuleComponent::Execute(args) => (Tag::Execute, string_list(args)),
            RuleComponent::Later { delay, components } => {
                let mut items = vec![number_value(*delay)];
                items.extend(components.iter().map(RuleComponent::to_data));
                (Tag::Later, Value::Sequence(items))
            }
            RuleComponent::Unsupported(raw) => return raw.clone(),
        };

        tagged(tag, payload)
    }
}

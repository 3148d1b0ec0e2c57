use serde_yaml::Value;
use std::time::Duration;

use crate::core::compile::compile;
use crate::core::evaluate::{
    evaluate, ActionHandler, ActionRecorder, DeviceInfo, EvalContext, Event, RecordedAction,
};
use crate::core::keys::KeyTable;
use crate::core::types::{
    ClickCount, KeyAction, Modifier, PressAction, Rule, RuleComponent, RuleSet, RuleSource,
};

fn component(text: &str) -> RuleComponent {
    compile(&serde_yaml::from_str::<Value>(text).unwrap())
}

fn rules(texts: &[&str]) -> RuleSet {
    RuleSet::new(vec![Rule::new(texts.iter().map(|t| component(t)).collect())])
}

/// Evaluate and return the decision together with the recorded actions
fn run(rules: &RuleSet, event: &Event) -> (bool, Vec<RecordedAction>) {
    let keys = KeyTable::new();
    let mut recorder = ActionRecorder::new();
    let decision = {
        let mut ctx = EvalContext::new(event, &mut recorder, &keys);
        evaluate(rules, &mut ctx)
    };
    (decision.diverted, recorder.actions)
}

fn pressed(key: &str) -> RecordedAction {
    RecordedAction::KeyPress {
        keys: vec![key.to_string()],
        action: PressAction::Click,
    }
}

/// Handler whose actions always fail, counting the attempts
#[derive(Default)]
struct FailingHandler {
    calls: usize,
}

impl ActionHandler for FailingHandler {
    fn key_press(&mut self, _keys: &[String], _action: PressAction) -> bool {
        self.calls += 1;
        false
    }

    fn mouse_scroll(&mut self, _horizontal: f64, _vertical: f64) -> bool {
        self.calls += 1;
        false
    }

    fn mouse_click(&mut self, _button: &str, _count: ClickCount) -> bool {
        self.calls += 1;
        false
    }

    fn set_setting(&mut self, _device: &str, _setting: &str, _key: Option<&Value>, _value: &Value) -> bool {
        self.calls += 1;
        false
    }

    fn execute(&mut self, _command: &[String]) -> bool {
        self.calls += 1;
        false
    }

    fn schedule(&mut self, _delay: Duration, _rule: Rule) -> bool {
        self.calls += 1;
        false
    }
}

#[test]
fn test_brightness_rule_diverts_pressed_key() {
    let builtin = RuleSet::new(vec![Rule::with_source(
        vec![RuleComponent::Rule(Rule::new(vec![component(
            "And: [{Key: [Brightness Down, pressed]}, {KeyPress: XF86_MonBrightnessDown}]",
        )]))],
        RuleSource::new("builtin", false),
    )]);

    let event = Event::new().with_key("Brightness Down", KeyAction::Pressed);
    let (diverted, actions) = run(&builtin, &event);
    assert!(diverted);
    assert_eq!(actions, vec![pressed("XF86_MonBrightnessDown")]);

    let event = Event::new().with_key("Brightness Down", KeyAction::Released);
    let (diverted, actions) = run(&builtin, &event);
    assert!(!diverted);
    assert!(actions.is_empty());

    let (diverted, actions) = run(&builtin, &Event::new());
    assert!(!diverted);
    assert!(actions.is_empty());
}

#[test]
fn test_and_short_circuits_on_false() {
    let set = rules(&["And: [{Test: 'False'}, {KeyPress: a}]"]);
    let (diverted, actions) = run(&set, &Event::new());
    assert!(!diverted);
    assert!(actions.is_empty());

    let set = rules(&["And: [{KeyPress: a}, {Test: 'False'}, {KeyPress: b}]"]);
    let (diverted, actions) = run(&set, &Event::new());
    assert!(diverted, "an action fired before the false condition");
    assert_eq!(actions, vec![pressed("a")]);
}

#[test]
fn test_or_short_circuits_on_true() {
    let set = rules(&["Or: [{Test: 'True'}, {KeyPress: a}]"]);
    let (diverted, actions) = run(&set, &Event::new());
    assert!(!diverted);
    assert!(actions.is_empty());

    let set = rules(&["Or: [{Test: 'False'}, {KeyPress: a}, {KeyPress: b}]"]);
    let (_, actions) = run(&set, &Event::new());
    assert_eq!(actions, vec![pressed("a")]);
}

#[test]
fn test_or_tries_every_failing_action() {
    let set = rules(&["Or: [{KeyPress: a}, {KeyPress: b}]"]);
    let event = Event::new();
    let keys = KeyTable::new();
    let mut handler = FailingHandler::default();
    let decision = {
        let mut ctx = EvalContext::new(&event, &mut handler, &keys);
        evaluate(&set, &mut ctx)
    };
    assert!(!decision.diverted);
    assert_eq!(handler.calls, 2);
}

#[test]
fn test_empty_combinators() {
    let (diverted, actions) = run(&rules(&["And: []", "KeyPress: a"]), &Event::new());
    assert!(diverted);
    assert_eq!(actions.len(), 1);

    let (diverted, actions) = run(&rules(&["Or: []", "KeyPress: a"]), &Event::new());
    assert!(!diverted);
    assert!(actions.is_empty());

    let (diverted, _) = run(&rules(&["Not: null", "KeyPress: a"]), &Event::new());
    assert!(diverted, "an empty Not is vacuously true");
}

#[test]
fn test_not_inverts() {
    let set = rules(&["Not: {Process: firefox}", "KeyPress: a"]);
    let (diverted, _) = run(&set, &Event::new().with_process("firefox-esr"));
    assert!(!diverted);
    let (diverted, _) = run(&set, &Event::new().with_process("kitty"));
    assert!(diverted);
}

#[test]
fn test_first_matching_rule_wins() {
    let set = RuleSet::new(vec![
        Rule::new(vec![
            component("Rule: [{Process: kitty}, {KeyPress: a}]"),
            component("Rule: [{KeyPress: b}]"),
        ]),
        Rule::new(vec![component("Rule: [{KeyPress: c}]")]),
    ]);

    let (diverted, actions) = run(&set, &Event::new().with_process("kitty"));
    assert!(diverted);
    assert_eq!(actions, vec![pressed("a")]);

    let (diverted, actions) = run(&set, &Event::new().with_process("firefox"));
    assert!(diverted);
    assert_eq!(actions, vec![pressed("b")]);
}

#[test]
fn test_missing_event_data_is_false() {
    let conditions = [
        "Feature: CROWN",
        "Report: 1",
        "Process: kitty",
        "MouseProcess: kitty",
        "Key: Brightness Up",
        "KeyIsDown: Smart Shift",
        "Active: MX Master 3",
        "Device: MX Master 3",
        "Host: desk",
        "Setting: [null, smart-shift, 30]",
        "Test: thumb_wheel_up",
        "TestBytes: [0, 2, 5]",
        "MouseGesture: [Mouse Up]",
    ];
    for condition in conditions {
        let (diverted, _) = run(&rules(&[condition, "KeyPress: a"]), &Event::new());
        assert!(!diverted, "{} should be false without data", condition);
    }
}

#[test]
fn test_conditions_match_event_data() {
    let event = Event::new()
        .with_device(DeviceInfo {
            name: "MX Master 3".to_string(),
            serial: Some("ABCD1234".to_string()),
            unit_id: None,
        })
        .with_feature("THUMB WHEEL", vec![0x00, 0x03])
        .with_report(0)
        .with_modifiers(vec![Modifier::Shift, Modifier::Control])
        .with_process("firefox")
        .with_setting("MX Master 3", "smart-shift", Value::from(30));

    let matching = [
        "Feature: THUMB WHEEL",
        "Report: 0",
        "Process: fire",
        "Device: ABCD1234",
        "Modifiers: [Control, Shift]",
        "Setting: [null, smart-shift, 30]",
        "Setting: [MX Master 3, smart-shift, 30]",
        "Test: thumb_wheel_up",
        "Test: [thumb_wheel_up, 3]",
        "TestBytes: [0, 2, 3]",
        "TestBytes: [1, 2, 2, 2]",
    ];
    for condition in matching {
        let (diverted, _) = run(&rules(&[condition, "KeyPress: a"]), &event);
        assert!(diverted, "{} should match", condition);
    }

    let failing = [
        "Modifiers: [Shift]",
        "Test: [thumb_wheel_up, 4]",
        "Test: thumb_wheel_down",
        "Test: crown_pressed",
        "Test: no_such_test",
        "TestBytes: [0, 3, 3]",
        "Setting: [null, smart-shift, 31]",
    ];
    for condition in failing {
        let (diverted, _) = run(&rules(&[condition, "KeyPress: a"]), &event);
        assert!(!diverted, "{} should not match", condition);
    }
}

#[test]
fn test_set_is_visible_to_later_setting() {
    let set = rules(&[
        "Set: [null, dpi, 1600]",
        "Setting: [null, dpi, 1600]",
        "KeyPress: a",
    ]);
    let event = Event::new()
        .with_device(DeviceInfo::named("MX Master 3"))
        .with_setting("MX Master 3", "dpi", Value::from(800));

    let (diverted, actions) = run(&set, &event);
    assert!(diverted);
    assert_eq!(
        actions[0],
        RecordedAction::Set {
            device: "MX Master 3".to_string(),
            setting: "dpi".to_string(),
            key: None,
            value: Value::from(1600),
        }
    );
    assert_eq!(actions[1], pressed("a"));
}

#[test]
fn test_keyed_setting() {
    let mut keyed = serde_yaml::Mapping::new();
    keyed.insert(Value::from("Back Button"), Value::from("Diverted"));
    let event = Event::new()
        .with_device(DeviceInfo::named("MX"))
        .with_setting("MX", "divert-keys", Value::Mapping(keyed));

    let set = rules(&["Setting: [null, divert-keys, Back Button, Diverted]", "KeyPress: a"]);
    assert!(run(&set, &event).0);
    let set = rules(&["Setting: [null, divert-keys, Forward Button, Diverted]", "KeyPress: a"]);
    assert!(!run(&set, &event).0);
}

#[test]
fn test_unknown_key_does_not_fire() {
    let set = rules(&["KeyPress: [Control_L, Frobnicate]"]);
    let (diverted, actions) = run(&set, &Event::new());
    assert!(!diverted);
    assert!(actions.is_empty());
}

#[test]
fn test_later_schedules_its_components() {
    let set = rules(&["Later: [0.5, {KeyPress: a}]"]);
    let (diverted, actions) = run(&set, &Event::new());
    assert!(diverted);
    assert_eq!(
        actions,
        vec![RecordedAction::Schedule {
            delay: Duration::from_millis(500),
            rule: Rule::new(vec![component("KeyPress: a")]),
        }]
    );

    let (diverted, actions) = run(&rules(&["Later: [-1, {KeyPress: a}]"]), &Event::new());
    assert!(!diverted);
    assert!(actions.is_empty());
}

#[test]
fn test_other_actions_are_recorded() {
    let set = rules(&[
        "MouseScroll: [0, 2]",
        "MouseClick: [left, 2]",
        "Execute: [notify-send, hi]",
    ]);
    let (diverted, actions) = run(&set, &Event::new());
    assert!(diverted);
    assert_eq!(
        actions,
        vec![
            RecordedAction::MouseScroll {
                horizontal: 0.0,
                vertical: 2.0,
            },
            RecordedAction::MouseClick {
                button: "left".to_string(),
                count: ClickCount::Times(2),
            },
            RecordedAction::Execute(vec!["notify-send".to_string(), "hi".to_string()]),
        ]
    );
}

#[test]
fn test_execute_without_command_does_not_fire() {
    let (diverted, actions) = run(&rules(&["Execute: ['']"]), &Event::new());
    assert!(!diverted);
    assert!(actions.is_empty());
}

#[test]
fn test_unsupported_component_is_false() {
    let (diverted, actions) = run(&rules(&["Teleport: moon", "KeyPress: a"]), &Event::new());
    assert!(!diverted);
    assert!(actions.is_empty());
}

#[test]
fn test_event_deserialises_with_defaults() {
    let event: Event = serde_yaml::from_str(
        "key: {key: Brightness Up}\nprocess: kitty\nmodifiers: [Shift]\n",
    )
    .unwrap();
    assert_eq!(event.key.as_ref().map(|k| k.action), Some(KeyAction::Pressed));
    assert_eq!(event.process.as_deref(), Some("kitty"));
    assert_eq!(event.modifiers, vec![Modifier::Shift]);
    assert!(event.device.is_none());
}

use serde_yaml::Value;

use crate::core::compile::{compile, try_compile, DecodeError};
use crate::core::types::{
    ByteTest, ClickCount, KeyAction, Modifier, PressAction, Rule, RuleComponent, SettingRef, Tag,
    TestSpec,
};

fn yaml(text: &str) -> Value {
    serde_yaml::from_str(text).unwrap()
}

fn representative_components() -> Vec<RuleComponent> {
    vec![
        RuleComponent::Feature("REPROG CONTROLS V4".to_string()),
        RuleComponent::Report(3),
        RuleComponent::Process("firefox".to_string()),
        RuleComponent::MouseProcess("steam".to_string()),
        RuleComponent::Modifiers(vec![Modifier::Control, Modifier::Shift]),
        RuleComponent::Key {
            key: "Brightness Down".to_string(),
            action: KeyAction::Released,
        },
        RuleComponent::KeyIsDown("Smart Shift".to_string()),
        RuleComponent::Active("MX Master 3".to_string()),
        RuleComponent::Device("4082".to_string()),
        RuleComponent::Host("workstation".to_string()),
        RuleComponent::Setting(SettingRef {
            device: None,
            setting: "smart-shift".to_string(),
            key: None,
            value: Value::from(30),
        }),
        RuleComponent::Test(TestSpec {
            name: "thumb_wheel_up".to_string(),
            parameter: Some(2),
        }),
        RuleComponent::TestBytes(ByteTest {
            begin: 0,
            end: 2,
            mask: Some(0xff00),
            value: 0x0100,
        }),
        RuleComponent::MouseGesture(vec!["Mouse Up".to_string(), "Mouse Left".to_string()]),
        RuleComponent::KeyPress {
            keys: vec!["Control_L".to_string(), "Tab".to_string()],
            action: PressAction::Depress,
        },
        RuleComponent::MouseScroll {
            horizontal: 0.0,
            vertical: -1.5,
        },
        RuleComponent::MouseClick {
            button: "middle".to_string(),
            count: ClickCount::Times(2),
        },
        RuleComponent::Set(SettingRef {
            device: Some("MX Master 3".to_string()),
            setting: "hires-smooth-invert".to_string(),
            key: Some(Value::from("ratchet")),
            value: Value::from(true),
        }),
        RuleComponent::Execute(vec!["notify-send".to_string(), "hello".to_string()]),
    ]
}

#[test]
fn test_round_trip_every_leaf() {
    for component in representative_components() {
        let data = component.to_data();
        assert_eq!(compile(&data), component, "round trip of {:?}", data);
    }
}

#[test]
fn test_round_trip_every_template() {
    for tag in Tag::ALL {
        let component = tag.template();
        assert_eq!(compile(&component.to_data()), component, "template of {}", tag);
    }
}

#[test]
fn test_round_trip_nested_containers() {
    let leaves = representative_components();
    let tree = RuleComponent::Rule(Rule::new(vec![
        RuleComponent::And(vec![
            leaves[0].clone(),
            RuleComponent::Or(vec![leaves[4].clone(), leaves[5].clone()]),
            RuleComponent::Not(Some(Box::new(leaves[9].clone()))),
        ]),
        RuleComponent::Later {
            delay: 0.5,
            components: vec![leaves[14].clone(), RuleComponent::Rule(Rule::new(vec![leaves[18].clone()]))],
        },
        RuleComponent::Not(None),
    ]));

    assert_eq!(compile(&tree.to_data()), tree);
}

#[test]
fn test_shorthand_payloads() {
    assert_eq!(
        compile(&yaml("Key: Brightness Down")),
        RuleComponent::Key {
            key: "Brightness Down".to_string(),
            action: KeyAction::Pressed,
        }
    );
    assert_eq!(
        compile(&yaml("KeyPress: XF86_MonBrightnessDown")),
        RuleComponent::KeyPress {
            keys: vec!["XF86_MonBrightnessDown".to_string()],
            action: PressAction::Click,
        }
    );
    assert_eq!(
        compile(&yaml("KeyPress: [Control_L, Tab]")),
        RuleComponent::KeyPress {
            keys: vec!["Control_L".to_string(), "Tab".to_string()],
            action: PressAction::Click,
        }
    );
    assert_eq!(
        compile(&yaml("Modifiers: Shift")),
        RuleComponent::Modifiers(vec![Modifier::Shift])
    );
    assert_eq!(
        compile(&yaml("Not: [{Host: desk}]")),
        RuleComponent::Not(Some(Box::new(RuleComponent::Host("desk".to_string()))))
    );
    assert_eq!(
        compile(&yaml("Later: 2")),
        RuleComponent::Later {
            delay: 2.0,
            components: Vec::new(),
        }
    );
    assert_eq!(
        compile(&yaml("Execute: xdotool")),
        RuleComponent::Execute(vec!["xdotool".to_string()])
    );
}

#[test]
fn test_canonical_encoding() {
    let press = compile(&yaml("KeyPress: space"));
    assert_eq!(press.to_data(), yaml("KeyPress: [[space], click]"));

    let scroll = compile(&yaml("MouseScroll: [0, 1]"));
    assert_eq!(scroll.to_data(), yaml("MouseScroll: [0, 1]"));

    let key = compile(&yaml("Key: Brightness Up"));
    assert_eq!(key.to_data(), yaml("Key: [Brightness Up, pressed]"));
}

#[test]
fn test_try_compile_errors() {
    assert_eq!(try_compile(&yaml("[1, 2]")), Err(DecodeError::NotATaggedValue));
    assert_eq!(
        try_compile(&yaml("{Host: a, Process: b}")),
        Err(DecodeError::NotATaggedValue)
    );
    assert_eq!(
        try_compile(&yaml("Frobnicate: 1")),
        Err(DecodeError::UnknownTag("Frobnicate".to_string()))
    );
    assert!(matches!(
        try_compile(&yaml("Report: lots")),
        Err(DecodeError::InvalidPayload { tag: "Report", .. })
    ));
    assert!(matches!(
        try_compile(&yaml("Modifiers: [Hyper]")),
        Err(DecodeError::InvalidPayload { tag: "Modifiers", .. })
    ));
}

#[test]
fn test_unknown_tag_is_kept_verbatim() {
    let raw = yaml("Frobnicate: {speed: 3, modes: [a, b]}");
    let component = compile(&raw);
    assert_eq!(component, RuleComponent::Unsupported(raw.clone()));
    assert_eq!(component.tag(), None);
    assert_eq!(component.to_data(), raw);
}

#[test]
fn test_malformed_payload_is_kept_verbatim() {
    let raw = yaml("MouseScroll: [up]");
    assert_eq!(compile(&raw), RuleComponent::Unsupported(raw.clone()));
}

#[test]
fn test_unknown_tag_inside_container_reserialises_identically() {
    let source = "- Rule:\n  - Host: desk\n  - Teleport:\n      to: moon\n      speed: 9\n";
    let parsed: Value = serde_yaml::from_str(source).unwrap();

    let compiled: Vec<RuleComponent> = parsed
        .as_sequence()
        .unwrap()
        .iter()
        .map(compile)
        .collect();
    match &compiled[0] {
        RuleComponent::Rule(rule) => {
            assert!(matches!(rule.components[1], RuleComponent::Unsupported(_)));
        }
        other => panic!("Expected a rule, got {:?}", other),
    }

    let written = Value::Sequence(compiled.iter().map(RuleComponent::to_data).collect());
    assert_eq!(written, parsed);
    assert_eq!(
        serde_yaml::to_string(&written).unwrap(),
        serde_yaml::to_string(&parsed).unwrap()
    );
}

#[test]
fn test_not_of_list_or_null_survives_a_save() {
    for (text, inner) in [
        ("Not: [[{Host: a}]]", yaml("[{Host: a}]")),
        ("Not: [null]", Value::Null),
    ] {
        let component = compile(&yaml(text));
        assert_eq!(
            component,
            RuleComponent::Not(Some(Box::new(RuleComponent::Unsupported(inner)))),
            "{}",
            text
        );

        let written = serde_yaml::to_string(&component.to_data()).unwrap();
        assert_eq!(compile(&yaml(&written)), component, "{} wrote {}", text, written);
    }
}

#[test]
fn test_not_of_plain_component_writes_bare_child() {
    let component = compile(&yaml("Not: [{Host: a}]"));
    assert_eq!(component.to_data(), yaml("Not: {Host: a}"));
}

#[test]
fn test_key_press_keeps_unknown_keys() {
    let component = compile(&yaml("KeyPress: [[Control_L, Frobnicate], depress]"));
    assert_eq!(
        component,
        RuleComponent::KeyPress {
            keys: vec!["Control_L".to_string(), "Frobnicate".to_string()],
            action: PressAction::Depress,
        }
    );
    assert_eq!(crate::core::default_keys().unknown(&["Frobnicate".to_string()]), vec!["Frobnicate"]);
}

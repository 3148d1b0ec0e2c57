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

//! Rule validation run before a save.
//!
//! Walks a rule tree and collects issues into a report the storage layer
//! uses to decide whether the document may be written:
//! - **Error**: blocks the save (a rule that cannot be evaluated sensibly)
//! - **Warning**: logged, the save proceeds (rules that load but may not do
//!   what the user expects on this machine)
//!
//! # Example
//! ```
//! use diversion_rules::config::validator::RuleValidator;
//! use diversion_rules::core::{Rule, RuleComponent};
//!
//! let rule = Rule::new(vec![RuleComponent::Not(None)]);
//! let report = RuleValidator::new().validate_rule(&rule);
//! assert!(report.has_errors());
//! ```

use std::fmt;

use crate::core::evaluate::TESTS;
use crate::core::{KeyTable, Rule, RuleComponent};

/// Shortest and longest delay a `Later` is expected to carry, in seconds
const LATER_DELAY_RANGE: (f64, f64) = (0.01, 100.0);

/// Validation severity level
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ValidationLevel {
    /// Blocks the save
    Error,
    /// Allows the save but is reported
    Warning,
}

/// A single issue found in a rule tree
#[derive(Clone, Debug)]
pub struct ValidationIssue {
    /// Child indices from the validated rule down to the component
    pub location: Vec<usize>,
    pub validation_level: ValidationLevel,
    /// Human-readable description of the issue
    pub message: String,
    /// Optional suggestion for fixing the issue
    pub suggestion: Option<String>,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let location = self
            .location
            .iter()
            .map(|i| i.to_string())
            .collect::<Vec<_>>()
            .join(".");
        write!(f, "[{}] {}", location, self.message)?;
        if let Some(suggestion) = &self.suggestion {
            write!(f, " ({})", suggestion)?;
        }
        Ok(())
    }
}

/// All issues found in one validation pass
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the report contains any Error-level issues
    pub fn has_errors(&self) -> bool {
        self.issues
            .iter()
            .any(|issue| issue.validation_level == ValidationLevel::Error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues
            .iter()
            .filter(|i| i.validation_level == ValidationLevel::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues
            .iter()
            .filter(|i| i.validation_level == ValidationLevel::Warning)
    }

    fn add_error(&mut self, location: &[usize], message: String, suggestion: &str) {
        self.issues.push(ValidationIssue {
            location: location.to_vec(),
            validation_level: ValidationLevel::Error,
            message,
            suggestion: Some(suggestion.to_string()),
        });
    }

    fn add_warning(&mut self, location: &[usize], message: String, suggestion: Option<String>) {
        self.issues.push(ValidationIssue {
            location: location.to_vec(),
            validation_level: ValidationLevel::Warning,
            message,
            suggestion,
        });
    }
}

/// Checks rule trees against the key table and the component constraints
#[derive(Clone, Debug, Default)]
pub struct RuleValidator {
    keys: KeyTable,
}

impl RuleValidator {
    /// Validator using the default key table
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_keys(keys: KeyTable) -> Self {
        Self { keys }
    }

    /// Validate every component below `rule`
    pub fn validate_rule(&self, rule: &Rule) -> ValidationReport {
        let mut report = ValidationReport::new();
        let mut location = Vec::new();
        for (i, component) in rule.components.iter().enumerate() {
            location.push(i);
            self.check(component, &mut location, &mut report);
            location.pop();
        }
        report
    }

    fn check(&self, component: &RuleComponent, location: &mut Vec<usize>, report: &mut ValidationReport) {
        match component {
            RuleComponent::Not(None) => report.add_error(
                location,
                "Not has nothing to negate".to_string(),
                "insert a condition into it or delete it",
            ),
            RuleComponent::Execute(command) if command.first().is_none_or(|c| c.trim().is_empty()) => {
                report.add_warning(
                    location,
                    "Execute has no command".to_string(),
                    Some("name the program to run".to_string()),
                )
            }
            RuleComponent::KeyPress { keys, .. } => {
                let unknown = self.keys.unknown(keys);
                if !unknown.is_empty() {
                    report.add_warning(
                        location,
                        format!("KeyPress names unknown keys: {}", unknown.join(", ")),
                        Some("the key press will not be sent on this machine".to_string()),
                    );
                }
            }
            RuleComponent::Test(test) if !TESTS.contains(&test.name.as_str()) => report.add_warning(
                location,
                format!("unknown test '{}'", test.name),
                Some(format!("known tests: {}", TESTS.join(", "))),
            ),
            RuleComponent::TestBytes(test) if test.end <= test.begin || test.end - test.begin > 8 => {
                report.add_warning(
                    location,
                    format!("TestBytes range {}..{} is not 1 to 8 bytes", test.begin, test.end),
                    None,
                )
            }
            RuleComponent::Later { delay, .. }
                if !(LATER_DELAY_RANGE.0..=LATER_DELAY_RANGE.1).contains(delay) =>
            {
                report.add_warning(
                    location,
                    format!("Later delay {}s is outside {}..{}s", delay, LATER_DELAY_RANGE.0, LATER_DELAY_RANGE.1),
                    None,
                )
            }
            RuleComponent::Unsupported(raw) => report.add_warning(
                location,
                format!(
                    "unsupported component kept as is: {}",
                    serde_yaml::to_string(raw).unwrap_or_default().trim_end()
                ),
                None,
            ),
            _ => {}
        }

        for (i, child) in component.children().iter().enumerate() {
            location.push(i);
            self.check(child, location, report);
            location.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{compile, Tag};
    use serde_yaml::Value;

    fn rule(texts: &[&str]) -> Rule {
        Rule::new(
            texts
                .iter()
                .map(|t| compile(&serde_yaml::from_str::<Value>(t).unwrap()))
                .collect(),
        )
    }

    #[test]
    fn test_clean_rule_passes() {
        let report = RuleValidator::new().validate_rule(&rule(&[
            "Key: [Brightness Down, pressed]",
            "KeyPress: XF86_MonBrightnessDown",
            "Test: [thumb_wheel_up, 10]",
            "Later: [1, {KeyPress: a}]",
        ]));
        assert!(!report.has_errors());
        assert_eq!(report.issues.len(), 0, "unexpected issues: {:?}", report.issues);
    }

    #[test]
    fn test_empty_not_blocks_save() {
        let report = RuleValidator::new().validate_rule(&rule(&["Rule: [{Or: [{Not: null}]}]"]));
        assert!(report.has_errors());
        let error = report.errors().next().unwrap();
        assert_eq!(error.location, vec![0, 0, 0]);
        assert!(error.message.contains("Not"));
    }

    #[test]
    fn test_execute_without_command_is_a_warning() {
        let report = RuleValidator::new().validate_rule(&rule(&["Execute: ['']", "Execute: []"]));
        assert!(!report.has_errors());
        assert_eq!(report.warnings().count(), 2);

        let template = Rule::new(vec![Tag::Execute.template()]);
        assert!(!RuleValidator::new().validate_rule(&template).has_errors());
    }

    #[test]
    fn test_warnings_do_not_block() {
        let report = RuleValidator::new().validate_rule(&rule(&[
            "KeyPress: [Control_L, Frobnicate]",
            "Test: wiggle",
            "TestBytes: [4, 2, 1]",
            "Later: [500, {KeyPress: a}]",
            "Teleport: moon",
        ]));
        assert!(!report.has_errors());
        assert_eq!(report.warnings().count(), 5);
        assert!(report.issues[0].message.contains("Frobnicate"));
    }

    #[test]
    fn test_custom_key_table() {
        let keys: KeyTable = ["Frobnicate"].into_iter().collect();
        let report = RuleValidator::with_keys(keys).validate_rule(&rule(&["KeyPress: Frobnicate"]));
        assert_eq!(report.issues.len(), 0);
    }

    #[test]
    fn test_issue_display() {
        let report = RuleValidator::new().validate_rule(&rule(&["Host: a", "Not: null"]));
        let text = report.issues[0].to_string();
        assert!(text.starts_with("[1] Not has nothing to negate"), "{}", text);
    }
}

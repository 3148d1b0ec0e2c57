//! Core module tests
//!
//! Contains test suites for core functionality:
//! - Component compilation and the textual round trip
//! - Rule evaluation against events
//! - Type tests (Tag, RuleSet, RuleComponent helpers)

#[cfg(test)]
mod compile_tests;
#[cfg(test)]
mod evaluate_tests;

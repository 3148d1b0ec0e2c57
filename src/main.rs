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

//! CLI entry point for diversion-rules
//!
//! Provides command-line interface for validating the rules, listing
//! them as the editor shows them, and dry-running an event through them.

use clap::{Parser, Subcommand};
use colored::*;
use diversion_rules::config::{FileStore, RuleStorage, RuleValidator};
use diversion_rules::core::{
    evaluate, ActionRecorder, EvalContext, Event, KeyTable, RecordedAction, RuleComponent,
};
use diversion_rules::editor::RuleEditor;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "diversion-rules")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the user rules file
    #[arg(
        short,
        long,
        global = true,
        env = "DIVERSION_RULES",
        default_value = "~/.config/diversion/rules.yaml"
    )]
    rules: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the rules and report problems
    Check,

    /// List all rules, as the editor shows them
    List,

    /// Evaluate one event against the rules without performing any action
    Eval {
        /// YAML file describing the event
        #[arg(short, long)]
        event: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let rules_path = expand(&cli.rules)?;
    let storage = RuleStorage::standard(FileStore::new(), rules_path);

    match cli.command {
        Commands::Check => check_rules(&storage)?,
        Commands::List => list_rules(storage),
        Commands::Eval { event } => eval_event(&storage, &expand(&event)?)?,
    }

    Ok(())
}

/// Expand tilde and environment variables in a path argument
fn expand(path: &Path) -> anyhow::Result<PathBuf> {
    let raw = path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid path encoding"))?;
    let expanded = shellexpand::full(raw)
        .map_err(|e| anyhow::anyhow!("Cannot expand {}: {}", raw, e))?;
    Ok(PathBuf::from(expanded.as_ref()))
}

/// Validate every loaded rule
fn check_rules(storage: &RuleStorage<FileStore>) -> anyhow::Result<()> {
    if let Some(source) = storage.user_source() {
        println!("{} Checking rules: {}", "→".cyan(), source.path.display());
    }

    let rules = storage.load_config();
    let validator = RuleValidator::new();
    let mut errors = 0;
    let mut warnings = 0;

    for entry in rules.entries() {
        let RuleComponent::Rule(rule) = entry else {
            continue;
        };
        let origin = rule
            .source
            .as_ref()
            .map(|s| s.path.display().to_string())
            .unwrap_or_default();

        println!(
            "{} {} rule{} from {}",
            "✓".green(),
            rule.components.len(),
            if rule.components.len() == 1 { "" } else { "s" },
            origin
        );

        let report = validator.validate_rule(rule);
        for issue in report.errors() {
            println!("  {} {}", "✗".red().bold(), issue);
        }
        for issue in report.warnings() {
            println!("  {} {}", "⚠".yellow(), issue);
        }
        errors += report.errors().count();
        warnings += report.warnings().count();
    }

    if errors > 0 {
        println!(
            "\n{} {} error{} and {} warning{}: these rules cannot be saved",
            "✗".red().bold(),
            errors,
            if errors == 1 { "" } else { "s" },
            warnings,
            if warnings == 1 { "" } else { "s" }
        );
        std::process::exit(1);
    }

    if warnings > 0 {
        println!("\n{} {} warning{}", "⚠".yellow(), warnings, if warnings == 1 { "" } else { "s" });
    } else {
        println!("\n{} {}", "✓".green().bold(), "No problems found!".bold());
    }
    Ok(())
}

/// Print the editor projection of the rules
fn list_rules(storage: RuleStorage<FileStore>) {
    let editor = RuleEditor::new(storage);

    for row in editor.rows() {
        let indent = "  ".repeat(row.level);
        let label = match row.level {
            0 => match editor.component(row.id) {
                Some(RuleComponent::Rule(rule)) => rule
                    .source
                    .map(|s| format!("Rules from {}", s.path.display()))
                    .unwrap_or_else(|| "Rules".to_string()),
                _ => row.label.clone(),
            },
            1 => "Rule".to_string(),
            _ => row.label.clone(),
        };

        let label = if row.placeholder {
            label.dimmed()
        } else if row.level == 0 {
            label.bold()
        } else if row.level == 1 {
            label.cyan()
        } else {
            label.normal()
        };
        let marker = if row.editable { "".normal() } else { " (read-only)".dimmed() };

        println!("{}{}{}", indent, label, marker);
    }
}

/// Evaluate an event file against the rules, recording the actions
fn eval_event(storage: &RuleStorage<FileStore>, event_path: &Path) -> anyhow::Result<()> {
    let content = fs::read_to_string(event_path)
        .map_err(|e| anyhow::anyhow!("Failed to read file: {}", e))?;
    let event: Event = serde_yaml::from_str(&content)
        .map_err(|e| anyhow::anyhow!("Invalid event in {}: {}", event_path.display(), e))?;

    let rules = storage.load_config();
    let keys = KeyTable::new();
    let mut recorder = ActionRecorder::new();
    let decision = {
        let mut ctx = EvalContext::new(&event, &mut recorder, &keys);
        evaluate(&rules, &mut ctx)
    };

    for action in &recorder.actions {
        println!("{} {}", "→".cyan(), describe(action));
    }

    if decision.diverted {
        println!("{} {}", "✓".green().bold(), "Event diverted".bold());
    } else {
        println!("{} Event passed through", "–".dimmed());
    }
    Ok(())
}

fn describe(action: &RecordedAction) -> String {
    match action {
        RecordedAction::KeyPress { keys, action } => format!("KeyPress {} {}", keys.join("+"), action.as_str()),
        RecordedAction::MouseScroll { horizontal, vertical } => {
            format!("MouseScroll {} {}", horizontal, vertical)
        }
        RecordedAction::MouseClick { button, count } => format!("MouseClick {} {}", button, count),
        RecordedAction::Set {
            device,
            setting,
            key,
            value,
        } => {
            let key = key.as_ref().map(|k| format!(" [{}]", yaml(k))).unwrap_or_default();
            format!("Set {} {}{} = {}", device, setting, key, yaml(value))
        }
        RecordedAction::Execute(command) => format!("Execute {}", command.join(" ")),
        RecordedAction::Schedule { delay, rule } => format!(
            "Later {:.2}s: {}",
            delay.as_secs_f64(),
            RuleComponent::Rule(rule.clone())
        ),
    }
}

fn yaml(value: &serde_yaml::Value) -> String {
    serde_yaml::to_string(value)
        .map(|s| s.trim_end().to_string())
        .unwrap_or_default()
}

//! Parser for a feature's `plan.md`.
//!
//! Extracts the summary, `**Key**: value` tech-stack pairs, ordered phases
//! with goals and task bullets, the dependency list, and risk/mitigation
//! pairs. Section routing is by substring match on depth-2 headings.

use std::sync::LazyLock;

use regex::Regex;

use crate::markdown::{parse_markdown, Block};
use crate::models::{ParsedPhase, ParsedPlan, ParsedRisk};

static TECH_PAIR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*([^*]+)\*\*\s*:\s*([^\n]+)").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    None,
    Summary,
    TechStack,
    Phase,
    Dependencies,
    Risks,
}

/// Parse plan.md text into a [`ParsedPlan`]. Total — never fails.
pub fn parse_plan(text: &str) -> ParsedPlan {
    let mut plan = ParsedPlan::default();
    let mut section = Section::None;
    let mut phase_order: i64 = 0;

    for block in parse_markdown(text) {
        match block {
            Block::Heading { level: 2, text } => {
                let lower = text.to_lowercase();
                section = if lower.contains("summary") {
                    Section::Summary
                } else if lower.contains("technical context") || lower.contains("tech") {
                    Section::TechStack
                } else if lower.contains("phase") {
                    phase_order += 1;
                    plan.phases.push(ParsedPhase {
                        name: text.trim().to_string(),
                        order: phase_order,
                        goal: None,
                        tasks: Vec::new(),
                    });
                    Section::Phase
                } else if lower.contains("dependencies") {
                    Section::Dependencies
                } else if lower.contains("risk") {
                    Section::Risks
                } else {
                    Section::None
                };
            }
            Block::Paragraph { text } => match section {
                Section::Summary => {
                    if plan.summary.is_none() {
                        plan.summary = Some(text);
                    }
                }
                Section::Phase => {
                    if let Some(phase) = plan.phases.last_mut() {
                        if phase.goal.is_none() {
                            phase.goal = Some(text);
                        }
                    }
                }
                Section::TechStack => {
                    for captures in TECH_PAIR_RE.captures_iter(&text) {
                        plan.tech_stack.insert(
                            captures[1].trim().to_string(),
                            captures[2].trim().to_string(),
                        );
                    }
                }
                _ => {}
            },
            Block::List { items } => match section {
                Section::Phase => {
                    if let Some(phase) = plan.phases.last_mut() {
                        phase.tasks.extend(items);
                    }
                }
                Section::Dependencies => plan.dependencies.extend(items),
                Section::Risks => {
                    for item in items {
                        if let Some(risk) = split_risk(&item) {
                            plan.risks.push(risk);
                        }
                    }
                }
                _ => {}
            },
            _ => {}
        }
    }

    plan
}

/// Split a risk bullet on the first `-`, `–`, or `:` into (risk, mitigation).
/// Items without a separator are dropped.
fn split_risk(item: &str) -> Option<ParsedRisk> {
    let (idx, sep) = item
        .char_indices()
        .find(|(_, c)| matches!(c, '-' | '–' | ':'))?;
    let risk = item[..idx].trim();
    let mitigation = item[idx + sep.len_utf8()..].trim();
    if risk.is_empty() {
        return None;
    }
    Some(ParsedRisk {
        risk: risk.to_string(),
        mitigation: mitigation.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAN: &str = r#"# Implementation Plan

## Summary

Mirror spec documents into SQLite and keep them fresh.

A second paragraph that must not replace the summary.

## Technical Context

**Language**: Rust
**Storage**: SQLite

## Phase 1: Foundation

Stand up the schema and parsers.

- Create migrations
- Wire the structural reader

## Phase 2: Sync

- Implement the orchestrator

## Dependencies

- sqlx
- pulldown-cmark

## Risks

- Watcher misses events – fall back to manual sync
- Schema drift: add migration tests
- unsplittable risk item
"#;

    #[test]
    fn test_summary_first_wins() {
        let plan = parse_plan(PLAN);
        assert_eq!(
            plan.summary.as_deref(),
            Some("Mirror spec documents into SQLite and keep them fresh.")
        );
    }

    #[test]
    fn test_tech_stack_pairs() {
        let plan = parse_plan(PLAN);
        assert_eq!(plan.tech_stack.get("Language").map(String::as_str), Some("Rust"));
        assert_eq!(plan.tech_stack.get("Storage").map(String::as_str), Some("SQLite"));
    }

    #[test]
    fn test_phases_ordered_with_goal_and_tasks() {
        let plan = parse_plan(PLAN);
        assert_eq!(plan.phases.len(), 2);
        assert_eq!(plan.phases[0].name, "Phase 1: Foundation");
        assert_eq!(plan.phases[0].order, 1);
        assert_eq!(
            plan.phases[0].goal.as_deref(),
            Some("Stand up the schema and parsers.")
        );
        assert_eq!(plan.phases[0].tasks.len(), 2);
        assert_eq!(plan.phases[1].order, 2);
        assert!(plan.phases[1].goal.is_none());
    }

    #[test]
    fn test_dependencies_collected() {
        let plan = parse_plan(PLAN);
        assert_eq!(plan.dependencies, vec!["sqlx", "pulldown-cmark"]);
    }

    #[test]
    fn test_risks_split_and_separatorless_dropped() {
        let plan = parse_plan(PLAN);
        assert_eq!(plan.risks.len(), 2);
        assert_eq!(
            plan.risks[0],
            ParsedRisk {
                risk: "Watcher misses events".into(),
                mitigation: "fall back to manual sync".into()
            }
        );
        assert_eq!(plan.risks[1].risk, "Schema drift");
        assert_eq!(plan.risks[1].mitigation, "add migration tests");
    }

    #[test]
    fn test_empty_input() {
        let plan = parse_plan("");
        assert!(plan.summary.is_none());
        assert!(plan.phases.is_empty());
        assert!(plan.tech_stack.is_empty());
    }
}

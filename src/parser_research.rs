//! Parser for a feature's `research.md`.
//!
//! Each depth-2 heading (other than an overview) opens a decision topic
//! carrying `**Decision**:` and `**Rationale**:` fields plus an optional
//! alternatives list introduced by an "Alternatives considered" marker.

use std::sync::LazyLock;

use regex::Regex;

use crate::markdown::{parse_markdown, Block};
use crate::models::ParsedResearchDecision;

static DECISION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\*\*Decision\*\*\s*:\s*([^\n]+)").unwrap());
static RATIONALE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\*\*Rationale\*\*\s*:\s*([^\n]+)").unwrap());

/// Parse research.md text into decision records. Total — never fails.
pub fn parse_research(text: &str) -> Vec<ParsedResearchDecision> {
    let mut decisions: Vec<ParsedResearchDecision> = Vec::new();
    let mut in_alternatives = false;

    for block in parse_markdown(text) {
        match block {
            Block::Heading { level: 2, text } => {
                let lower = text.to_lowercase();
                in_alternatives = false;
                if lower.contains("overview") || lower.contains("summary") {
                    continue;
                }
                decisions.push(ParsedResearchDecision {
                    topic: text.trim().to_string(),
                    ..ParsedResearchDecision::default()
                });
            }
            Block::Paragraph { text } => {
                let Some(current) = decisions.last_mut() else {
                    continue;
                };
                if current.decision.is_none() {
                    if let Some(c) = DECISION_RE.captures(&text) {
                        current.decision = Some(c[1].trim().to_string());
                    }
                }
                if current.rationale.is_none() {
                    if let Some(c) = RATIONALE_RE.captures(&text) {
                        current.rationale = Some(c[1].trim().to_string());
                    }
                }
                if text.to_lowercase().contains("alternative") {
                    in_alternatives = true;
                }
            }
            Block::List { items } => {
                if in_alternatives {
                    if let Some(current) = decisions.last_mut() {
                        current.alternatives.extend(items);
                    }
                }
            }
            _ => {}
        }
    }

    decisions
}

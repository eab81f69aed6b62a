//! Parser for a feature's `spec.md`.
//!
//! Extracts the title, bold-label metadata fields (`**Status**:`,
//! `**Created**:`, `**Feature Branch**:`, `**Priority**:`), user stories
//! with acceptance scenarios, and FR/NFR requirement identifiers.
//!
//! Single forward pass over the block sequence carrying an explicit scan
//! state (current section, open story accumulator). Malformed constructs
//! degrade to defaults — this function never fails.

use std::sync::LazyLock;

use regex::Regex;

use crate::markdown::{parse_markdown, Block};
use crate::models::{
    FeatureStatus, ParsedRequirement, ParsedSpec, ParsedUserStory, StoryPriority,
};

static STATUS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\*\*Status\*\*\s*:\s*([^\n]+)").unwrap());
static CREATED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\*\*Created\*\*\s*:\s*([^\n]+)").unwrap());
static BRANCH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\*\*Feature Branch\*\*\s*:\s*([^\n]+)").unwrap());
static PRIORITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\*\*Priority\*\*\s*:\s*([^\n]+)").unwrap());
static STORY_PRIORITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\(\s*Priority\s*:\s*(P[1-3])\s*\)\s*$").unwrap());
static REQUIREMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^((?:FR|NFR)-\d+)[\s:.\-–—]*").unwrap());
static TITLE_PREFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^Feature Specification\s*:\s*").unwrap());

/// Section of the spec document the scan is currently inside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    None,
    UserStories,
    Requirements,
}

/// Per-step scan state carried through the fold.
struct Scan {
    out: ParsedSpec,
    section: Section,
    story: Option<ParsedUserStory>,
}

impl Scan {
    fn close_story(&mut self) {
        if let Some(story) = self.story.take() {
            self.out.user_stories.push(story);
        }
    }
}

/// Parse spec.md text into a [`ParsedSpec`]. Total — never fails.
pub fn parse_spec(text: &str) -> ParsedSpec {
    let blocks = parse_markdown(text);
    let mut scan = Scan {
        out: ParsedSpec::default(),
        section: Section::None,
        story: None,
    };
    let mut status_seen = false;

    for block in &blocks {
        match block {
            Block::Heading { level: 1, text } => {
                if scan.out.title.is_none() {
                    scan.out.title = Some(TITLE_PREFIX_RE.replace(text, "").trim().to_string());
                }
            }
            Block::Heading { level: 2, text } => {
                scan.close_story();
                let lower = text.to_lowercase();
                scan.section = if lower.contains("user") && lower.contains("scenario") {
                    Section::UserStories
                } else if lower.contains("requirement") {
                    Section::Requirements
                } else {
                    Section::None
                };
            }
            Block::Heading { level: 3, text } => {
                if scan.section == Section::UserStories {
                    scan.close_story();
                    scan.story = Some(new_story(text));
                }
            }
            Block::Paragraph { text } => {
                // Bold-label metadata fields win first, from anywhere in
                // the document.
                if !status_seen {
                    if let Some(c) = STATUS_RE.captures(text) {
                        scan.out.status = FeatureStatus::parse(&c[1]);
                        status_seen = true;
                    }
                }
                if scan.out.created.is_none() {
                    if let Some(c) = CREATED_RE.captures(text) {
                        scan.out.created = Some(c[1].trim().to_string());
                    }
                }
                if scan.out.branch.is_none() {
                    if let Some(c) = BRANCH_RE.captures(text) {
                        scan.out.branch = Some(c[1].trim().to_string());
                    }
                }
                if scan.out.priority.is_none() {
                    if let Some(c) = PRIORITY_RE.captures(text) {
                        scan.out.priority = Some(c[1].trim().to_string());
                    }
                }
                if let Some(story) = scan.story.as_mut() {
                    if story.description.is_none() && !text.trim_start().starts_with("**") {
                        story.description = Some(text.clone());
                    }
                }
            }
            Block::List { items } => {
                if let Some(story) = scan.story.as_mut() {
                    story.scenarios.extend(items.iter().cloned());
                } else if scan.section == Section::Requirements {
                    for item in items {
                        if let Some(req) = parse_requirement(item) {
                            scan.out.requirements.push(req);
                        }
                    }
                }
            }
            _ => {}
        }
    }

    scan.close_story();
    scan.out
}

fn new_story(heading: &str) -> ParsedUserStory {
    let priority = STORY_PRIORITY_RE
        .captures(heading)
        .map(|c| match c[1].to_uppercase().as_str() {
            "P1" => StoryPriority::P1,
            "P3" => StoryPriority::P3,
            _ => StoryPriority::P2,
        })
        .unwrap_or(StoryPriority::P2);
    let title = STORY_PRIORITY_RE.replace(heading, "").trim().to_string();
    ParsedUserStory {
        title,
        priority,
        description: None,
        scenarios: Vec::new(),
    }
}

/// Items lacking an FR/NFR prefix are not an error — they are ignored.
fn parse_requirement(item: &str) -> Option<ParsedRequirement> {
    let trimmed = item.trim();
    let captures = REQUIREMENT_RE.captures(trimmed)?;
    let req_id = captures[1].to_uppercase();
    let rest = REQUIREMENT_RE.replace(trimmed, "").trim().to_string();
    let (description, priority) = match STORY_PRIORITY_RE.captures(&rest) {
        Some(c) => {
            let p = c[1].to_uppercase();
            (STORY_PRIORITY_RE.replace(&rest, "").trim().to_string(), Some(p))
        }
        None => (rest, None),
    };
    Some(ParsedRequirement {
        req_id,
        description,
        priority,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPEC: &str = r#"# Feature Specification: Login Flow

**Status**: approved
**Created**: 2025-01-15
**Feature Branch**: `003-login-flow`

## Overview

A login flow for the dashboard.

## User Scenarios & Testing

### Registered user signs in (Priority: P1)

A registered user enters credentials and lands on the dashboard.

- Given a valid account, signing in succeeds
- Given a wrong password, an error is shown

### Visitor requests a reset

Password reset via email.

## Requirements

- FR-001: The system MUST validate credentials server-side
- nfr-002 Responses arrive within 500ms (Priority: P2)
- This bullet has no identifier and is ignored
"#;

    #[test]
    fn test_title_prefix_stripped() {
        let spec = parse_spec(SPEC);
        assert_eq!(spec.title.as_deref(), Some("Login Flow"));
    }

    #[test]
    fn test_status_field_anywhere() {
        let spec = parse_spec(SPEC);
        assert_eq!(spec.status, FeatureStatus::Approved);
        assert_eq!(spec.created.as_deref(), Some("2025-01-15"));
        assert_eq!(spec.branch.as_deref(), Some("`003-login-flow`"));
    }

    #[test]
    fn test_status_defaults_to_draft() {
        let spec = parse_spec("# Title\n\nNo metadata here.\n");
        assert_eq!(spec.status, FeatureStatus::Draft);
    }

    #[test]
    fn test_stories_with_priority_and_default() {
        let spec = parse_spec(SPEC);
        assert_eq!(spec.user_stories.len(), 2);
        assert_eq!(spec.user_stories[0].title, "Registered user signs in");
        assert_eq!(spec.user_stories[0].priority, StoryPriority::P1);
        assert_eq!(spec.user_stories[1].priority, StoryPriority::P2);
    }

    #[test]
    fn test_story_description_and_scenarios() {
        let spec = parse_spec(SPEC);
        let story = &spec.user_stories[0];
        assert_eq!(
            story.description.as_deref(),
            Some("A registered user enters credentials and lands on the dashboard.")
        );
        assert_eq!(story.scenarios.len(), 2);
        assert!(story.scenarios[0].starts_with("Given a valid account"));
    }

    #[test]
    fn test_requirements_filtered_and_uppercased() {
        let spec = parse_spec(SPEC);
        assert_eq!(spec.requirements.len(), 2);
        assert_eq!(spec.requirements[0].req_id, "FR-001");
        assert_eq!(
            spec.requirements[0].description,
            "The system MUST validate credentials server-side"
        );
        assert_eq!(spec.requirements[1].req_id, "NFR-002");
        assert_eq!(spec.requirements[1].priority.as_deref(), Some("P2"));
        assert!(spec.requirements[1].description.ends_with("500ms"));
    }

    #[test]
    fn test_section_exit_ends_story_accumulation() {
        let md = "## User Scenarios\n\n### Story A\n\n## Something Else\n\n- stray bullet\n";
        let spec = parse_spec(md);
        assert_eq!(spec.user_stories.len(), 1);
        assert!(spec.user_stories[0].scenarios.is_empty());
    }

    #[test]
    fn test_empty_input() {
        let spec = parse_spec("");
        assert!(spec.title.is_none());
        assert_eq!(spec.status, FeatureStatus::Draft);
        assert!(spec.user_stories.is_empty());
        assert!(spec.requirements.is_empty());
    }
}

//! Parser for a feature's `data-model.md`.
//!
//! Entities are `###` subsections; attributes and relationships live under
//! `####` headings or bold-marker paragraphs (`**Attributes**`), as bullet
//! lists or GFM tables. Several authoring conventions are tolerated:
//!
//! - `` `name` (TYPE, constraint, ...): description `` attribute bullets
//! - plain `name: type` attribute bullets
//! - three-column attribute tables (header row skipped)
//! - `has many X` / `belongs to X` / `references X` relationship bullets
//!
//! A depth-2 heading that is neither an overview nor a relationships
//! section is a category label grouping the entities below it; it does not
//! create an entity itself. Unrecognized subsection labels ("Lifecycle",
//! "Validation") are recorded as tags on the entity and left unparsed.

use std::sync::LazyLock;

use regex::Regex;

use crate::markdown::{parse_markdown, Block};
use crate::models::{
    Cardinality, ParsedAttribute, ParsedDataModel, ParsedEntity, ParsedRelationship,
};

static BOLD_MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\*\*[^*]+\*\*:?\s*$").unwrap());
static ATTR_PRIMARY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^`([^`]+)`\s*\(([^)]*)\)\s*:?\s*(.*)$").unwrap());
static RELATIONSHIP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:has|belongs|references)\s+(?:many|one|to)?\s*(\w+)").unwrap()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    None,
    Overview,
    Relationships,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SubSection {
    None,
    Attributes,
    Relationships,
    /// A recognized-but-unparsed label such as "lifecycle" or "validation".
    Other,
}

/// Per-step scan state: the open entity is always the last element of the
/// result vector (entities are appended as soon as their heading is seen).
struct Scan {
    out: ParsedDataModel,
    section: Section,
    entity_open: bool,
    subsection: SubSection,
}

/// Parse data-model.md text into a [`ParsedDataModel`]. Total — never fails.
pub fn parse_data_model(text: &str) -> ParsedDataModel {
    let mut scan = Scan {
        out: ParsedDataModel::default(),
        section: Section::None,
        entity_open: false,
        subsection: SubSection::None,
    };

    for block in parse_markdown(text) {
        match block {
            Block::Heading { level: 2, text } => {
                let lower = text.to_lowercase();
                if lower.contains("overview") || lower.contains("summary") {
                    scan.section = Section::Overview;
                    scan.entity_open = false;
                    scan.subsection = SubSection::None;
                } else if lower.contains("relationship") {
                    scan.section = Section::Relationships;
                } else {
                    // Category label grouping the entities below it.
                    scan.section = Section::None;
                }
            }
            Block::Heading { level: 3, text } => {
                scan.out.entities.push(ParsedEntity {
                    name: text.trim().to_string(),
                    ..ParsedEntity::default()
                });
                scan.entity_open = true;
                scan.subsection = SubSection::None;
            }
            Block::Heading { level: 4, text } => reclassify(&mut scan, &text),
            Block::Paragraph { text } => {
                if BOLD_MARKER_RE.is_match(text.trim()) {
                    reclassify(&mut scan, &text);
                } else if scan.section == Section::Overview && scan.out.overview.is_none() {
                    scan.out.overview = Some(text);
                } else if scan.entity_open && scan.subsection == SubSection::None {
                    if let Some(entity) = scan.out.entities.last_mut() {
                        if entity.description.is_none() {
                            entity.description = Some(text);
                        }
                    }
                }
            }
            Block::List { items } => {
                let parse_as_relationships = scan.subsection == SubSection::Relationships
                    || (scan.section == Section::Relationships
                        && scan.subsection == SubSection::None);
                if scan.subsection == SubSection::Attributes {
                    if let Some(entity) = open_entity(&mut scan) {
                        for item in &items {
                            if let Some(attr) = parse_attribute(item) {
                                entity.attributes.push(attr);
                            }
                        }
                    }
                } else if parse_as_relationships {
                    if let Some(entity) = open_entity(&mut scan) {
                        for item in &items {
                            if let Some(rel) = parse_relationship(item) {
                                entity.relationships.push(rel);
                            }
                        }
                    }
                }
            }
            Block::Table { rows } => {
                if scan.subsection == SubSection::Attributes {
                    if let Some(entity) = open_entity(&mut scan) {
                        // Header row is labels, not data.
                        for row in rows.iter().skip(1) {
                            if let Some(attr) = table_row_attribute(row) {
                                entity.attributes.push(attr);
                            }
                        }
                    }
                }
            }
            _ => {}
        }
    }

    scan.out
}

fn open_entity(scan: &mut Scan) -> Option<&mut ParsedEntity> {
    if scan.entity_open {
        scan.out.entities.last_mut()
    } else {
        None
    }
}

/// Reclassify the current subsection from a `####` heading or a bold-marker
/// paragraph. Unmatched labels are stored on the entity as opaque tags.
fn reclassify(scan: &mut Scan, label: &str) {
    let lower = label.to_lowercase();
    scan.subsection = if lower.contains("attribute")
        || lower.contains("field")
        || lower.contains("column")
    {
        SubSection::Attributes
    } else if lower.contains("relationship") || lower.contains("association") {
        SubSection::Relationships
    } else {
        if let Some(entity) = open_entity(scan) {
            let tag: String = lower
                .chars()
                .filter(|c| c.is_alphanumeric() || c.is_whitespace())
                .collect();
            let tag = tag.trim().to_string();
            if !tag.is_empty() {
                entity.subsection_tags.push(tag);
            }
        }
        SubSection::Other
    };
}

/// Primary: `` `name` (TYPE, constraints...): description ``.
/// Fallback: `name: type`. Anything else is skipped.
fn parse_attribute(item: &str) -> Option<ParsedAttribute> {
    let trimmed = item.trim();
    if let Some(captures) = ATTR_PRIMARY_RE.captures(trimmed) {
        let name = captures[1].trim().to_string();
        let parens = captures[2].trim().to_string();
        let description = captures[3].trim().to_string();
        let mut segments = parens.split(',').map(str::trim).filter(|s| !s.is_empty());
        let attr_type = segments.next().map(str::to_string);
        let remaining: Vec<&str> = segments.collect();
        let constraints = if !remaining.is_empty() {
            Some(remaining.join(", "))
        } else if !description.is_empty() {
            Some(description)
        } else {
            None
        };
        return Some(ParsedAttribute {
            name,
            attr_type,
            constraints,
        });
    }

    let (name, rest) = trimmed.split_once(':')?;
    let name = name.trim().trim_matches('`').trim();
    if name.is_empty() {
        return None;
    }
    Some(ParsedAttribute {
        name: name.to_string(),
        attr_type: Some(rest.trim().to_string()).filter(|s| !s.is_empty()),
        constraints: None,
    })
}

fn parse_relationship(item: &str) -> Option<ParsedRelationship> {
    let target = RELATIONSHIP_RE.captures(item)?[1].to_string();
    let lower = item.to_lowercase();
    let cardinality = if lower.contains("1:n") || lower.contains("one-to-many") {
        Cardinality::OneToMany
    } else if lower.contains("n:1") || lower.contains("many-to-one") {
        Cardinality::ManyToOne
    } else if lower.contains("n:n") || lower.contains("many-to-many") {
        Cardinality::ManyToMany
    } else {
        Cardinality::OneToOne
    };
    Some(ParsedRelationship {
        target,
        cardinality,
        description: item.trim().to_string(),
    })
}

fn table_row_attribute(row: &[String]) -> Option<ParsedAttribute> {
    let name = row.first()?.trim().trim_matches('`').to_string();
    if name.is_empty() {
        return None;
    }
    let attr_type = row.get(1).map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
    let constraints = row.get(2).map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
    Some(ParsedAttribute {
        name,
        attr_type,
        constraints,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const DATA_MODEL: &str = r#"# Data Model: Login Flow

## Overview

Accounts, sessions, and their audit trail.

## Core Entities

### Account

A registered user of the dashboard.

**Attributes**

- `id` (UUID, PK): primary identifier
- `email` (TEXT, unique, not null)
- display_name: TEXT

**Relationships**

- has many Session (1:N)
- references AuditLog

**Lifecycle**

Created on signup, soft-deleted on account closure.

### Session

#### Fields

| Name | Type | Constraints |
|------|------|-------------|
| `token` | TEXT | unique |
| `expires_at` | DATETIME | not null |

#### Associations

- belongs to Account (many-to-one)
"#;

    #[test]
    fn test_overview_text() {
        let model = parse_data_model(DATA_MODEL);
        assert_eq!(
            model.overview.as_deref(),
            Some("Accounts, sessions, and their audit trail.")
        );
    }

    #[test]
    fn test_category_heading_creates_no_entity() {
        let model = parse_data_model(DATA_MODEL);
        let names: Vec<&str> = model.entities.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Account", "Session"]);
    }

    #[test]
    fn test_entity_description_first_paragraph() {
        let model = parse_data_model(DATA_MODEL);
        assert_eq!(
            model.entities[0].description.as_deref(),
            Some("A registered user of the dashboard.")
        );
        assert!(model.entities[1].description.is_none());
    }

    #[test]
    fn test_primary_attribute_pattern() {
        let model = parse_data_model(DATA_MODEL);
        let attrs = &model.entities[0].attributes;
        assert_eq!(
            attrs[0],
            ParsedAttribute {
                name: "id".into(),
                attr_type: Some("UUID".into()),
                constraints: Some("PK".into()),
            }
        );
        assert_eq!(
            attrs[1],
            ParsedAttribute {
                name: "email".into(),
                attr_type: Some("TEXT".into()),
                constraints: Some("unique, not null".into()),
            }
        );
    }

    #[test]
    fn test_fallback_attribute_pattern() {
        let model = parse_data_model(DATA_MODEL);
        let attrs = &model.entities[0].attributes;
        assert_eq!(
            attrs[2],
            ParsedAttribute {
                name: "display_name".into(),
                attr_type: Some("TEXT".into()),
                constraints: None,
            }
        );
    }

    #[test]
    fn test_constraints_fall_back_to_description() {
        let model = parse_data_model("### E\n\n**Attributes**\n\n- `count` (INTEGER): how many\n");
        assert_eq!(
            model.entities[0].attributes[0],
            ParsedAttribute {
                name: "count".into(),
                attr_type: Some("INTEGER".into()),
                constraints: Some("how many".into()),
            }
        );
    }

    #[test]
    fn test_relationships_and_cardinality() {
        let model = parse_data_model(DATA_MODEL);
        let rels = &model.entities[0].relationships;
        assert_eq!(rels.len(), 2);
        assert_eq!(rels[0].target, "Session");
        assert_eq!(rels[0].cardinality, Cardinality::OneToMany);
        assert_eq!(rels[1].target, "AuditLog");
        assert_eq!(rels[1].cardinality, Cardinality::OneToOne);
    }

    #[test]
    fn test_table_attributes_skip_header() {
        let model = parse_data_model(DATA_MODEL);
        let attrs = &model.entities[1].attributes;
        assert_eq!(attrs.len(), 2);
        assert_eq!(attrs[0].name, "token");
        assert_eq!(attrs[0].attr_type.as_deref(), Some("TEXT"));
        assert_eq!(attrs[0].constraints.as_deref(), Some("unique"));
    }

    #[test]
    fn test_association_heading_maps_to_relationships() {
        let model = parse_data_model(DATA_MODEL);
        let rels = &model.entities[1].relationships;
        assert_eq!(rels.len(), 1);
        assert_eq!(rels[0].target, "Account");
        assert_eq!(rels[0].cardinality, Cardinality::ManyToOne);
    }

    #[test]
    fn test_lifecycle_stored_as_tag_not_description() {
        let model = parse_data_model(DATA_MODEL);
        assert_eq!(model.entities[0].subsection_tags, vec!["lifecycle"]);
        // The paragraph under the Lifecycle marker must not become anything.
        assert_ne!(
            model.entities[0].description.as_deref(),
            Some("Created on signup, soft-deleted on account closure.")
        );
    }

    #[test]
    fn test_duplicate_entity_headings_preserved() {
        let model = parse_data_model("### Thing\n\n### Thing\n");
        assert_eq!(model.entities.len(), 2);
        assert_eq!(model.entities[0].name, model.entities[1].name);
    }

    #[test]
    fn test_non_matching_relationship_items_dropped() {
        let model =
            parse_data_model("### E\n\n**Relationships**\n\n- just a note with no verb\n");
        assert!(model.entities[0].relationships.is_empty());
    }

    #[test]
    fn test_empty_input() {
        let model = parse_data_model("");
        assert!(model.overview.is_none());
        assert!(model.entities.is_empty());
    }
}

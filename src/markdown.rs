//! Markdown structural reader.
//!
//! Flattens a markdown document into an ordered sequence of [`Block`]s
//! (heading, paragraph, list, table) that the document parsers consume.
//! Inline markers that the downstream regex passes depend on are restored
//! during flattening: `**bold**` spans keep their asterisks and `` `code` ``
//! spans keep their backticks, so a flattened paragraph reads like the
//! authored source.
//!
//! Parsing is total: malformed markdown degrades to best-effort block
//! segmentation and never returns an error. GFM tables and YAML front-matter
//! are enabled; front-matter is consumed and discarded.

use pulldown_cmark::{Event, HeadingLevel, Options, Parser, Tag, TagEnd};

/// A top-level block in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    /// Heading with level 1–6 and flattened inline text.
    Heading { level: u8, text: String },
    /// Paragraph with flattened inline text.
    Paragraph { text: String },
    /// List with one flattened string per top-level item. Nested list
    /// content is folded into its parent item, depth-first.
    List { items: Vec<String> },
    /// Table as ordered rows of flattened cells; row 0 is the header row.
    Table { rows: Vec<Vec<String>> },
}

impl Block {
    /// Depth-first concatenation of all descendant text.
    pub fn text(&self) -> String {
        match self {
            Block::Heading { text, .. } | Block::Paragraph { text } => text.clone(),
            Block::List { items } => items.join("\n"),
            Block::Table { rows } => rows
                .iter()
                .map(|r| r.join(" "))
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

fn level_to_u8(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

#[derive(Default)]
struct Reader {
    blocks: Vec<Block>,
    heading: Option<(u8, String)>,
    paragraph: Option<String>,
    /// Open list items, innermost last. Only the outermost list emits a block.
    item_stack: Vec<String>,
    list_items: Vec<String>,
    list_depth: usize,
    table_rows: Vec<Vec<String>>,
    table_row: Vec<String>,
    cell: Option<String>,
    in_metadata: bool,
}

impl Reader {
    /// Route inline text to the innermost open construct.
    fn push_text(&mut self, s: &str) {
        if self.in_metadata {
            return;
        }
        if let Some(cell) = self.cell.as_mut() {
            cell.push_str(s);
        } else if let Some(item) = self.item_stack.last_mut() {
            item.push_str(s);
        } else if let Some((_, buf)) = self.heading.as_mut() {
            buf.push_str(s);
        } else if let Some(buf) = self.paragraph.as_mut() {
            buf.push_str(s);
        }
    }

    fn start(&mut self, tag: Tag) {
        match tag {
            Tag::MetadataBlock(_) => self.in_metadata = true,
            Tag::Heading { level, .. } => self.heading = Some((level_to_u8(level), String::new())),
            Tag::Paragraph => {
                // Paragraphs inside list items flow into the item text.
                if self.item_stack.is_empty() && self.cell.is_none() {
                    self.paragraph = Some(String::new());
                }
            }
            Tag::List(_) => self.list_depth += 1,
            Tag::Item => self.item_stack.push(String::new()),
            Tag::Table(_) => self.table_rows.clear(),
            Tag::TableHead | Tag::TableRow => self.table_row = Vec::new(),
            Tag::TableCell => self.cell = Some(String::new()),
            Tag::Strong => self.push_text("**"),
            Tag::Emphasis => self.push_text("*"),
            _ => {}
        }
    }

    fn end(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::MetadataBlock(_) => self.in_metadata = false,
            TagEnd::Heading(_) => {
                if let Some((level, text)) = self.heading.take() {
                    self.blocks.push(Block::Heading {
                        level,
                        text: text.trim().to_string(),
                    });
                }
            }
            TagEnd::Paragraph => {
                if let Some(text) = self.paragraph.take() {
                    self.blocks.push(Block::Paragraph {
                        text: text.trim().to_string(),
                    });
                }
            }
            TagEnd::Item => {
                if let Some(item) = self.item_stack.pop() {
                    let item = item.trim().to_string();
                    if let Some(parent) = self.item_stack.last_mut() {
                        parent.push('\n');
                        parent.push_str(&item);
                    } else {
                        self.list_items.push(item);
                    }
                }
            }
            TagEnd::List(_) => {
                self.list_depth = self.list_depth.saturating_sub(1);
                if self.list_depth == 0 {
                    self.blocks.push(Block::List {
                        items: std::mem::take(&mut self.list_items),
                    });
                }
            }
            TagEnd::TableCell => {
                if let Some(cell) = self.cell.take() {
                    self.table_row.push(cell.trim().to_string());
                }
            }
            TagEnd::TableHead | TagEnd::TableRow => {
                self.table_rows.push(std::mem::take(&mut self.table_row));
            }
            TagEnd::Table => {
                self.blocks.push(Block::Table {
                    rows: std::mem::take(&mut self.table_rows),
                });
            }
            TagEnd::Strong => self.push_text("**"),
            TagEnd::Emphasis => self.push_text("*"),
            _ => {}
        }
    }
}

/// Parse markdown text into an ordered block sequence. Never fails.
pub fn parse_markdown(text: &str) -> Vec<Block> {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_YAML_STYLE_METADATA_BLOCKS);

    let mut reader = Reader::default();
    for event in Parser::new_ext(text, options) {
        match event {
            Event::Start(tag) => reader.start(tag),
            Event::End(tag) => reader.end(tag),
            Event::Text(t) => reader.push_text(&t),
            Event::Code(c) => {
                reader.push_text("`");
                reader.push_text(&c);
                reader.push_text("`");
            }
            Event::SoftBreak | Event::HardBreak => reader.push_text("\n"),
            _ => {}
        }
    }
    reader.blocks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heading_levels() {
        let blocks = parse_markdown("# One\n\n## Two\n\n###### Six\n");
        assert_eq!(
            blocks,
            vec![
                Block::Heading {
                    level: 1,
                    text: "One".into()
                },
                Block::Heading {
                    level: 2,
                    text: "Two".into()
                },
                Block::Heading {
                    level: 6,
                    text: "Six".into()
                },
            ]
        );
    }

    #[test]
    fn test_bold_markers_survive_flattening() {
        let blocks = parse_markdown("**Status**: approved\n");
        assert_eq!(
            blocks,
            vec![Block::Paragraph {
                text: "**Status**: approved".into()
            }]
        );
    }

    #[test]
    fn test_code_spans_keep_backticks() {
        let blocks = parse_markdown("- `id` (UUID, PK): identifier\n");
        assert_eq!(
            blocks,
            vec![Block::List {
                items: vec!["`id` (UUID, PK): identifier".into()]
            }]
        );
    }

    #[test]
    fn test_nested_list_folds_into_parent_item() {
        let blocks = parse_markdown("- parent\n  - child one\n  - child two\n");
        match &blocks[0] {
            Block::List { items } => {
                assert_eq!(items.len(), 1);
                assert!(items[0].contains("parent"));
                assert!(items[0].contains("child one"));
                assert!(items[0].contains("child two"));
            }
            other => panic!("expected list, got {:?}", other),
        }
    }

    #[test]
    fn test_table_rows_and_cells() {
        let md = "| Name | Type | Notes |\n|------|------|-------|\n| id | UUID | PK |\n| name | TEXT | unique |\n";
        let blocks = parse_markdown(md);
        assert_eq!(
            blocks,
            vec![Block::Table {
                rows: vec![
                    vec!["Name".into(), "Type".into(), "Notes".into()],
                    vec!["id".into(), "UUID".into(), "PK".into()],
                    vec!["name".into(), "TEXT".into(), "unique".into()],
                ]
            }]
        );
    }

    #[test]
    fn test_front_matter_discarded() {
        let md = "---\ntitle: hidden\n---\n\n# Visible\n";
        let blocks = parse_markdown(md);
        assert_eq!(
            blocks,
            vec![Block::Heading {
                level: 1,
                text: "Visible".into()
            }]
        );
    }

    #[test]
    fn test_line_breaks_preserved_in_paragraphs() {
        let blocks = parse_markdown("**Status**: draft\n**Created**: 2025-01-01\n");
        assert_eq!(
            blocks,
            vec![Block::Paragraph {
                text: "**Status**: draft\n**Created**: 2025-01-01".into()
            }]
        );
    }

    #[test]
    fn test_malformed_input_never_panics() {
        for garbage in [
            "",
            "###",
            "| broken | table\n|---|\n| a |",
            "- [x",
            "**unclosed bold",
            "\u{0}\u{1}binary-ish",
        ] {
            let _ = parse_markdown(garbage);
        }
    }

    #[test]
    fn test_block_text_concatenates_descendants() {
        let blocks = parse_markdown("- alpha\n- beta\n");
        assert_eq!(blocks[0].text(), "alpha\nbeta");
    }
}

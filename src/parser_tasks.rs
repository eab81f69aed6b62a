//! Parser for a feature's `tasks.md`.
//!
//! Line-oriented rather than tree-based: checkbox syntax does not nest
//! reliably in a generic markdown tree, and we want exact source line
//! numbers. A line only becomes a task if it carries a `T###` identifier;
//! everything else is invisible, not an error.
//!
//! Task line shape: `- [ ] T001 [P] [US1] Description referencing \`path/to/file.rs\``

use std::sync::LazyLock;

use regex::Regex;

use crate::models::{ParsedTask, ParsedTasksFile, TaskStatus};

static TITLE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^#\s+(.+)$").unwrap());
static PHASE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^##\s+(Phase\s+\d+.*)$").unwrap());
static CHECKBOX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*-\s*\[([^\]]?)\]\s*").unwrap());
static TASK_ID_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\b(T\d{3})\b").unwrap());
static STORY_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\[(US\d+)\]").unwrap());
static BACKTICK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"`([^`]+)`").unwrap());
static SPACE_RUN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Parse tasks.md text into a [`ParsedTasksFile`]. Total — never fails.
pub fn parse_tasks(text: &str) -> ParsedTasksFile {
    let mut out = ParsedTasksFile::default();
    let mut phase_name: Option<String> = None;
    let mut phase_order: i64 = 0;

    for (idx, line) in text.lines().enumerate() {
        if out.title.is_none() {
            if let Some(captures) = TITLE_RE.captures(line) {
                out.title = Some(captures[1].trim().to_string());
                continue;
            }
        }
        if let Some(captures) = PHASE_RE.captures(line) {
            phase_name = Some(captures[1].trim().to_string());
            phase_order += 1;
            continue;
        }
        if let Some(task) = parse_task_line(line, idx as i64 + 1, &phase_name, phase_order) {
            out.tasks.push(task);
        }
    }

    out
}

fn parse_task_line(
    line: &str,
    line_number: i64,
    phase_name: &Option<String>,
    phase_order: i64,
) -> Option<ParsedTask> {
    let checkbox = CHECKBOX_RE.captures(line)?;
    let glyph = checkbox[1].to_string();

    // No T### token means the line is not a task at all.
    let task_id = TASK_ID_RE.captures(line)?[1].to_uppercase();

    let status = match glyph.as_str() {
        "x" | "X" => TaskStatus::Done,
        "/" => TaskStatus::InProgress,
        _ => TaskStatus::NotStarted,
    };

    let is_parallel = line.contains("[P]");
    let story_label = STORY_RE.captures(line).map(|c| c[1].to_uppercase());
    let file_path = BACKTICK_RE
        .captures_iter(line)
        .map(|c| c[1].to_string())
        .find(|token| token.contains('.'));

    let mut description = CHECKBOX_RE.replace(line, "").to_string();
    description = TASK_ID_RE.replace(&description, "").to_string();
    description = description.replace("[P]", "");
    description = STORY_RE.replace_all(&description, "").to_string();
    if let Some(path) = &file_path {
        description = description.replace(&format!("`{}`", path), "");
    }
    let description = SPACE_RUN_RE.replace_all(&description, " ").trim().to_string();

    Some(ParsedTask {
        task_id,
        description,
        status,
        phase_name: phase_name.clone(),
        phase_order,
        is_parallel,
        story_label,
        file_path,
        line_number,
    })
}

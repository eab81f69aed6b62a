//! Core data models used throughout spec-mirror.
//!
//! These types represent the parsed documents and persisted records that flow
//! through the parse and sync pipeline. Parser outputs are pure values — no
//! back-references to the markdown tree they came from.

use std::collections::BTreeMap;
use std::path::PathBuf;

/// Lifecycle status of a feature, read from the spec document's
/// `**Status**:` field. Unknown values fall back to `Draft`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeatureStatus {
    #[default]
    Draft,
    Approved,
    InProgress,
    Complete,
}

impl FeatureStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureStatus::Draft => "draft",
            FeatureStatus::Approved => "approved",
            FeatureStatus::InProgress => "in_progress",
            FeatureStatus::Complete => "complete",
        }
    }

    /// Permissive parse: accepts a few human spellings, defaults to `Draft`.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "approved" => FeatureStatus::Approved,
            "in progress" | "in_progress" | "in-progress" => FeatureStatus::InProgress,
            "complete" | "completed" | "done" => FeatureStatus::Complete,
            _ => FeatureStatus::Draft,
        }
    }
}

/// Status of a single checkbox task, derived from the bracket glyph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    NotStarted,
    InProgress,
    Done,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::NotStarted => "not_started",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Done => "done",
        }
    }
}

/// Relationship cardinality between two data-model entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    OneToOne,
    OneToMany,
    ManyToOne,
    ManyToMany,
}

impl Cardinality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Cardinality::OneToOne => "1:1",
            Cardinality::OneToMany => "1:N",
            Cardinality::ManyToOne => "N:1",
            Cardinality::ManyToMany => "N:N",
        }
    }
}

/// User story priority (`(Priority: P1)` heading suffix). Defaults to P2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoryPriority {
    P1,
    P2,
    P3,
}

impl StoryPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoryPriority::P1 => "P1",
            StoryPriority::P2 => "P2",
            StoryPriority::P3 => "P3",
        }
    }
}

// ============ Parser outputs ============

/// Result of parsing a feature's `spec.md`.
#[derive(Debug, Clone, Default)]
pub struct ParsedSpec {
    pub title: Option<String>,
    pub status: FeatureStatus,
    pub created: Option<String>,
    pub branch: Option<String>,
    pub priority: Option<String>,
    pub user_stories: Vec<ParsedUserStory>,
    pub requirements: Vec<ParsedRequirement>,
}

/// One user story under the spec document's user-scenarios section.
#[derive(Debug, Clone)]
pub struct ParsedUserStory {
    pub title: String,
    pub priority: StoryPriority,
    pub description: Option<String>,
    /// Acceptance-scenario bullets, verbatim.
    pub scenarios: Vec<String>,
}

/// One functional or non-functional requirement (`FR-001`, `NFR-002`).
#[derive(Debug, Clone)]
pub struct ParsedRequirement {
    pub req_id: String,
    pub description: String,
    pub priority: Option<String>,
}

/// Result of parsing a feature's `plan.md`.
#[derive(Debug, Clone, Default)]
pub struct ParsedPlan {
    pub summary: Option<String>,
    pub tech_stack: BTreeMap<String, String>,
    pub phases: Vec<ParsedPhase>,
    pub dependencies: Vec<String>,
    pub risks: Vec<ParsedRisk>,
}

/// One implementation phase from plan.md, in document order.
#[derive(Debug, Clone)]
pub struct ParsedPhase {
    pub name: String,
    /// 1-based position in the document.
    pub order: i64,
    pub goal: Option<String>,
    pub tasks: Vec<String>,
}

/// A risk/mitigation pair from the plan's risks section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRisk {
    pub risk: String,
    pub mitigation: String,
}

/// Result of parsing a feature's `tasks.md`.
#[derive(Debug, Clone, Default)]
pub struct ParsedTasksFile {
    pub title: Option<String>,
    pub tasks: Vec<ParsedTask>,
}

/// One checkbox task line. Lines without a `T###` id never become tasks.
#[derive(Debug, Clone)]
pub struct ParsedTask {
    pub task_id: String,
    pub description: String,
    pub status: TaskStatus,
    pub phase_name: Option<String>,
    /// 1-based order of the containing phase; 0 when no phase heading seen.
    pub phase_order: i64,
    pub is_parallel: bool,
    pub story_label: Option<String>,
    pub file_path: Option<String>,
    /// 1-based source line number.
    pub line_number: i64,
}

/// Result of parsing a feature's `data-model.md`.
#[derive(Debug, Clone, Default)]
pub struct ParsedDataModel {
    pub overview: Option<String>,
    pub entities: Vec<ParsedEntity>,
}

/// One data-model entity (a `###` subsection). Duplicate headings produce
/// duplicate entities — the ambiguity is preserved, not merged.
#[derive(Debug, Clone, Default)]
pub struct ParsedEntity {
    pub name: String,
    pub description: Option<String>,
    pub attributes: Vec<ParsedAttribute>,
    pub relationships: Vec<ParsedRelationship>,
    /// Unrecognized subsection labels seen under this entity (e.g.
    /// "lifecycle", "validation"), lower-cased with punctuation stripped.
    /// Recorded but not further parsed.
    pub subsection_tags: Vec<String>,
}

/// One attribute line or table row under an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAttribute {
    pub name: String,
    pub attr_type: Option<String>,
    pub constraints: Option<String>,
}

/// One relationship bullet under an entity.
#[derive(Debug, Clone)]
pub struct ParsedRelationship {
    pub target: String,
    pub cardinality: Cardinality,
    pub description: String,
}

/// One decision record from `research.md`.
#[derive(Debug, Clone, Default)]
pub struct ParsedResearchDecision {
    pub topic: String,
    pub decision: Option<String>,
    pub rationale: Option<String>,
    pub alternatives: Vec<String>,
}

// ============ Watcher events ============

/// Kind of filesystem change observed by the watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Add,
    Change,
    Unlink,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Add => "add",
            ChangeKind::Change => "change",
            ChangeKind::Unlink => "unlink",
        }
    }
}

/// Debounced, feature-scoped change notification. Transient — never persisted.
#[derive(Debug, Clone)]
pub struct FileChangeEvent {
    pub kind: ChangeKind,
    pub path: PathBuf,
    /// Feature number extracted from a `/specs/NNN-slug/` path segment.
    pub feature_number: Option<String>,
}

// ============ Persisted records ============

/// A feature as stored in SQLite. Identity is assigned by the store;
/// (project_id, feature_number) is the natural key.
#[derive(Debug, Clone)]
pub struct FeatureRecord {
    pub id: String,
    pub project_id: String,
    pub feature_number: String,
    pub feature_name: String,
    pub title: String,
    pub status: String,
    pub spec_path: String,
    pub priority: Option<String>,
    pub created_date: Option<String>,
    pub task_completion_pct: f64,
    pub checklist_count: i64,
    pub content_hash: String,
}

/// Per-feature record counts reported by `spm status`.
#[derive(Debug, Clone, Default)]
pub struct FeatureCounts {
    pub tasks: i64,
    pub done_tasks: i64,
    pub entities: i64,
    pub requirements: i64,
    pub user_stories: i64,
    pub research_decisions: i64,
    pub has_plan: bool,
}

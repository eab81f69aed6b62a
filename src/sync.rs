//! Feature sync orchestrator.
//!
//! Walks `<root>/specs`, parses each feature folder's documents, and
//! reconciles the results into the store: features are upserted by natural
//! key, child records are replaced wholesale, and a content hash over the
//! documents short-circuits features that have not changed since the last
//! sync. A failure in one feature never aborts the rest.

use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::models::{ParsedTasksFile, TaskStatus};
use crate::parser_data_model::parse_data_model;
use crate::parser_plan::parse_plan;
use crate::parser_research::parse_research;
use crate::parser_spec::parse_spec;
use crate::parser_tasks::parse_tasks;
use crate::store::{NewFeature, SpecStore};

static FEATURE_DIR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d+)-(.+)$").unwrap());

/// Outcome of one sync pass. `errors` holds per-feature failures; a non-empty
/// list does not mean the pass failed.
#[derive(Debug, Default)]
pub struct SyncReport {
    pub synced: usize,
    pub errors: Vec<String>,
}

/// Sync every feature folder under `<root>/specs` into the store.
///
/// Only project-level problems (missing specs directory, store setup) surface
/// as `Err`; anything scoped to one feature lands in [`SyncReport::errors`].
pub async fn sync_project(
    store: &dyn SpecStore,
    project_name: &str,
    root: &Path,
) -> Result<SyncReport> {
    let specs_dir = root.join("specs");
    if !specs_dir.is_dir() {
        anyhow::bail!("No specs directory at {}", specs_dir.display());
    }

    let project_id = store
        .upsert_project(project_name, &root.display().to_string())
        .await?;

    let mut folders: Vec<(String, String, std::path::PathBuf)> = Vec::new();
    for entry in std::fs::read_dir(&specs_dir)
        .with_context(|| format!("Failed to read {}", specs_dir.display()))?
    {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if let Some(caps) = FEATURE_DIR_RE.captures(&name) {
            folders.push((caps[1].to_string(), caps[2].to_string(), entry.path()));
        }
    }
    folders.sort();

    let mut report = SyncReport::default();
    for (number, slug, dir) in &folders {
        match sync_feature(store, &project_id, number, slug, dir).await {
            Ok(()) => report.synced += 1,
            Err(e) => report.errors.push(format!("{}-{}: {:#}", number, slug, e)),
        }
    }

    Ok(report)
}

fn read_optional(path: &Path) -> Result<Option<String>> {
    if !path.is_file() {
        return Ok(None);
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(Some(text))
}

fn content_hash(docs: &[Option<&str>], checklist_count: i64) -> String {
    let mut hasher = Sha256::new();
    for doc in docs {
        hasher.update(doc.unwrap_or("").as_bytes());
        // Separator so shifting text between files changes the hash.
        hasher.update([0u8]);
    }
    // The checklist count is persisted on the feature, so adding or removing
    // a checklist file must defeat the unchanged short-circuit too.
    hasher.update(checklist_count.to_be_bytes());
    hex_string(&hasher.finalize())
}

fn hex_string(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn completion_pct(tasks: &ParsedTasksFile) -> f64 {
    if tasks.tasks.is_empty() {
        return 0.0;
    }
    let done = tasks
        .tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Done)
        .count();
    done as f64 / tasks.tasks.len() as f64 * 100.0
}

fn count_checklists(feature_dir: &Path) -> i64 {
    let dir = feature_dir.join("checklists");
    if !dir.is_dir() {
        return 0;
    }
    WalkDir::new(&dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.file_type().is_file()
                && e.path().extension().is_some_and(|ext| ext == "md")
        })
        .count() as i64
}

async fn sync_feature(
    store: &dyn SpecStore,
    project_id: &str,
    feature_number: &str,
    feature_name: &str,
    dir: &Path,
) -> Result<()> {
    let spec_path = dir.join("spec.md");
    let spec_text = read_optional(&spec_path)?
        .with_context(|| format!("No spec.md in {}", dir.display()))?;
    let plan_text = read_optional(&dir.join("plan.md"))?;
    let tasks_text = read_optional(&dir.join("tasks.md"))?;
    let data_model_text = read_optional(&dir.join("data-model.md"))?;
    let research_text = read_optional(&dir.join("research.md"))?;

    let checklist_count = count_checklists(dir);
    let hash = content_hash(
        &[
            Some(&spec_text),
            plan_text.as_deref(),
            tasks_text.as_deref(),
            data_model_text.as_deref(),
            research_text.as_deref(),
        ],
        checklist_count,
    );
    if store.feature_hash(project_id, feature_number).await? == Some(hash.clone()) {
        return Ok(());
    }

    let spec = parse_spec(&spec_text);
    let tasks = tasks_text
        .as_deref()
        .map(parse_tasks)
        .unwrap_or_default();
    let data_model = data_model_text
        .as_deref()
        .map(parse_data_model)
        .unwrap_or_default();
    let research = research_text
        .as_deref()
        .map(parse_research)
        .unwrap_or_default();

    let feature_id = store
        .upsert_feature(&NewFeature {
            project_id: project_id.to_string(),
            feature_number: feature_number.to_string(),
            feature_name: feature_name.to_string(),
            title: spec.title.clone().unwrap_or_else(|| feature_name.to_string()),
            status: spec.status.as_str().to_string(),
            spec_path: spec_path.display().to_string(),
            priority: spec.priority.clone(),
            created_date: spec.created.clone(),
            task_completion_pct: completion_pct(&tasks),
            checklist_count,
            content_hash: hash,
        })
        .await?;

    store
        .replace_user_stories(&feature_id, &spec.user_stories)
        .await?;
    store
        .replace_requirements(&feature_id, &spec.requirements)
        .await?;
    store.replace_tasks(&feature_id, &tasks.tasks).await?;
    store
        .replace_entities(&feature_id, &data_model.entities)
        .await?;
    store.replace_research(&feature_id, &research).await?;

    if let Some(plan_text) = plan_text.as_deref() {
        let plan = parse_plan(plan_text);
        store.upsert_plan(&feature_id, &plan).await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::fs;
    use tempfile::TempDir;

    const SPEC: &str = "# Feature Specification: Login Flow\n\n\
        **Status**: In Progress\n**Created**: 2025-03-01\n\n\
        ## Requirements\n\n- FR-001: Users can log in\n- FR-002: Sessions expire\n";

    const TASKS: &str = "# Tasks\n\n## Phase 1: Setup\n\n\
        - [x] T001 Create schema\n- [ ] T002 Add login endpoint\n";

    fn scaffold_feature(root: &Path, folder: &str, spec: Option<&str>, tasks: Option<&str>) {
        let dir = root.join("specs").join(folder);
        fs::create_dir_all(&dir).unwrap();
        if let Some(spec) = spec {
            fs::write(dir.join("spec.md"), spec).unwrap();
        }
        if let Some(tasks) = tasks {
            fs::write(dir.join("tasks.md"), tasks).unwrap();
        }
    }

    #[tokio::test]
    async fn test_sync_one_feature() {
        let tmp = TempDir::new().unwrap();
        scaffold_feature(tmp.path(), "001-login", Some(SPEC), Some(TASKS));

        let store = MemoryStore::new();
        let report = sync_project(&store, "demo", tmp.path()).await.unwrap();
        assert_eq!(report.synced, 1);
        assert!(report.errors.is_empty());

        let project = store.upsert_project("demo", "x").await.unwrap();
        let feature = store
            .feature_by_number(&project, "001")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(feature.title, "Login Flow");
        assert_eq!(feature.status, "in_progress");
        assert_eq!(feature.task_completion_pct, 50.0);
        let counts = store.feature_counts(&feature.id).await.unwrap();
        assert_eq!(counts.tasks, 2);
        assert_eq!(counts.requirements, 2);
    }

    #[tokio::test]
    async fn test_missing_spec_md_is_per_feature_error() {
        let tmp = TempDir::new().unwrap();
        scaffold_feature(tmp.path(), "001-login", Some(SPEC), None);
        scaffold_feature(tmp.path(), "002-broken", None, Some(TASKS));

        let store = MemoryStore::new();
        let report = sync_project(&store, "demo", tmp.path()).await.unwrap();
        assert_eq!(report.synced, 1);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("002-broken"));
    }

    #[tokio::test]
    async fn test_non_feature_dirs_ignored() {
        let tmp = TempDir::new().unwrap();
        scaffold_feature(tmp.path(), "001-login", Some(SPEC), None);
        fs::create_dir_all(tmp.path().join("specs/notes")).unwrap();

        let store = MemoryStore::new();
        let report = sync_project(&store, "demo", tmp.path()).await.unwrap();
        assert_eq!(report.synced, 1);
        assert!(report.errors.is_empty());
    }

    #[tokio::test]
    async fn test_missing_specs_dir_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let store = MemoryStore::new();
        assert!(sync_project(&store, "demo", tmp.path()).await.is_err());
    }

    #[tokio::test]
    async fn test_resync_is_idempotent_and_removed_task_disappears() {
        let tmp = TempDir::new().unwrap();
        scaffold_feature(tmp.path(), "001-login", Some(SPEC), Some(TASKS));

        let store = MemoryStore::new();
        sync_project(&store, "demo", tmp.path()).await.unwrap();
        // Unchanged tree: still reported as synced, nothing rewritten.
        let report = sync_project(&store, "demo", tmp.path()).await.unwrap();
        assert_eq!(report.synced, 1);

        let project = store.upsert_project("demo", "x").await.unwrap();
        let feature = store
            .feature_by_number(&project, "001")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(store.task_count(&feature.id), 2);

        fs::write(
            tmp.path().join("specs/001-login/tasks.md"),
            "# Tasks\n\n- [x] T001 Create schema\n",
        )
        .unwrap();
        sync_project(&store, "demo", tmp.path()).await.unwrap();
        assert_eq!(store.task_count(&feature.id), 1);

        let feature = store
            .feature_by_number(&project, "001")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(feature.task_completion_pct, 100.0);
    }

    #[tokio::test]
    async fn test_no_tasks_means_zero_pct() {
        let tmp = TempDir::new().unwrap();
        scaffold_feature(tmp.path(), "001-login", Some(SPEC), None);

        let store = MemoryStore::new();
        sync_project(&store, "demo", tmp.path()).await.unwrap();
        let project = store.upsert_project("demo", "x").await.unwrap();
        let feature = store
            .feature_by_number(&project, "001")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(feature.task_completion_pct, 0.0);
    }

    #[tokio::test]
    async fn test_checklists_counted() {
        let tmp = TempDir::new().unwrap();
        scaffold_feature(tmp.path(), "001-login", Some(SPEC), None);
        let checklists = tmp.path().join("specs/001-login/checklists");
        fs::create_dir_all(&checklists).unwrap();
        fs::write(checklists.join("ux.md"), "- [ ] item\n").unwrap();
        fs::write(checklists.join("security.md"), "- [ ] item\n").unwrap();
        fs::write(checklists.join("notes.txt"), "not a checklist").unwrap();

        let store = MemoryStore::new();
        sync_project(&store, "demo", tmp.path()).await.unwrap();
        let project = store.upsert_project("demo", "x").await.unwrap();
        let feature = store
            .feature_by_number(&project, "001")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(feature.checklist_count, 2);
    }

    #[tokio::test]
    async fn test_added_checklist_defeats_unchanged_short_circuit() {
        let tmp = TempDir::new().unwrap();
        scaffold_feature(tmp.path(), "001-login", Some(SPEC), Some(TASKS));

        let store = MemoryStore::new();
        sync_project(&store, "demo", tmp.path()).await.unwrap();
        let project = store.upsert_project("demo", "x").await.unwrap();
        let feature = store
            .feature_by_number(&project, "001")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(feature.checklist_count, 0);

        // Documents untouched, but a new checklist file appears.
        let checklists = tmp.path().join("specs/001-login/checklists");
        fs::create_dir_all(&checklists).unwrap();
        fs::write(checklists.join("requirements.md"), "- [ ] item\n").unwrap();

        sync_project(&store, "demo", tmp.path()).await.unwrap();
        let feature = store
            .feature_by_number(&project, "001")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(feature.checklist_count, 1);

        // And removing it rolls the count back.
        fs::remove_file(checklists.join("requirements.md")).unwrap();
        sync_project(&store, "demo", tmp.path()).await.unwrap();
        let feature = store
            .feature_by_number(&project, "001")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(feature.checklist_count, 0);
    }
}

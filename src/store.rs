//! Persistence collaborator for the sync pipeline.
//!
//! [`SpecStore`] is the seam between the orchestrator and storage: natural-key
//! upserts for features and plans, and wholesale replace-children operations
//! for everything keyed under a feature (tasks, entities, requirements, user
//! stories, research decisions). A record removed from a document disappears
//! from the store on the next sync.
//!
//! Two implementations: [`SqliteStore`] for the real database and
//! [`MemoryStore`] for exercising the orchestrator without SQLite.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::models::{
    FeatureCounts, FeatureRecord, ParsedEntity, ParsedPlan, ParsedRequirement,
    ParsedResearchDecision, ParsedTask, ParsedUserStory,
};

/// Mutable fields of a feature, handed to [`SpecStore::upsert_feature`].
/// Identity is assigned by the store; (project_id, feature_number) is the
/// natural key.
#[derive(Debug, Clone)]
pub struct NewFeature {
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

/// One persisted task, as read back for status and analysis.
#[derive(Debug, Clone)]
pub struct TaskRow {
    pub task_id: String,
    pub description: String,
    pub status: String,
    pub phase_name: Option<String>,
    pub file_path: Option<String>,
}

/// One persisted requirement, as read back for analysis.
#[derive(Debug, Clone)]
pub struct RequirementRow {
    pub req_id: String,
    pub description: String,
}

/// Everything the analysis prompts need about one feature.
#[derive(Debug, Clone)]
pub struct FeatureDetail {
    pub feature: FeatureRecord,
    pub tasks: Vec<TaskRow>,
    pub requirements: Vec<RequirementRow>,
    pub story_titles: Vec<String>,
    pub entity_names: Vec<String>,
    pub plan_summary: Option<String>,
    pub phase_names: Vec<String>,
    pub research_topics: Vec<String>,
}

#[async_trait]
pub trait SpecStore: Send + Sync {
    /// Insert or update a project by name. Returns the project id.
    async fn upsert_project(&self, name: &str, root_path: &str) -> Result<String>;

    /// Insert or update a feature by (project, number). Returns the feature id.
    async fn upsert_feature(&self, feature: &NewFeature) -> Result<String>;

    /// Content hash recorded at the feature's last sync, if any.
    async fn feature_hash(&self, project_id: &str, feature_number: &str)
        -> Result<Option<String>>;

    /// Insert or update the feature's plan (at most one per feature).
    async fn upsert_plan(&self, feature_id: &str, plan: &ParsedPlan) -> Result<()>;

    async fn replace_tasks(&self, feature_id: &str, tasks: &[ParsedTask]) -> Result<()>;
    async fn replace_entities(&self, feature_id: &str, entities: &[ParsedEntity]) -> Result<()>;
    async fn replace_requirements(
        &self,
        feature_id: &str,
        requirements: &[ParsedRequirement],
    ) -> Result<()>;
    async fn replace_user_stories(
        &self,
        feature_id: &str,
        stories: &[ParsedUserStory],
    ) -> Result<()>;
    async fn replace_research(
        &self,
        feature_id: &str,
        decisions: &[ParsedResearchDecision],
    ) -> Result<()>;

    /// Persist one AI analysis result. Returns the analysis id.
    async fn record_analysis(
        &self,
        feature_id: &str,
        kind: &str,
        model: &str,
        content: &str,
    ) -> Result<String>;

    async fn list_features(&self, project_id: &str) -> Result<Vec<FeatureRecord>>;
    async fn feature_by_number(
        &self,
        project_id: &str,
        feature_number: &str,
    ) -> Result<Option<FeatureRecord>>;
    async fn feature_counts(&self, feature_id: &str) -> Result<FeatureCounts>;
    async fn feature_detail(&self, feature_id: &str) -> Result<Option<FeatureDetail>>;
}

// ============ JSON column encoding ============

fn attributes_json(entity: &ParsedEntity) -> String {
    let values: Vec<_> = entity
        .attributes
        .iter()
        .map(|a| {
            json!({
                "name": a.name,
                "type": a.attr_type,
                "constraints": a.constraints,
            })
        })
        .collect();
    serde_json::Value::Array(values).to_string()
}

fn relationships_json(entity: &ParsedEntity) -> String {
    let values: Vec<_> = entity
        .relationships
        .iter()
        .map(|r| {
            json!({
                "target": r.target,
                "cardinality": r.cardinality.as_str(),
                "description": r.description,
            })
        })
        .collect();
    serde_json::Value::Array(values).to_string()
}

fn phases_json(plan: &ParsedPlan) -> String {
    let values: Vec<_> = plan
        .phases
        .iter()
        .map(|p| {
            json!({
                "name": p.name,
                "order": p.order,
                "goal": p.goal,
                "tasks": p.tasks,
            })
        })
        .collect();
    serde_json::Value::Array(values).to_string()
}

fn risks_json(plan: &ParsedPlan) -> String {
    let values: Vec<_> = plan
        .risks
        .iter()
        .map(|r| json!({ "risk": r.risk, "mitigation": r.mitigation }))
        .collect();
    serde_json::Value::Array(values).to_string()
}

fn strings_json(strings: &[String]) -> String {
    serde_json::to_string(strings).unwrap_or_else(|_| "[]".to_string())
}

// ============ SQLite implementation ============

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn feature_from_row(row: &sqlx::sqlite::SqliteRow) -> FeatureRecord {
    FeatureRecord {
        id: row.get("id"),
        project_id: row.get("project_id"),
        feature_number: row.get("feature_number"),
        feature_name: row.get("feature_name"),
        title: row.get("title"),
        status: row.get("status"),
        spec_path: row.get("spec_path"),
        priority: row.get("priority"),
        created_date: row.get("created_date"),
        task_completion_pct: row.get("task_completion_pct"),
        checklist_count: row.get("checklist_count"),
        content_hash: row.get("content_hash"),
    }
}

#[async_trait]
impl SpecStore for SqliteStore {
    async fn upsert_project(&self, name: &str, root_path: &str) -> Result<String> {
        let existing: Option<String> =
            sqlx::query_scalar("SELECT id FROM projects WHERE name = ?")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;
        let id = existing.unwrap_or_else(|| Uuid::new_v4().to_string());

        sqlx::query(
            r#"
            INSERT INTO projects (id, name, root_path) VALUES (?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET root_path = excluded.root_path
            "#,
        )
        .bind(&id)
        .bind(name)
        .bind(root_path)
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    async fn upsert_feature(&self, feature: &NewFeature) -> Result<String> {
        let existing: Option<String> = sqlx::query_scalar(
            "SELECT id FROM features WHERE project_id = ? AND feature_number = ?",
        )
        .bind(&feature.project_id)
        .bind(&feature.feature_number)
        .fetch_optional(&self.pool)
        .await?;
        let id = existing.unwrap_or_else(|| Uuid::new_v4().to_string());
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO features (id, project_id, feature_number, feature_name, title, status,
                                  spec_path, priority, created_date, task_completion_pct,
                                  checklist_count, content_hash, synced_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(project_id, feature_number) DO UPDATE SET
                feature_name = excluded.feature_name,
                title = excluded.title,
                status = excluded.status,
                spec_path = excluded.spec_path,
                priority = excluded.priority,
                created_date = excluded.created_date,
                task_completion_pct = excluded.task_completion_pct,
                checklist_count = excluded.checklist_count,
                content_hash = excluded.content_hash,
                synced_at = excluded.synced_at
            "#,
        )
        .bind(&id)
        .bind(&feature.project_id)
        .bind(&feature.feature_number)
        .bind(&feature.feature_name)
        .bind(&feature.title)
        .bind(&feature.status)
        .bind(&feature.spec_path)
        .bind(&feature.priority)
        .bind(&feature.created_date)
        .bind(feature.task_completion_pct)
        .bind(feature.checklist_count)
        .bind(&feature.content_hash)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    async fn feature_hash(
        &self,
        project_id: &str,
        feature_number: &str,
    ) -> Result<Option<String>> {
        let hash: Option<String> = sqlx::query_scalar(
            "SELECT content_hash FROM features WHERE project_id = ? AND feature_number = ?",
        )
        .bind(project_id)
        .bind(feature_number)
        .fetch_optional(&self.pool)
        .await?;
        Ok(hash)
    }

    async fn upsert_plan(&self, feature_id: &str, plan: &ParsedPlan) -> Result<()> {
        let existing: Option<String> =
            sqlx::query_scalar("SELECT id FROM plans WHERE feature_id = ?")
                .bind(feature_id)
                .fetch_optional(&self.pool)
                .await?;
        let id = existing.unwrap_or_else(|| Uuid::new_v4().to_string());

        sqlx::query(
            r#"
            INSERT INTO plans (id, feature_id, summary, tech_stack_json, phases_json,
                               dependencies_json, risks_json)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(feature_id) DO UPDATE SET
                summary = excluded.summary,
                tech_stack_json = excluded.tech_stack_json,
                phases_json = excluded.phases_json,
                dependencies_json = excluded.dependencies_json,
                risks_json = excluded.risks_json
            "#,
        )
        .bind(&id)
        .bind(feature_id)
        .bind(&plan.summary)
        .bind(serde_json::to_string(&plan.tech_stack)?)
        .bind(phases_json(plan))
        .bind(strings_json(&plan.dependencies))
        .bind(risks_json(plan))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn replace_tasks(&self, feature_id: &str, tasks: &[ParsedTask]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM tasks WHERE feature_id = ?")
            .bind(feature_id)
            .execute(&mut *tx)
            .await?;

        for task in tasks {
            // A document repeating a task id keeps the last occurrence.
            sqlx::query(
                r#"
                INSERT INTO tasks (id, feature_id, task_id, description, status, phase_name,
                                   phase_order, is_parallel, story_label, file_path, line_number)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(feature_id, task_id) DO UPDATE SET
                    description = excluded.description,
                    status = excluded.status,
                    phase_name = excluded.phase_name,
                    phase_order = excluded.phase_order,
                    is_parallel = excluded.is_parallel,
                    story_label = excluded.story_label,
                    file_path = excluded.file_path,
                    line_number = excluded.line_number
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(feature_id)
            .bind(&task.task_id)
            .bind(&task.description)
            .bind(task.status.as_str())
            .bind(&task.phase_name)
            .bind(task.phase_order)
            .bind(task.is_parallel)
            .bind(&task.story_label)
            .bind(&task.file_path)
            .bind(task.line_number)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn replace_entities(&self, feature_id: &str, entities: &[ParsedEntity]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM entities WHERE feature_id = ?")
            .bind(feature_id)
            .execute(&mut *tx)
            .await?;

        for (position, entity) in entities.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO entities (id, feature_id, name, position, description,
                                      subsection_tags, attributes_json, relationships_json)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(feature_id)
            .bind(&entity.name)
            .bind(position as i64)
            .bind(&entity.description)
            .bind(strings_json(&entity.subsection_tags))
            .bind(attributes_json(entity))
            .bind(relationships_json(entity))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn replace_requirements(
        &self,
        feature_id: &str,
        requirements: &[ParsedRequirement],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM requirements WHERE feature_id = ?")
            .bind(feature_id)
            .execute(&mut *tx)
            .await?;

        for requirement in requirements {
            sqlx::query(
                r#"
                INSERT INTO requirements (id, feature_id, req_id, description, priority)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(feature_id, req_id) DO UPDATE SET
                    description = excluded.description,
                    priority = excluded.priority
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(feature_id)
            .bind(&requirement.req_id)
            .bind(&requirement.description)
            .bind(&requirement.priority)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn replace_user_stories(
        &self,
        feature_id: &str,
        stories: &[ParsedUserStory],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM user_stories WHERE feature_id = ?")
            .bind(feature_id)
            .execute(&mut *tx)
            .await?;

        for (position, story) in stories.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO user_stories (id, feature_id, position, title, priority,
                                          description, scenarios_json)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(feature_id)
            .bind(position as i64)
            .bind(&story.title)
            .bind(story.priority.as_str())
            .bind(&story.description)
            .bind(strings_json(&story.scenarios))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn replace_research(
        &self,
        feature_id: &str,
        decisions: &[ParsedResearchDecision],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM research_decisions WHERE feature_id = ?")
            .bind(feature_id)
            .execute(&mut *tx)
            .await?;

        for decision in decisions {
            sqlx::query(
                r#"
                INSERT INTO research_decisions (id, feature_id, topic, decision, rationale,
                                                alternatives_json)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(feature_id, topic) DO UPDATE SET
                    decision = excluded.decision,
                    rationale = excluded.rationale,
                    alternatives_json = excluded.alternatives_json
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(feature_id)
            .bind(&decision.topic)
            .bind(&decision.decision)
            .bind(&decision.rationale)
            .bind(strings_json(&decision.alternatives))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn record_analysis(
        &self,
        feature_id: &str,
        kind: &str,
        model: &str,
        content: &str,
    ) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        sqlx::query(
            r#"
            INSERT INTO analyses (id, feature_id, kind, model, content, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(feature_id)
        .bind(kind)
        .bind(model)
        .bind(content)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(id)
    }

    async fn list_features(&self, project_id: &str) -> Result<Vec<FeatureRecord>> {
        let rows = sqlx::query(
            "SELECT * FROM features WHERE project_id = ? ORDER BY feature_number",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(feature_from_row).collect())
    }

    async fn feature_by_number(
        &self,
        project_id: &str,
        feature_number: &str,
    ) -> Result<Option<FeatureRecord>> {
        let row = sqlx::query(
            "SELECT * FROM features WHERE project_id = ? AND feature_number = ?",
        )
        .bind(project_id)
        .bind(feature_number)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(feature_from_row))
    }

    async fn feature_counts(&self, feature_id: &str) -> Result<FeatureCounts> {
        let tasks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tasks WHERE feature_id = ?")
            .bind(feature_id)
            .fetch_one(&self.pool)
            .await?;
        let done_tasks: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM tasks WHERE feature_id = ? AND status = 'done'",
        )
        .bind(feature_id)
        .fetch_one(&self.pool)
        .await?;
        let entities: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM entities WHERE feature_id = ?")
                .bind(feature_id)
                .fetch_one(&self.pool)
                .await?;
        let requirements: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM requirements WHERE feature_id = ?")
                .bind(feature_id)
                .fetch_one(&self.pool)
                .await?;
        let user_stories: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM user_stories WHERE feature_id = ?")
                .bind(feature_id)
                .fetch_one(&self.pool)
                .await?;
        let research_decisions: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM research_decisions WHERE feature_id = ?")
                .bind(feature_id)
                .fetch_one(&self.pool)
                .await?;
        let plans: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM plans WHERE feature_id = ?")
            .bind(feature_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(FeatureCounts {
            tasks,
            done_tasks,
            entities,
            requirements,
            user_stories,
            research_decisions,
            has_plan: plans > 0,
        })
    }

    async fn feature_detail(&self, feature_id: &str) -> Result<Option<FeatureDetail>> {
        let row = sqlx::query("SELECT * FROM features WHERE id = ?")
            .bind(feature_id)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let feature = feature_from_row(&row);

        let tasks = sqlx::query(
            "SELECT task_id, description, status, phase_name, file_path FROM tasks \
             WHERE feature_id = ? ORDER BY phase_order, task_id",
        )
        .bind(feature_id)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(|r| TaskRow {
            task_id: r.get("task_id"),
            description: r.get("description"),
            status: r.get("status"),
            phase_name: r.get("phase_name"),
            file_path: r.get("file_path"),
        })
        .collect();

        let requirements = sqlx::query(
            "SELECT req_id, description FROM requirements WHERE feature_id = ? ORDER BY req_id",
        )
        .bind(feature_id)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(|r| RequirementRow {
            req_id: r.get("req_id"),
            description: r.get("description"),
        })
        .collect();

        let story_titles: Vec<String> = sqlx::query_scalar(
            "SELECT title FROM user_stories WHERE feature_id = ? ORDER BY position",
        )
        .bind(feature_id)
        .fetch_all(&self.pool)
        .await?;

        let entity_names: Vec<String> =
            sqlx::query_scalar("SELECT name FROM entities WHERE feature_id = ? ORDER BY position")
                .bind(feature_id)
                .fetch_all(&self.pool)
                .await?;

        let plan_row = sqlx::query("SELECT summary, phases_json FROM plans WHERE feature_id = ?")
            .bind(feature_id)
            .fetch_optional(&self.pool)
            .await?;
        let (plan_summary, phase_names) = match plan_row {
            Some(row) => {
                let summary: Option<String> = row.get("summary");
                let phases_json: String = row.get("phases_json");
                let names = serde_json::from_str::<serde_json::Value>(&phases_json)
                    .ok()
                    .and_then(|v| {
                        v.as_array().map(|phases| {
                            phases
                                .iter()
                                .filter_map(|p| p["name"].as_str().map(str::to_string))
                                .collect::<Vec<_>>()
                        })
                    })
                    .unwrap_or_default();
                (summary, names)
            }
            None => (None, Vec::new()),
        };

        let research_topics: Vec<String> = sqlx::query_scalar(
            "SELECT topic FROM research_decisions WHERE feature_id = ? ORDER BY topic",
        )
        .bind(feature_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(FeatureDetail {
            feature,
            tasks,
            requirements,
            story_titles,
            entity_names,
            plan_summary,
            phase_names,
            research_topics,
        }))
    }
}

// ============ In-memory implementation (test double) ============

#[derive(Default)]
struct MemoryInner {
    projects: BTreeMap<String, String>,
    features: BTreeMap<(String, String), FeatureRecord>,
    tasks: HashMap<String, Vec<ParsedTask>>,
    entities: HashMap<String, Vec<ParsedEntity>>,
    requirements: HashMap<String, Vec<ParsedRequirement>>,
    stories: HashMap<String, Vec<ParsedUserStory>>,
    research: HashMap<String, Vec<ParsedResearchDecision>>,
    plans: HashMap<String, ParsedPlan>,
    analyses: Vec<(String, String, String)>,
}

/// BTreeMap/HashMap-backed [`SpecStore`] for orchestrator tests.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn task_count(&self, feature_id: &str) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.tasks.get(feature_id).map_or(0, Vec::len)
    }

    pub fn analysis_count(&self) -> usize {
        self.inner.lock().unwrap().analyses.len()
    }
}

#[async_trait]
impl SpecStore for MemoryStore {
    async fn upsert_project(&self, name: &str, _root_path: &str) -> Result<String> {
        let mut inner = self.inner.lock().unwrap();
        let id = inner
            .projects
            .entry(name.to_string())
            .or_insert_with(|| Uuid::new_v4().to_string())
            .clone();
        Ok(id)
    }

    async fn upsert_feature(&self, feature: &NewFeature) -> Result<String> {
        let mut inner = self.inner.lock().unwrap();
        let key = (feature.project_id.clone(), feature.feature_number.clone());
        let id = inner
            .features
            .get(&key)
            .map(|f| f.id.clone())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        inner.features.insert(
            key,
            FeatureRecord {
                id: id.clone(),
                project_id: feature.project_id.clone(),
                feature_number: feature.feature_number.clone(),
                feature_name: feature.feature_name.clone(),
                title: feature.title.clone(),
                status: feature.status.clone(),
                spec_path: feature.spec_path.clone(),
                priority: feature.priority.clone(),
                created_date: feature.created_date.clone(),
                task_completion_pct: feature.task_completion_pct,
                checklist_count: feature.checklist_count,
                content_hash: feature.content_hash.clone(),
            },
        );
        Ok(id)
    }

    async fn feature_hash(
        &self,
        project_id: &str,
        feature_number: &str,
    ) -> Result<Option<String>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .features
            .get(&(project_id.to_string(), feature_number.to_string()))
            .map(|f| f.content_hash.clone()))
    }

    async fn upsert_plan(&self, feature_id: &str, plan: &ParsedPlan) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.plans.insert(feature_id.to_string(), plan.clone());
        Ok(())
    }

    async fn replace_tasks(&self, feature_id: &str, tasks: &[ParsedTask]) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.tasks.insert(feature_id.to_string(), tasks.to_vec());
        Ok(())
    }

    async fn replace_entities(&self, feature_id: &str, entities: &[ParsedEntity]) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .entities
            .insert(feature_id.to_string(), entities.to_vec());
        Ok(())
    }

    async fn replace_requirements(
        &self,
        feature_id: &str,
        requirements: &[ParsedRequirement],
    ) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .requirements
            .insert(feature_id.to_string(), requirements.to_vec());
        Ok(())
    }

    async fn replace_user_stories(
        &self,
        feature_id: &str,
        stories: &[ParsedUserStory],
    ) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .stories
            .insert(feature_id.to_string(), stories.to_vec());
        Ok(())
    }

    async fn replace_research(
        &self,
        feature_id: &str,
        decisions: &[ParsedResearchDecision],
    ) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .research
            .insert(feature_id.to_string(), decisions.to_vec());
        Ok(())
    }

    async fn record_analysis(
        &self,
        feature_id: &str,
        kind: &str,
        _model: &str,
        content: &str,
    ) -> Result<String> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .analyses
            .push((feature_id.to_string(), kind.to_string(), content.to_string()));
        Ok(Uuid::new_v4().to_string())
    }

    async fn list_features(&self, project_id: &str) -> Result<Vec<FeatureRecord>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .features
            .values()
            .filter(|f| f.project_id == project_id)
            .cloned()
            .collect())
    }

    async fn feature_by_number(
        &self,
        project_id: &str,
        feature_number: &str,
    ) -> Result<Option<FeatureRecord>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .features
            .get(&(project_id.to_string(), feature_number.to_string()))
            .cloned())
    }

    async fn feature_counts(&self, feature_id: &str) -> Result<FeatureCounts> {
        let inner = self.inner.lock().unwrap();
        let tasks = inner.tasks.get(feature_id).map_or(0, |t| t.len() as i64);
        let done_tasks = inner.tasks.get(feature_id).map_or(0, |t| {
            t.iter()
                .filter(|t| t.status == crate::models::TaskStatus::Done)
                .count() as i64
        });
        Ok(FeatureCounts {
            tasks,
            done_tasks,
            entities: inner.entities.get(feature_id).map_or(0, |e| e.len() as i64),
            requirements: inner
                .requirements
                .get(feature_id)
                .map_or(0, |r| r.len() as i64),
            user_stories: inner.stories.get(feature_id).map_or(0, |s| s.len() as i64),
            research_decisions: inner
                .research
                .get(feature_id)
                .map_or(0, |r| r.len() as i64),
            has_plan: inner.plans.contains_key(feature_id),
        })
    }

    async fn feature_detail(&self, feature_id: &str) -> Result<Option<FeatureDetail>> {
        let inner = self.inner.lock().unwrap();
        let Some(feature) = inner
            .features
            .values()
            .find(|f| f.id == feature_id)
            .cloned()
        else {
            return Ok(None);
        };

        let tasks = inner
            .tasks
            .get(feature_id)
            .map(|tasks| {
                tasks
                    .iter()
                    .map(|t| TaskRow {
                        task_id: t.task_id.clone(),
                        description: t.description.clone(),
                        status: t.status.as_str().to_string(),
                        phase_name: t.phase_name.clone(),
                        file_path: t.file_path.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        let requirements = inner
            .requirements
            .get(feature_id)
            .map(|reqs| {
                reqs.iter()
                    .map(|r| RequirementRow {
                        req_id: r.req_id.clone(),
                        description: r.description.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        let plan = inner.plans.get(feature_id);

        Ok(Some(FeatureDetail {
            feature,
            tasks,
            requirements,
            story_titles: inner
                .stories
                .get(feature_id)
                .map(|s| s.iter().map(|s| s.title.clone()).collect())
                .unwrap_or_default(),
            entity_names: inner
                .entities
                .get(feature_id)
                .map(|e| e.iter().map(|e| e.name.clone()).collect())
                .unwrap_or_default(),
            plan_summary: plan.and_then(|p| p.summary.clone()),
            phase_names: plan
                .map(|p| p.phases.iter().map(|ph| ph.name.clone()).collect())
                .unwrap_or_default(),
            research_topics: inner
                .research
                .get(feature_id)
                .map(|r| r.iter().map(|d| d.topic.clone()).collect())
                .unwrap_or_default(),
        }))
    }
}

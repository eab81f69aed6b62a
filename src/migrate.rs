use anyhow::Result;

use crate::config::Config;
use crate::db;

/// Create the schema. Idempotent — every statement is IF NOT EXISTS.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS projects (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            root_path TEXT NOT NULL,
            UNIQUE(name)
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS features (
            id TEXT PRIMARY KEY,
            project_id TEXT NOT NULL,
            feature_number TEXT NOT NULL,
            feature_name TEXT NOT NULL,
            title TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'draft',
            spec_path TEXT NOT NULL,
            priority TEXT,
            created_date TEXT,
            task_completion_pct REAL NOT NULL DEFAULT 0,
            checklist_count INTEGER NOT NULL DEFAULT 0,
            content_hash TEXT NOT NULL,
            synced_at INTEGER NOT NULL,
            UNIQUE(project_id, feature_number),
            FOREIGN KEY (project_id) REFERENCES projects(id)
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tasks (
            id TEXT PRIMARY KEY,
            feature_id TEXT NOT NULL,
            task_id TEXT NOT NULL,
            description TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'not_started',
            phase_name TEXT,
            phase_order INTEGER NOT NULL DEFAULT 0,
            is_parallel INTEGER NOT NULL DEFAULT 0,
            story_label TEXT,
            file_path TEXT,
            line_number INTEGER NOT NULL,
            UNIQUE(feature_id, task_id),
            FOREIGN KEY (feature_id) REFERENCES features(id)
        )
        "#,
    )
    .execute(&pool)
    .await?;

    // Duplicate entity headings stay distinct rows, so position (document
    // order) is part of the key rather than the entity name.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS entities (
            id TEXT PRIMARY KEY,
            feature_id TEXT NOT NULL,
            name TEXT NOT NULL,
            position INTEGER NOT NULL,
            description TEXT,
            subsection_tags TEXT NOT NULL DEFAULT '[]',
            attributes_json TEXT NOT NULL DEFAULT '[]',
            relationships_json TEXT NOT NULL DEFAULT '[]',
            UNIQUE(feature_id, position),
            FOREIGN KEY (feature_id) REFERENCES features(id)
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS plans (
            id TEXT PRIMARY KEY,
            feature_id TEXT NOT NULL,
            summary TEXT,
            tech_stack_json TEXT NOT NULL DEFAULT '{}',
            phases_json TEXT NOT NULL DEFAULT '[]',
            dependencies_json TEXT NOT NULL DEFAULT '[]',
            risks_json TEXT NOT NULL DEFAULT '[]',
            UNIQUE(feature_id),
            FOREIGN KEY (feature_id) REFERENCES features(id)
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS requirements (
            id TEXT PRIMARY KEY,
            feature_id TEXT NOT NULL,
            req_id TEXT NOT NULL,
            description TEXT NOT NULL,
            priority TEXT,
            UNIQUE(feature_id, req_id),
            FOREIGN KEY (feature_id) REFERENCES features(id)
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS user_stories (
            id TEXT PRIMARY KEY,
            feature_id TEXT NOT NULL,
            position INTEGER NOT NULL,
            title TEXT NOT NULL,
            priority TEXT NOT NULL DEFAULT 'P2',
            description TEXT,
            scenarios_json TEXT NOT NULL DEFAULT '[]',
            UNIQUE(feature_id, position),
            FOREIGN KEY (feature_id) REFERENCES features(id)
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS research_decisions (
            id TEXT PRIMARY KEY,
            feature_id TEXT NOT NULL,
            topic TEXT NOT NULL,
            decision TEXT,
            rationale TEXT,
            alternatives_json TEXT NOT NULL DEFAULT '[]',
            UNIQUE(feature_id, topic),
            FOREIGN KEY (feature_id) REFERENCES features(id)
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS analyses (
            id TEXT PRIMARY KEY,
            feature_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            model TEXT NOT NULL,
            content TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            FOREIGN KEY (feature_id) REFERENCES features(id)
        )
        "#,
    )
    .execute(&pool)
    .await?;

    // Indexes
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_features_project ON features(project_id)")
        .execute(&pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_tasks_feature ON tasks(feature_id)")
        .execute(&pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_entities_feature ON entities(feature_id)")
        .execute(&pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_analyses_feature ON analyses(feature_id)")
        .execute(&pool)
        .await?;

    pool.close().await;
    Ok(())
}

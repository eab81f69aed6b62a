//! Project status overview.
//!
//! Summarizes what the mirror currently holds: one line per feature with its
//! lifecycle status, task progress, and child-record counts. Used by
//! `spm status` to give confidence that syncs are keeping up with the tree.

use anyhow::Result;

use crate::config::Config;
use crate::db;
use crate::migrate;
use crate::store::{SpecStore, SqliteStore};

/// Run the status command: query the mirror and print a per-feature summary.
pub async fn run_status(config: &Config) -> Result<()> {
    migrate::run_migrations(config).await?;
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool);

    let project_id = store
        .upsert_project(&config.project.name, &config.project.root.display().to_string())
        .await?;
    let features = store.list_features(&project_id).await?;

    println!("spec-mirror — Project Status");
    println!("============================");
    println!();
    println!("  Project:  {}", config.project.name);
    println!("  Root:     {}", config.project.root.display());
    println!("  Features: {}", features.len());

    if features.is_empty() {
        println!();
        println!("  Nothing synced yet. Run `spm sync` first.");
        return Ok(());
    }

    println!();
    println!(
        "  {:<4} {:<28} {:<12} {:>8} {:>7} {:>6} {:>8} {:>9} {:>5}",
        "NUM", "TITLE", "STATUS", "TASKS", "DONE%", "REQS", "STORIES", "ENTITIES", "PLAN"
    );
    println!("  {}", "-".repeat(96));

    for feature in &features {
        let counts = store.feature_counts(&feature.id).await?;
        println!(
            "  {:<4} {:<28} {:<12} {:>8} {:>6.0}% {:>6} {:>8} {:>9} {:>5}",
            feature.feature_number,
            truncate(&feature.title, 28),
            feature.status,
            counts.tasks,
            feature.task_completion_pct,
            counts.requirements,
            counts.user_stories,
            counts.entities,
            if counts.has_plan { "yes" } else { "no" },
        );
    }

    println!();
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", cut)
    }
}

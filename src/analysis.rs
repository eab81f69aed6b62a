//! AI analysis of synced features.
//!
//! [`TextCompletion`] is the capability seam: callers receive a provider
//! value and never reach for ambient state. Providers are chosen from
//! configuration — `disabled` (always errors) or `openai` (OpenAI-compatible
//! chat completions).
//!
//! The OpenAI provider retries transient failures with exponential backoff:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//!
//! Prompts are built from persisted records only; the analyzer never re-reads
//! the markdown tree. Results land in the `analyses` table.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;

use crate::config::AnalysisConfig;
use crate::store::{FeatureDetail, SpecStore};

/// One analysis flavor. `Consistency` cross-checks tasks against plan phases
/// and requirements against user stories; `Gaps` looks for requirements no
/// task covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisKind {
    Summary,
    Consistency,
    Gaps,
}

impl AnalysisKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisKind::Summary => "summary",
            AnalysisKind::Consistency => "consistency",
            AnalysisKind::Gaps => "gaps",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "summary" => Ok(AnalysisKind::Summary),
            "consistency" => Ok(AnalysisKind::Consistency),
            "gaps" => Ok(AnalysisKind::Gaps),
            other => bail!("Unknown analysis kind: '{}'. Must be summary, consistency, or gaps.", other),
        }
    }
}

/// Capability to turn a prompt into completed text.
#[async_trait]
pub trait TextCompletion: Send + Sync {
    fn model_name(&self) -> &str;
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Create the provider the configuration names.
pub fn provider_from_config(config: &AnalysisConfig) -> Result<Box<dyn TextCompletion>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledCompletion)),
        "openai" => Ok(Box::new(OpenAICompletion::new(config)?)),
        other => bail!("Unknown analysis provider: '{}'", other),
    }
}

/// A no-op provider that always returns errors.
///
/// Used when `analysis.provider = "disabled"` in the configuration.
pub struct DisabledCompletion;

#[async_trait]
impl TextCompletion for DisabledCompletion {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn complete(&self, _prompt: &str) -> Result<String> {
        bail!("Analysis is disabled. Set analysis.provider = \"openai\" in the config.")
    }
}

/// Completion provider using an OpenAI-compatible chat API.
///
/// Calls `POST {base_url}/chat/completions` with the configured model.
/// Requires the `OPENAI_API_KEY` environment variable to be set.
pub struct OpenAICompletion {
    model: String,
    base_url: String,
    max_retries: u32,
    timeout_secs: u64,
}

impl OpenAICompletion {
    pub fn new(config: &AnalysisConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("analysis.model required for OpenAI provider"))?;

        if std::env::var("OPENAI_API_KEY").is_err() {
            bail!("OPENAI_API_KEY environment variable not set");
        }

        Ok(Self {
            model,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            max_retries: config.max_retries,
            timeout_secs: config.timeout_secs,
        })
    }
}

#[async_trait]
impl TextCompletion for OpenAICompletion {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY not set"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()?;

        let body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = client
                .post(format!("{}/chat/completions", self.base_url))
                .header("Authorization", format!("Bearer {}", api_key))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        return parse_completion_response(&json);
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err =
                            Some(anyhow::anyhow!("OpenAI API error {}: {}", status, body_text));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    bail!("OpenAI API error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Completion failed after retries")))
    }
}

fn parse_completion_response(json: &serde_json::Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("Invalid completion response: missing choices[0].message.content"))
}

/// Run one analysis over a feature's persisted records and store the result.
/// Returns the analysis text.
pub async fn analyze_feature(
    store: &dyn SpecStore,
    provider: &dyn TextCompletion,
    feature_id: &str,
    kind: AnalysisKind,
) -> Result<String> {
    let detail = store
        .feature_detail(feature_id)
        .await?
        .with_context(|| format!("No feature with id {}", feature_id))?;

    let prompt = build_prompt(kind, &detail);
    let content = provider.complete(&prompt).await?;
    store
        .record_analysis(feature_id, kind.as_str(), provider.model_name(), &content)
        .await?;
    Ok(content)
}

fn build_prompt(kind: AnalysisKind, detail: &FeatureDetail) -> String {
    let mut prompt = String::new();
    push_feature_context(&mut prompt, detail);

    match kind {
        AnalysisKind::Summary => {
            prompt.push_str(
                "\nSummarize this feature in a short paragraph: what it delivers, \
                 how far implementation has progressed, and what remains.\n",
            );
        }
        AnalysisKind::Consistency => {
            prompt.push_str(
                "\nCheck this feature for internal consistency. Do the tasks cover \
                 every plan phase? Does every requirement trace to at least one user \
                 story? List each mismatch you find, or state that none exist.\n",
            );
        }
        AnalysisKind::Gaps => {
            prompt.push_str(
                "\nList every requirement that no task appears to implement. For each, \
                 name the requirement id and say what kind of task is missing.\n",
            );
        }
    }

    prompt
}

fn push_feature_context(out: &mut String, detail: &FeatureDetail) {
    let feature = &detail.feature;
    out.push_str(&format!(
        "Feature {} \"{}\" (status: {}, {:.0}% of tasks done)\n",
        feature.feature_number, feature.title, feature.status, feature.task_completion_pct
    ));

    if let Some(summary) = &detail.plan_summary {
        out.push_str(&format!("\nPlan summary: {}\n", summary));
    }
    if !detail.phase_names.is_empty() {
        out.push_str("\nPlan phases:\n");
        for name in &detail.phase_names {
            out.push_str(&format!("- {}\n", name));
        }
    }
    if !detail.requirements.is_empty() {
        out.push_str("\nRequirements:\n");
        for req in &detail.requirements {
            out.push_str(&format!("- {}: {}\n", req.req_id, req.description));
        }
    }
    if !detail.story_titles.is_empty() {
        out.push_str("\nUser stories:\n");
        for title in &detail.story_titles {
            out.push_str(&format!("- {}\n", title));
        }
    }
    if !detail.tasks.is_empty() {
        out.push_str("\nTasks:\n");
        for task in &detail.tasks {
            out.push_str(&format!(
                "- {} [{}] {}\n",
                task.task_id, task.status, task.description
            ));
        }
    }
    if !detail.entity_names.is_empty() {
        out.push_str(&format!("\nData-model entities: {}\n", detail.entity_names.join(", ")));
    }
    if !detail.research_topics.is_empty() {
        out.push_str(&format!("\nResearch topics: {}\n", detail.research_topics.join(", ")));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ParsedRequirement, ParsedTask, TaskStatus};
    use crate::store::{MemoryStore, NewFeature};

    struct CannedCompletion;

    #[async_trait]
    impl TextCompletion for CannedCompletion {
        fn model_name(&self) -> &str {
            "canned"
        }
        async fn complete(&self, prompt: &str) -> Result<String> {
            Ok(format!("echo: {} chars", prompt.len()))
        }
    }

    async fn seeded_store() -> (MemoryStore, String) {
        let store = MemoryStore::new();
        let project = store.upsert_project("demo", "/tmp/demo").await.unwrap();
        let feature = store
            .upsert_feature(&NewFeature {
                project_id: project,
                feature_number: "001".into(),
                feature_name: "login".into(),
                title: "Login Flow".into(),
                status: "in_progress".into(),
                spec_path: "specs/001-login/spec.md".into(),
                priority: None,
                created_date: None,
                task_completion_pct: 50.0,
                checklist_count: 0,
                content_hash: "h".into(),
            })
            .await
            .unwrap();
        store
            .replace_requirements(
                &feature,
                &[ParsedRequirement {
                    req_id: "FR-001".into(),
                    description: "Users can log in".into(),
                    priority: None,
                }],
            )
            .await
            .unwrap();
        store
            .replace_tasks(
                &feature,
                &[ParsedTask {
                    task_id: "T001".into(),
                    description: "Create schema".into(),
                    status: TaskStatus::Done,
                    phase_name: None,
                    phase_order: 0,
                    is_parallel: false,
                    story_label: None,
                    file_path: None,
                    line_number: 1,
                }],
            )
            .await
            .unwrap();
        (store, feature)
    }

    #[tokio::test]
    async fn test_disabled_provider_errors() {
        let (store, feature) = seeded_store().await;
        let result = analyze_feature(&store, &DisabledCompletion, &feature, AnalysisKind::Summary).await;
        assert!(result.is_err());
        assert_eq!(store.analysis_count(), 0);
    }

    #[tokio::test]
    async fn test_analysis_persisted() {
        let (store, feature) = seeded_store().await;
        let text = analyze_feature(&store, &CannedCompletion, &feature, AnalysisKind::Gaps)
            .await
            .unwrap();
        assert!(text.starts_with("echo:"));
        assert_eq!(store.analysis_count(), 1);
    }

    #[tokio::test]
    async fn test_prompt_includes_records() {
        let (store, feature) = seeded_store().await;
        let detail = store.feature_detail(&feature).await.unwrap().unwrap();
        let prompt = build_prompt(AnalysisKind::Consistency, &detail);
        assert!(prompt.contains("Login Flow"));
        assert!(prompt.contains("FR-001"));
        assert!(prompt.contains("T001"));
        assert!(prompt.contains("consistency"));
    }

    #[test]
    fn test_kind_parse() {
        assert_eq!(AnalysisKind::parse("summary").unwrap(), AnalysisKind::Summary);
        assert_eq!(AnalysisKind::parse("GAPS").unwrap(), AnalysisKind::Gaps);
        assert!(AnalysisKind::parse("vibes").is_err());
    }

    #[test]
    fn test_parse_completion_response() {
        let json = serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": "fine" } }]
        });
        assert_eq!(parse_completion_response(&json).unwrap(), "fine");
        assert!(parse_completion_response(&serde_json::json!({})).is_err());
    }
}

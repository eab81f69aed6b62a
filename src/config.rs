use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub project: ProjectConfig,
    #[serde(default)]
    pub watcher: WatcherConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// The Spec-kit project being mirrored. `root` must contain a `specs/`
/// directory (and, for a valid project, a `.specify/` directory).
#[derive(Debug, Deserialize, Clone)]
pub struct ProjectConfig {
    pub name: String,
    pub root: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WatcherConfig {
    /// Quiet window per file path before a change event fires.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
        }
    }
}

fn default_debounce_ms() -> u64 {
    500
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnalysisConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            base_url: default_base_url(),
            max_retries: 5,
            timeout_secs: 60,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    60
}

impl AnalysisConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.project.name.trim().is_empty() {
        anyhow::bail!("project.name must not be empty");
    }

    if config.watcher.debounce_ms == 0 {
        anyhow::bail!("watcher.debounce_ms must be > 0");
    }

    if config.analysis.is_enabled() && config.analysis.model.is_none() {
        anyhow::bail!(
            "analysis.model must be specified when provider is '{}'",
            config.analysis.provider
        );
    }

    match config.analysis.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown analysis provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> (tempfile::TempDir, PathBuf) {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("spm.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        (tmp, path)
    }

    #[test]
    fn test_minimal_config_defaults() {
        let (_tmp, path) = write_config(
            r#"
[db]
path = "data/spm.sqlite"

[project]
name = "demo"
root = "/tmp/demo"
"#,
        );
        let config = load_config(&path).unwrap();
        assert_eq!(config.watcher.debounce_ms, 500);
        assert_eq!(config.analysis.provider, "disabled");
        assert!(!config.analysis.is_enabled());
    }

    #[test]
    fn test_enabled_analysis_requires_model() {
        let (_tmp, path) = write_config(
            r#"
[db]
path = "data/spm.sqlite"

[project]
name = "demo"
root = "/tmp/demo"

[analysis]
provider = "openai"
"#,
        );
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let (_tmp, path) = write_config(
            r#"
[db]
path = "data/spm.sqlite"

[project]
name = "demo"
root = "/tmp/demo"

[analysis]
provider = "ollama"
model = "llama3"
"#,
        );
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn test_zero_debounce_rejected() {
        let (_tmp, path) = write_config(
            r#"
[db]
path = "data/spm.sqlite"

[project]
name = "demo"
root = "/tmp/demo"

[watcher]
debounce_ms = 0
"#,
        );
        assert!(load_config(&path).is_err());
    }
}

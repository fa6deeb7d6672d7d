use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::batch::BatchLimits;
use crate::pipeline::{FallbackPolicy, PipelineOptions};

const DEFAULT_SETTINGS_TOML: &str = include_str!("../settings.toml");

#[derive(Debug, Clone)]
pub struct Settings {
    pub batch_size: usize,
    pub max_batch_chars: Option<usize>,
    pub max_concurrent_batches: usize,
    pub batch_timeout: Duration,
    pub document_timeout: Duration,
    pub fallback: FallbackPolicy,
    pub models: Vec<String>,
    pub temperature: Option<f32>,
    pub server_addr: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            batch_size: 120,
            max_batch_chars: None,
            max_concurrent_batches: 4,
            batch_timeout: Duration::from_secs(90),
            document_timeout: Duration::from_secs(600),
            fallback: FallbackPolicy::Document,
            models: vec!["openai:gpt-4o-mini".to_string(), "openai:gpt-4o".to_string()],
            temperature: Some(0.2),
            server_addr: "0.0.0.0:5000".to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    translator: Option<TranslatorSettings>,
    gateway: Option<GatewaySettings>,
    server: Option<ServerSettings>,
}

#[derive(Debug, Default, Deserialize)]
struct TranslatorSettings {
    batch_size: Option<usize>,
    max_batch_chars: Option<usize>,
    max_concurrent_batches: Option<usize>,
    batch_timeout_secs: Option<u64>,
    document_timeout_secs: Option<u64>,
    fallback: Option<FallbackPolicy>,
}

#[derive(Debug, Default, Deserialize)]
struct GatewaySettings {
    models: Option<Vec<String>>,
    temperature: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerSettings {
    addr: Option<String>,
}

/// Embedded defaults, then `settings.toml` and `settings.local.toml` in the
/// working directory, then the same pair under `~/.llm-html-translator`, then
/// `extra_path`. Later layers win key by key.
pub fn load_settings(extra_path: Option<&Path>) -> Result<Settings> {
    let mut settings = Settings::default();
    settings.merge(parse_settings(DEFAULT_SETTINGS_TOML, "embedded defaults")?);

    let mut ordered_paths = Vec::new();
    ordered_paths.push(PathBuf::from("settings.toml"));
    ordered_paths.push(PathBuf::from("settings.local.toml"));

    if let Some(home) = home_dir() {
        ordered_paths.push(home.join("settings.toml"));
        ordered_paths.push(home.join("settings.local.toml"));
    }

    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        ordered_paths.push(extra.to_path_buf());
    }

    for path in ordered_paths {
        if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("failed to read settings: {}", path.display()))?;
            let parsed = parse_settings(&content, &path.display().to_string())?;
            settings.merge(parsed);
        }
    }

    Ok(settings)
}

fn parse_settings(content: &str, origin: &str) -> Result<SettingsFile> {
    toml::from_str(content).with_context(|| format!("failed to parse settings: {}", origin))
}

impl Settings {
    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            limits: BatchLimits {
                max_items: self.batch_size,
                max_chars: self.max_batch_chars,
            },
            max_concurrent_batches: self.max_concurrent_batches,
            document_timeout: self.document_timeout,
            fallback: self.fallback,
        }
    }

    fn merge(&mut self, incoming: SettingsFile) {
        if let Some(translator) = incoming.translator {
            if let Some(size) = translator.batch_size
                && size > 0
            {
                self.batch_size = size;
            }
            if let Some(chars) = translator.max_batch_chars {
                self.max_batch_chars = (chars > 0).then_some(chars);
            }
            if let Some(limit) = translator.max_concurrent_batches
                && limit > 0
            {
                self.max_concurrent_batches = limit;
            }
            if let Some(secs) = translator.batch_timeout_secs
                && secs > 0
            {
                self.batch_timeout = Duration::from_secs(secs);
            }
            if let Some(secs) = translator.document_timeout_secs
                && secs > 0
            {
                self.document_timeout = Duration::from_secs(secs);
            }
            if let Some(fallback) = translator.fallback {
                self.fallback = fallback;
            }
        }
        if let Some(gateway) = incoming.gateway {
            if let Some(models) = gateway.models {
                let models = models
                    .into_iter()
                    .map(|model| model.trim().to_string())
                    .filter(|model| !model.is_empty())
                    .collect::<Vec<_>>();
                if !models.is_empty() {
                    self.models = models;
                }
            }
            if let Some(temperature) = gateway.temperature {
                self.temperature = (temperature >= 0.0).then_some(temperature);
            }
        }
        if let Some(server) = incoming.server
            && let Some(addr) = server.addr
            && !addr.trim().is_empty()
        {
            self.server_addr = addr;
        }
    }
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().and_then(|home| {
        let home = home.trim();
        if home.is_empty() {
            None
        } else {
            Some(Path::new(home).join(".llm-html-translator"))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_defaults_match_default_impl() {
        let mut settings = Settings::default();
        settings.merge(parse_settings(DEFAULT_SETTINGS_TOML, "embedded").unwrap());
        let defaults = Settings::default();
        assert_eq!(settings.batch_size, defaults.batch_size);
        assert_eq!(settings.max_batch_chars, None);
        assert_eq!(settings.batch_timeout, defaults.batch_timeout);
        assert_eq!(settings.fallback, FallbackPolicy::Document);
        assert_eq!(settings.models, defaults.models);
        assert_eq!(settings.server_addr, defaults.server_addr);
    }

    #[test]
    fn extra_file_overrides_selected_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        fs::write(
            &path,
            r#"
[translator]
batch_size = 7
max_batch_chars = 3000
fallback = "batch"

[gateway]
models = ["claude:claude-3-5-haiku-latest", "  "]
"#,
        )
        .unwrap();
        let settings = load_settings(Some(&path)).unwrap();
        assert_eq!(settings.batch_size, 7);
        assert_eq!(settings.max_batch_chars, Some(3000));
        assert_eq!(settings.fallback, FallbackPolicy::Batch);
        assert_eq!(settings.models, vec!["claude:claude-3-5-haiku-latest"]);
        assert_eq!(settings.max_concurrent_batches, 4);

        let options = settings.pipeline_options();
        assert_eq!(options.limits.max_items, 7);
        assert_eq!(options.limits.max_chars, Some(3000));
    }

    #[test]
    fn zero_values_are_ignored() {
        let mut settings = Settings::default();
        settings.merge(
            parse_settings(
                "[translator]\nbatch_size = 0\nmax_concurrent_batches = 0\n",
                "inline",
            )
            .unwrap(),
        );
        assert_eq!(settings.batch_size, 120);
        assert_eq!(settings.max_concurrent_batches, 4);
    }

    #[test]
    fn missing_extra_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_settings(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(err.to_string().contains("settings file not found"));
    }

    #[test]
    fn rejects_unknown_fallback_policy() {
        assert!(parse_settings("[translator]\nfallback = \"sometimes\"\n", "inline").is_err());
    }
}

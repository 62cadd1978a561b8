use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub merge: MergeConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// Thresholds handed to the proximity/similarity matcher.
#[derive(Debug, Deserialize, Clone)]
pub struct MatchingConfig {
    #[serde(default = "default_max_distance_m")]
    pub max_distance_m: f64,
    #[serde(default = "default_min_name_similarity")]
    pub min_name_similarity: f64,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            max_distance_m: default_max_distance_m(),
            min_name_similarity: default_min_name_similarity(),
            max_results: default_max_results(),
        }
    }
}

fn default_max_distance_m() -> f64 {
    150.0
}
fn default_min_name_similarity() -> f64 {
    0.55
}
fn default_max_results() -> usize {
    5000
}

/// Auto-merge batch settings.
#[derive(Debug, Deserialize, Clone)]
pub struct MergeConfig {
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
    #[serde(default = "default_max_merges")]
    pub max_merges: u64,
    #[serde(default = "default_max_images")]
    pub max_images: usize,
    #[serde(default = "default_actor")]
    pub actor: String,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            min_confidence: default_min_confidence(),
            max_merges: default_max_merges(),
            max_images: default_max_images(),
            actor: default_actor(),
        }
    }
}

fn default_min_confidence() -> f64 {
    85.0
}
fn default_max_merges() -> u64 {
    500
}
fn default_max_images() -> usize {
    20
}
fn default_actor() -> String {
    "auto-merge".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.matching.max_distance_m <= 0.0 {
        anyhow::bail!("matching.max_distance_m must be > 0");
    }

    if !(0.0..=1.0).contains(&config.matching.min_name_similarity) {
        anyhow::bail!("matching.min_name_similarity must be in [0.0, 1.0]");
    }

    if config.matching.max_results == 0 {
        anyhow::bail!("matching.max_results must be > 0");
    }

    if !(0.0..=100.0).contains(&config.merge.min_confidence) {
        anyhow::bail!("merge.min_confidence must be in [0.0, 100.0]");
    }

    if config.merge.max_images == 0 {
        anyhow::bail!("merge.max_images must be > 0");
    }

    if config.merge.actor.trim().is_empty() {
        anyhow::bail!("merge.actor must not be empty");
    }

    Ok(config)
}

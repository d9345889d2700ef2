//! Language configuration for submission execution

use std::collections::HashMap;
use std::sync::OnceLock;

use anyhow::Context;
use serde::Deserialize;
use tracing::warn;

/// Configuration for a supported submission language
#[derive(Debug, Clone)]
pub struct LanguageConfig {
    /// Canonical language name (table key)
    pub name: String,
    /// Run command template; the harness script is fed on stdin
    pub run_command: Vec<String>,
    /// Whether type annotations must be erased before execution
    pub erase_types: bool,
    /// Time limit multiplier and bonus: (multiplier, bonus_ms)
    /// actual_time = base_time * multiplier + bonus
    /// Example: (1, 250) gives the runtime 250ms to start up
    pub time_limit: Option<(u32, u32)>,
    /// Memory limit multiplier and bonus: (multiplier, bonus_mb)
    /// actual_memory = base_memory * multiplier + bonus
    pub memory_limit: Option<(u32, u32)>,
}

impl LanguageConfig {
    /// Calculate the wall-clock ceiling for a per-test timeout
    pub fn calculate_time_limit(&self, base_time_ms: u32) -> u32 {
        match self.time_limit {
            Some((multiplier, bonus_ms)) => base_time_ms
                .saturating_mul(multiplier)
                .saturating_add(bonus_ms),
            None => base_time_ms,
        }
    }

    /// Calculate actual memory limit based on base memory limit
    pub fn calculate_memory_limit(&self, base_memory_mb: u32) -> u32 {
        match self.memory_limit {
            Some((multiplier, bonus_mb)) => base_memory_mb
                .saturating_mul(multiplier)
                .saturating_add(bonus_mb),
            None => base_memory_mb,
        }
    }

    /// Run command with `{memory_mb}` substituted
    pub fn run_command_for(&self, memory_mb: u32) -> Vec<String> {
        let memory = memory_mb.to_string();
        self.run_command
            .iter()
            .map(|part| part.replace("{memory_mb}", &memory))
            .collect()
    }
}

/// Raw TOML configuration for a language
#[derive(Debug, Deserialize)]
struct RawLanguageConfig {
    run_command: String,
    #[serde(default)]
    erase_types: bool,
    #[serde(default)]
    time_limit: Vec<String>,
    #[serde(default)]
    memory_limit: Vec<String>,
    #[serde(default)]
    aliases: Vec<String>,
}

const EMBEDDED_LANGUAGES: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/files/languages.toml"));

/// Global language configurations
static LANGUAGES: OnceLock<HashMap<String, LanguageConfig>> = OnceLock::new();

/// Parse the language table from TOML content
fn parse_languages(content: &str) -> anyhow::Result<HashMap<String, LanguageConfig>> {
    let raw_configs: HashMap<String, RawLanguageConfig> =
        toml::from_str(content).context("Invalid language table")?;

    let mut languages = HashMap::new();

    for (name, raw) in raw_configs {
        let parse_limit =
            |raw_limit: Vec<String>, kind: &str| -> anyhow::Result<Option<(u32, u32)>> {
                if raw_limit.is_empty() {
                    return Ok(None);
                }
                if raw_limit.len() != 2 {
                    anyhow::bail!("Invalid {} limit for {}: {:?}", kind, name, raw_limit);
                }
                let multiplier = raw_limit[0].parse::<u32>().with_context(|| {
                    format!("Invalid {} multiplier for {}: {}", kind, name, raw_limit[0])
                })?;
                let offset = raw_limit[1].parse::<u32>().with_context(|| {
                    format!("Invalid {} offset for {}: {}", kind, name, raw_limit[1])
                })?;
                Ok(Some((multiplier, offset)))
            };

        let run_command = into_command(&raw.run_command);
        if run_command.is_empty() {
            anyhow::bail!("Empty run_command for {}", name);
        }

        let config = LanguageConfig {
            name: name.to_lowercase(),
            run_command,
            erase_types: raw.erase_types,
            time_limit: parse_limit(raw.time_limit, "time")?,
            memory_limit: parse_limit(raw.memory_limit, "memory")?,
        };

        // Add main language name
        languages.insert(name.to_lowercase(), config.clone());

        // Add aliases
        for alias in raw.aliases {
            languages.insert(alias.to_lowercase(), config.clone());
        }
    }

    Ok(languages)
}

/// Initialize language configurations from the embedded TOML table
pub fn init_languages() -> anyhow::Result<()> {
    let languages = parse_languages(EMBEDDED_LANGUAGES)?;

    LANGUAGES
        .set(languages)
        .map_err(|_| anyhow::anyhow!("Languages already initialized"))?;

    Ok(())
}

fn languages() -> &'static HashMap<String, LanguageConfig> {
    LANGUAGES.get_or_init(|| {
        parse_languages(EMBEDDED_LANGUAGES).unwrap_or_else(|e| {
            warn!("Failed to load embedded language table: {:#}", e);
            HashMap::new()
        })
    })
}

/// Get language configuration by language name or alias
pub fn get_language_config(language: &str) -> Option<LanguageConfig> {
    languages().get(&language.trim().to_lowercase()).cloned()
}

/// Get all supported language names and aliases
pub fn get_supported_languages() -> Vec<String> {
    let mut names: Vec<String> = languages().keys().cloned().collect();
    names.sort();
    names
}

fn into_command(command: &str) -> Vec<String> {
    command.split_whitespace().map(|s| s.to_string()).collect()
}

//! Daemon configuration.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context as _, Result};
use graph::{Rule, RuleSet, Settings};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub context: ContextConfig,
    #[serde(default, rename = "stream.rules")]
    pub stream_rules: Vec<RuleConfig>,
    #[serde(default, rename = "filter.rules")]
    pub filter_rules: Vec<RuleConfig>,
    #[serde(default)]
    pub web: WebConfig,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContextConfig {
    #[serde(default = "default_quantum", rename = "default.clock.quantum")]
    pub quantum: u64,
    #[serde(default = "default_rate", rename = "default.clock.rate")]
    pub rate: u32,
    #[serde(default = "default_true", rename = "mem.allow-mlock")]
    pub allow_mlock: bool,
    #[serde(default, rename = "mem.warn-mlock")]
    pub warn_mlock: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WebConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleConfig {
    #[serde(default)]
    pub matches: Vec<BTreeMap<String, String>>,
    #[serde(default, rename = "update-props")]
    pub update_props: BTreeMap<String, String>,
}

fn default_quantum() -> u64 {
    1024
}

fn default_rate() -> u32 {
    48000
}

fn default_true() -> bool {
    true
}

fn default_listen() -> String {
    String::from("127.0.0.1:3000")
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            quantum: default_quantum(),
            rate: default_rate(),
            allow_mlock: true,
            warn_mlock: false,
        }
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

impl Config {
    /// Load the configuration, falling back to defaults when the file does
    /// not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(?path, "No configuration file, using defaults");
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Reading {}", path.display()))?;

        serde_json::from_str(&contents).with_context(|| format!("Parsing {}", path.display()))
    }

    /// The engine settings of this configuration.
    pub fn settings(&self) -> Settings {
        Settings {
            quantum: self.context.quantum,
            rate: self.context.rate,
            allow_mlock: self.context.allow_mlock,
            warn_mlock: self.context.warn_mlock,
        }
    }

    /// The stream property rules.
    pub fn stream_rules(&self) -> RuleSet {
        to_rule_set(&self.stream_rules)
    }

    /// The filter property rules.
    pub fn filter_rules(&self) -> RuleSet {
        to_rule_set(&self.filter_rules)
    }
}

fn to_rule_set(rules: &[RuleConfig]) -> RuleSet {
    RuleSet {
        rules: rules
            .iter()
            .map(|r| Rule {
                matches: r
                    .matches
                    .iter()
                    .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
                    .collect(),
                update_props: r
                    .update_props
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_config() {
        let config: Config = serde_json::from_str(
            r#"{
                "context": {
                    "default.clock.quantum": 256,
                    "default.clock.rate": 44100
                },
                "stream.rules": [
                    {
                        "matches": [{ "media.class": "Audio*" }],
                        "update-props": { "node.pause-on-idle": "false" }
                    }
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(config.context.quantum, 256);
        assert_eq!(config.context.rate, 44100);
        assert_eq!(config.stream_rules.len(), 1);

        let rules = config.stream_rules();
        let mut props: runtime::Properties =
            [("media.class", "Audio/Source")].into_iter().collect();
        assert_eq!(rules.apply(&mut props), 1);
    }

    #[test]
    fn defaults_without_file() {
        let config = Config::load(Path::new("/nonexistent/flowmix.conf")).unwrap();
        assert_eq!(config.context.quantum, 1024);
        assert!(config.stream_rules.is_empty());
    }
}

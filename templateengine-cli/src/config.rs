use std::collections::BTreeMap;
use std::env;

use anyhow::{bail, Context, Error};
use clap::ArgMatches;
use serde::{Deserialize, Serialize};
use templateengine::{Environment, Value};

/// Holds in-memory config state for the execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Config {
    format: String,
    newline: bool,
    trim_blocks: bool,
    lstrip_blocks: bool,
    chunk_size: usize,
    defines: BTreeMap<String, serde_json::Value>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            format: "auto".to_string(),
            newline: true,
            trim_blocks: true,
            lstrip_blocks: true,
            chunk_size: 0,
            defines: Default::default(),
        }
    }
}

impl Config {
    pub fn update_from_matches(&mut self, matches: &ArgMatches) -> Result<(), Error> {
        if let Some(format) = matches.get_one::<String>("format") {
            self.format = format.clone();
        }
        if matches.get_flag("no-newline") {
            self.newline = false;
        }
        if matches.get_flag("no-trim-blocks") {
            self.trim_blocks = false;
        }
        if matches.get_flag("no-lstrip-blocks") {
            self.lstrip_blocks = false;
        }
        if let Some(chunk_size) = matches.get_one::<usize>("chunk-size") {
            self.chunk_size = *chunk_size;
        }
        self.add_defines_from_matches(matches)?;
        Ok(())
    }

    #[cfg(feature = "toml")]
    pub fn load_from_toml(p: &std::path::Path) -> Result<Config, Error> {
        let contents = std::fs::read_to_string(p)
            .with_context(|| format!("unable to read config file '{}'", p.display()))?;
        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("invalid config file '{}'", p.display()))?;
        Ok(cfg)
    }

    pub fn update_from_env(&mut self) -> Result<(), Error> {
        if let Ok(format) = env::var("TEMPLATEENGINE_FORMAT") {
            self.format = format;
        }
        if let Ok(newline) = env::var("TEMPLATEENGINE_NEWLINE") {
            self.newline = parse_env_bool(&newline, "TEMPLATEENGINE_NEWLINE")?;
        }
        if let Ok(trim_blocks) = env::var("TEMPLATEENGINE_TRIM_BLOCKS") {
            self.trim_blocks = parse_env_bool(&trim_blocks, "TEMPLATEENGINE_TRIM_BLOCKS")?;
        }
        if let Ok(lstrip_blocks) = env::var("TEMPLATEENGINE_LSTRIP_BLOCKS") {
            self.lstrip_blocks = parse_env_bool(&lstrip_blocks, "TEMPLATEENGINE_LSTRIP_BLOCKS")?;
        }
        if let Ok(chunk_size) = env::var("TEMPLATEENGINE_CHUNK_SIZE") {
            self.chunk_size = chunk_size.parse().with_context(|| {
                format!("Invalid chunk size for TEMPLATEENGINE_CHUNK_SIZE: {}", chunk_size)
            })?;
        }
        Ok(())
    }

    pub fn newline(&self) -> bool {
        self.newline
    }

    pub fn format(&self) -> &str {
        &self.format
    }

    pub fn chunk_size(&self) -> Option<usize> {
        Some(self.chunk_size).filter(|&x| x > 0)
    }

    pub fn defines(&self) -> Value {
        Value::from_serialize(&self.defines)
    }

    pub fn apply_to_env(&self, env: &mut Environment) {
        env.set_trim_blocks(self.trim_blocks);
        env.set_lstrip_blocks(self.lstrip_blocks);
    }

    fn add_defines_from_matches(&mut self, matches: &ArgMatches) -> Result<(), Error> {
        if let Some(items) = matches.get_many::<String>("define") {
            for item in items {
                if let Some((key, raw_value)) = item.split_once(":=") {
                    self.defines
                        .insert(key.to_string(), interpret_raw_value(raw_value)?);
                } else if let Some((key, string_value)) = item.split_once('=') {
                    self.defines
                        .insert(key.to_string(), string_value.into());
                } else {
                    self.defines.insert(item.to_string(), true.into());
                }
            }
        }
        Ok(())
    }
}

fn interpret_raw_value(s: &str) -> Result<serde_json::Value, Error> {
    serde_json::from_str(s).with_context(|| format!("invalid raw value '{}' (not valid JSON)", s))
}

fn parse_env_bool(s: &str, var_name: &str) -> Result<bool, Error> {
    match s.to_lowercase().as_str() {
        "0" | "false" | "no" | "off" => Ok(false),
        "1" | "true" | "yes" | "on" => Ok(true),
        _ => bail!("Invalid boolean value for {}: {}", var_name, s),
    }
}

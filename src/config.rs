use std::path::Path;

use anyhow::Result;
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::constants::DEFAULT_READ_BUFFER_KIB;

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SpecialAction {
    /// Copy the file verbatim into the destination.
    Copy,
    /// Hand the file to the external decoder.
    Decode,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SpecialTargetConfig {
    pub name: String,
    pub action: SpecialAction,
    /// Output file name inside the destination; defaults to `name`.
    #[serde(default)]
    pub output: Option<String>,
    /// Human readable name used in "couldn't extract" lines.
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub catalog_name: String,
    #[serde(default)]
    pub catalog_search_paths: Vec<String>,
    pub scan_extensions: Vec<String>,
    #[serde(default)]
    pub excluded_dir_suffixes: Vec<String>,
    #[serde(default = "default_read_buffer_kib")]
    pub read_buffer_kib: usize,
    #[serde(default)]
    pub special_targets: Vec<SpecialTargetConfig>,
    #[serde(default)]
    pub decoder_command: Vec<String>,
    #[serde(default)]
    pub write_manifest: bool,
    #[serde(default)]
    pub latest_link: Option<String>,
}

impl Config {
    pub fn read_buffer_bytes(&self) -> usize {
        self.read_buffer_kib.max(1).saturating_mul(1024)
    }
}

fn default_read_buffer_kib() -> usize {
    DEFAULT_READ_BUFFER_KIB
}

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: Config,
    pub config_hash: String,
}

pub fn load_config(path: Option<&Path>) -> Result<LoadedConfig> {
    let bytes: Vec<u8> = if let Some(p) = path {
        std::fs::read(p)?
    } else {
        include_bytes!("../config/default.yml").to_vec()
    };

    let mut config: Config = serde_yaml::from_slice(&bytes)?;
    for ext in &mut config.scan_extensions {
        *ext = ext.trim().trim_start_matches('.').to_ascii_lowercase();
    }
    config.scan_extensions.retain(|ext| !ext.is_empty());

    let config_hash = hash_bytes(&bytes);

    Ok(LoadedConfig { config, config_hash })
}

fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    hex::encode(digest)
}

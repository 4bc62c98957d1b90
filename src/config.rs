use std::path::{Path, PathBuf};

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::writer::Compression;

pub const DEFAULT_CONFIG_NAME: &str = "pcap_flatten";
pub const ENV_PREFIX: &str = "PCAP_FLATTEN";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EtlConfig {
    pub input_dir: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub pcap_dir: Option<PathBuf>,
    pub input_extension: String,
    pub num_threads: Option<usize>,
    pub compression: Compression,
    pub tshark_path: PathBuf,
    pub log_dir: Option<PathBuf>,
}

impl Default for EtlConfig {
    fn default() -> Self {
        Self {
            input_dir: None,
            output_dir: None,
            pcap_dir: None,
            input_extension: "json".to_string(),
            num_threads: None,
            compression: Compression::default(),
            tshark_path: PathBuf::from("tshark"),
            log_dir: None,
        }
    }
}

/// Defaults, then the config file, then `PCAP_FLATTEN_*` environment variables.
///
/// An explicit `path` must exist; otherwise `pcap_flatten.{toml,yaml,json}` in
/// the working directory is read when present.
pub fn load_config(path: Option<&Path>) -> Result<EtlConfig, ConfigError> {
    let file = match path {
        Some(path) => File::from(path).required(true),
        None => File::with_name(DEFAULT_CONFIG_NAME).required(false),
    };

    let cfg = Config::builder()
        .add_source(file)
        .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
        .build()?;
    cfg.try_deserialize()
}

//! Where the data server lives.
//!
//! The connection settings come from exactly one place, tried in order: an
//! explicit configuration object, the configuration map embedded in the
//! host's instrument description, or the plugin's YAML configuration file.
//! The file path can be overridden with `CDCI_OSA_PLUGIN_CONF_FILE`.
//!
//! The file is either flat:
//!
//! ```yaml
//! data_server_url: http://dataserver:8000
//! data_server_cache: /data/reduced/ddcache
//! dummy_cache: /data/dummy_prods
//! ```
//!
//! or keyed per instrument under `instruments:`.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::info;

use crate::error::{OsaError, Result};

pub const CONF_FILE_ENV_VAR: &str = "CDCI_OSA_PLUGIN_CONF_FILE";
/// The bundled configuration, relative to the package root.
pub const DEFAULT_CONF_FILE: &str = "config_dir/data_server_conf.yml";

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ConnectionConfig {
    #[serde(alias = "dataserver_url")]
    pub data_server_url: String,
    #[serde(alias = "dataserver_cache")]
    pub data_server_cache: String,
    #[serde(default)]
    pub dummy_cache: Option<PathBuf>,
}

impl ConnectionConfig {
    fn validated(self) -> Result<Self> {
        if self.data_server_url.trim().is_empty() {
            return Err(OsaError::ConfigProblem("data_server_url is empty".to_owned()));
        }

        if self.data_server_cache.trim().is_empty() {
            return Err(OsaError::ConfigProblem(
                "data_server_cache is empty".to_owned(),
            ));
        }

        Ok(self)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ConfigFile {
    PerInstrument {
        instruments: BTreeMap<String, ConnectionConfig>,
    },
    Flat(ConnectionConfig),
}

/// The candidate configuration sources for one dispatcher.
#[derive(Clone, Debug, Default)]
pub struct ConfigSources {
    pub explicit: Option<ConnectionConfig>,
    pub embedded: Option<Map<String, Value>>,
    pub file: Option<PathBuf>,
    pub instrument: Option<String>,
}

impl ConfigSources {
    /// Sources that fall back to the plugin's configuration file.
    pub fn for_instrument(instrument: &str) -> Self {
        ConfigSources {
            file: Some(plugin_conf_file()),
            instrument: Some(instrument.to_owned()),
            ..Default::default()
        }
    }

    pub fn explicit(config: ConnectionConfig) -> Self {
        ConfigSources {
            explicit: Some(config),
            ..Default::default()
        }
    }

    pub fn resolve(&self) -> Result<ConnectionConfig> {
        if let Some(c) = &self.explicit {
            return c.clone().validated();
        }

        if let Some(m) = &self.embedded {
            let c: ConnectionConfig = serde_json::from_value(Value::Object(m.clone()))
                .map_err(|e| {
                    OsaError::ConfigProblem(format!("bad instrument configuration: {}", e))
                })?;
            return c.validated();
        }

        if let Some(path) = &self.file {
            return load_config_file(path, self.instrument.as_deref());
        }

        Err(OsaError::ConfigProblem(
            "no data server configuration given".to_owned(),
        ))
    }
}

/// The configuration file path, honoring the environment override.
pub fn plugin_conf_file() -> PathBuf {
    std::env::var_os(CONF_FILE_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(default_conf_file)
}

/// The bundled configuration file, anchored at the package root rather than
/// the working directory.
pub fn default_conf_file() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join(DEFAULT_CONF_FILE)
}

pub fn load_config_file(path: &Path, instrument: Option<&str>) -> Result<ConnectionConfig> {
    info!("loading data server configuration from {}", path.display());

    let text = std::fs::read_to_string(path).map_err(|e| {
        OsaError::ConfigProblem(format!("cannot read {}: {}", path.display(), e))
    })?;

    let file: ConfigFile = serde_yaml::from_str(&text).map_err(|e| {
        OsaError::ConfigProblem(format!("cannot parse {}: {}", path.display(), e))
    })?;

    let config = match file {
        ConfigFile::Flat(c) => c,

        ConfigFile::PerInstrument { mut instruments } => {
            let name = instrument.ok_or_else(|| {
                OsaError::ConfigProblem(format!(
                    "{} is keyed per instrument but no instrument was given",
                    path.display()
                ))
            })?;

            instruments.remove(name).ok_or_else(|| {
                OsaError::ConfigProblem(format!(
                    "{} has no section for instrument `{}`",
                    path.display(),
                    name
                ))
            })?
        }
    };

    config.validated()
}

//! Loading service configuration (port, pagination limits, snapshot path) from TOML.
//!
//! See `BankConfig` for the expected schema. Every section is optional.

use std::path::PathBuf;

use serde::Deserialize;
use tracing::{error, info};

#[derive(Clone, Debug, Deserialize, Default, PartialEq)]
pub struct BankConfig {
  #[serde(default)]
  pub server: ServerCfg,
  #[serde(default)]
  pub pagination: PaginationCfg,
  #[serde(default)]
  pub storage: StorageCfg,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct ServerCfg {
  #[serde(default = "default_port")]
  pub port: u16,
}

impl Default for ServerCfg {
  fn default() -> Self {
    Self { port: default_port() }
  }
}

fn default_port() -> u16 { 3000 }

/// Page sizes for the exercise list. Assembly ignores `max_limit`.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct PaginationCfg {
  #[serde(default = "default_limit")]
  pub default_limit: usize,
  #[serde(default = "default_max_limit")]
  pub max_limit: usize,
}

impl Default for PaginationCfg {
  fn default() -> Self {
    Self { default_limit: default_limit(), max_limit: default_max_limit() }
  }
}

fn default_limit() -> usize { 10 }
fn default_max_limit() -> usize { 100 }

#[derive(Clone, Debug, Deserialize, Default, PartialEq)]
pub struct StorageCfg {
  /// JSON snapshot file. Absent = memory only.
  #[serde(default)]
  pub data_path: Option<PathBuf>,
}

impl BankConfig {
  /// Parse a TOML document.
  pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
    toml::from_str::<BankConfig>(s)
  }

  /// `PORT` and `BANK_DATA_PATH` take precedence over the file.
  pub fn apply_env_overrides(mut self) -> Self {
    if let Some(port) = std::env::var("PORT").ok().and_then(|p| p.parse::<u16>().ok()) {
      self.server.port = port;
    }
    if let Ok(path) = std::env::var("BANK_DATA_PATH") {
      if !path.is_empty() {
        self.storage.data_path = Some(PathBuf::from(path));
      }
    }
    self
  }
}

/// Load from BANK_CONFIG_PATH, then apply env overrides. On any IO/parse error
/// the failure is logged and defaults are used.
pub fn load_config_from_env() -> BankConfig {
  let base = match std::env::var("BANK_CONFIG_PATH") {
    Ok(path) => match std::fs::read_to_string(&path) {
      Ok(s) => match BankConfig::from_toml_str(&s) {
        Ok(cfg) => {
          info!(target: "exercise_bank", %path, "Loaded config (TOML)");
          cfg
        }
        Err(e) => {
          error!(target: "exercise_bank", %path, error = %e, "Failed to parse TOML config");
          BankConfig::default()
        }
      },
      Err(e) => {
        error!(target: "exercise_bank", %path, error = %e, "Failed to read TOML config file");
        BankConfig::default()
      }
    },
    Err(_) => BankConfig::default(),
  };
  base.apply_env_overrides()
}

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    time::Duration,
};

use ethers::types::Address;
use serde::Deserialize;

use crate::{
    contracts::MAINNET_WETH,
    error::{HarnessError, Result},
};

pub const DEFAULT_CONFIG_PATH: &str = "harness.json";

/// A named network the harness can run a command against.
///
/// Fields holding secrets may be written as `${VAR}` and are only resolved
/// from the environment when the profile is actually connected.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NetworkProfile {
    #[serde(skip)]
    pub name: String,
    #[serde(default)]
    pub chain_id: Option<u64>,
    pub rpc_url: String,
    #[serde(default)]
    pub fork_block_number: Option<u64>,
    #[serde(default)]
    pub fork: bool,
    #[serde(default)]
    pub accounts: Vec<String>,
    #[serde(default)]
    pub weth: Option<Address>,
}

impl NetworkProfile {
    /// Whether connecting should go through a local fork of `rpc_url`.
    pub fn is_fork(&self) -> bool {
        self.fork || self.fork_block_number.is_some()
    }

    pub fn rpc_url(&self) -> Result<String> {
        resolve_env(&self.rpc_url)
    }

    pub fn credentials(&self) -> Result<Vec<String>> {
        self.accounts.iter().map(|key| resolve_env(key)).collect()
    }

    pub fn weth_address(&self) -> Address {
        self.weth.unwrap_or(MAINNET_WETH)
    }
}

/// Expands a value of the exact form `${NAME}` from the environment.
pub fn resolve_env(value: &str) -> Result<String> {
    match value.strip_prefix("${").and_then(|v| v.strip_suffix('}')) {
        Some(var) => std::env::var(var).map_err(|_| HarnessError::MissingEnvVar(var.to_string())),
        None => Ok(value.to_string()),
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProfileRegistry {
    profiles: BTreeMap<String, NetworkProfile>,
    default: Option<String>,
}

impl ProfileRegistry {
    pub fn new(
        profiles: BTreeMap<String, NetworkProfile>,
        default: Option<String>,
    ) -> Result<Self> {
        let profiles: BTreeMap<_, _> = profiles
            .into_iter()
            .map(|(name, mut profile)| {
                profile.name = name.clone();
                (name, profile)
            })
            .collect();

        if let Some(default) = &default {
            if !profiles.contains_key(default) {
                return Err(HarnessError::InvalidConfig(format!(
                    "default network {default} is not defined"
                )));
            }
        }
        Ok(Self { profiles, default })
    }

    pub fn resolve_profile(&self, name: &str) -> Result<&NetworkProfile> {
        self.profiles
            .get(name)
            .ok_or_else(|| HarnessError::UnknownProfile(name.to_string()))
    }

    pub fn default_profile(&self) -> Result<&NetworkProfile> {
        let name = self.default.as_deref().ok_or(HarnessError::NoDefaultProfile)?;
        self.resolve_profile(name)
    }

    /// Resolves `name` if given, the default profile otherwise.
    pub fn select(&self, name: Option<&str>) -> Result<&NetworkProfile> {
        match name {
            Some(name) => self.resolve_profile(name),
            None => self.default_profile(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    default_network: Option<String>,
    #[serde(default = "default_exploit")]
    exploit: String,
    #[serde(default)]
    exploit_args: Vec<String>,
    #[serde(default = "default_artifacts")]
    artifacts: PathBuf,
    #[serde(default = "default_confirmation_timeout")]
    confirmation_timeout_secs: u64,
    #[serde(default = "default_anvil")]
    anvil: String,
    #[serde(default)]
    networks: BTreeMap<String, NetworkProfile>,
}

fn default_exploit() -> String {
    "Exploit".to_string()
}

fn default_artifacts() -> PathBuf {
    PathBuf::from("artifacts")
}

fn default_confirmation_timeout() -> u64 {
    120
}

fn default_anvil() -> String {
    "anvil".to_string()
}

/// Static configuration, built once at startup and passed down explicitly.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub profiles: ProfileRegistry,
    /// Interface deployed by the `deploy` command, with its constructor arguments.
    pub exploit: String,
    pub exploit_args: Vec<String>,
    pub artifacts: PathBuf,
    pub confirmation_timeout: Duration,
    /// Fork node executable.
    pub anvil: String,
}

impl HarnessConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let file: ConfigFile =
            serde_json::from_str(json).map_err(|e| HarnessError::InvalidConfig(e.to_string()))?;
        if file.confirmation_timeout_secs == 0 {
            return Err(HarnessError::InvalidConfig(
                "confirmationTimeoutSecs must be positive".to_string(),
            ));
        }

        Ok(Self {
            profiles: ProfileRegistry::new(file.networks, file.default_network)?,
            exploit: file.exploit,
            exploit_args: file.exploit_args,
            artifacts: file.artifacts,
            confirmation_timeout: Duration::from_secs(file.confirmation_timeout_secs),
            anvil: file.anvil,
        })
    }

    /// Loads the config file; a relative artifacts path is taken relative to it.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            HarnessError::InvalidConfig(format!("cannot read {}: {e}", path.display()))
        })?;
        let mut config = Self::from_json(&json)?;
        if config.artifacts.is_relative() {
            if let Some(dir) = path.parent() {
                config.artifacts = dir.join(&config.artifacts);
            }
        }
        log::debug!("loaded config from {}", path.display());
        Ok(config)
    }
}

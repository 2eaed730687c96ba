//! # Configuration
//!
//! Layered loading: built-in defaults, then an optional `vaultctl.toml` (or any format
//! the `config` crate recognises), then `WMP__` environment variables. Nested keys use
//! double underscores, so `WMP__KEYSTORE__SECRET` sets `keystore.secret`.

use config::{Config, Environment, File, Map};
use serde::Deserialize;
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use tracing::debug;
use wmp_vault::DEFAULT_CHUNK_SIZE;

pub const DEFAULT_CONFIG_FILE: &str = "vaultctl";
pub const ENV_PREFIX: &str = "WMP";

#[wmp_derive::wmp_error]
pub enum ConfigError {
    #[error("Config error{}: {source}", format_context(.context))]
    Config { source: config::ConfigError, context: Option<Cow<'static, str>> },

    #[error("Invalid configuration{}: {message}", format_context(.context))]
    Invalid { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct VaultctlConfig {
    pub vault: VaultSection,
    pub keystore: KeyStoreSection,
    pub log: LogSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VaultSection {
    pub root: PathBuf,
    pub chunk_size: usize,
    pub remove_source: bool,
}

impl Default for VaultSection {
    fn default() -> Self {
        Self { root: PathBuf::from("data/vault"), chunk_size: DEFAULT_CHUNK_SIZE, remove_source: false }
    }
}

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct KeyStoreSection {
    pub root: PathBuf,
    /// Host master secret; required.
    pub secret: Option<String>,
    pub salt: String,
}

impl Default for KeyStoreSection {
    fn default() -> Self {
        Self { root: PathBuf::from("data/keys"), secret: None, salt: "wmp-vault".to_owned() }
    }
}

impl std::fmt::Debug for KeyStoreSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyStoreSection")
            .field("root", &self.root)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("salt", &self.salt)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogSection {
    pub level: String,
    /// Rolling log directory; console only when unset.
    pub dir: Option<PathBuf>,
    pub json: bool,
}

impl Default for LogSection {
    fn default() -> Self {
        Self { level: "info".to_owned(), dir: None, json: false }
    }
}

impl VaultctlConfig {
    /// The master secret, rejecting a missing or blank value.
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] when `keystore.secret` is not set.
    pub fn secret(&self) -> Result<&str, ConfigError> {
        self.keystore.secret.as_deref().filter(|s| !s.trim().is_empty()).ok_or_else(|| {
            ConfigError::Invalid {
                message: "keystore.secret is required (set WMP__KEYSTORE__SECRET)".into(),
                context: None,
            }
        })
    }
}

/// Loads the configuration from the process environment.
///
/// An explicit `path` must exist; the default `vaultctl` file is optional.
///
/// # Errors
/// Returns [`ConfigError::Config`] if a source cannot be read or does not match
/// [`VaultctlConfig`].
pub fn load_config(path: Option<&Path>) -> Result<VaultctlConfig, ConfigError> {
    load_config_with_env(path, None)
}

/// Like [`load_config`], reading environment overrides from `env` instead of the
/// process environment when given.
pub fn load_config_with_env(
    path: Option<&Path>,
    env: Option<Map<String, String>>,
) -> Result<VaultctlConfig, ConfigError> {
    let (effective_path, required) =
        path.map_or_else(|| (PathBuf::from(DEFAULT_CONFIG_FILE), false), |p| (p.to_path_buf(), true));

    debug!(path = %effective_path.display(), required, "Loading config");

    let config = Config::builder()
        .add_source(File::from(effective_path.as_path()).required(required))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .source(env),
        )
        .build()
        .context("Failed to build config")?
        .try_deserialize::<VaultctlConfig>()
        .context("Failed to deserialize config")?;

    Ok(config)
}

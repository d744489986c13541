//! Loading of the operator configuration.
//!
//! Values come from a YAML file, then from `KUBECONVERGE_*` environment
//! variables, optionally seeded from a `.env` file.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{ConfigError, Error, Result};

use super::spec::OperatorConfig;

/// Prefix of the environment overrides.
pub const ENV_PREFIX: &str = "KUBECONVERGE_";

/// Default configuration file names to search for.
pub const DEFAULT_CONFIG_FILES: &[&str] = &["kubeconverge.yaml", "kubeconverge.yml"];

/// Parser for the operator configuration.
#[derive(Debug, Default)]
pub struct ConfigParser {
    /// Directory holding the `.env` file.
    base_path: Option<PathBuf>,
}

impl ConfigParser {
    /// Creates a new parser.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the directory holding the `.env` file.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<OperatorConfig> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        if !path.exists() {
            return Err(Error::Config(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(ConfigError::ParseError {
                message: format!("Failed to read file: {e}"),
                location: Some(path.display().to_string()),
            })
        })?;

        self.parse_yaml(&content, Some(path))
    }

    /// Parses configuration from a YAML string.
    ///
    /// An empty document yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<OperatorConfig> {
        debug!("Parsing YAML configuration");

        if content.trim().is_empty() {
            return Ok(OperatorConfig::default());
        }

        let config: OperatorConfig = serde_yaml::from_str(content).map_err(|e| {
            let location = match (source, e.location()) {
                (Some(p), Some(l)) => Some(format!("{}:{}:{}", p.display(), l.line(), l.column())),
                (Some(p), None) => Some(p.display().to_string()),
                (None, Some(l)) => Some(format!("{}:{}", l.line(), l.column())),
                (None, None) => None,
            };
            Error::Config(ConfigError::ParseError {
                message: format!("YAML parse error: {e}"),
                location,
            })
        })?;

        debug!("Parsed configuration for controller: {}", config.controller.name);
        Ok(config)
    }

    /// Loads configuration with `.env` and environment overrides applied.
    ///
    /// # Errors
    ///
    /// Returns an error if the file, the `.env` file or an override is
    /// invalid.
    pub fn load_with_env(&self, path: impl AsRef<Path>) -> Result<OperatorConfig> {
        self.load_dotenv()?;
        let mut config = self.load_file(path)?;
        Self::apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Applies `KUBECONVERGE_*` overrides read through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns a parse error naming the variable if a value is malformed.
    pub fn apply_env_overrides<F>(config: &mut OperatorConfig, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| {
            let name = format!("{ENV_PREFIX}{key}");
            lookup(&name).map(|value| (name, value))
        };

        if let Some((_, name)) = var("CONTROLLER_NAME") {
            debug!("Overriding controller.name from environment");
            config.controller.name = name;
        }

        if let Some((_, instance)) = var("CONTROLLER_INSTANCE") {
            debug!("Overriding controller.instance from environment");
            config.controller.instance = Some(instance);
        }

        if let Some((name, value)) = var("REQUEST_TIMEOUT_SECS") {
            debug!("Overriding controller.request_timeout_secs from environment");
            config.controller.request_timeout_secs = parse_env(&name, &value)?;
        }

        if let Some((name, value)) = var("PASS_TIMEOUT_SECS") {
            debug!("Overriding controller.pass_timeout_secs from environment");
            config.controller.pass_timeout_secs = Some(parse_env(&name, &value)?);
        }

        if let Some((name, value)) = var("LOG_VERBOSE") {
            config.logging.verbose = parse_env(&name, &value)?;
        }

        if let Some((name, value)) = var("LOG_JSON") {
            config.logging.json = parse_env(&name, &value)?;
        }

        Ok(())
    }

    /// Loads the `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the `.env` file exists but cannot be loaded.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = self
            .base_path
            .as_ref()
            .map_or_else(|| PathBuf::from(".env"), |p| p.join(".env"));

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| {
                Error::Config(ConfigError::ParseError {
                    message: format!("Failed to load .env file: {e}"),
                    location: Some(env_path.display().to_string()),
                })
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e| {
        Error::Config(ConfigError::ParseError {
            message: format!("invalid value {value:?}: {e}"),
            location: Some(name.to_string()),
        })
    })
}

/// Finds the configuration file in `start_dir` or its parents.
///
/// # Errors
///
/// Returns an error if no configuration file is found.
pub fn find_config_file(start_dir: impl AsRef<Path>) -> Result<PathBuf> {
    let start = start_dir.as_ref();
    let mut current = start.to_path_buf();

    loop {
        for filename in DEFAULT_CONFIG_FILES {
            let config_path = current.join(filename);
            if config_path.exists() {
                info!("Found configuration file: {}", config_path.display());
                return Ok(config_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    Err(Error::Config(ConfigError::FileNotFound {
        path: start.join(DEFAULT_CONFIG_FILES[0]),
    }))
}

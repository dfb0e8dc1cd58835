//! Agent and server configuration
//!
//! The agent document (name, prompt sections, languages) is loaded from TOML
//! or taken from the built-in default. Server settings come from the
//! environment with fixed defaults.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use thiserror::Error;
use tracing::warn;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_METRICS_PORT: u16 = 9090;
pub const DEFAULT_APP_VERSION: &str = "1.0.0";
pub const DEFAULT_AGENT_NAME: &str = "observable-agent";

/// Agent configuration document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentConfig {
    pub agent: AgentSection,
    #[serde(default)]
    pub prompt: Vec<PromptSection>,
    #[serde(default)]
    pub languages: Vec<Language>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentSection {
    /// Agent name (must match [a-zA-Z0-9._-]+)
    pub name: String,
}

/// One titled section of the agent's prompt
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PromptSection {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bullets: Vec<String>,
}

/// Spoken language and the voice used for it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Language {
    pub name: String,
    pub code: String,
    pub voice: String,
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Failed to render TOML: {0}")]
    TomlRender(#[from] toml::ser::Error),
    #[error("Invalid agent name format: {0}")]
    InvalidAgentName(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Invalid listen address: {0}")]
    InvalidAddress(String),
}

impl AgentConfig {
    /// Load and validate configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: AgentConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` when given, otherwise the built-in default
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_agent_name(&self.agent.name)?;

        if self.prompt.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "at least one prompt section is required".to_string(),
            ));
        }
        for section in &self.prompt {
            if section.title.trim().is_empty() {
                return Err(ConfigError::InvalidConfig(
                    "prompt section title must not be empty".to_string(),
                ));
            }
            let has_body = section.body.as_deref().is_some_and(|b| !b.trim().is_empty());
            if !has_body && section.bullets.is_empty() {
                return Err(ConfigError::InvalidConfig(format!(
                    "prompt section '{}' needs a body or bullets",
                    section.title
                )));
            }
        }
        for language in &self.languages {
            if language.code.trim().is_empty() {
                return Err(ConfigError::InvalidConfig(format!(
                    "language '{}' has no code",
                    language.name
                )));
            }
        }

        Ok(())
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            agent: AgentSection {
                name: DEFAULT_AGENT_NAME.to_string(),
            },
            prompt: vec![
                PromptSection {
                    title: "Role".to_string(),
                    body: Some("Customer service agent. Help with orders and support.".to_string()),
                    bullets: Vec::new(),
                },
                PromptSection {
                    title: "Guidelines".to_string(),
                    body: None,
                    bullets: vec![
                        "Be helpful and efficient".to_string(),
                        "Create tickets for complex issues".to_string(),
                        "Transfer to specialists when needed".to_string(),
                    ],
                },
            ],
            languages: vec![Language {
                name: "English".to_string(),
                code: "en-US".to_string(),
                voice: "rime.spore".to_string(),
            }],
        }
    }
}

fn validate_agent_name(name: &str) -> Result<(), ConfigError> {
    let valid_chars = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-');

    if name.is_empty() || !valid_chars {
        return Err(ConfigError::InvalidAgentName(format!(
            "Agent name '{name}' must match pattern [a-zA-Z0-9._-]+"
        )));
    }

    Ok(())
}

/// Listen addresses and process constants resolved from the environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub metrics_port: u16,
    pub version: String,
    pub metrics_enabled: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            metrics_port: DEFAULT_METRICS_PORT,
            version: DEFAULT_APP_VERSION.to_string(),
            metrics_enabled: true,
        }
    }
}

impl ServerConfig {
    /// Read `HOST`, `PORT`, `METRICS_PORT`, `APP_VERSION` and `METRICS_ENABLED`
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve settings through `lookup`; unparseable values keep their default
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let port = |key: &str, default: u16| match lookup(key) {
            None => default,
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                warn!(variable = key, value = %raw, "Invalid port, using default {}", default);
                default
            }),
        };

        let metrics_enabled = match lookup("METRICS_ENABLED") {
            None => defaults.metrics_enabled,
            Some(raw) => match raw.trim().to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => {
                    warn!(value = %raw, "Invalid METRICS_ENABLED, using default");
                    defaults.metrics_enabled
                }
            },
        };

        Self {
            host: lookup("HOST")
                .filter(|h| !h.trim().is_empty())
                .unwrap_or(defaults.host),
            port: port("PORT", defaults.port),
            metrics_port: port("METRICS_PORT", defaults.metrics_port),
            version: lookup("APP_VERSION").unwrap_or(defaults.version),
            metrics_enabled,
        }
    }

    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        Ok(SocketAddr::new(self.ip()?, self.port))
    }

    pub fn metrics_addr(&self) -> Result<SocketAddr, ConfigError> {
        Ok(SocketAddr::new(self.ip()?, self.metrics_port))
    }

    fn ip(&self) -> Result<IpAddr, ConfigError> {
        self.host
            .parse()
            .map_err(|_| ConfigError::InvalidAddress(self.host.clone()))
    }
}

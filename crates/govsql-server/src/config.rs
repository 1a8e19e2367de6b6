//! Configuration system for the GovSQL server
//!
//! Loads configuration from:
//! 1. config.yaml - operational settings (port, database, history, logging)
//! 2. .env file - secrets (API keys)
//!
//! Environment variables always override config.yaml values.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// Path to the DuckDB database file
    pub path: String,

    /// User name recorded on history records written by the workflow
    pub user: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: "data/govsql.duckdb".to_string(),
            user: "govsql".to_string(),
        }
    }
}

/// Language model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    /// Model used for relevance checks, translation, rewrites and info
    /// messages
    pub translation_model: String,

    /// Model used for result rendering
    pub rendering_model: String,

    /// Model used for question embeddings
    pub embedding_model: String,

    /// Optional OpenAI-compatible endpoint override
    #[serde(default)]
    pub api_base: Option<String>,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            translation_model: "gpt-4o-mini".to_string(),
            rendering_model: "gpt-4o-mini".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            api_base: None,
        }
    }
}

/// Similarity history configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistorySettings {
    /// Directory holding the persisted collections
    pub directory: String,

    /// Collection name
    pub collection: String,

    /// Hint threshold: prior questions within this distance are shown
    /// to the model as worked examples
    pub similarity_distance: f32,

    /// Near-duplicate threshold for the insert-vs-touch decision
    pub near_duplicate_epsilon: f32,
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            directory: "data/history".to_string(),
            collection: "questions_sql_history".to_string(),
            similarity_distance: 0.25,
            near_duplicate_epsilon: 1e-4,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) or module-specific
    pub level: String,

    /// Output format: pretty, json, compact
    pub format: String,

    /// Output destination: stdout, file, both
    pub output: String,

    /// Directory for log files
    pub directory: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            output: "stdout".to_string(),
            directory: "./logs".to_string(),
        }
    }
}

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseSettings,
    pub llm: LlmSettings,
    pub history: HistorySettings,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from YAML file with environment variable overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = serde_yaml::from_str(&contents)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load config.yaml when present, defaults otherwise; environment
    /// variables win either way.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            let mut config = Config::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("GOVSQL_SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("GOVSQL_SERVER_PORT") {
            if let Ok(port_num) = port.parse() {
                self.server.port = port_num;
            }
        }

        if let Ok(path) = std::env::var("GOVSQL_DATABASE_PATH") {
            self.database.path = path;
        }
        if let Ok(user) = std::env::var("GOVSQL_DATABASE_USER") {
            self.database.user = user;
        }

        if let Ok(model) = std::env::var("GOVSQL_TRANSLATION_MODEL") {
            self.llm.translation_model = model;
        }
        if let Ok(model) = std::env::var("GOVSQL_RENDERING_MODEL") {
            self.llm.rendering_model = model;
        }
        if let Ok(model) = std::env::var("GOVSQL_EMBEDDING_MODEL") {
            self.llm.embedding_model = model;
        }
        if let Ok(base) = std::env::var("GOVSQL_LLM_API_BASE") {
            self.llm.api_base = Some(base);
        }

        if let Ok(dir) = std::env::var("GOVSQL_HISTORY_DIR") {
            self.history.directory = dir;
        }
        if let Ok(distance) = std::env::var("GOVSQL_SIMILARITY_DISTANCE") {
            if let Ok(value) = distance.parse() {
                self.history.similarity_distance = value;
            }
        }

        if let Ok(level) = std::env::var("RUST_LOG") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("LOG_FORMAT") {
            self.logging.format = format;
        }
        if let Ok(output) = std::env::var("LOG_OUTPUT") {
            self.logging.output = output;
        }
        if let Ok(dir) = std::env::var("LOG_DIR") {
            self.logging.directory = dir;
        }
    }

    /// Get OpenAI API key from environment (must be in .env)
    pub fn openai_api_key() -> Result<String, ConfigError> {
        std::env::var("OPENAI_API_KEY")
            .map_err(|_| ConfigError::MissingEnvVar("OPENAI_API_KEY".to_string()))
    }

    /// Set logging environment variables for the logging module
    pub fn apply_logging_env(&self) {
        std::env::set_var("RUST_LOG", &self.logging.level);
        std::env::set_var("LOG_FORMAT", &self.logging.format);
        std::env::set_var("LOG_OUTPUT", &self.logging.output);
        std::env::set_var("LOG_DIR", &self.logging.directory);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.history.collection, "questions_sql_history");
        assert_eq!(config.history.near_duplicate_epsilon, 1e-4);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, "pretty");
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let config_yaml = r#"
server:
  host: "0.0.0.0"
  port: 9000
database:
  path: "data/demo.duckdb"
  user: "analyst"
"#;
        let temp_file = std::env::temp_dir().join("govsql_partial_config.yaml");
        std::fs::write(&temp_file, config_yaml).unwrap();

        let config = Config::load(&temp_file).unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.database.user, "analyst");
        // Sections absent from the file keep their defaults.
        assert_eq!(config.history.collection, "questions_sql_history");

        std::fs::remove_file(temp_file).ok();
    }

    #[test]
    fn test_env_var_override() {
        std::env::set_var("GOVSQL_SERVER_PORT", "9090");
        std::env::set_var("GOVSQL_DATABASE_PATH", "other.duckdb");

        let config_yaml = r#"
server:
  host: "127.0.0.1"
  port: 8080
database:
  path: "data/govsql.duckdb"
  user: "govsql"
"#;
        let temp_file = std::env::temp_dir().join("govsql_test_config.yaml");
        std::fs::write(&temp_file, config_yaml).unwrap();

        let config = Config::load(&temp_file).unwrap();
        assert_eq!(config.server.port, 9090); // Overridden
        assert_eq!(config.database.path, "other.duckdb"); // Overridden

        std::env::remove_var("GOVSQL_SERVER_PORT");
        std::env::remove_var("GOVSQL_DATABASE_PATH");
        std::fs::remove_file(temp_file).ok();
    }
}

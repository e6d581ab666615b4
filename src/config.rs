use serde::Deserialize;
use tracing::warn;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub listen: ListenConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub journal: JournalConfig,
    #[serde(default)]
    pub cors: CorsConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ListenConfig {
    #[serde(default = "default_listen_address")]
    pub address: String,
    #[serde(default = "default_listen_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    /// Serialized regression pipeline (JSON)
    #[serde(default = "default_model_path")]
    pub path: String,
    /// Score the reference profile once after loading
    #[serde(default = "default_true")]
    pub smoke_test: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct JournalConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Max journal entries before rotation
    #[serde(default = "default_journal_max")]
    pub max_entries: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct LogConfig {
    /// EnvFilter directive, used when RUST_LOG is unset
    pub level: Option<String>,
    #[serde(default)]
    pub json: bool,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            address: default_listen_address(),
            port: default_listen_port(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: default_model_path(),
            smoke_test: true,
        }
    }
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: default_journal_max(),
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

// Default value functions
fn default_true() -> bool { true }
fn default_listen_address() -> String { "0.0.0.0".to_string() }
fn default_listen_port() -> u16 { 5001 }
fn default_model_path() -> String { "./models/trust_pipeline_best.json".to_string() }
fn default_journal_max() -> usize { 1000 }

impl Config {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path, e))?;
        Self::parse(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config '{}': {}", path, e))
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Apply PORT / MODEL_PATH from the process environment
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(
            std::env::var("PORT").ok().as_deref(),
            std::env::var("MODEL_PATH").ok().as_deref(),
        );
    }

    fn apply_overrides(&mut self, port: Option<&str>, model_path: Option<&str>) {
        if let Some(port) = port {
            match port.trim().parse::<u16>() {
                Ok(p) => self.listen.port = p,
                Err(e) => warn!("Ignoring invalid PORT '{}': {}", port, e),
            }
        }
        if let Some(path) = model_path.filter(|p| !p.trim().is_empty()) {
            self.model.path = path.to_string();
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.listen.address, self.listen.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.listen.port, 5001);
        assert_eq!(config.listen.address, "0.0.0.0");
        assert_eq!(config.model.path, "./models/trust_pipeline_best.json");
        assert!(config.model.smoke_test);
        assert!(config.journal.enabled);
        assert_eq!(config.journal.max_entries, 1000);
        assert!(config.cors.enabled);
        assert!(!config.log.json);
        assert!(config.log.level.is_none());
    }

    #[test]
    fn test_partial_sections() {
        let config = Config::parse(
            r#"
            [listen]
            port = 8080

            [model]
            path = "/srv/models/trust.json"
            smoke_test = false

            [log]
            level = "trust_rater=debug"
            json = true
            "#,
        )
        .unwrap();
        assert_eq!(config.listen.port, 8080);
        assert_eq!(config.listen.address, "0.0.0.0");
        assert_eq!(config.model.path, "/srv/models/trust.json");
        assert!(!config.model.smoke_test);
        assert_eq!(config.log.level.as_deref(), Some("trust_rater=debug"));
        assert!(config.log.json);
        assert_eq!(config.bind_addr(), "0.0.0.0:8080");
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_overrides(Some("9000"), Some("/tmp/model.json"));
        assert_eq!(config.listen.port, 9000);
        assert_eq!(config.model.path, "/tmp/model.json");
    }

    #[test]
    fn test_invalid_port_override_is_ignored() {
        let mut config = Config::default();
        config.apply_overrides(Some("not-a-port"), Some("   "));
        assert_eq!(config.listen.port, 5001);
        assert_eq!(config.model.path, "./models/trust_pipeline_best.json");
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        assert!(Config::parse("[listen\nport = ").is_err());
    }
}

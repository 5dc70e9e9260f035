//! Process-wide configuration, loaded once at init and passed as an
//! injected dependency (see §9 "Global mutable state").

use serde::{Deserialize, Serialize};

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub request_timeout_secs: u64,
    pub shutdown_timeout_secs: u64,
    pub max_body_size_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: 30,
            shutdown_timeout_secs: 30,
            max_body_size_bytes: 2 * 1024 * 1024,
        }
    }
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.request_timeout_secs)
    }

    pub fn shutdown_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.shutdown_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub url: String,
    pub pool_min: u32,
    pub pool_max: u32,
    pub acquire_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            pool_min: 2,
            pool_max: 20,
            acquire_timeout_secs: 2,
            idle_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub host: String,
    pub port: u16,
    pub pool_size: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            pool_size: 16,
        }
    }
}

impl QueueConfig {
    pub fn url(&self) -> String {
        format!("redis://{}:{}", self.host, self.port)
    }
}

/// Parsed `ALLOWED_TARGET_HOSTS`. Empty means permit all.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TargetConfig {
    pub allowed_hosts: Vec<String>,
}

impl TargetConfig {
    pub fn from_env_value(raw: &str) -> Self {
        let allowed_hosts = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        Self { allowed_hosts }
    }

    /// Whether `host` is permitted. An entry `*.domain` matches `domain`
    /// itself and any subdomain of it. An empty allow-list permits all.
    pub fn permits(&self, host: &str) -> bool {
        if self.allowed_hosts.is_empty() {
            return true;
        }
        self.allowed_hosts.iter().any(|pattern| {
            if let Some(suffix) = pattern.strip_prefix("*.") {
                host == suffix || host.ends_with(&format!(".{suffix}"))
            } else {
                host == pattern
            }
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

impl CorsConfig {
    pub fn from_env_value(raw: &str) -> Self {
        let allowed_origins = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        Self { allowed_origins }
    }

    pub fn allow_any(&self) -> bool {
        self.allowed_origins.iter().any(|o| o == "*") || self.allowed_origins.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
    pub verbose: bool,
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Pretty,
            verbose: true,
            filter: "info".to_string(),
        }
    }
}

impl LoggingConfig {
    /// Derives the logging posture from `NODE_ENV`: `production` gets
    /// compact JSON logs and suppressed verbose detail; anything else gets
    /// pretty, verbose logs (per §6/§7).
    pub fn from_node_env(node_env: &str) -> Self {
        if node_env == "production" {
            Self {
                format: LogFormat::Json,
                verbose: false,
                filter: "info".to_string(),
            }
        } else {
            Self {
                format: LogFormat::Pretty,
                verbose: true,
                filter: "debug".to_string(),
            }
        }
    }
}

/// Worker delivery tuning: not environment-configurable per §6, but kept as
/// a typed struct (rather than scattered literals) so the constants from
/// §4.3/§4.4 live in one place.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    pub concurrency: usize,
    pub http_timeout_secs: u64,
    pub max_redirects: usize,
    pub max_attempts: u32,
    pub initial_backoff_secs: u64,
    pub backoff_factor: u64,
    pub max_backoff_secs: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            http_timeout_secs: 30,
            max_redirects: 5,
            max_attempts: 3,
            initial_backoff_secs: 1,
            backoff_factor: 2,
            max_backoff_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub queue: QueueConfig,
    pub target: TargetConfig,
    pub cors: CorsConfig,
    pub logging: LoggingConfig,
    pub delivery: DeliveryConfig,
    pub node_env: String,
}

impl AppConfig {
    /// Layers configuration: compiled-in defaults, then an optional TOML
    /// file, then the environment variables named in §6, which always
    /// take precedence.
    pub fn load() -> Result<Self, config::ConfigError> {
        let mut cfg = AppConfig::default();

        let builder = config::Config::builder()
            .add_source(config::File::with_name("config/scheduler").required(false))
            .build()?;
        if let Ok(file_cfg) = builder.try_deserialize::<AppConfig>() {
            cfg = file_cfg;
        }

        if let Ok(url) = std::env::var("POSTGRES_URL") {
            cfg.store.url = url;
        }
        if let Ok(host) = std::env::var("REDIS_HOST") {
            cfg.queue.host = host;
        }
        if let Ok(port) = std::env::var("REDIS_PORT") {
            if let Ok(port) = port.parse() {
                cfg.queue.port = port;
            }
        }
        if let Ok(port) = std::env::var("PORT") {
            if let Ok(port) = port.parse() {
                cfg.server.port = port;
            }
        }
        if let Ok(origins) = std::env::var("ALLOWED_ORIGINS") {
            cfg.cors = CorsConfig::from_env_value(&origins);
        }
        if let Ok(hosts) = std::env::var("ALLOWED_TARGET_HOSTS") {
            cfg.target = TargetConfig::from_env_value(&hosts);
        }
        if let Ok(node_env) = std::env::var("NODE_ENV") {
            cfg.logging = LoggingConfig::from_node_env(&node_env);
            cfg.node_env = node_env;
        } else {
            cfg.node_env = "development".to_string();
        }

        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_allow_list_empty_permits_all() {
        let target = TargetConfig::default();
        assert!(target.permits("anything.example.com"));
    }

    #[test]
    fn target_allow_list_wildcard_matches_subdomains() {
        let target = TargetConfig::from_env_value("*.example.com");
        assert!(target.permits("example.com"));
        assert!(target.permits("api.example.com"));
        assert!(!target.permits("example.org"));
    }

    #[test]
    fn target_allow_list_exact_match() {
        let target = TargetConfig::from_env_value("hooks.example.com");
        assert!(target.permits("hooks.example.com"));
        assert!(!target.permits("other.example.com"));
    }

    #[test]
    fn logging_config_from_production_env() {
        let cfg = LoggingConfig::from_node_env("production");
        assert_eq!(cfg.format, LogFormat::Json);
        assert!(!cfg.verbose);
    }
}

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub manager: ManagerConfig,
    pub shard: ShardConfig,
    pub ingress: IngressConfig,
    pub executor: ExecutorConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Base URL of the manager, e.g. `http://manager:8080`
    pub base_url: String,
    /// Transport timeout for a single manager request
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardConfig {
    /// Interval between two polls of the manager
    pub poll_interval_ms: u64,
    /// Upper bound on entities processed concurrently in one poll cycle
    pub max_concurrent_syncs: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngressConfig {
    /// Container image recorded on every provisioned ingress resource
    pub image: String,
    /// Prefix of the per-tenant namespace
    pub namespace_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Timeout of a single webhook delivery
    pub webhook_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address of the event ingress HTTP server
    pub listen: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            manager: ManagerConfig {
                base_url: "http://localhost:8080".to_string(),
                request_timeout_ms: 10_000,
            },
            shard: ShardConfig {
                poll_interval_ms: 5_000,
                max_concurrent_syncs: 8,
            },
            ingress: IngressConfig {
                image: "eventbridge/ingress:latest".to_string(),
                namespace_prefix: "ob-".to_string(),
            },
            executor: ExecutorConfig {
                webhook_timeout_ms: 5_000,
            },
            server: ServerConfig {
                listen: "0.0.0.0:8081".to_string(),
            },
        }
    }
}

impl Config {
    pub fn from_file(path: &str) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn validate(&self) -> crate::Result<()> {
        if !self.manager.base_url.starts_with("http://") {
            return Err(crate::error::BridgeError::InvalidConfig(
                "manager.base_url must be an http:// URL".to_string(),
            ));
        }

        if self.manager.request_timeout_ms == 0 {
            return Err(crate::error::BridgeError::InvalidConfig(
                "manager.request_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.shard.poll_interval_ms == 0 {
            return Err(crate::error::BridgeError::InvalidConfig(
                "shard.poll_interval_ms must be greater than 0".to_string(),
            ));
        }

        if self.shard.max_concurrent_syncs == 0 {
            return Err(crate::error::BridgeError::InvalidConfig(
                "shard.max_concurrent_syncs must be greater than 0".to_string(),
            ));
        }

        if self.ingress.image.is_empty() {
            return Err(crate::error::BridgeError::InvalidConfig(
                "ingress.image cannot be empty".to_string(),
            ));
        }

        if self.executor.webhook_timeout_ms == 0 {
            return Err(crate::error::BridgeError::InvalidConfig(
                "executor.webhook_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.server.listen.parse::<std::net::SocketAddr>().is_err() {
            return Err(crate::error::BridgeError::InvalidConfig(format!(
                "server.listen is not a socket address: {}",
                self.server.listen
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_poll_interval() {
        let mut config = Config::default();

        config.shard.poll_interval_ms = 0;
        let result = config.validate();
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("poll_interval_ms must be greater than 0"));

        config.shard.poll_interval_ms = 1_000;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_manager_url() {
        let mut config = Config::default();
        config.manager.base_url = "manager:8080".to_string();
        let result = config.validate();
        assert!(result.unwrap_err().to_string().contains("manager.base_url"));
    }

    #[test]
    fn test_config_validation_listen_address() {
        let mut config = Config::default();
        config.server.listen = "not-an-address".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[manager]
base_url = "http://manager.internal:8080"
request_timeout_ms = 2000

[shard]
poll_interval_ms = 1000
max_concurrent_syncs = 4

[ingress]
image = "registry.local/ingress:1.0"
namespace_prefix = "tenant-"

[executor]
webhook_timeout_ms = 3000

[server]
listen = "127.0.0.1:9000"
"#
        )
        .unwrap();

        let config = Config::from_file(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.manager.base_url, "http://manager.internal:8080");
        assert_eq!(config.shard.max_concurrent_syncs, 4);
        assert_eq!(config.ingress.namespace_prefix, "tenant-");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_malformed_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[manager]\nbase_url = 12").unwrap();
        let result = Config::from_file(file.path().to_str().unwrap());
        assert!(matches!(result, Err(crate::error::BridgeError::Config(_))));
    }
}

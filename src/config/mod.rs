use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub gateway: GatewayConfig,
    pub sync: SyncConfig,
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Base URL used to compose self-links for locally stored objects.
    pub base_url: String,
    /// Path prefix for object self-links.
    pub object_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Per-call timeout for outbound synchronization requests, in seconds.
    /// A timeout converts into a task failure on the object, it never aborts
    /// sibling tasks.
    pub call_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub max_connections: u32,
    pub connection_timeout_secs: u64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        // Load .env if present so DATABASE_URL and friends are visible
        let _ = dotenvy::dotenv();

        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = env::var("GATEWAY_BASE_URL") {
            self.gateway.base_url = v;
        }
        if let Ok(v) = env::var("GATEWAY_OBJECT_PATH") {
            self.gateway.object_path = v;
        }
        if let Ok(v) = env::var("SYNC_CALL_TIMEOUT_SECS") {
            self.sync.call_timeout_secs = v.parse().unwrap_or(self.sync.call_timeout_secs);
        }
        if let Ok(v) = env::var("SYNC_CONNECT_TIMEOUT_SECS") {
            self.sync.connect_timeout_secs = v.parse().unwrap_or(self.sync.connect_timeout_secs);
        }
        if let Ok(v) = env::var("DATABASE_URL") {
            self.database.url = Some(v);
        }
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_CONNECTION_TIMEOUT") {
            self.database.connection_timeout_secs =
                v.parse().unwrap_or(self.database.connection_timeout_secs);
        }

        self
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            gateway: GatewayConfig {
                base_url: "http://localhost:8000".to_string(),
                object_path: "/api/v1/eav/object_entities".to_string(),
            },
            sync: SyncConfig {
                call_timeout_secs: 30,
                connect_timeout_secs: 10,
                user_agent: format!("eav-gateway/{}", env!("CARGO_PKG_VERSION")),
            },
            database: DatabaseConfig {
                url: None,
                max_connections: 10,
                connection_timeout_secs: 30,
            },
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            gateway: GatewayConfig {
                base_url: "https://staging.example.com".to_string(),
                object_path: "/api/v1/eav/object_entities".to_string(),
            },
            sync: SyncConfig {
                call_timeout_secs: 15,
                connect_timeout_secs: 5,
                user_agent: format!("eav-gateway/{}", env!("CARGO_PKG_VERSION")),
            },
            database: DatabaseConfig {
                url: None,
                max_connections: 20,
                connection_timeout_secs: 10,
            },
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            gateway: GatewayConfig {
                base_url: "https://gateway.example.com".to_string(),
                object_path: "/api/v1/eav/object_entities".to_string(),
            },
            sync: SyncConfig {
                call_timeout_secs: 10,
                connect_timeout_secs: 5,
                user_agent: format!("eav-gateway/{}", env!("CARGO_PKG_VERSION")),
            },
            database: DatabaseConfig {
                url: None,
                max_connections: 50,
                connection_timeout_secs: 5,
            },
        }
    }
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub database: DatabaseConfig,
    pub directory: DirectoryConfig,
    pub tenancy: TenancyConfig,
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub max_connections: u32,
    pub acquire_timeout_ms: u64,
    pub idle_timeout_secs: u64,
    /// Registry table, always read through the shared schema
    pub registry_table: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// 0 disables caching entirely
    pub cache_ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenancyConfig {
    pub default_slug: String,
    pub shared_schema: String,
    /// When false, a request carrying no routing signal is rejected
    /// instead of landing on the default tenant.
    pub allow_default_fallback: bool,
    /// Entity kinds exposed through the repository factory
    pub entities: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub port: u16,
    pub enable_request_logging: bool,
}

impl DatabaseConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }
}

impl DirectoryConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

impl Default for TenancyConfig {
    fn default() -> Self {
        Self {
            default_slug: "default".to_string(),
            shared_schema: "public".to_string(),
            allow_default_fallback: true,
            entities: [
                "accounts",
                "payments",
                "messages",
                "marks",
                "attendance",
                "exemptions",
                "continuous_assessments",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // Database overrides
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_ACQUIRE_TIMEOUT_MS") {
            self.database.acquire_timeout_ms = v.parse().unwrap_or(self.database.acquire_timeout_ms);
        }
        if let Ok(v) = env::var("DATABASE_IDLE_TIMEOUT_SECS") {
            self.database.idle_timeout_secs = v.parse().unwrap_or(self.database.idle_timeout_secs);
        }
        if let Ok(v) = env::var("DATABASE_REGISTRY_TABLE") {
            self.database.registry_table = v;
        }

        // Directory overrides
        if let Ok(v) = env::var("DIRECTORY_CACHE_TTL_SECS") {
            self.directory.cache_ttl_secs = v.parse().unwrap_or(self.directory.cache_ttl_secs);
        }

        // Tenancy overrides
        if let Ok(v) = env::var("TENANCY_DEFAULT_SLUG") {
            self.tenancy.default_slug = v.trim().to_lowercase();
        }
        if let Ok(v) = env::var("TENANCY_SHARED_SCHEMA") {
            self.tenancy.shared_schema = v;
        }
        if let Ok(v) = env::var("TENANCY_ALLOW_DEFAULT_FALLBACK") {
            self.tenancy.allow_default_fallback = v.parse().unwrap_or(self.tenancy.allow_default_fallback);
        }
        if let Ok(v) = env::var("TENANCY_ENTITIES") {
            self.tenancy.entities = v
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        // API overrides
        if let Ok(v) = env::var("API_PORT").or_else(|_| env::var("PORT")) {
            self.api.port = v.parse().unwrap_or(self.api.port);
        }
        if let Ok(v) = env::var("API_ENABLE_REQUEST_LOGGING") {
            self.api.enable_request_logging = v.parse().unwrap_or(self.api.enable_request_logging);
        }

        self
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            database: DatabaseConfig {
                max_connections: 10,
                acquire_timeout_ms: 5_000,
                idle_timeout_secs: 600,
                registry_table: "tenants".to_string(),
            },
            directory: DirectoryConfig { cache_ttl_secs: 5 },
            tenancy: TenancyConfig::default(),
            api: ApiConfig {
                port: 3000,
                enable_request_logging: true,
            },
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            database: DatabaseConfig {
                max_connections: 20,
                acquire_timeout_ms: 3_000,
                idle_timeout_secs: 300,
                registry_table: "tenants".to_string(),
            },
            directory: DirectoryConfig { cache_ttl_secs: 30 },
            tenancy: TenancyConfig::default(),
            api: ApiConfig {
                port: 3000,
                enable_request_logging: true,
            },
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            database: DatabaseConfig {
                max_connections: 50,
                acquire_timeout_ms: 2_000,
                idle_timeout_secs: 300,
                registry_table: "tenants".to_string(),
            },
            directory: DirectoryConfig { cache_ttl_secs: 60 },
            tenancy: TenancyConfig {
                allow_default_fallback: false,
                ..TenancyConfig::default()
            },
            api: ApiConfig {
                port: 3000,
                enable_request_logging: false,
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

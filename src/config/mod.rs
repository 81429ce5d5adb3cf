use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub page: PageConfig,
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Production,
    Test,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Directory searched for website templates.
    pub views: String,
    /// Prefix prepended to every `api` route url.
    pub api_prefix: String,
    /// Prefix prepended to every `website` and `redirect` route url.
    pub web_prefix: String,
    pub default_lang: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    /// Database used when a request carries no tenant code.
    pub name: String,
    pub pool_size: u32,
    /// Prepended to collection names that have no explicit mapping.
    pub collection_prefix: String,
    /// Explicit collection name overrides, consulted before the prefix.
    pub collection_map: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageConfig {
    /// Page size applied when a list request does not specify a limit.
    pub default_limit: i64,
    /// Hard ceiling for any requested page size.
    pub max_limit: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub jwt_secret: String,
    pub jwt_expiry_hours: u64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("PLINTH_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("test") => Environment::Test,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Test => Self::test(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // Server overrides
        if let Ok(v) = env::var("PLINTH_HOST") {
            self.server.host = v;
        }
        if let Ok(v) = env::var("PORT") {
            self.server.port = v.parse().unwrap_or(self.server.port);
        }
        if let Ok(v) = env::var("PLINTH_VIEWS") {
            self.server.views = v;
        }
        if let Ok(v) = env::var("PLINTH_API_PREFIX") {
            self.server.api_prefix = v;
        }
        if let Ok(v) = env::var("PLINTH_WEB_PREFIX") {
            self.server.web_prefix = v;
        }
        if let Ok(v) = env::var("PLINTH_DEFAULT_LANG") {
            self.server.default_lang = v;
        }

        // Database overrides
        if let Ok(v) = env::var("DATABASE_HOST") {
            self.database.host = v;
        }
        if let Ok(v) = env::var("DATABASE_PORT") {
            self.database.port = v.parse().unwrap_or(self.database.port);
        }
        if let Ok(v) = env::var("DATABASE_USER") {
            self.database.user = v;
        }
        if let Ok(v) = env::var("DATABASE_PASSWORD") {
            self.database.password = v;
        }
        if let Ok(v) = env::var("DATABASE_NAME") {
            self.database.name = v;
        }
        if let Ok(v) = env::var("DATABASE_POOL_SIZE") {
            self.database.pool_size = v.parse().unwrap_or(self.database.pool_size);
        }
        if let Ok(v) = env::var("COLLECTION_PREFIX") {
            self.database.collection_prefix = v;
        }

        // Page overrides
        if let Ok(v) = env::var("PAGE_DEFAULT_LIMIT") {
            self.page.default_limit = v.parse().unwrap_or(self.page.default_limit);
        }
        if let Ok(v) = env::var("PAGE_MAX_LIMIT") {
            self.page.max_limit = v.parse().unwrap_or(self.page.max_limit);
        }

        // Security overrides
        if let Ok(v) = env::var("JWT_SECRET") {
            self.security.jwt_secret = v;
        }
        if let Ok(v) = env::var("JWT_EXPIRY_HOURS") {
            self.security.jwt_expiry_hours = v.parse().unwrap_or(self.security.jwt_expiry_hours);
        }

        self
    }

    /// Collects every configuration problem instead of stopping at the first,
    /// so a broken deployment reports all of its mistakes in one pass.
    /// A non-empty result is fatal at startup.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.database.host.is_empty() {
            problems.push("database.host is empty".to_string());
        }
        if self.database.port == 0 {
            problems.push("database.port is not a valid port".to_string());
        }
        if self.database.name.is_empty() {
            problems.push("database.name is empty".to_string());
        }
        if self.database.pool_size == 0 {
            problems.push("database.pool_size must be at least 1".to_string());
        }
        if self.page.default_limit <= 0 {
            problems.push("page.default_limit must be positive".to_string());
        }
        if self.page.max_limit < self.page.default_limit {
            problems.push("page.max_limit is below page.default_limit".to_string());
        }
        if self.server.views.is_empty() {
            problems.push("server.views is empty".to_string());
        }
        if self.security.jwt_secret.is_empty() {
            problems.push("security.jwt_secret is empty".to_string());
        }

        problems
    }

    /// Baseline settings `from_env` starts from before applying overrides.
    /// Public so tests and tooling can build a known-good configuration.
    pub fn development() -> Self {
        Self {
            environment: Environment::Development,
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
                views: "views".to_string(),
                api_prefix: String::new(),
                web_prefix: String::new(),
                default_lang: "en".to_string(),
            },
            database: DatabaseConfig {
                host: "localhost".to_string(),
                port: 5432,
                user: String::new(),
                password: String::new(),
                name: "plinth".to_string(),
                pool_size: 5,
                collection_prefix: String::new(),
                collection_map: HashMap::new(),
            },
            page: PageConfig { default_limit: 20, max_limit: 1000 },
            security: SecurityConfig {
                jwt_secret: "plinth-dev-secret".to_string(),
                jwt_expiry_hours: 24 * 7, // 1 week
            },
        }
    }

    pub fn production() -> Self {
        Self {
            environment: Environment::Production,
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
                views: "views".to_string(),
                api_prefix: String::new(),
                web_prefix: String::new(),
                default_lang: "en".to_string(),
            },
            database: DatabaseConfig {
                host: "localhost".to_string(),
                port: 5432,
                user: String::new(),
                password: String::new(),
                name: "plinth".to_string(),
                pool_size: 20,
                collection_prefix: String::new(),
                collection_map: HashMap::new(),
            },
            page: PageConfig { default_limit: 20, max_limit: 200 },
            security: SecurityConfig {
                // No usable default in production; JWT_SECRET must be set.
                jwt_secret: String::new(),
                jwt_expiry_hours: 24,
            },
        }
    }

    pub fn test() -> Self {
        Self {
            environment: Environment::Test,
            page: PageConfig { default_limit: 10, max_limit: 100 },
            ..Self::development()
        }
    }
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}

#[macro_export]
macro_rules! is_development {
    () => {
        matches!($crate::config::CONFIG.environment, $crate::config::Environment::Development)
    };
}

#[macro_export]
macro_rules! is_production {
    () => {
        matches!($crate::config::CONFIG.environment, $crate::config::Environment::Production)
    };
}

/// Configuration management for the API server
///
/// Loaded once at startup from environment variables (and `.env` in
/// development).
///
/// # Environment Variables
///
/// - `DATABASE_URL`: PostgreSQL connection string (required)
/// - `DATABASE_MAX_CONNECTIONS`: pool size (default: 10)
/// - `API_HOST`: Host to bind to (default: 0.0.0.0)
/// - `API_PORT`: Port to bind to (default: 8080)
/// - `CORS_ORIGINS`: comma-separated allowed origins, `*` for any (default: `*`)
/// - `PRODUCTION`: `true` enables HSTS (default: false)
/// - `JWT_SECRET`: Secret key for JWT signing, at least 32 characters (required)
/// - `ACCESS_TOKEN_TTL_HOURS`: access token lifetime (default: 24)
/// - `RATE_LIMIT_PER_MINUTE`: requests per user per minute (default: 120)
/// - `RUST_LOG`: Log filter (default: `foodbridge_api=debug,tower_http=debug`)
///
/// # Example
///
/// ```no_run
/// use foodbridge_api::config::Config;
///
/// # fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// println!("Server will listen on {}", config.bind_address());
/// # Ok(())
/// # }
/// ```

use serde::{Deserialize, Serialize};
use std::env;

/// Shortest accepted JWT secret
pub const MIN_JWT_SECRET_LENGTH: usize = 32;

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub rate_limit: RateLimitConfig,
}

/// API server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,

    /// Allowed CORS origins; `["*"]` allows any
    pub cors_origins: Vec<String>,

    /// Enables HSTS and other production-only behavior
    pub production: bool,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in pool
    pub max_connections: u32,
}

/// JWT configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    /// Secret key for JWT signing
    ///
    /// Generate with: `openssl rand -hex 32`
    #[serde(skip_serializing)]
    pub secret: String,

    /// Access token lifetime in hours
    pub access_token_ttl_hours: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Requests allowed per user per minute, also the burst size
    pub requests_per_minute: u32,
}

fn parse_var<T: std::str::FromStr>(name: &str, default: &str) -> anyhow::Result<T> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.trim()
        .parse::<T>()
        .map_err(|_| anyhow::anyhow!("{} has an invalid value: {}", name, raw))
}

/// Splits a comma-separated origin list, dropping blanks
pub fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

impl Config {
    /// Loads configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing, a numeric variable
    /// doesn't parse, or the JWT secret is too short.
    pub fn from_env() -> anyhow::Result<Self> {
        // Load .env file if present (for development)
        dotenvy::dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?;

        let jwt_secret = env::var("JWT_SECRET")
            .map_err(|_| anyhow::anyhow!("JWT_SECRET environment variable is required"))?;

        let access_token_ttl_hours: i64 = parse_var("ACCESS_TOKEN_TTL_HOURS", "24")?;
        if access_token_ttl_hours <= 0 {
            anyhow::bail!("ACCESS_TOKEN_TTL_HOURS must be positive");
        }

        let requests_per_minute: u32 = parse_var("RATE_LIMIT_PER_MINUTE", "120")?;
        if requests_per_minute == 0 {
            anyhow::bail!("RATE_LIMIT_PER_MINUTE must be positive");
        }

        let config = Self {
            api: ApiConfig {
                host: env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: parse_var("API_PORT", "8080")?,
                cors_origins: parse_origins(
                    &env::var("CORS_ORIGINS").unwrap_or_else(|_| "*".to_string()),
                ),
                production: parse_var("PRODUCTION", "false")?,
            },
            database: DatabaseConfig {
                url: database_url,
                max_connections: parse_var("DATABASE_MAX_CONNECTIONS", "10")?,
            },
            jwt: JwtConfig {
                secret: jwt_secret,
                access_token_ttl_hours,
            },
            rate_limit: RateLimitConfig {
                requests_per_minute,
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Checks cross-field constraints
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.jwt.secret.len() < MIN_JWT_SECRET_LENGTH {
            anyhow::bail!(
                "JWT_SECRET must be at least {} characters long",
                MIN_JWT_SECRET_LENGTH
            );
        }
        if self.api.production && self.api.cors_origins.iter().any(|o| o == "*") {
            tracing::warn!("CORS_ORIGINS allows any origin in production");
        }
        Ok(())
    }

    /// Returns the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }

    /// Access token lifetime
    pub fn access_token_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.jwt.access_token_ttl_hours)
    }

    /// A configuration for tests and local tooling
    pub fn for_tests(database_url: &str) -> Self {
        Self {
            api: ApiConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
                cors_origins: vec!["*".to_string()],
                production: false,
            },
            database: DatabaseConfig {
                url: database_url.to_string(),
                max_connections: 5,
            },
            jwt: JwtConfig {
                secret: "test-secret-key-that-is-at-least-32-bytes".to_string(),
                access_token_ttl_hours: 24,
            },
            rate_limit: RateLimitConfig {
                requests_per_minute: 1000,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_address() {
        let mut config = Config::for_tests("postgresql://localhost/test");
        config.api.port = 8080;

        assert_eq!(config.bind_address(), "127.0.0.1:8080");
    }

    #[test]
    fn test_short_secret_rejected() {
        let mut config = Config::for_tests("postgresql://localhost/test");
        assert!(config.validate().is_ok());

        config.jwt.secret = "too-short".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_origins() {
        assert_eq!(
            parse_origins("https://a.org, https://b.org ,,"),
            vec!["https://a.org".to_string(), "https://b.org".to_string()]
        );
        assert_eq!(parse_origins("*"), vec!["*".to_string()]);
        assert!(parse_origins("").is_empty());
    }

    #[test]
    fn test_access_token_ttl() {
        let mut config = Config::for_tests("postgresql://localhost/test");
        config.jwt.access_token_ttl_hours = 2;
        assert_eq!(config.access_token_ttl(), chrono::Duration::hours(2));
    }

    #[test]
    fn test_secret_not_serialized() {
        let config = Config::for_tests("postgresql://localhost/test");
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains(&config.jwt.secret));
    }
}

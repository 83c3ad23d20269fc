use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub max_connections: u32,
    pub query_timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct MailConfig {
    pub from: String,
    pub frontend_url: String,
    pub invitation_ttl_hours: i64,
    /// No SMTP relay means mails are only logged.
    pub smtp: Option<SmtpConfig>,
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl_secs: u64,
    pub max_capacity: u64,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub db: DbConfig,
    pub jwt: JwtConfig,
    pub mail: MailConfig,
    pub cache: CacheConfig,
}

impl ServerConfig {
    pub fn addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }
}

impl DbConfig {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }
}

impl MailConfig {
    pub fn invitation_ttl(&self) -> time::Duration {
        time::Duration::hours(self.invitation_ttl_hours)
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let server = ServerConfig {
            host: std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env_or("APP_PORT", 8080),
        };

        let db = DbConfig {
            url: std::env::var("DATABASE_URL").context("DATABASE_URL is required")?,
            max_connections: env_or("DB_MAX_CONNECTIONS", 10),
            query_timeout_secs: env_or("DB_QUERY_TIMEOUT_SECS", 5),
        };

        let secret = std::env::var("JWT_SECRET").context("JWT_SECRET is required")?;
        anyhow::ensure!(!secret.is_empty(), "JWT_SECRET must not be empty");
        let jwt = JwtConfig {
            secret,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "murmur".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "murmur".into()),
            ttl_minutes: env_or("JWT_TTL_MINUTES", 60 * 24 * 3),
        };

        let smtp = match std::env::var("SMTP_HOST") {
            Ok(host) if !host.is_empty() => Some(SmtpConfig {
                host,
                port: env_or("SMTP_PORT", 587),
                username: std::env::var("SMTP_USERNAME").unwrap_or_default(),
                password: std::env::var("SMTP_PASSWORD").unwrap_or_default(),
            }),
            _ => None,
        };
        let mail = MailConfig {
            from: std::env::var("MAIL_FROM").unwrap_or_else(|_| "no-reply@murmur.local".into()),
            frontend_url: std::env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".into()),
            invitation_ttl_hours: env_or("INVITATION_TTL_HOURS", 72),
            smtp,
        };

        let cache = CacheConfig {
            enabled: env_or("CACHE_ENABLED", false),
            ttl_secs: env_or("CACHE_TTL_SECS", 60),
            max_capacity: env_or("CACHE_MAX_CAPACITY", 10_000),
        };

        Ok(Self {
            server,
            db,
            jwt,
            mail,
            cache,
        })
    }
}

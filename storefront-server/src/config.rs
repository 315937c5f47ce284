//! Storefront server configuration

use std::time::Duration;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Storefront server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Environment: development | staging | production
    pub environment: String,
    /// HTTP listen port
    pub http_port: u16,
    /// PostgreSQL connection URL. `None` selects the in-memory store (development only)
    pub database_url: Option<String>,
    /// sqlx pool size
    pub db_max_connections: u32,
    /// HS256 signing secret for access tokens
    pub jwt_secret: String,
    /// Access token lifetime in hours
    pub jwt_expiry_hours: i64,
    /// Sign-ups with one of these (lowercased) emails get the admin role
    pub admin_emails: Vec<String>,
    /// Deadline for a whole checkout transaction
    pub checkout_timeout: Duration,
    /// Maximum wait for a single row lock
    pub lock_timeout: Duration,
    /// Deadline for one loyalty coupon job
    pub loyalty_timeout: Duration,
    /// Bounded loyalty job queue
    pub loyalty_queue_capacity: usize,
    /// Log-in attempts per client IP within one rate-limit window
    pub log_in_attempts_per_window: u32,
    /// Sign-up attempts per client IP within one rate-limit window
    pub sign_up_attempts_per_window: u32,
    pub rate_limit_window: Duration,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, BoxError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, BoxError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = lookup("ENVIRONMENT").unwrap_or_else(|| "development".into());

        Ok(Self {
            http_port: parse_or(&lookup, "HTTP_PORT", 8080)?,
            database_url: lookup("DATABASE_URL").filter(|s| !s.is_empty()),
            db_max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", 10)?,
            jwt_secret: require_secret(&lookup, "JWT_SECRET", &environment)?,
            jwt_expiry_hours: parse_or(&lookup, "JWT_EXPIRY_HOURS", 24)?,
            admin_emails: lookup("ADMIN_EMAILS")
                .map(|list| {
                    list.split(',')
                        .map(|e| e.trim().to_lowercase())
                        .filter(|e| !e.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            checkout_timeout: Duration::from_millis(parse_or(&lookup, "CHECKOUT_TIMEOUT_MS", 5000)?),
            lock_timeout: Duration::from_millis(parse_or(&lookup, "LOCK_TIMEOUT_MS", 3000)?),
            loyalty_timeout: Duration::from_secs(parse_or(&lookup, "LOYALTY_TIMEOUT_SECS", 10)?),
            loyalty_queue_capacity: parse_or(&lookup, "LOYALTY_QUEUE_CAPACITY", 256)?,
            log_in_attempts_per_window: parse_or(&lookup, "LOG_IN_RATE_LIMIT", 10)?,
            sign_up_attempts_per_window: parse_or(&lookup, "SIGN_UP_RATE_LIMIT", 5)?,
            rate_limit_window: Duration::from_secs(parse_or(&lookup, "RATE_LIMIT_WINDOW_SECS", 60)?),
            environment,
        })
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }

    pub fn is_admin_email(&self, email: &str) -> bool {
        self.admin_emails.iter().any(|e| e == email)
    }
}

/// Require a secret: must be set and non-empty outside development.
fn require_secret<F>(lookup: &F, name: &str, environment: &str) -> Result<String, BoxError>
where
    F: Fn(&str) -> Option<String>,
{
    let val = match lookup(name) {
        Some(v) => v,
        None => {
            if environment != "development" {
                return Err(format!("{name} must be set in {environment} environment").into());
            }
            format!("dev-{name}-not-for-production")
        }
    };
    if val.is_empty() && environment != "development" {
        return Err(format!("{name} must not be empty in {environment} environment").into());
    }
    Ok(val)
}

fn parse_or<F, T>(lookup: &F, name: &str, default: T) -> Result<T, BoxError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| format!("{name} has an invalid value: {raw:?}").into()),
        None => Ok(default),
    }
}

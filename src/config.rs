/// Configuration management for the Files backend
use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Smallest token length accepted for confirmation and reset links
pub const MIN_TOKEN_LENGTH: usize = 40;

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub email: Option<EmailConfig>,
    pub oauth: Option<OAuthConfig>,
    pub credentials: CredentialConfig,
    pub session: SessionConfig,
    pub rate_limit: RateLimitConfig,
    pub logging: LoggingConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
    /// Base URL used when building links sent by email
    pub public_url: String,
    /// Origin allowed by CORS (the frontend)
    pub frontend_origin: Option<String>,
    /// Directory served under /public
    pub public_dir: PathBuf,
    pub production: bool,
    pub version: String,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_directory: PathBuf,
    pub database: PathBuf,
}

/// Email configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    pub smtp_url: String,
    pub from_address: String,
}

/// Google OAuth client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_url: String,
    pub auth_url: String,
    pub token_url: String,
    pub userinfo_url: String,
}

/// Token lifetimes and sweeper cadence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialConfig {
    /// Confirmation window in seconds
    pub confirmation_window: u64,
    /// Password reset window in seconds
    pub reset_window: u64,
    pub token_length: usize,
    pub handle_suffix_length: usize,
    /// Expiry sweeper interval in seconds
    pub sweep_interval: u64,
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            confirmation_window: 6 * 3600,
            reset_window: 6 * 3600,
            token_length: 50,
            handle_suffix_length: 6,
            sweep_interval: 30 * 60,
        }
    }
}

impl CredentialConfig {
    pub fn confirmation_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.confirmation_window as i64)
    }

    pub fn reset_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.reset_window as i64)
    }
}

/// Session cookie configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Session lifetime in seconds
    pub ttl: u64,
    pub cookie_secure: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl: 7 * 24 * 3600,
            cookie_secure: false,
        }
    }
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub authenticated_rps: u32,
    pub unauthenticated_rps: u32,
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            authenticated_rps: 50,
            unauthenticated_rps: 10,
            burst_size: 20,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    /// Emit one JSON object per event instead of human-readable lines
    pub json: bool,
}

impl LoggingConfig {
    /// `json` selects the JSON formatter; anything else is plain text
    pub fn from_format(level: String, format: &str) -> Self {
        Self {
            level,
            json: format.trim().eq_ignore_ascii_case("json"),
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> AppResult<Self> {
        dotenv::dotenv().ok();

        let hostname = env::var("FILES_HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
        let port = env::var("FILES_PORT")
            .unwrap_or_else(|_| "9002".to_string())
            .parse()
            .map_err(|_| AppError::Validation("Invalid port number".to_string()))?;
        let public_url = env::var("FILES_PUBLIC_URL")
            .unwrap_or_else(|_| format!("http://{}:{}", hostname, port));
        let frontend_origin = env::var("FILES_FRONTEND_ORIGIN").ok();
        let public_dir = env::var("FILES_PUBLIC_DIR")
            .unwrap_or_else(|_| "./public".to_string())
            .into();
        let production = env::var("APP_ENV").map(|v| v == "production").unwrap_or(false);
        let version = env!("CARGO_PKG_VERSION").to_string();

        let data_directory: PathBuf = env::var("FILES_DATA_DIRECTORY")
            .unwrap_or_else(|_| "./data".to_string())
            .into();
        let database = env::var("FILES_DATABASE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_directory.join("files.sqlite"));

        let email = if let Ok(smtp_url) = env::var("FILES_EMAIL_SMTP_URL") {
            Some(EmailConfig {
                smtp_url,
                from_address: env::var("FILES_EMAIL_FROM_ADDRESS")
                    .unwrap_or_else(|_| format!("noreply@{}", hostname)),
            })
        } else {
            None
        };

        let oauth = match (env::var("GOOGLE_CLIENT_ID"), env::var("GOOGLE_CLIENT_SECRET")) {
            (Ok(client_id), Ok(client_secret)) => Some(OAuthConfig {
                client_id,
                client_secret,
                redirect_url: env::var("GOOGLE_REDIRECT_URL")
                    .unwrap_or_else(|_| format!("{}/account/google/callback", public_url)),
                auth_url: env::var("GOOGLE_AUTH_URL")
                    .unwrap_or_else(|_| "https://accounts.google.com/o/oauth2/auth".to_string()),
                token_url: env::var("GOOGLE_TOKEN_URL")
                    .unwrap_or_else(|_| "https://oauth2.googleapis.com/token".to_string()),
                userinfo_url: env::var("GOOGLE_USERINFO_URL").unwrap_or_else(|_| {
                    "https://www.googleapis.com/oauth2/v2/userinfo".to_string()
                }),
            }),
            _ => None,
        };

        let defaults = CredentialConfig::default();
        let credentials = CredentialConfig {
            confirmation_window: env_or(
                "FILES_CONFIRMATION_WINDOW_SECS",
                defaults.confirmation_window,
            ),
            reset_window: env_or("FILES_RESET_WINDOW_SECS", defaults.reset_window),
            token_length: env_or("FILES_TOKEN_LENGTH", defaults.token_length),
            handle_suffix_length: env_or(
                "FILES_HANDLE_SUFFIX_LENGTH",
                defaults.handle_suffix_length,
            ),
            sweep_interval: env_or("FILES_SWEEP_INTERVAL_SECS", defaults.sweep_interval),
        };

        let session_defaults = SessionConfig::default();
        let session = SessionConfig {
            ttl: env_or("FILES_SESSION_TTL_SECS", session_defaults.ttl),
            cookie_secure: env_or("FILES_SESSION_COOKIE_SECURE", production),
        };

        let rate_defaults = RateLimitConfig::default();
        let rate_limit = RateLimitConfig {
            enabled: env_or("FILES_RATE_LIMITS_ENABLED", rate_defaults.enabled),
            authenticated_rps: env_or(
                "FILES_RATE_LIMIT_AUTHENTICATED_RPS",
                rate_defaults.authenticated_rps,
            ),
            unauthenticated_rps: env_or(
                "FILES_RATE_LIMIT_UNAUTHENTICATED_RPS",
                rate_defaults.unauthenticated_rps,
            ),
            burst_size: env_or("FILES_RATE_LIMIT_BURST", rate_defaults.burst_size),
        };

        let level = env::var("FILES_LOG_LEVEL").unwrap_or_else(|_| "debug".to_string());

        Ok(ServerConfig {
            service: ServiceConfig {
                hostname,
                port,
                public_url,
                frontend_origin,
                public_dir,
                production,
                version,
            },
            storage: StorageConfig {
                data_directory,
                database,
            },
            email,
            oauth,
            credentials,
            session,
            rate_limit,
            logging: LoggingConfig::from_format(
                level,
                &env::var("FILES_LOG_FORMAT").unwrap_or_default(),
            ),
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> AppResult<()> {
        if self.service.hostname.is_empty() {
            return Err(AppError::Validation("Hostname cannot be empty".to_string()));
        }

        if self.credentials.token_length < MIN_TOKEN_LENGTH {
            return Err(AppError::Validation(format!(
                "Token length must be at least {} characters",
                MIN_TOKEN_LENGTH
            )));
        }

        if self.credentials.handle_suffix_length < 6 {
            return Err(AppError::Validation(
                "Handle suffix must be at least 6 characters".to_string(),
            ));
        }

        if self.credentials.confirmation_window == 0 || self.credentials.reset_window == 0 {
            return Err(AppError::Validation(
                "Token windows must be greater than zero".to_string(),
            ));
        }

        if self.credentials.sweep_interval == 0 {
            return Err(AppError::Validation(
                "Sweep interval must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Base URL for emailed links, without a trailing slash
    pub fn link_base(&self) -> &str {
        self.service.public_url.trim_end_matches('/')
    }
}

#[cfg(test)]
pub(crate) fn test_config(data_directory: PathBuf) -> ServerConfig {
    ServerConfig {
        service: ServiceConfig {
            hostname: "localhost".to_string(),
            port: 9002,
            public_url: "http://localhost:9002/".to_string(),
            frontend_origin: None,
            public_dir: data_directory.join("public"),
            production: false,
            version: "test".to_string(),
        },
        storage: StorageConfig {
            database: data_directory.join("files.sqlite"),
            data_directory,
        },
        email: None,
        oauth: None,
        credentials: CredentialConfig::default(),
        session: SessionConfig::default(),
        rate_limit: RateLimitConfig::default(),
        logging: LoggingConfig {
            level: "debug".to_string(),
            json: false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_use_six_hour_windows() {
        let credentials = CredentialConfig::default();
        assert_eq!(credentials.confirmation_window(), chrono::Duration::hours(6));
        assert_eq!(credentials.reset_window(), chrono::Duration::hours(6));
        assert_eq!(credentials.sweep_interval, 1800);
    }

    #[test]
    fn test_validate_rejects_short_tokens() {
        let mut config = test_config(PathBuf::from("/tmp/files"));
        assert!(config.validate().is_ok());

        config.credentials.token_length = 39;
        assert!(matches!(config.validate(), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_validate_rejects_zero_windows() {
        let mut config = test_config(PathBuf::from("/tmp/files"));
        config.credentials.reset_window = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_log_format_selection() {
        assert!(LoggingConfig::from_format("info".to_string(), "json").json);
        assert!(LoggingConfig::from_format("info".to_string(), " JSON ").json);
        assert!(!LoggingConfig::from_format("info".to_string(), "text").json);
        assert!(!LoggingConfig::from_format("info".to_string(), "").json);
    }

    #[test]
    fn test_link_base_strips_trailing_slash() {
        let config = test_config(PathBuf::from("/tmp/files"));
        assert_eq!(config.link_base(), "http://localhost:9002");
    }
}

use std::path::PathBuf;

use anyhow::{Result, bail};

/// Session secrets that MUST NOT reach a non-dev deployment.
const PLACEHOLDER_SECRETS: &[&str] = &["dev-change-me", "dev-secret-change-me"];

/// The local identity materialized by the dev login shortcut. Present
/// only when dev mode was switched on at startup.
#[derive(Debug, Clone)]
pub struct DevIdentity {
    pub email: String,
    pub display_name: String,
}

#[derive(Debug, Clone)]
pub struct GoogleConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: String,
    pub use_tls: bool,
}

#[derive(Debug, Clone)]
pub struct PortalConfig {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub upload_dir: PathBuf,
    pub session_secret: String,
    pub dev: Option<DevIdentity>,
    pub google: Option<GoogleConfig>,
    pub smtp: Option<SmtpConfig>,
}

impl PortalConfig {
    /// Read the whole configuration once at startup. Optional
    /// collaborators (Google OAuth, SMTP) stay `None` unless fully
    /// configured; the affected operations then fail with a clear error
    /// instead of attempting a connection.
    pub fn from_env() -> Result<Self> {
        let host = env_or("PORTAL_HOST", "0.0.0.0");
        let port: u16 = env_or("PORTAL_PORT", "8000").parse()?;
        let db_path: PathBuf = env_or("PORTAL_DB_PATH", "portal.db").into();
        let upload_dir: PathBuf = env_or("PORTAL_UPLOAD_DIR", "./uploads").into();

        let dev = if bool_env("PORTAL_DEV_MODE") {
            Some(DevIdentity {
                email: env_or("PORTAL_DEV_USER_EMAIL", "dev@example.com"),
                display_name: env_or("PORTAL_DEV_USER_NAME", "Dev User"),
            })
        } else {
            None
        };

        let session_secret = env_or("PORTAL_SESSION_SECRET", "dev-secret-change-me");
        if dev.is_none()
            && (session_secret.is_empty()
                || PLACEHOLDER_SECRETS.contains(&session_secret.as_str()))
        {
            bail!(
                "PORTAL_SESSION_SECRET is unset or still a placeholder; \
                 set it to a random string (or enable PORTAL_DEV_MODE for local work)"
            );
        }

        let google = match (
            std::env::var("GOOGLE_CLIENT_ID").ok(),
            std::env::var("GOOGLE_CLIENT_SECRET").ok(),
            std::env::var("GOOGLE_REDIRECT_URI").ok(),
        ) {
            (Some(client_id), Some(client_secret), Some(redirect_uri)) => Some(GoogleConfig {
                client_id,
                client_secret,
                redirect_uri,
            }),
            _ => None,
        };

        let smtp = match (std::env::var("SMTP_HOST").ok(), std::env::var("SMTP_FROM").ok()) {
            (Some(smtp_host), Some(from)) if !smtp_host.is_empty() && !from.is_empty() => {
                Some(SmtpConfig {
                    host: smtp_host,
                    port: env_or("SMTP_PORT", "587").parse()?,
                    username: std::env::var("SMTP_USERNAME").ok().filter(|s| !s.is_empty()),
                    password: std::env::var("SMTP_PASSWORD").ok().filter(|s| !s.is_empty()),
                    from,
                    use_tls: std::env::var("SMTP_USE_TLS")
                        .map(|v| parse_bool(&v))
                        .unwrap_or(true),
                })
            }
            _ => None,
        };

        Ok(Self {
            host,
            port,
            db_path,
            upload_dir,
            session_secret,
            dev,
            google,
            smtp,
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.into())
}

fn bool_env(key: &str) -> bool {
    std::env::var(key).map(|v| parse_bool(&v)).unwrap_or(false)
}

fn parse_bool(v: &str) -> bool {
    matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

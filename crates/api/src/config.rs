use imagejob_core::job::JobId;
use url::Url;

/// Configuration problems detected while loading [`ServerConfig`].
///
/// Messages name the offending variables only, never their values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variables: {}", .0.join(", "))]
    Missing(Vec<String>),

    #[error("Invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// Where job status records and queue messages are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    /// PostgreSQL reachable at `database_url`.
    Postgres { database_url: String },
    /// Process-local storage, lost on restart.
    Memory,
}

/// Deployment identifiers of the hosting environment.
///
/// Only used to build responses (the status polling URL); nothing is
/// provisioned from them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentConfig {
    pub subscription_id: String,
    pub resource_group: String,
    pub function_app_name: String,
    pub container_image: String,
    pub location: String,
    /// Public root of this service, e.g. `https://imagejobs.example.com`.
    pub public_base_url: Url,
}

impl DeploymentConfig {
    /// Polling URL for a job: `{public_base_url}/api/GetJobStatus?job_id=...`.
    pub fn status_url(&self, job_id: &JobId) -> Url {
        let mut url = self.public_base_url.clone();
        let path = format!("{}/api/GetJobStatus", url.path().trim_end_matches('/'));
        url.set_path(&path);
        url.set_fragment(None);
        url.query_pairs_mut()
            .clear()
            .append_pair("job_id", job_id.as_str());
        url
    }
}

/// Server configuration, loaded once at startup and validated eagerly.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    pub storage: StorageBackend,
    pub deployment: DeploymentConfig,
}

/// Deployment variables that must be present for the service to start.
const REQUIRED_DEPLOYMENT_VARS: [&str; 5] = [
    "SUBSCRIPTION_ID",
    "RESOURCE_GROUP",
    "FUNCTION_APP_NAME",
    "CONTAINER_IMAGE",
    "LOCATION",
];

impl ServerConfig {
    /// Load configuration from the process environment.
    ///
    /// | Env Var                | Default                                         |
    /// |------------------------|-------------------------------------------------|
    /// | `HOST`                 | `0.0.0.0`                                       |
    /// | `PORT`                 | `3000`                                          |
    /// | `CORS_ORIGINS`         | `http://localhost:5173`                         |
    /// | `REQUEST_TIMEOUT_SECS` | `30`                                            |
    /// | `STORAGE_BACKEND`      | `postgres` (or `memory`)                        |
    /// | `DATABASE_URL`         | required for `postgres`                         |
    /// | `SUBSCRIPTION_ID`      | required                                        |
    /// | `RESOURCE_GROUP`       | required                                        |
    /// | `FUNCTION_APP_NAME`    | required                                        |
    /// | `CONTAINER_IMAGE`      | required                                        |
    /// | `LOCATION`             | required                                        |
    /// | `PUBLIC_BASE_URL`      | `https://{FUNCTION_APP_NAME}.azurewebsites.net` |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// Blank values count as unset. Every missing required variable is
    /// reported in a single [`ConfigError::Missing`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut missing = Vec::new();
        let mut require = |key: &'static str| {
            let value = get(key);
            if value.is_none() {
                missing.push(key.to_string());
            }
            value.unwrap_or_default()
        };

        let subscription_id = require(REQUIRED_DEPLOYMENT_VARS[0]);
        let resource_group = require(REQUIRED_DEPLOYMENT_VARS[1]);
        let function_app_name = require(REQUIRED_DEPLOYMENT_VARS[2]);
        let container_image = require(REQUIRED_DEPLOYMENT_VARS[3]);
        let location = require(REQUIRED_DEPLOYMENT_VARS[4]);

        let storage = match get("STORAGE_BACKEND").as_deref() {
            None | Some("postgres") => StorageBackend::Postgres {
                database_url: require("DATABASE_URL"),
            },
            Some("memory") => StorageBackend::Memory,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: "STORAGE_BACKEND",
                    reason: format!("expected 'postgres' or 'memory', got '{other}'"),
                })
            }
        };

        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }

        let host = get("HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port = parse_or("PORT", get("PORT"), 3000u16)?;
        let request_timeout_secs =
            parse_or("REQUEST_TIMEOUT_SECS", get("REQUEST_TIMEOUT_SECS"), 30u64)?;

        let cors_origins: Vec<String> = get("CORS_ORIGINS")
            .unwrap_or_else(|| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let base = get("PUBLIC_BASE_URL")
            .unwrap_or_else(|| format!("https://{function_app_name}.azurewebsites.net"));
        let public_base_url = Url::parse(&base).map_err(|e| ConfigError::Invalid {
            var: "PUBLIC_BASE_URL",
            reason: e.to_string(),
        })?;
        if public_base_url.cannot_be_a_base()
            || !matches!(public_base_url.scheme(), "http" | "https")
        {
            return Err(ConfigError::Invalid {
                var: "PUBLIC_BASE_URL",
                reason: "must be an absolute http(s) URL".into(),
            });
        }

        Ok(Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            storage,
            deployment: DeploymentConfig {
                subscription_id,
                resource_group,
                function_app_name,
                container_image,
                location,
                public_base_url,
            },
        })
    }
}

fn parse_or<T>(var: &'static str, value: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            reason: e.to_string(),
        }),
    }
}

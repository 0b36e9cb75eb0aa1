use atelier_core::error::CoreError;

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS`.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 3000,
            cors_origins: vec!["http://localhost:5173".into()],
            request_timeout_secs: 30,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                 |
    /// |------------------------|-------------------------|
    /// | `HOST`                 | `0.0.0.0`               |
    /// | `PORT`                 | `3000`                  |
    /// | `CORS_ORIGINS`         | `http://localhost:5173` |
    /// | `REQUEST_TIMEOUT_SECS` | `30`                    |
    pub fn from_env() -> Result<Self, CoreError> {
        let defaults = Self::default();

        let host = std::env::var("HOST").unwrap_or(defaults.host);

        let port = match std::env::var("PORT") {
            Ok(raw) => parse_number::<u16>("PORT", &raw)?,
            Err(_) => defaults.port,
        };

        let cors_origins = match std::env::var("CORS_ORIGINS") {
            Ok(raw) => split_origins(&raw),
            Err(_) => defaults.cors_origins,
        };

        let request_timeout_secs = match std::env::var("REQUEST_TIMEOUT_SECS") {
            Ok(raw) => parse_number::<u64>("REQUEST_TIMEOUT_SECS", &raw)?,
            Err(_) => defaults.request_timeout_secs,
        };

        Ok(Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
        })
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, CoreError> {
    raw.trim()
        .parse()
        .map_err(|_| CoreError::Validation(format!("{key} must be a valid number, got '{raw}'")))
}

fn split_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_origins_trims_and_skips_empty() {
        assert_eq!(
            split_origins(" http://a.test , ,http://b.test"),
            vec!["http://a.test".to_string(), "http://b.test".to_string()]
        );
    }

    #[test]
    fn parse_number_rejects_out_of_range_port() {
        assert!(parse_number::<u16>("PORT", "70000").is_err());
        assert_eq!(parse_number::<u16>("PORT", "8080").unwrap(), 8080);
    }
}

use std::env;

/// Runtime settings read from the environment (and `.env` when present).
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub jwt_secret: String,
    pub jwt_expiration_hours: i64,
    pub notification_service_url: Option<String>,
    pub db_max_connections: u32,
}

/// Token signing settings alone, for tools that mint tokens without a
/// database.
#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub jwt_secret: String,
    pub jwt_expiration_hours: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set in environment")]
    Missing(&'static str),

    #[error("{name} has an invalid value: {value}")]
    Invalid { name: &'static str, value: String },
}

impl TokenConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(&|key: &str| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: &F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            jwt_secret: lookup("JWT_SECRET")
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing("JWT_SECRET"))?,
            jwt_expiration_hours: parse_or(
                "JWT_EXPIRATION_HOURS",
                lookup("JWT_EXPIRATION_HOURS"),
                24,
            )?,
        })
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(name))
        };

        let database_url = required("DATABASE_URL")?;
        let token = TokenConfig::from_lookup(&lookup)?;

        Ok(Self {
            host: lookup("HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port: parse_or("PORT", lookup("PORT"), 8082)?,
            database_url,
            jwt_secret: token.jwt_secret,
            jwt_expiration_hours: token.jwt_expiration_hours,
            notification_service_url: lookup("NOTIFICATION_SERVICE_URL")
                .filter(|v| !v.trim().is_empty()),
            db_max_connections: parse_or(
                "DB_MAX_CONNECTIONS",
                lookup("DB_MAX_CONNECTIONS"),
                10,
            )?,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T: std::str::FromStr>(
    name: &'static str,
    value: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match value {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value: raw }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_applied() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/flexpass"),
            ("JWT_SECRET", "secret"),
        ]))
        .unwrap();

        assert_eq!(config.bind_address(), "127.0.0.1:8082");
        assert_eq!(config.jwt_expiration_hours, 24);
        assert_eq!(config.db_max_connections, 10);
        assert!(config.notification_service_url.is_none());
    }

    #[test]
    fn test_missing_secret_is_an_error() {
        let err = AppConfig::from_lookup(lookup_from(&[(
            "DATABASE_URL",
            "postgres://localhost/flexpass",
        )]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Missing("JWT_SECRET")));
    }

    #[test]
    fn test_token_config_needs_no_database() {
        let token = TokenConfig::from_lookup(&lookup_from(&[
            ("JWT_SECRET", "secret"),
            ("JWT_EXPIRATION_HOURS", "2"),
        ]))
        .unwrap();
        assert_eq!(token.jwt_secret, "secret");
        assert_eq!(token.jwt_expiration_hours, 2);

        let err = TokenConfig::from_lookup(&lookup_from(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("JWT_SECRET")));
    }

    #[test]
    fn test_invalid_port_rejected() {
        let err = AppConfig::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/flexpass"),
            ("JWT_SECRET", "secret"),
            ("PORT", "eighty"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "PORT", .. }));
    }
}

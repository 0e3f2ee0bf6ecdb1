use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use crate::enrollment::validate::AgePolicy;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the enrollment service.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub enrollment: EnrollmentConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            enrollment: EnrollmentConfig::from_env()?,
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Knobs for the enrollment flow itself.
///
/// The 19/65 coverage window was historically re-typed on every page of the
/// wizard; it lives here so there is exactly one source for the thresholds.
#[derive(Debug, Clone)]
pub struct EnrollmentConfig {
    pub minimum_age: u8,
    pub maximum_age: u8,
    pub lookup_timeout_secs: u64,
}

impl EnrollmentConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let minimum_age = parse_age_var("ENROLL_MINIMUM_AGE", 19)?;
        let maximum_age = parse_age_var("ENROLL_MAXIMUM_AGE", 65)?;
        if minimum_age > maximum_age {
            return Err(ConfigError::InvertedAgeWindow {
                minimum: minimum_age,
                maximum: maximum_age,
            });
        }

        let lookup_timeout_secs = match env::var("ENROLL_LOOKUP_TIMEOUT_SECS") {
            Ok(value) => value
                .trim()
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidTimeout { value })?,
            Err(_) => 8,
        };

        Ok(Self {
            minimum_age,
            maximum_age,
            lookup_timeout_secs,
        })
    }

    pub fn age_policy(&self) -> AgePolicy {
        AgePolicy {
            minimum_age: self.minimum_age,
            maximum_age: self.maximum_age,
        }
    }

    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_secs(self.lookup_timeout_secs)
    }
}

fn parse_age_var(name: &'static str, default: u8) -> Result<u8, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<u8>()
            .map_err(|_| ConfigError::InvalidAgeBound { name, value }),
        Err(_) => Ok(default),
    }
}

/// Failures while assembling the runtime configuration.
#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidAgeBound { name: &'static str, value: String },
    InvertedAgeWindow { minimum: u8, maximum: u8 },
    InvalidTimeout { value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid TCP port"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must be an IP address or 'localhost'")
            }
            ConfigError::InvalidAgeBound { name, value } => {
                write!(f, "{name} must be an age in years, got '{value}'")
            }
            ConfigError::InvertedAgeWindow { minimum, maximum } => {
                write!(
                    f,
                    "minimum age {minimum} exceeds maximum age {maximum} in the coverage window"
                )
            }
            ConfigError::InvalidTimeout { value } => {
                write!(
                    f,
                    "ENROLL_LOOKUP_TIMEOUT_SECS must be whole seconds, got '{value}'"
                )
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_parsing_defaults_to_development() {
        assert_eq!(AppEnvironment::from_str("staging"), AppEnvironment::Development);
        assert_eq!(AppEnvironment::from_str("PROD"), AppEnvironment::Production);
        assert_eq!(AppEnvironment::from_str("ci"), AppEnvironment::Test);
    }

    #[test]
    fn localhost_resolves_to_loopback() {
        let server = ServerConfig {
            host: "localhost".to_string(),
            port: 4100,
        };
        let addr = server.socket_addr().expect("socket addr");
        assert_eq!(addr.to_string(), "127.0.0.1:4100");
    }

    #[test]
    fn default_enrollment_window_is_19_to_65() {
        let config = EnrollmentConfig {
            minimum_age: 19,
            maximum_age: 65,
            lookup_timeout_secs: 8,
        };
        let policy = config.age_policy();
        assert_eq!(policy.minimum_age, 19);
        assert_eq!(policy.maximum_age, 65);
        assert_eq!(config.lookup_timeout(), Duration::from_secs(8));
    }
}

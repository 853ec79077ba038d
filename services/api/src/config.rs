use receptionist_core::twilio::TwilioConfig;
use std::{net::SocketAddr, time::Duration};
use tracing::Level;

/// Twilio's default maximum call length.
pub const DEFAULT_CALL_MAX_AGE_SECS: u64 = 4 * 60 * 60;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    /// Publicly reachable host of this server; a tunnel is opened when absent.
    pub base_url: Option<String>,
    pub ngrok_auth_token: Option<String>,
    pub twilio: TwilioConfig,
    /// Twilio number outbound SMS are sent from.
    pub outbound_caller_number: String,
    pub openai_api_key: String,
    pub chat_model: String,
    /// When set, the agent may hand the caller over to this number.
    pub transfer_phone_number: Option<String>,
    /// When set, the agent may send email through Nylas.
    pub nylas_access_token: Option<String>,
    /// Reject webhooks without a valid `X-Twilio-Signature`.
    pub verify_twilio_signatures: bool,
    /// Calls older than this are dropped by the stale call sweeper.
    pub call_max_age: Duration,
    pub log_level: Level,
}

/// Reads a variable, treating an empty value as unset.
fn optional(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn required(name: &str) -> Result<String, ConfigError> {
    optional(name).ok_or_else(|| ConfigError::MissingVar(name.to_string()))
}

fn parse_or<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match optional(name) {
        Some(value) => value.trim().parse::<T>().map_err(|_| {
            ConfigError::InvalidValue(name.to_string(), format!("'{}' could not be parsed", value))
        }),
        None => Ok(default),
    }
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let twilio = TwilioConfig {
            account_sid: required("TWILIO_ACCOUNT_SID")?,
            auth_token: required("TWILIO_AUTH_TOKEN")?,
        };

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            bind_address,
            base_url: optional("TELEPHONY_SERVER_BASE_URL"),
            ngrok_auth_token: optional("NGROK_AUTH_TOKEN"),
            twilio,
            outbound_caller_number: required("OUTBOUND_CALLER_NUMBER")?,
            openai_api_key: required("OPENAI_API_KEY")?,
            chat_model: optional("CHAT_MODEL")
                .unwrap_or_else(|| receptionist_core::agent::DEFAULT_MODEL.to_string()),
            transfer_phone_number: optional("TRANSFER_PHONE_NUMBER"),
            nylas_access_token: optional("NYLAS_ACCESS_TOKEN"),
            verify_twilio_signatures: parse_or("TWILIO_VALIDATE_SIGNATURES", true)?,
            call_max_age: Duration::from_secs(parse_or(
                "CALL_MAX_AGE_SECS",
                DEFAULT_CALL_MAX_AGE_SECS,
            )?),
            log_level,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use tracing::Level;

    const ALL_VARS: &[&str] = &[
        "BIND_ADDRESS",
        "TELEPHONY_SERVER_BASE_URL",
        "NGROK_AUTH_TOKEN",
        "TWILIO_ACCOUNT_SID",
        "TWILIO_AUTH_TOKEN",
        "OUTBOUND_CALLER_NUMBER",
        "OPENAI_API_KEY",
        "CHAT_MODEL",
        "TRANSFER_PHONE_NUMBER",
        "NYLAS_ACCESS_TOKEN",
        "TWILIO_VALIDATE_SIGNATURES",
        "CALL_MAX_AGE_SECS",
        "RUST_LOG",
    ];

    fn clear_env_vars() {
        for var in ALL_VARS {
            unsafe {
                env::remove_var(var);
            }
        }
    }

    fn set_minimal_env() {
        unsafe {
            env::set_var("TWILIO_ACCOUNT_SID", "AC123");
            env::set_var("TWILIO_AUTH_TOKEN", "twilio-token");
            env::set_var("OUTBOUND_CALLER_NUMBER", "+15550009999");
            env::set_var("OPENAI_API_KEY", "test-openai-key");
        }
    }

    #[test]
    fn test_config_error_display() {
        let missing_var = ConfigError::MissingVar("TEST_VAR".to_string());
        assert_eq!(
            format!("{}", missing_var),
            "Missing environment variable: TEST_VAR"
        );

        let invalid_value =
            ConfigError::InvalidValue("TEST_VAR".to_string(), "bad_value".to_string());
        assert_eq!(
            format!("{}", invalid_value),
            "Invalid value for environment variable TEST_VAR: bad_value"
        );
    }

    #[test]
    #[serial]
    fn test_config_from_env_minimal() {
        clear_env_vars();
        set_minimal_env();

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.bind_address.to_string(), "0.0.0.0:3000");
        assert_eq!(config.base_url, None);
        assert_eq!(config.ngrok_auth_token, None);
        assert_eq!(config.twilio.account_sid, "AC123");
        assert_eq!(config.twilio.auth_token, "twilio-token");
        assert_eq!(config.outbound_caller_number, "+15550009999");
        assert_eq!(config.openai_api_key, "test-openai-key");
        assert_eq!(config.chat_model, "gpt-3.5-turbo");
        assert_eq!(config.transfer_phone_number, None);
        assert_eq!(config.nylas_access_token, None);
        assert!(config.verify_twilio_signatures);
        assert_eq!(config.call_max_age, Duration::from_secs(4 * 60 * 60));
        assert_eq!(config.log_level, Level::INFO);
    }

    #[test]
    #[serial]
    fn test_config_from_env_custom_values() {
        clear_env_vars();
        set_minimal_env();
        unsafe {
            env::set_var("BIND_ADDRESS", "127.0.0.1:8080");
            env::set_var("TELEPHONY_SERVER_BASE_URL", "receptionist.example.com");
            env::set_var("NGROK_AUTH_TOKEN", "ngrok-token");
            env::set_var("CHAT_MODEL", "gpt-4o");
            env::set_var("TRANSFER_PHONE_NUMBER", "+15550001111");
            env::set_var("NYLAS_ACCESS_TOKEN", "nylas-token");
            env::set_var("TWILIO_VALIDATE_SIGNATURES", "false");
            env::set_var("CALL_MAX_AGE_SECS", "600");
            env::set_var("RUST_LOG", "debug");
        }

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.bind_address.to_string(), "127.0.0.1:8080");
        assert_eq!(config.base_url.as_deref(), Some("receptionist.example.com"));
        assert_eq!(config.ngrok_auth_token.as_deref(), Some("ngrok-token"));
        assert_eq!(config.chat_model, "gpt-4o");
        assert_eq!(config.transfer_phone_number.as_deref(), Some("+15550001111"));
        assert_eq!(config.nylas_access_token.as_deref(), Some("nylas-token"));
        assert!(!config.verify_twilio_signatures);
        assert_eq!(config.call_max_age, Duration::from_secs(600));
        assert_eq!(config.log_level, Level::DEBUG);
    }

    #[test]
    #[serial]
    fn test_config_empty_base_url_is_unset() {
        clear_env_vars();
        set_minimal_env();
        unsafe {
            env::set_var("TELEPHONY_SERVER_BASE_URL", "");
        }

        let config = Config::from_env().expect("Config should load successfully");
        assert_eq!(config.base_url, None);
    }

    #[test]
    #[serial]
    fn test_config_invalid_bind_address() {
        clear_env_vars();
        set_minimal_env();
        unsafe {
            env::set_var("BIND_ADDRESS", "not-a-valid-address");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "BIND_ADDRESS"),
            _ => panic!("Expected InvalidValue for BIND_ADDRESS"),
        }
    }

    #[test]
    #[serial]
    fn test_config_invalid_log_level() {
        clear_env_vars();
        set_minimal_env();
        unsafe {
            env::set_var("RUST_LOG", "not-a-level");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "RUST_LOG"),
            _ => panic!("Expected InvalidValue for RUST_LOG"),
        }
    }

    #[test]
    #[serial]
    fn test_config_missing_twilio_credentials() {
        clear_env_vars();
        set_minimal_env();
        unsafe {
            env::remove_var("TWILIO_AUTH_TOKEN");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::MissingVar(var) => assert_eq!(var, "TWILIO_AUTH_TOKEN"),
            _ => panic!("Expected MissingVar for TWILIO_AUTH_TOKEN"),
        }
    }

    #[test]
    #[serial]
    fn test_config_missing_outbound_caller_number() {
        clear_env_vars();
        set_minimal_env();
        unsafe {
            env::remove_var("OUTBOUND_CALLER_NUMBER");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::MissingVar(var) => assert_eq!(var, "OUTBOUND_CALLER_NUMBER"),
            _ => panic!("Expected MissingVar for OUTBOUND_CALLER_NUMBER"),
        }
    }

    #[test]
    #[serial]
    fn test_config_invalid_call_max_age() {
        clear_env_vars();
        set_minimal_env();
        unsafe {
            env::set_var("CALL_MAX_AGE_SECS", "an hour");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "CALL_MAX_AGE_SECS"),
            _ => panic!("Expected InvalidValue for CALL_MAX_AGE_SECS"),
        }
    }
}

use std::collections::HashMap;
use thiserror::Error;

use crate::engine::OverSellPolicy;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    pub oversell_policy: OverSellPolicy,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let port = env_map
            .get("PORT")
            .map(|s| s.as_str())
            .unwrap_or("8080")
            .parse::<u16>()
            .map_err(|_| {
                ConfigError::InvalidValue("PORT".to_string(), "must be a valid u16".to_string())
            })?;

        let database_path = env_map
            .get("DATABASE_PATH")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("DATABASE_PATH".to_string()))?;

        let oversell_policy = match env_map
            .get("OVERSELL_POLICY")
            .map(|s| s.as_str())
            .unwrap_or("zero-cost")
        {
            "zero-cost" => OverSellPolicy::ZeroCost,
            "reject" => OverSellPolicy::Reject,
            other => {
                return Err(ConfigError::InvalidValue(
                    "OVERSELL_POLICY".to_string(),
                    format!("must be zero-cost or reject, got {}", other),
                ))
            }
        };

        Ok(Config {
            port,
            database_path,
            oversell_policy,
        })
    }
}

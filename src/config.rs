use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::AppError;

#[derive(Deserialize, Debug, Clone)]
pub struct RegistryConfig {
    pub database_url: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,
}

// Partial config for layering
#[derive(Deserialize, Default, Debug)]
struct PartialRegistryConfig {
    database_url: Option<String>,
    max_connections: Option<u32>,
    log_dir: Option<String>,
}

fn default_max_connections() -> u32 {
    10
}

fn default_log_dir() -> String {
    "logs".to_string()
}

impl RegistryConfig {
    pub fn load(config_path: Option<&str>) -> Result<Self, AppError> {
        dotenv::dotenv().ok();

        let file_config = Self::load_file(config_path)?;
        let env_config: PartialRegistryConfig = envy::from_env::<PartialRegistryConfig>()
            .map_err(|e| AppError::ConfigError(format!("Failed to load config from environment: {e}")))?;

        Self::merge(env_config, file_config)
    }

    fn load_file(config_path: Option<&str>) -> Result<PartialRegistryConfig, AppError> {
        let Some(path_str) = config_path else {
            return Ok(PartialRegistryConfig::default());
        };
        let path = Path::new(path_str);
        if !path.exists() {
            return Ok(PartialRegistryConfig::default());
        }
        let contents = fs::read_to_string(path).map_err(|e| {
            AppError::ConfigError(format!("Failed to read config file at {path:?}: {e}"))
        })?;
        toml::from_str(&contents).map_err(|e| {
            AppError::ConfigError(format!("Failed to parse TOML from config file at {path:?}: {e}"))
        })
    }

    // Environment overrides file.
    fn merge(
        env_config: PartialRegistryConfig,
        file_config: PartialRegistryConfig,
    ) -> Result<Self, AppError> {
        Ok(RegistryConfig {
            database_url: env_config
                .database_url
                .or(file_config.database_url)
                .ok_or_else(|| AppError::ConfigError("DATABASE_URL is required".to_string()))?,
            max_connections: env_config
                .max_connections
                .or(file_config.max_connections)
                .unwrap_or_else(default_max_connections),
            log_dir: env_config
                .log_dir
                .or(file_config.log_dir)
                .unwrap_or_else(default_log_dir),
        })
    }
}

// rest_api/src/config.rs

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

/// Server settings, loaded from `server_config.yaml`. A missing file means
/// defaults; a malformed file is an error.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_roles_file")]
    pub roles_file: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: default_host(),
            port: default_port(),
            roles_file: default_roles_file(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8082
}

fn default_roles_file() -> String {
    "roles_permissions.yaml".to_string()
}

#[derive(Debug, Deserialize)]
struct ServerConfigWrapper {
    server: ServerConfig,
}

pub fn load_server_config(config_file_path: Option<PathBuf>) -> Result<ServerConfig> {
    let path = config_file_path.unwrap_or_else(|| PathBuf::from("server_config.yaml"));
    if !path.exists() {
        return Ok(ServerConfig::default());
    }
    let content = fs::read_to_string(&path)
        .with_context(|| format!("failed to read server config file {}", path.display()))?;
    let wrapper: ServerConfigWrapper = serde_yaml::from_str(&content)
        .with_context(|| format!("failed to parse server config file {}", path.display()))?;
    Ok(wrapper.server)
}

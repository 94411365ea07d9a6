use serde::Deserialize;

use crate::domain::server::ServerConfig;
use crate::error::{Error, Result};

/// Shape of the server configuration file. Every knob is optional; missing
/// fields fall back to the built-in defaults.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfigDto {
    pub server_name: Option<String>,
    pub job_history_enable: Option<bool>,
    pub hook_budget_ms: Option<u64>,
    pub node_ncpus: Option<u32>,
}

impl TryFrom<ServerConfigDto> for ServerConfig {
    type Error = Error;

    fn try_from(dto: ServerConfigDto) -> Result<ServerConfig> {
        let defaults = ServerConfig::default();
        let config = ServerConfig {
            server_name: dto.server_name.unwrap_or(defaults.server_name),
            job_history_enable: dto.job_history_enable.unwrap_or(defaults.job_history_enable),
            hook_budget_ms: dto.hook_budget_ms.unwrap_or(defaults.hook_budget_ms),
            node_ncpus: dto.node_ncpus.unwrap_or(defaults.node_ncpus),
        };

        if config.server_name.is_empty() {
            return Err(Error::ValidationError("serverName must not be empty".to_string()));
        }
        if config.hook_budget_ms == 0 {
            return Err(Error::ValidationError("hookBudgetMs must be positive".to_string()));
        }
        if config.node_ncpus == 0 {
            return Err(Error::ValidationError("nodeNcpus must be positive".to_string()));
        }
        Ok(config)
    }
}

use std::sync::Arc;

use crate::api::config_dto::ServerConfigDto;
use crate::domain::clock::SystemClock;
use crate::domain::server::{Server, ServerConfig};
use crate::error::Result;
use crate::loader::parser::parse_json_file;

pub mod api;
pub mod domain;
pub mod error;
pub mod loader;
pub mod logger;

/// Boots a batch server from a JSON configuration file.
pub fn boot_server(config_path: &str, clock: Arc<dyn SystemClock>) -> Result<Server> {
    logger::init();
    log::info!("Logger initialized. Booting batch server.");

    let dto: ServerConfigDto = parse_json_file::<ServerConfigDto>(config_path)?;
    log::info!("Configuration file parsed successfully.");

    let config = ServerConfig::try_from(dto)?;
    Ok(Server::new(config, clock))
}

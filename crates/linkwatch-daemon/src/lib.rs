//! Linkwatch daemon
//!
//! Wires [`linkwatch_engine::Engine`] to a TOML directory, HTTP webhook
//! gateways and a JSON-lines feed of samples and replies.

pub mod config;
pub mod directory;
pub mod gateway;
pub mod input;

use std::sync::Arc;

use anyhow::Result;
use linkwatch_engine::{Channel, Dispatcher, Engine, MemoryStore};
use tracing::{info, warn};

use config::DaemonConfig;
use directory::Directory;
use gateway::WebhookGateway;

/// Build an engine from a loaded config, backed by an in-memory store.
pub fn build_engine(config: &DaemonConfig) -> Result<Engine> {
    let directory = Arc::new(Directory::from_config(config));
    info!(networks = directory.network_count(), "Directory loaded");

    let engine = Engine::new(
        config.engine.clone(),
        MemoryStore::new().shared(),
        directory,
        build_dispatcher(config),
    )?;
    Ok(engine)
}

/// One webhook gateway per configured channel.
pub fn build_dispatcher(config: &DaemonConfig) -> Dispatcher {
    let mut dispatcher = Dispatcher::new(config.engine.dispatch.clone());
    for (channel, webhook) in [
        (Channel::Chat, &config.gateways.chat),
        (Channel::Email, &config.gateways.email),
    ] {
        if let Some(webhook) = webhook {
            dispatcher = dispatcher.with_gateway(Arc::new(WebhookGateway::new(channel, webhook)));
        }
        if !dispatcher.has_gateway(channel) {
            warn!(%channel, "No gateway configured; sends will be recorded as failed");
        }
    }
    dispatcher
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatcher_registers_configured_gateways_only() {
        let config = DaemonConfig::from_toml_str(
            r#"
[gateways.chat]
url = "http://127.0.0.1:9/chat"
"#,
        )
        .unwrap();
        let dispatcher = build_dispatcher(&config);
        assert!(dispatcher.has_gateway(Channel::Chat));
        assert!(!dispatcher.has_gateway(Channel::Email));
    }
}

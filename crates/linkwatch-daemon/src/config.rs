use std::collections::HashSet;
use std::path::Path;

use anyhow::{bail, Context, Result};
use linkwatch_engine::{EngineConfig, RecipientRole};
use serde::Deserialize;

/// Webhook relay for one channel.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookConfig {
    pub url: String,
    /// Sent as `Authorization: Bearer <token>` when present.
    #[serde(default)]
    pub token: Option<String>,
}

/// Configured gateways; a channel without one records every send as Failed.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GatewaysConfig {
    #[serde(default)]
    pub chat: Option<WebhookConfig>,
    #[serde(default)]
    pub email: Option<WebhookConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkEntry {
    pub id: String,
    pub name: String,
    pub site_id: String,
    pub isp_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SiteEntry {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IspEntry {
    pub id: String,
    pub name: String,
}

/// A site PIC (attached by `site_id`) or ISP helpdesk (by `isp_id`).
#[derive(Debug, Clone, Deserialize)]
pub struct ContactEntry {
    pub id: String,
    pub name: String,
    pub role: RecipientRole,
    #[serde(default)]
    pub site_id: Option<String>,
    #[serde(default)]
    pub isp_id: Option<String>,
    #[serde(default)]
    pub priority: u32,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub chat_address: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

fn default_active() -> bool {
    true
}

/// Top-level daemon configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DaemonConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub gateways: GatewaysConfig,
    #[serde(default)]
    pub networks: Vec<NetworkEntry>,
    #[serde(default)]
    pub sites: Vec<SiteEntry>,
    #[serde(default)]
    pub isps: Vec<IspEntry>,
    #[serde(default)]
    pub contacts: Vec<ContactEntry>,
}

impl DaemonConfig {
    /// Read, parse and validate a config file, then apply env overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_toml_str(&raw).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw).context("Failed to parse TOML")?;
        config.engine = config.engine.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Check engine settings and directory cross-references.
    pub fn validate(&self) -> Result<()> {
        self.engine.validate()?;

        let sites: HashSet<&str> = self.sites.iter().map(|s| s.id.as_str()).collect();
        let isps: HashSet<&str> = self.isps.iter().map(|i| i.id.as_str()).collect();

        let mut network_ids = HashSet::new();
        for network in &self.networks {
            if !network_ids.insert(network.id.as_str()) {
                bail!("duplicate network id '{}'", network.id);
            }
            if !sites.contains(network.site_id.as_str()) {
                bail!("network '{}' references unknown site '{}'", network.id, network.site_id);
            }
            if !isps.contains(network.isp_id.as_str()) {
                bail!("network '{}' references unknown isp '{}'", network.id, network.isp_id);
            }
        }

        for contact in &self.contacts {
            match contact.role {
                RecipientRole::SitePic => match contact.site_id.as_deref() {
                    Some(site) if sites.contains(site) => {}
                    Some(site) => bail!("contact '{}' references unknown site '{}'", contact.id, site),
                    None => bail!("site PIC '{}' needs a site_id", contact.id),
                },
                RecipientRole::IspHelpdesk => match contact.isp_id.as_deref() {
                    Some(isp) if isps.contains(isp) => {}
                    Some(isp) => bail!("contact '{}' references unknown isp '{}'", contact.id, isp),
                    None => bail!("ISP helpdesk '{}' needs an isp_id", contact.id),
                },
            }
        }

        for (name, gateway) in [("chat", &self.gateways.chat), ("email", &self.gateways.email)] {
            if let Some(gateway) = gateway {
                if !gateway.url.starts_with("http://") && !gateway.url.starts_with("https://") {
                    bail!("{} gateway url must be http(s): {}", name, gateway.url);
                }
            }
        }
        Ok(())
    }
}

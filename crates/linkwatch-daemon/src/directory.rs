//! Reference data loaded from the daemon config
//!
//! Networks, sites, ISPs and their contacts are static for the life of the
//! process; [`Directory`] indexes them for the engine's lookups.

use std::collections::HashMap;

use async_trait::async_trait;
use linkwatch_engine::{EngineResult, Network, Recipient, RecipientRole, ReferenceData};

use crate::config::{ContactEntry, DaemonConfig};

#[derive(Debug, Default)]
pub struct Directory {
    networks: HashMap<String, Network>,
    site_contacts: HashMap<String, Vec<Recipient>>,
    isp_contacts: HashMap<String, Vec<Recipient>>,
}

impl Directory {
    pub fn from_config(config: &DaemonConfig) -> Self {
        let networks = config
            .networks
            .iter()
            .map(|n| {
                (
                    n.id.clone(),
                    Network::new(n.id.clone(), n.name.clone(), n.site_id.clone(), n.isp_id.clone()),
                )
            })
            .collect();

        let mut site_contacts: HashMap<String, Vec<Recipient>> = HashMap::new();
        let mut isp_contacts: HashMap<String, Vec<Recipient>> = HashMap::new();
        for contact in &config.contacts {
            let owner = match contact.role {
                RecipientRole::SitePic => contact
                    .site_id
                    .as_ref()
                    .map(|site| site_contacts.entry(site.clone()).or_default()),
                RecipientRole::IspHelpdesk => contact
                    .isp_id
                    .as_ref()
                    .map(|isp| isp_contacts.entry(isp.clone()).or_default()),
            };
            if let Some(list) = owner {
                list.push(recipient(contact));
            }
        }

        Self {
            networks,
            site_contacts,
            isp_contacts,
        }
    }

    pub fn network_count(&self) -> usize {
        self.networks.len()
    }
}

fn recipient(contact: &ContactEntry) -> Recipient {
    Recipient {
        id: contact.id.clone(),
        name: contact.name.clone(),
        role: contact.role,
        priority: contact.priority,
        active: contact.active,
        chat_address: contact.chat_address.clone(),
        email: contact.email.clone(),
    }
}

#[async_trait]
impl ReferenceData for Directory {
    async fn get_network(&self, network_id: &str) -> EngineResult<Option<Network>> {
        Ok(self.networks.get(network_id).cloned())
    }

    async fn get_recipients_for_network(&self, network_id: &str) -> EngineResult<Vec<Recipient>> {
        let Some(network) = self.networks.get(network_id) else {
            return Ok(Vec::new());
        };
        let mut recipients = Vec::new();
        if let Some(site) = self.site_contacts.get(&network.site_id) {
            recipients.extend(site.iter().cloned());
        }
        if let Some(isp) = self.isp_contacts.get(&network.isp_id) {
            recipients.extend(isp.iter().cloned());
        }
        Ok(recipients)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
[[sites]]
id = "s1"
name = "Kuta"

[[sites]]
id = "s2"
name = "Ubud"

[[isps]]
id = "i1"
name = "Metronet"

[[networks]]
id = "n1"
name = "Kuta primary"
site_id = "s1"
isp_id = "i1"

[[networks]]
id = "n2"
name = "Ubud primary"
site_id = "s2"
isp_id = "i1"

[[contacts]]
id = "pic-kuta"
name = "Wayan"
role = "site_pic"
site_id = "s1"
chat_address = "+62811"

[[contacts]]
id = "pic-ubud"
name = "Made"
role = "site_pic"
site_id = "s2"
chat_address = "+62812"

[[contacts]]
id = "noc"
name = "Metronet NOC"
role = "isp_helpdesk"
isp_id = "i1"
email = "noc@metronet.example"
"#;

    #[tokio::test]
    async fn test_recipients_follow_site_and_isp() {
        let config = DaemonConfig::from_toml_str(CONFIG).unwrap();
        let directory = Directory::from_config(&config);
        assert_eq!(directory.network_count(), 2);

        let ids: Vec<String> = directory
            .get_recipients_for_network("n1")
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["pic-kuta", "noc"]);

        let network = directory.get_network("n2").await.unwrap().unwrap();
        assert_eq!(network.name, "Ubud primary");
    }

    #[tokio::test]
    async fn test_unknown_network() {
        let directory = Directory::from_config(&DaemonConfig::default());
        assert!(directory.get_network("nope").await.unwrap().is_none());
        assert!(directory
            .get_recipients_for_network("nope")
            .await
            .unwrap()
            .is_empty());
    }
}

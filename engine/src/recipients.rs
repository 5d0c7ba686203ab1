//! Recipient Resolver
//!
//! Orders the contacts for a network: active site PICs first, then active
//! ISP helpdesks, each group by ascending priority.

use tracing::debug;

use crate::error::EngineResult;
use crate::ports::SharedReferenceData;
use crate::types::ResolvedRecipient;

#[derive(Clone)]
pub struct RecipientResolver {
    reference: SharedReferenceData,
}

impl RecipientResolver {
    pub fn new(reference: SharedReferenceData) -> Self {
        Self { reference }
    }

    /// Resolve the ordered recipient list for a network.
    ///
    /// An empty list is a valid answer, not an error.
    pub async fn resolve(&self, network_id: &str) -> EngineResult<Vec<ResolvedRecipient>> {
        let mut contacts = self.reference.get_recipients_for_network(network_id).await?;
        contacts.sort_by(|a, b| {
            a.role
                .cmp(&b.role)
                .then(a.priority.cmp(&b.priority))
                .then_with(|| a.id.cmp(&b.id))
        });

        let resolved: Vec<ResolvedRecipient> = contacts
            .into_iter()
            .filter_map(|recipient| {
                if !recipient.active {
                    debug!(network_id, recipient_id = %recipient.id, "Skipping inactive recipient");
                    return None;
                }
                let Some((channel, address)) = recipient.preferred_channel() else {
                    debug!(network_id, recipient_id = %recipient.id, "Skipping recipient without address");
                    return None;
                };
                let address = address.to_string();
                Some(ResolvedRecipient {
                    recipient,
                    channel,
                    address,
                })
            })
            .collect();

        debug!(network_id, count = resolved.len(), "Recipients resolved");
        Ok(resolved)
    }
}

//! Campaign identity for correlating a run with its external records.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Identifies the campaign a run generates content for.
///
/// Identifiers are opaque strings owned by the external record store.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct CampaignIdentity {
    /// The user that owns the campaign.
    pub user_id: String,
    /// The project (campaign) record.
    pub project_id: String,
    /// The product being marketed.
    #[serde(default)]
    pub product_id: String,
}

impl CampaignIdentity {
    /// Creates a new identity.
    #[must_use]
    pub fn new(
        user_id: impl Into<String>,
        project_id: impl Into<String>,
        product_id: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            project_id: project_id.into(),
            product_id: product_id.into(),
        }
    }

    /// Converts to a map of non-empty identifiers for span attributes.
    #[must_use]
    pub fn to_attributes(&self) -> HashMap<String, String> {
        let mut attrs = HashMap::new();
        for (key, value) in [
            ("campaign.user_id", &self.user_id),
            ("campaign.project_id", &self.project_id),
            ("campaign.product_id", &self.product_id),
        ] {
            if !value.is_empty() {
                attrs.insert(key.to_string(), value.clone());
            }
        }
        attrs
    }
}

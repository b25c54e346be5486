//! Data types exchanged with the Senler API.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Parameters of an API method call, sent as a JSON object.
pub type RequestParams = Map<String, Value>;

/// Undecoded JSON response body.
pub type RawResponse = Value;

/// Group identifiers that scope a request to one community.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GroupScope {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vk_group_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<u64>,
}

impl GroupScope {
    pub fn is_empty(&self) -> bool {
        self.vk_group_id.is_none() && self.group_id.is_none()
    }

    /// Adds the configured ids to `params`. Keys the caller already set are kept.
    pub fn merge_into(&self, params: &mut RequestParams) {
        if let Some(id) = self.vk_group_id {
            params
                .entry("vk_group_id")
                .or_insert_with(|| Value::from(id));
        }
        if let Some(id) = self.group_id {
            params.entry("group_id").or_insert_with(|| Value::from(id));
        }
    }
}

use crate::wire::WireMode;

use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};

/// Configuration for a broker-backed stream.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Config {
    /// Broker endpoints.
    pub endpoints: Vec<String>,

    /// Topic to read from and publish to.
    pub topic: String,

    /// Maximum number of read but not yet acknowledged messages.
    #[serde(default = "default_max_inflight_messages")]
    pub max_inflight_messages: NonZeroUsize,

    /// Wire layout of payloads on the topic.
    #[serde(default)]
    pub wire: WireMode,

    /// Return malformed messages as errors instead of skipping them.
    #[serde(default)]
    pub forward_unmarshal_errors: bool,
}

const fn default_max_inflight_messages() -> NonZeroUsize {
    NonZeroUsize::MIN
}

use callfeed_protocol::{AccessCredential, ApiKey, Downstream, System};
use serde::{Deserialize, Serialize};

/// Everything `loadConfig` returns (spec §4.A), as held by
/// `callfeed-control::config::ConfigSnapshot`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ConfigData {
    pub systems: Vec<System>,
    pub groups: Vec<String>,
    pub tags: Vec<String>,
    pub credentials: Vec<AccessCredential>,
    pub api_keys: Vec<ApiKey>,
    pub downstreams: Vec<Downstream>,
    pub settings: Settings,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Settings {
    pub branding: String,
}

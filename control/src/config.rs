use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use callfeed_protocol::{AccessCredential, ApiKey, Downstream, System, SystemId, TalkgroupId};
use callfeed_store::ConfigData;

/// An indexed, immutable view of the long-lived configuration (spec §3:
/// "Systems/.../Downstreams are long-lived configuration ... observed by the
/// core via a reload signal"). Built once per `loadConfig` and swapped in
/// whole by `ConfigHandle::reload`.
pub struct ConfigSnapshot {
    pub data: ConfigData,
    credentials_by_code: HashMap<String, AccessCredential>,
    api_keys_by_key: HashMap<String, ApiKey>,
    systems_by_id: HashMap<SystemId, System>,
}

impl ConfigSnapshot {
    pub fn new(data: ConfigData) -> Self {
        let credentials_by_code = data
            .credentials
            .iter()
            .map(|c| (c.code.clone(), c.clone()))
            .collect();
        let api_keys_by_key = data.api_keys.iter().map(|k| (k.key.clone(), k.clone())).collect();
        let systems_by_id = data.systems.iter().map(|s| (s.id, s.clone())).collect();
        Self {
            data,
            credentials_by_code,
            api_keys_by_key,
            systems_by_id,
        }
    }

    pub fn credential(&self, code: &str) -> Option<&AccessCredential> {
        self.credentials_by_code.get(code)
    }

    pub fn api_key(&self, key: &str) -> Option<&ApiKey> {
        self.api_keys_by_key.get(key)
    }

    pub fn system(&self, id: SystemId) -> Option<&System> {
        self.systems_by_id.get(&id)
    }

    pub fn downstreams(&self) -> &[Downstream] {
        &self.data.downstreams
    }

    /// Talkgroup ids under `system` carrying `group` as their group label.
    pub fn talkgroups_in_group(&self, system: SystemId, group: &str) -> Vec<TalkgroupId> {
        self.systems_by_id
            .get(&system)
            .map(|s| s.talkgroups.iter().filter(|t| t.group == group).map(|t| t.id).collect())
            .unwrap_or_default()
    }

    /// Talkgroup ids under `system` carrying `tag` as their tag label.
    pub fn talkgroups_with_tag(&self, system: SystemId, tag: &str) -> Vec<TalkgroupId> {
        self.systems_by_id
            .get(&system)
            .map(|s| s.talkgroups.iter().filter(|t| t.tag == tag).map(|t| t.id).collect())
            .unwrap_or_default()
    }

}

/// Copy-on-write config cell (spec §9 "Configuration reload vs in-flight
/// sessions"): a reload publishes a brand-new snapshot; holders keep their
/// `Arc` until they next re-derive against the latest one.
#[derive(Clone)]
pub struct ConfigHandle(Arc<ArcSwap<ConfigSnapshot>>);

impl ConfigHandle {
    pub fn new(initial: ConfigSnapshot) -> Self {
        Self(Arc::new(ArcSwap::from_pointee(initial)))
    }

    pub fn load(&self) -> Arc<ConfigSnapshot> {
        self.0.load_full()
    }

    pub fn reload(&self, data: ConfigData) {
        self.0.store(Arc::new(ConfigSnapshot::new(data)));
    }
}

use chrono::Utc;
use callfeed_protocol::{PublicConfig, SystemId, SystemsAllow, TalkgroupId};

use crate::config::ConfigHandle;

/// Why a presented credential or API key was rejected (spec §4.B).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reject {
    Unknown,
    Expired,
    Disabled,
}

/// The effective (systems, talkgroups, concurrency cap) tuple derived from a
/// credential (spec §GLOSSARY "Permission"). Immutable for the life of the
/// session that holds it; a config reload never retroactively widens it.
#[derive(Clone, Debug)]
pub struct Permission {
    pub code: String,
    pub systems: SystemsAllow,
    pub limit: Option<u32>,
}

impl Permission {
    pub fn allows(&self, sys: SystemId, tg: TalkgroupId) -> bool {
        self.systems.allows(sys, tg)
    }

    pub fn allows_system(&self, sys: SystemId) -> bool {
        self.systems.allows_system(sys)
    }
}

/// The same tuple for an ingestion `ApiKey` (no concurrency cap — ingestion
/// is not session-bound).
#[derive(Clone, Debug)]
pub struct ApiKeyPermission {
    pub ident: String,
    pub systems: SystemsAllow,
}

/// Maps presented credentials/API keys to their `Permission` (spec §4.B).
#[derive(Clone)]
pub struct AccessController {
    config: ConfigHandle,
}

impl AccessController {
    pub fn new(config: ConfigHandle) -> Self {
        Self { config }
    }

    pub fn resolve(&self, code: &str) -> Result<Permission, Reject> {
        let snapshot = self.config.load();
        let credential = snapshot.credential(code).ok_or(Reject::Unknown)?;
        if let Some(expiration) = credential.expiration {
            if expiration <= Utc::now() {
                return Err(Reject::Expired);
            }
        }
        Ok(Permission {
            code: credential.code.clone(),
            systems: credential.systems.clone(),
            limit: credential.limit,
        })
    }

    pub fn resolve_api_key(&self, key: &str) -> Result<ApiKeyPermission, Reject> {
        let snapshot = self.config.load();
        let api_key = snapshot.api_key(key).ok_or(Reject::Unknown)?;
        if api_key.disabled {
            return Err(Reject::Disabled);
        }
        Ok(ApiKeyPermission {
            ident: api_key.ident.clone(),
            systems: api_key.systems.clone(),
        })
    }

    /// Builds the `CFG` payload: the full config narrowed to what `permission`
    /// allows, with each system's talkgroup list narrowed in turn.
    pub fn public_config(&self, permission: &Permission) -> PublicConfig {
        let snapshot = self.config.load();
        let systems = snapshot
            .data
            .systems
            .iter()
            .filter(|s| permission.allows_system(s.id))
            .map(|s| {
                let mut s = s.clone();
                s.talkgroups.retain(|t| permission.allows(s.id, t.id));
                s
            })
            .collect();
        PublicConfig {
            systems,
            groups: snapshot.data.groups.clone(),
            tags: snapshot.data.tags.clone(),
            branding: snapshot.data.settings.branding.clone(),
        }
    }

    pub fn config(&self) -> ConfigHandle {
        self.config.clone()
    }
}

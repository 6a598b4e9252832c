use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{CallId, SystemId, TalkgroupId, UnitId};

/// Per-talkgroup entry of an allow-list: either every talkgroup under the
/// system, or an explicit list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TalkgroupScope {
    All(AllMarker),
    List(Vec<TalkgroupId>),
}

/// Serializes/deserializes as the literal string `"*"`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AllMarker;

impl Serialize for AllMarker {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str("*")
    }
}

impl<'de> Deserialize<'de> for AllMarker {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        if s == "*" {
            Ok(AllMarker)
        } else {
            Err(serde::de::Error::custom("expected \"*\""))
        }
    }
}

impl TalkgroupScope {
    pub fn allows(&self, tg: TalkgroupId) -> bool {
        match self {
            TalkgroupScope::All(_) => true,
            TalkgroupScope::List(list) => list.contains(&tg),
        }
    }
}

/// A credential/apiKey/downstream allow-list: `"*"` (every system), or a
/// structured map of system id to its talkgroup scope.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SystemsAllow {
    All(AllMarker),
    Scoped(HashMap<SystemId, TalkgroupScope>),
}

impl SystemsAllow {
    pub fn allows(&self, sys: SystemId, tg: TalkgroupId) -> bool {
        match self {
            SystemsAllow::All(_) => true,
            SystemsAllow::Scoped(map) => map.get(&sys).is_some_and(|scope| scope.allows(tg)),
        }
    }

    /// True if the system is present at all (any talkgroup scope), used by
    /// ingestion's auto-populate gate.
    pub fn allows_system(&self, sys: SystemId) -> bool {
        match self {
            SystemsAllow::All(_) => true,
            SystemsAllow::Scoped(map) => map.contains_key(&sys),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrequencyEntry {
    pub pos: f64,
    pub freq: i64,
    pub len: f64,
    pub error_count: i64,
    pub spike_count: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SourceEntry {
    pub pos: f64,
    pub src: UnitId,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Call {
    pub id: CallId,
    pub date_time: DateTime<Utc>,
    pub system: SystemId,
    pub talkgroup: TalkgroupId,
    pub frequency: Option<i64>,
    pub source: Option<UnitId>,
    #[serde(default)]
    pub sources: Vec<SourceEntry>,
    #[serde(default)]
    pub frequencies: Vec<FrequencyEntry>,
    #[serde(default)]
    pub patches: Vec<TalkgroupId>,
    /// Exactly one of `audio`/`audio_url` is resolvable; enforced at ingest.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio: Option<Vec<u8>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
    pub audio_name: Option<String>,
    pub audio_type: Option<String>,
}

/// A `Call` as returned from `searchCalls`: audio is never included.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CallSummary {
    pub id: CallId,
    pub date_time: DateTime<Utc>,
    pub system: SystemId,
    pub talkgroup: TalkgroupId,
    pub frequency: Option<i64>,
    pub source: Option<UnitId>,
    #[serde(default)]
    pub patches: Vec<TalkgroupId>,
    pub audio_name: Option<String>,
    pub audio_type: Option<String>,
}

impl From<&Call> for CallSummary {
    fn from(c: &Call) -> Self {
        Self {
            id: c.id,
            date_time: c.date_time,
            system: c.system,
            talkgroup: c.talkgroup,
            frequency: c.frequency,
            source: c.source,
            patches: c.patches.clone(),
            audio_name: c.audio_name.clone(),
            audio_type: c.audio_type.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Talkgroup {
    pub id: TalkgroupId,
    pub label: String,
    pub name: String,
    pub group: String,
    pub tag: String,
    pub frequency: Option<i64>,
    pub led: Option<String>,
    pub order: i32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Unit {
    pub id: UnitId,
    pub label: String,
    pub order: i32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct System {
    pub id: SystemId,
    pub label: String,
    pub led: Option<String>,
    pub order: i32,
    pub auto_populate: bool,
    #[serde(default)]
    pub blacklists: HashSet<TalkgroupId>,
    #[serde(default)]
    pub talkgroups: Vec<Talkgroup>,
    #[serde(default)]
    pub units: Vec<Unit>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AccessCredential {
    pub code: String,
    pub ident: String,
    pub expiration: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
    pub order: i32,
    pub systems: SystemsAllow,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiKey {
    pub key: String,
    pub ident: String,
    pub disabled: bool,
    pub order: i32,
    pub systems: SystemsAllow,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Downstream {
    pub url: String,
    pub api_key: String,
    pub disabled: bool,
    pub order: i32,
    pub systems: SystemsAllow,
}

/// The subset of configuration sent to a client as `CFG`, already filtered
/// to a permitted set (see `callfeed-control::access`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PublicConfig {
    pub systems: Vec<System>,
    pub groups: Vec<String>,
    pub tags: Vec<String>,
    pub branding: String,
}

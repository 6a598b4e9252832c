//! Wire codec for the control channel: every frame is a JSON array whose
//! first element is a three-letter command tag (spec §4.I / §6).

use serde::de::Error as DeError;
use serde::ser::{Error as SerError, SerializeSeq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::ids::CallId;
use crate::livefeed::LivefeedMap;
use crate::model::{Call, PublicConfig};
use crate::options::{SearchOptions, SearchResult};

#[derive(Clone, Debug, PartialEq)]
pub enum ClientMessage {
    Ver,
    Pin { credential_b64: String },
    Lfm(Option<LivefeedMap>),
    Cal { id: CallId, flag: Value },
    Lcl(SearchOptions),
    Unknown(String),
}

#[derive(Clone, Debug, PartialEq)]
pub enum ServerMessage {
    Ver { branding: String, version: String },
    PinAck,
    Xpr,
    Max,
    Cfg(Box<PublicConfig>),
    Cal { call: Box<Call>, flag: Value },
    Lcl(Box<SearchResult>),
    Lsc(i64),
}

fn tag_err<E: DeError>(msg: impl Into<String>) -> E {
    E::custom(msg.into())
}

impl Serialize for ClientMessage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let values: Vec<Value> = match self {
            ClientMessage::Ver => vec![Value::String("VER".into())],
            ClientMessage::Pin { credential_b64 } => {
                vec![Value::String("PIN".into()), Value::String(credential_b64.clone())]
            }
            ClientMessage::Lfm(map) => {
                let payload = match map {
                    Some(m) => serde_json::to_value(m).map_err(S::Error::custom)?,
                    None => Value::Null,
                };
                vec![Value::String("LFM".into()), payload]
            }
            ClientMessage::Cal { id, flag } => vec![
                Value::String("CAL".into()),
                serde_json::to_value(id).map_err(S::Error::custom)?,
                flag.clone(),
            ],
            ClientMessage::Lcl(opts) => vec![
                Value::String("LCL".into()),
                serde_json::to_value(opts).map_err(S::Error::custom)?,
            ],
            ClientMessage::Unknown(tag) => vec![Value::String(tag.clone())],
        };
        let mut seq = serializer.serialize_seq(Some(values.len()))?;
        for v in &values {
            seq.serialize_element(v)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for ClientMessage {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let arr = Vec::<Value>::deserialize(deserializer)?;
        let tag = arr
            .first()
            .and_then(Value::as_str)
            .ok_or_else(|| tag_err("missing command tag"))?
            .to_string();

        Ok(match tag.as_str() {
            "VER" => ClientMessage::Ver,
            "PIN" => {
                let s = arr
                    .get(1)
                    .and_then(Value::as_str)
                    .ok_or_else(|| tag_err("PIN missing credential"))?;
                ClientMessage::Pin { credential_b64: s.to_string() }
            }
            "LFM" => {
                let payload = arr.get(1).cloned().unwrap_or(Value::Null);
                if payload.is_null() {
                    ClientMessage::Lfm(None)
                } else {
                    let map: LivefeedMap = serde_json::from_value(payload).map_err(D::Error::custom)?;
                    ClientMessage::Lfm(Some(map))
                }
            }
            "CAL" => {
                let id_val = arr.get(1).cloned().ok_or_else(|| tag_err("CAL missing id"))?;
                let id: CallId = serde_json::from_value(id_val).map_err(D::Error::custom)?;
                let flag = arr.get(2).cloned().unwrap_or(Value::Null);
                ClientMessage::Cal { id, flag }
            }
            "LCL" => {
                let opts_val = arr.get(1).cloned().unwrap_or(Value::Null);
                let opts: SearchOptions = serde_json::from_value(opts_val).map_err(D::Error::custom)?;
                ClientMessage::Lcl(opts)
            }
            other => ClientMessage::Unknown(other.to_string()),
        })
    }
}

impl Serialize for ServerMessage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let values: Vec<Value> = match self {
            ServerMessage::Ver { branding, version } => vec![
                Value::String("VER".into()),
                serde_json::json!({ "branding": branding, "version": version }),
            ],
            ServerMessage::PinAck => vec![Value::String("PIN".into())],
            ServerMessage::Xpr => vec![Value::String("XPR".into())],
            ServerMessage::Max => vec![Value::String("MAX".into())],
            ServerMessage::Cfg(cfg) => vec![
                Value::String("CFG".into()),
                serde_json::to_value(cfg.as_ref()).map_err(S::Error::custom)?,
            ],
            ServerMessage::Cal { call, flag } => vec![
                Value::String("CAL".into()),
                serde_json::to_value(call.as_ref()).map_err(S::Error::custom)?,
                flag.clone(),
            ],
            ServerMessage::Lcl(result) => vec![
                Value::String("LCL".into()),
                serde_json::to_value(result.as_ref()).map_err(S::Error::custom)?,
            ],
            ServerMessage::Lsc(count) => {
                vec![Value::String("LSC".into()), Value::Number((*count).into())]
            }
        };
        let mut seq = serializer.serialize_seq(Some(values.len()))?;
        for v in &values {
            seq.serialize_element(v)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for ServerMessage {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let arr = Vec::<Value>::deserialize(deserializer)?;
        let tag = arr
            .first()
            .and_then(Value::as_str)
            .ok_or_else(|| tag_err("missing command tag"))?
            .to_string();

        Ok(match tag.as_str() {
            "VER" => {
                let payload = arr.get(1).cloned().unwrap_or(Value::Null);
                let branding = payload.get("branding").and_then(Value::as_str).unwrap_or("").to_string();
                let version = payload.get("version").and_then(Value::as_str).unwrap_or("").to_string();
                ServerMessage::Ver { branding, version }
            }
            "PIN" => ServerMessage::PinAck,
            "XPR" => ServerMessage::Xpr,
            "MAX" => ServerMessage::Max,
            "CFG" => {
                let payload = arr.get(1).cloned().ok_or_else(|| tag_err("CFG missing payload"))?;
                let cfg: PublicConfig = serde_json::from_value(payload).map_err(D::Error::custom)?;
                ServerMessage::Cfg(Box::new(cfg))
            }
            "CAL" => {
                let call_val = arr.get(1).cloned().ok_or_else(|| tag_err("CAL missing call"))?;
                let call: Call = serde_json::from_value(call_val).map_err(D::Error::custom)?;
                let flag = arr.get(2).cloned().unwrap_or(Value::Null);
                ServerMessage::Cal { call: Box::new(call), flag }
            }
            "LCL" => {
                let payload = arr.get(1).cloned().ok_or_else(|| tag_err("LCL missing payload"))?;
                let result: SearchResult = serde_json::from_value(payload).map_err(D::Error::custom)?;
                ServerMessage::Lcl(Box::new(result))
            }
            "LSC" => {
                let n = arr.get(1).and_then(Value::as_i64).ok_or_else(|| tag_err("LSC missing count"))?;
                ServerMessage::Lsc(n)
            }
            other => return Err(tag_err(format!("unknown server tag: {other}"))),
        })
    }
}

/// Encode a message as a single JSON line (the unit exchanged over the
/// transport).
pub fn encode<T: Serialize>(msg: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string(msg)
}

pub fn decode<'a, T: Deserialize<'a>>(text: &'a str) -> Result<T, serde_json::Error> {
    serde_json::from_str(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::SystemId;
    use std::collections::HashMap;

    #[test]
    fn ver_request_round_trips() {
        let msg = ClientMessage::Ver;
        let text = encode(&msg).unwrap();
        assert_eq!(text, r#"["VER"]"#);
        let back: ClientMessage = decode(&text).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn pin_round_trips() {
        let msg = ClientMessage::Pin { credential_b64: "Zm9v".into() };
        let text = encode(&msg).unwrap();
        let back: ClientMessage = decode(&text).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn lfm_null_round_trips() {
        let msg = ClientMessage::Lfm(None);
        let text = encode(&msg).unwrap();
        assert_eq!(text, r#"["LFM",null]"#);
        let back: ClientMessage = decode(&text).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn lfm_map_round_trips() {
        let mut inner = HashMap::new();
        inner.insert(crate::ids::TalkgroupId(1001), true);
        inner.insert(crate::ids::TalkgroupId(1002), false);
        let mut outer = HashMap::new();
        outer.insert(SystemId(1), inner);
        let msg = ClientMessage::Lfm(Some(LivefeedMap(outer)));
        let text = encode(&msg).unwrap();
        let back: ClientMessage = decode(&text).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn unknown_tag_is_ignored_not_error() {
        let back: ClientMessage = decode(r#"["ZZZ",1,2,3]"#).unwrap();
        assert_eq!(back, ClientMessage::Unknown("ZZZ".into()));
    }

    #[test]
    fn lsc_round_trips() {
        let msg = ServerMessage::Lsc(42);
        let text = encode(&msg).unwrap();
        assert_eq!(text, r#"["LSC",42]"#);
        let back: ServerMessage = decode(&text).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn xpr_max_have_no_payload() {
        assert_eq!(encode(&ServerMessage::Xpr).unwrap(), r#"["XPR"]"#);
        assert_eq!(encode(&ServerMessage::Max).unwrap(), r#"["MAX"]"#);
    }
}

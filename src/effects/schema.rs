//! In-memory shape of an effect file.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// Schema version written into every saved effect.
pub const SAVE_FORMAT: u32 = 2;

/// Effect flavour, stored on disk as an integer code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EffectType {
    Layered,
    Scripted,
    Sequence,
}

impl EffectType {
    pub fn code(self) -> u64 {
        match self {
            EffectType::Layered => 1,
            EffectType::Scripted => 2,
            EffectType::Sequence => 3,
        }
    }

    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            1 => Some(EffectType::Layered),
            2 => Some(EffectType::Scripted),
            3 => Some(EffectType::Sequence),
            _ => None,
        }
    }
}

impl std::str::FromStr for EffectType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "layered" => Ok(EffectType::Layered),
            "scripted" => Ok(EffectType::Scripted),
            "sequence" => Ok(EffectType::Sequence),
            other => Err(format!("unknown effect type '{other}'")),
        }
    }
}

/// Fields shared by every effect type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectMeta {
    pub name: String,
    pub author: String,
    pub author_url: String,
    pub icon: String,
    pub summary: String,
    pub map_device: String,
    pub map_device_icon: String,
    pub map_graphic: String,
    pub map_cols: u32,
    pub map_rows: u32,
    pub save_format: u32,
    pub revision: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub positions: Vec<[u32; 2]>,
    pub properties: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayeredPayload {
    pub layers: Vec<Layer>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptParameter {
    pub var: String,
    pub label: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub default: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptedPayload {
    pub required_os: Vec<String>,
    pub parameters: Vec<ScriptParameter>,
    pub designed_for: Vec<String>,
    pub optimised_for: Vec<String>,
}

/// Sparse frame: column -> row -> `#RRGGBB`.
pub type Frame = BTreeMap<String, BTreeMap<String, String>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequencePayload {
    pub fps: u32,
    #[serde(rename = "loop")]
    pub looped: bool,
    pub frames: Vec<Frame>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EffectKind {
    Layered(LayeredPayload),
    Scripted(ScriptedPayload),
    Sequence(SequencePayload),
}

/// A complete effect document.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectDefinition {
    pub meta: EffectMeta,
    pub kind: EffectKind,
}

impl EffectDefinition {
    /// Skeleton for a brand-new effect. Never touches disk.
    pub fn init(name: &str, effect_type: EffectType) -> Self {
        let kind = match effect_type {
            EffectType::Layered => EffectKind::Layered(LayeredPayload {
                layers: vec![Layer {
                    name: String::from("Static"),
                    kind: String::from("static"),
                    positions: Vec::new(),
                    properties: Map::from_iter([(String::from("colour"), json!("#00FF00"))]),
                }],
            }),
            EffectType::Scripted => EffectKind::Scripted(ScriptedPayload {
                required_os: vec![String::from("linux")],
                parameters: Vec::new(),
                designed_for: Vec::new(),
                optimised_for: Vec::new(),
            }),
            EffectType::Sequence => EffectKind::Sequence(SequencePayload {
                fps: 10,
                looped: true,
                frames: vec![Frame::new()],
            }),
        };

        Self {
            meta: EffectMeta {
                name: name.to_string(),
                author: String::new(),
                author_url: String::new(),
                icon: String::from("img/general/effects.svg"),
                summary: String::new(),
                map_device: String::new(),
                map_device_icon: String::new(),
                map_graphic: String::new(),
                map_cols: 0,
                map_rows: 0,
                save_format: SAVE_FORMAT,
                revision: 1,
            },
            kind,
        }
    }

    pub fn effect_type(&self) -> EffectType {
        match self.kind {
            EffectKind::Layered(_) => EffectType::Layered,
            EffectKind::Scripted(_) => EffectType::Scripted,
            EffectKind::Sequence(_) => EffectType::Sequence,
        }
    }

    /// Flattens meta and payload into one JSON object.
    pub fn to_value(&self) -> serde_json::Result<Value> {
        let mut doc = match serde_json::to_value(&self.meta)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        let payload = match &self.kind {
            EffectKind::Layered(p) => serde_json::to_value(p)?,
            EffectKind::Scripted(p) => serde_json::to_value(p)?,
            EffectKind::Sequence(p) => serde_json::to_value(p)?,
        };
        if let Value::Object(map) = payload {
            doc.extend(map);
        }
        doc.insert(String::from("type"), json!(self.effect_type().code()));
        Ok(Value::Object(doc))
    }

    /// Inverse of [`EffectDefinition::to_value`]. Expects a validated document.
    pub fn from_value(doc: Value) -> serde_json::Result<Self> {
        let code = doc.get("type").and_then(Value::as_u64).unwrap_or_default();
        let kind = match EffectType::from_code(code) {
            Some(EffectType::Layered) => EffectKind::Layered(serde_json::from_value(doc.clone())?),
            Some(EffectType::Scripted) => {
                EffectKind::Scripted(serde_json::from_value(doc.clone())?)
            }
            Some(EffectType::Sequence) => {
                EffectKind::Sequence(serde_json::from_value(doc.clone())?)
            }
            None => {
                return Err(serde::de::Error::custom(format!(
                    "unknown effect type {code}"
                )));
            }
        };
        Ok(Self {
            meta: serde_json::from_value(doc)?,
            kind,
        })
    }
}

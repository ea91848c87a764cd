//! Schema checklist for effect documents.
//!
//! Every check runs; the result lists all violations so one pass shows
//! everything wrong with a file. An empty list means the document is valid.

use serde_json::{Map, Value};

use super::schema::EffectType;
use crate::device::is_hex_colour;

#[derive(Debug, Clone, Copy)]
enum Kind {
    Str,
    UInt,
    Bool,
    Array,
    Object,
}

impl Kind {
    fn matches(self, value: &Value) -> bool {
        match self {
            Kind::Str => value.is_string(),
            Kind::UInt => value.is_u64(),
            Kind::Bool => value.is_boolean(),
            Kind::Array => value.is_array(),
            Kind::Object => value.is_object(),
        }
    }

    fn name(self) -> &'static str {
        match self {
            Kind::Str => "string",
            Kind::UInt => "unsigned integer",
            Kind::Bool => "boolean",
            Kind::Array => "array",
            Kind::Object => "object",
        }
    }
}

const META_KEYS: [(&str, Kind); 13] = [
    ("name", Kind::Str),
    ("type", Kind::UInt),
    ("author", Kind::Str),
    ("author_url", Kind::Str),
    ("icon", Kind::Str),
    ("summary", Kind::Str),
    ("map_device", Kind::Str),
    ("map_device_icon", Kind::Str),
    ("map_graphic", Kind::Str),
    ("map_cols", Kind::UInt),
    ("map_rows", Kind::UInt),
    ("save_format", Kind::UInt),
    ("revision", Kind::UInt),
];

struct Checklist {
    violations: Vec<String>,
}

impl Checklist {
    fn require<'a>(
        &mut self,
        obj: &'a Map<String, Value>,
        at: &str,
        key: &str,
        kind: Kind,
    ) -> Option<&'a Value> {
        match obj.get(key) {
            None => {
                self.violations.push(format!("{at}{key}: missing"));
                None
            }
            Some(value) if !kind.matches(value) => {
                self.violations
                    .push(format!("{at}{key}: expected {}", kind.name()));
                None
            }
            Some(value) => Some(value),
        }
    }

    fn require_strings(&mut self, obj: &Map<String, Value>, key: &str) {
        if let Some(Value::Array(items)) = self.require(obj, "", key, Kind::Array) {
            for (idx, item) in items.iter().enumerate() {
                if !item.is_string() {
                    self.violations
                        .push(format!("{key}[{idx}]: expected string"));
                }
            }
        }
    }

    fn objects<'a>(
        &mut self,
        obj: &'a Map<String, Value>,
        key: &str,
    ) -> Vec<(String, &'a Map<String, Value>)> {
        let Some(Value::Array(items)) = self.require(obj, "", key, Kind::Array) else {
            return Vec::new();
        };
        items
            .iter()
            .enumerate()
            .filter_map(|(idx, item)| match item.as_object() {
                Some(map) => Some((format!("{key}[{idx}]."), map)),
                None => {
                    self.violations.push(format!("{key}[{idx}]: expected object"));
                    None
                }
            })
            .collect()
    }
}

/// Checks a document against the current schema.
pub fn validate(doc: &Value) -> Vec<String> {
    let Some(obj) = doc.as_object() else {
        return vec![String::from("document: expected object")];
    };

    let mut list = Checklist {
        violations: Vec::new(),
    };

    for (key, kind) in META_KEYS {
        list.require(obj, "", key, kind);
    }

    match obj
        .get("type")
        .and_then(Value::as_u64)
        .map(EffectType::from_code)
    {
        Some(Some(EffectType::Layered)) => check_layered(&mut list, obj),
        Some(Some(EffectType::Scripted)) => check_scripted(&mut list, obj),
        Some(Some(EffectType::Sequence)) => check_sequence(&mut list, obj),
        Some(None) => list.violations.push(String::from("type: unknown effect type")),
        None => {}
    }

    list.violations
}

fn check_layered(list: &mut Checklist, obj: &Map<String, Value>) {
    for (at, layer) in list.objects(obj, "layers") {
        list.require(layer, &at, "name", Kind::Str);
        list.require(layer, &at, "type", Kind::Str);
        list.require(layer, &at, "properties", Kind::Object);
        if let Some(Value::Array(positions)) = list.require(layer, &at, "positions", Kind::Array) {
            for (idx, pos) in positions.iter().enumerate() {
                let ok = pos
                    .as_array()
                    .is_some_and(|xy| xy.len() == 2 && xy.iter().all(Value::is_u64));
                if !ok {
                    list.violations
                        .push(format!("{at}positions[{idx}]: expected [x, y]"));
                }
            }
        }
    }
}

fn check_scripted(list: &mut Checklist, obj: &Map<String, Value>) {
    list.require_strings(obj, "required_os");
    list.require_strings(obj, "designed_for");
    list.require_strings(obj, "optimised_for");
    for (at, param) in list.objects(obj, "parameters") {
        list.require(param, &at, "var", Kind::Str);
        list.require(param, &at, "label", Kind::Str);
        list.require(param, &at, "type", Kind::Str);
        if !param.contains_key("default") {
            list.violations.push(format!("{at}default: missing"));
        }
    }
}

fn check_sequence(list: &mut Checklist, obj: &Map<String, Value>) {
    if let Some(fps) = list.require(obj, "", "fps", Kind::UInt) {
        if fps.as_u64() == Some(0) {
            list.violations.push(String::from("fps: must be positive"));
        }
    }
    list.require(obj, "", "loop", Kind::Bool);

    for (at, frame) in list.objects(obj, "frames") {
        for (x, column) in frame {
            if x.parse::<u32>().is_err() {
                list.violations.push(format!("{at}{x}: column is not a number"));
            }
            let Some(column) = column.as_object() else {
                list.violations.push(format!("{at}{x}: expected object"));
                continue;
            };
            for (y, colour) in column {
                if y.parse::<u32>().is_err() {
                    list.violations
                        .push(format!("{at}{x}.{y}: row is not a number"));
                }
                if !colour.as_str().is_some_and(is_hex_colour) {
                    list.violations
                        .push(format!("{at}{x}.{y}: expected #RRGGBB colour"));
                }
            }
        }
    }
}

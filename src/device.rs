//! Normalized device and option records shared by every backend.
//!
//! Backends translate whatever their hardware daemon reports into these
//! value types; the aggregator and everything above it only ever see this
//! model. Records are snapshots: re-query to observe changes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::state::SoftwareOwner;

/// Backend-local device identifier.
pub type DeviceUid = u32;

/// Option ids that bypass the software-ownership protocol. They adjust
/// hardware-level settings that never conflict with a software painter.
pub const ALWAYS_ALLOWED_OPTIONS: [&str; 4] = ["brightness", "poll_rate", "dpi", "game_mode"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormFactor {
    Accessory,
    Keyboard,
    Mouse,
    Mousemat,
    Keypad,
    Headset,
    Gpu,
    Unrecognised,
}

impl FormFactor {
    /// Maps a backend-reported type string onto the closed set.
    pub fn from_backend(kind: &str) -> Self {
        match kind.to_ascii_lowercase().as_str() {
            "keyboard" => Self::Keyboard,
            "mouse" => Self::Mouse,
            "mousemat" | "mousepad" => Self::Mousemat,
            "keypad" => Self::Keypad,
            "headset" => Self::Headset,
            "gpu" => Self::Gpu,
            "accessory" | "core" | "mug" | "speaker" => Self::Accessory,
            _ => Self::Unrecognised,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionKind {
    Effect,
    Slider,
    Toggle,
    Multichoice,
    Label,
    Dialog,
}

/// One selectable variant of an effect or multichoice option.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub id: String,
    pub data: OptionData,
    pub colours_required: usize,
    pub active: bool,
}

/// Value passed along with an option id when changing device state.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionData {
    #[default]
    None,
    Toggle(bool),
    Level(i64),
    Choice(String),
}

impl std::fmt::Display for OptionData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OptionData::None => write!(f, "-"),
            OptionData::Toggle(value) => write!(f, "{value}"),
            OptionData::Level(value) => write!(f, "{value}"),
            OptionData::Choice(value) => write!(f, "{value}"),
        }
    }
}

impl OptionData {
    /// Parses command-line style input: `true`/`false`, integers, otherwise text.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "" => Self::None,
            "true" => Self::Toggle(true),
            "false" => Self::Toggle(false),
            _ => raw
                .parse::<i64>()
                .map(Self::Level)
                .unwrap_or_else(|_| Self::Choice(raw.to_string())),
        }
    }
}

/// One controllable property within a zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceOption {
    pub id: String,
    pub kind: OptionKind,
    pub active: bool,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    /// Colour slots currently assigned, as `#RRGGBB`.
    #[serde(default)]
    pub colours: Vec<String>,
    /// Colours needed when the option has no parameters.
    #[serde(default)]
    pub colours_required: usize,
    /// Current value for sliders and toggles.
    #[serde(default)]
    pub value: OptionData,
    #[serde(default)]
    pub min: i64,
    #[serde(default)]
    pub max: i64,
}

impl DeviceOption {
    pub fn new(id: &str, kind: OptionKind) -> Self {
        Self {
            id: id.to_string(),
            kind,
            active: false,
            parameters: Vec::new(),
            colours: Vec::new(),
            colours_required: 0,
            value: OptionData::None,
            min: 0,
            max: 0,
        }
    }

    pub fn active_parameter(&self) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.active)
    }

    /// Number of colours the option currently consumes.
    pub fn colours_needed(&self) -> usize {
        self.active_parameter()
            .map(|p| p.colours_required)
            .unwrap_or(self.colours_required)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixDims {
    pub rows: u32,
    pub cols: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DpiRange {
    pub min: u32,
    pub max: u32,
}

/// Normalized device record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub backend: String,
    pub uid: DeviceUid,
    pub serial: String,
    pub name: String,
    pub form_factor: FormFactor,
    pub monochromatic: bool,
    pub matrix: Option<MatrixDims>,
    pub dpi: Option<DpiRange>,
    pub poll_rates: Vec<u32>,
    pub zones: BTreeMap<String, Vec<DeviceOption>>,
    /// Software entity currently owning the device, merged in by the aggregator.
    #[serde(default)]
    pub software: Option<SoftwareOwner>,
}

impl Device {
    pub fn zone_options(&self, zone: &str) -> &[DeviceOption] {
        self.zones.get(zone).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Device that a backend can see but cannot drive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialDevice {
    pub backend: String,
    pub name: String,
    pub vid_pid: Option<(u16, u16)>,
}

/// One line of a backend self-test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticResult {
    pub test: String,
    pub passed: bool,
    pub detail: Option<String>,
}

/// Effect option and parameter found active within a device.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveOption {
    pub zone: String,
    pub option_id: String,
    pub parameter: Option<Parameter>,
    pub colours: Vec<String>,
    pub colours_required: usize,
}

impl ActiveOption {
    pub fn data(&self) -> OptionData {
        self.parameter
            .as_ref()
            .map(|p| p.data.clone())
            .unwrap_or_default()
    }

    pub fn is_colour_bearing(&self) -> bool {
        self.colours_required > 0
    }
}

/// Returns true for `#RRGGBB` strings.
pub fn is_hex_colour(value: &str) -> bool {
    value.len() == 7
        && value.starts_with('#')
        && value[1..].chars().all(|c| c.is_ascii_hexdigit())
}

/// Splits `#RRGGBB` into its components.
pub fn hex_to_rgb(value: &str) -> Option<(u8, u8, u8)> {
    if !is_hex_colour(value) {
        return None;
    }
    let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&value[range], 16).ok();
    Some((channel(1..3)?, channel(3..5)?, channel(5..7)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn hex_colour_parsing() {
        assert_eq!(hex_to_rgb("#FF8000"), Some((255, 128, 0)));
        assert_eq!(hex_to_rgb("#ff8000"), Some((255, 128, 0)));
        assert_eq!(hex_to_rgb("FF8000"), None);
        assert_eq!(hex_to_rgb("#GG0000"), None);
        assert!(!is_hex_colour("#FFF"));
    }

    #[test]
    fn option_data_parse() {
        assert_eq!(OptionData::parse("true"), OptionData::Toggle(true));
        assert_eq!(OptionData::parse("75"), OptionData::Level(75));
        assert_eq!(OptionData::parse("left"), OptionData::Choice("left".into()));
        assert_eq!(OptionData::parse(""), OptionData::None);
    }

    #[test]
    fn colours_needed_prefers_active_parameter() {
        let mut option = DeviceOption::new("breath", OptionKind::Effect);
        option.colours_required = 1;
        assert_eq!(option.colours_needed(), 1);

        option.parameters = vec![
            Parameter {
                id: "single".into(),
                data: OptionData::Choice("single".into()),
                colours_required: 1,
                active: false,
            },
            Parameter {
                id: "dual".into(),
                data: OptionData::Choice("dual".into()),
                colours_required: 2,
                active: true,
            },
        ];
        assert_eq!(option.colours_needed(), 2);
        assert_eq!(option.active_parameter().unwrap().id, "dual");
    }

    #[test]
    fn form_factor_from_backend_strings() {
        assert_eq!(FormFactor::from_backend("Keyboard"), FormFactor::Keyboard);
        assert_eq!(FormFactor::from_backend("mousepad"), FormFactor::Mousemat);
        assert_eq!(FormFactor::from_backend("toaster"), FormFactor::Unrecognised);
    }
}

//! Translation between OpenRazer's effect vocabulary and device options.

use crate::device::{DeviceOption, OptionData, OptionKind, Parameter, hex_to_rgb};

pub const MAIN_ZONE: &str = "main";

/// Poll rates offered for devices that report one.
pub const POLL_RATES: [i64; 3] = [125, 500, 1000];

pub type Rgb = (u8, u8, u8);

/// What the daemon reported about the main zone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ZoneReport {
    pub brightness: Option<f64>,
    pub effect: Option<String>,
    pub effect_colours: Vec<u8>,
    pub dpi: Option<(i64, i64)>,
    pub max_dpi: Option<i64>,
    pub poll_rate: Option<i64>,
}

/// One daemon call, decoded from an option request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    None,
    Static(Rgb),
    Spectrum,
    BreathSingle(Rgb),
    BreathDual(Rgb, Rgb),
    BreathRandom,
    Wave(i32),
    Reactive(Rgb, u8),
    Brightness(f64),
    PollRate(u16),
    Dpi(u16),
}

fn param(id: &str, data: OptionData, colours_required: usize) -> Parameter {
    Parameter {
        id: id.to_string(),
        data,
        colours_required,
        active: false,
    }
}

fn effect(id: &str, colours_required: usize, parameters: Vec<Parameter>) -> DeviceOption {
    let mut option = DeviceOption::new(id, OptionKind::Effect);
    option.colours_required = colours_required;
    option.parameters = parameters;
    option
}

/// Maps the daemon's effect name onto `(option, parameter)`.
fn active_effect(name: &str) -> Option<(&'static str, Option<&'static str>)> {
    Some(match name {
        "none" => ("none", None),
        "static" => ("static", None),
        "spectrum" => ("spectrum", None),
        "breathSingle" => ("breath", Some("single")),
        "breathDual" => ("breath", Some("dual")),
        "breathRandom" => ("breath", Some("random")),
        "wave" => ("wave", None),
        "reactive" => ("reactive", None),
        _ => return None,
    })
}

fn to_hex(bytes: &[u8]) -> Vec<String> {
    bytes
        .chunks_exact(3)
        .map(|c| format!("#{:02X}{:02X}{:02X}", c[0], c[1], c[2]))
        .collect()
}

/// Builds the option list for the main zone.
pub fn main_zone(report: &ZoneReport) -> Vec<DeviceOption> {
    let mut options = vec![
        effect("none", 0, Vec::new()),
        effect("spectrum", 0, Vec::new()),
        effect("static", 1, Vec::new()),
        effect(
            "breath",
            1,
            vec![
                param("single", OptionData::Choice("single".into()), 1),
                param("dual", OptionData::Choice("dual".into()), 2),
                param("random", OptionData::Choice("random".into()), 0),
            ],
        ),
        effect(
            "wave",
            0,
            vec![
                param("left", OptionData::Choice("left".into()), 0),
                param("right", OptionData::Choice("right".into()), 0),
            ],
        ),
        effect(
            "reactive",
            1,
            vec![
                param("fast", OptionData::Level(1), 1),
                param("medium", OptionData::Level(2), 1),
                param("slow", OptionData::Level(3), 1),
            ],
        ),
    ];

    if let Some((option_id, param_id)) = report.effect.as_deref().and_then(active_effect) {
        if let Some(option) = options.iter_mut().find(|o| o.id == option_id) {
            option.active = true;
            option.colours = to_hex(&report.effect_colours);
            if let Some(p) = option
                .parameters
                .iter_mut()
                .find(|p| Some(p.id.as_str()) == param_id)
            {
                p.active = true;
            }
            option.colours.truncate(option.colours_needed());
        }
    }

    if let Some(level) = report.brightness {
        let mut option = DeviceOption::new("brightness", OptionKind::Slider);
        option.min = 0;
        option.max = 100;
        option.value = OptionData::Level(level.round() as i64);
        options.push(option);
    }

    if let (Some((x, _)), Some(max)) = (report.dpi, report.max_dpi) {
        let mut option = DeviceOption::new("dpi", OptionKind::Slider);
        option.min = 100;
        option.max = max;
        option.value = OptionData::Level(x);
        options.push(option);
    }

    if let Some(rate) = report.poll_rate {
        let mut option = DeviceOption::new("poll_rate", OptionKind::Multichoice);
        option.parameters = POLL_RATES
            .iter()
            .map(|hz| Parameter {
                active: *hz == rate,
                ..param(&hz.to_string(), OptionData::Level(*hz), 0)
            })
            .collect();
        option.active = true;
        options.push(option);
    }

    options
}

/// Decodes a state request. `None` means the request is not valid.
pub fn command_for(option_id: &str, data: &OptionData, colours: &[String]) -> Option<Command> {
    let rgb = |idx: usize| colours.get(idx).and_then(|c| hex_to_rgb(c));

    Some(match (option_id, data) {
        ("none", _) => Command::None,
        ("spectrum", _) => Command::Spectrum,
        ("static", _) => Command::Static(rgb(0)?),
        ("breath", OptionData::Choice(kind)) if kind == "dual" => {
            Command::BreathDual(rgb(0)?, rgb(1)?)
        }
        ("breath", OptionData::Choice(kind)) if kind == "random" => Command::BreathRandom,
        ("breath", _) => Command::BreathSingle(rgb(0)?),
        ("wave", OptionData::Choice(dir)) if dir == "right" => Command::Wave(2),
        ("wave", _) => Command::Wave(1),
        ("reactive", data) => {
            let speed = match data {
                OptionData::Level(n @ 1..=3) => *n as u8,
                _ => 2,
            };
            Command::Reactive(rgb(0)?, speed)
        }
        ("brightness", OptionData::Level(level)) => {
            Command::Brightness((*level).clamp(0, 100) as f64)
        }
        ("poll_rate", OptionData::Level(rate)) => Command::PollRate(u16::try_from(*rate).ok()?),
        ("dpi", OptionData::Level(dpi)) if *dpi > 0 => Command::Dpi(u16::try_from(*dpi).ok()?),
        _ => return None,
    })
}

//! Client proxies for the OpenRazer daemon's session bus interfaces.

use zbus::proxy;

pub const SERVICE: &str = "org.razer";

pub fn device_path(serial: &str) -> String {
    format!("/org/razer/device/{serial}")
}

#[proxy(
    interface = "razer.devices",
    default_service = "org.razer",
    default_path = "/org/razer",
    gen_blocking = false
)]
pub trait Devices {
    #[zbus(name = "getDevices")]
    fn get_devices(&self) -> zbus::Result<Vec<String>>;
}

#[proxy(
    interface = "razer.daemon",
    default_service = "org.razer",
    default_path = "/org/razer",
    gen_blocking = false
)]
pub trait Daemon {
    fn version(&self) -> zbus::Result<String>;

    fn stop(&self) -> zbus::Result<()>;
}

#[proxy(interface = "razer.device.misc", default_service = "org.razer", gen_blocking = false)]
pub trait Misc {
    #[zbus(name = "getDeviceName")]
    fn get_device_name(&self) -> zbus::Result<String>;

    #[zbus(name = "getDeviceType")]
    fn get_device_type(&self) -> zbus::Result<String>;

    #[zbus(name = "hasMatrix")]
    fn has_matrix(&self) -> zbus::Result<bool>;

    /// `[rows, cols]`
    #[zbus(name = "getMatrixDimensions")]
    fn get_matrix_dimensions(&self) -> zbus::Result<Vec<i32>>;

    #[zbus(name = "getPollRate")]
    fn get_poll_rate(&self) -> zbus::Result<i32>;

    #[zbus(name = "setPollRate")]
    fn set_poll_rate(&self, rate: u16) -> zbus::Result<()>;

    /// `[vid, pid]`
    #[zbus(name = "getVidPid")]
    fn get_vid_pid(&self) -> zbus::Result<Vec<i32>>;
}

#[proxy(
    interface = "razer.device.lighting.brightness",
    default_service = "org.razer",
    gen_blocking = false
)]
pub trait Brightness {
    #[zbus(name = "getBrightness")]
    fn get_brightness(&self) -> zbus::Result<f64>;

    #[zbus(name = "setBrightness")]
    fn set_brightness(&self, value: f64) -> zbus::Result<()>;
}

#[proxy(
    interface = "razer.device.lighting.chroma",
    default_service = "org.razer",
    gen_blocking = false
)]
pub trait Chroma {
    #[zbus(name = "getEffect")]
    fn get_effect(&self) -> zbus::Result<String>;

    #[zbus(name = "getEffectColors")]
    fn get_effect_colors(&self) -> zbus::Result<Vec<u8>>;

    #[zbus(name = "setNone")]
    fn set_none(&self) -> zbus::Result<()>;

    #[zbus(name = "setStatic")]
    fn set_static(&self, red: u8, green: u8, blue: u8) -> zbus::Result<()>;

    #[zbus(name = "setSpectrum")]
    fn set_spectrum(&self) -> zbus::Result<()>;

    #[zbus(name = "setBreathSingle")]
    fn set_breath_single(&self, red: u8, green: u8, blue: u8) -> zbus::Result<()>;

    #[zbus(name = "setBreathDual")]
    fn set_breath_dual(
        &self,
        red1: u8,
        green1: u8,
        blue1: u8,
        red2: u8,
        green2: u8,
        blue2: u8,
    ) -> zbus::Result<()>;

    #[zbus(name = "setBreathRandom")]
    fn set_breath_random(&self) -> zbus::Result<()>;

    #[zbus(name = "setWave")]
    fn set_wave(&self, direction: i32) -> zbus::Result<()>;

    #[zbus(name = "setReactive")]
    fn set_reactive(&self, red: u8, green: u8, blue: u8, speed: u8) -> zbus::Result<()>;

    /// Payload: row, first column, last column, then RGB triples.
    #[zbus(name = "setKeyRow")]
    fn set_key_row(&self, payload: &[u8]) -> zbus::Result<()>;

    #[zbus(name = "setCustom")]
    fn set_custom(&self) -> zbus::Result<()>;
}

#[proxy(interface = "razer.device.dpi", default_service = "org.razer", gen_blocking = false)]
pub trait Dpi {
    #[zbus(name = "getDPI")]
    fn get_dpi(&self) -> zbus::Result<Vec<i32>>;

    #[zbus(name = "setDPI")]
    fn set_dpi(&self, x: u16, y: u16) -> zbus::Result<()>;

    #[zbus(name = "maxDPI")]
    fn max_dpi(&self) -> zbus::Result<i32>;
}

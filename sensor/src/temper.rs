use crate::SensorError;

pub const TEMPER_VENDOR_ID: u16 = 0x0c45;
pub const TEMPER_PRODUCT_IDS: [u16; 2] = [0x7401, 0x7402];

/// The temperature sensor lives on the second HID interface; the first one
/// is a keyboard emulation endpoint.
pub const TEMPER_DATA_INTERFACE: u8 = 1;

pub const REPORT_LEN: usize = 8;
pub const READ_TEMPERATURE_REPORT: [u8; REPORT_LEN] =
    [0x01, 0x80, 0x33, 0x01, 0x00, 0x00, 0x00, 0x00];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    pub scale: f64,
    pub offset: f64,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            scale: 1.0,
            offset: 0.0,
        }
    }
}

impl Calibration {
    pub fn apply(&self, celsius: f64) -> f64 {
        self.scale * celsius + self.offset
    }
}

pub fn is_temper(vendor_id: u16, product_id: u16) -> bool {
    vendor_id == TEMPER_VENDOR_ID && TEMPER_PRODUCT_IDS.contains(&product_id)
}

/// Bytes 2..4 of the response hold the temperature as a signed big-endian
/// fixed-point value in 1/256 °C.
pub fn decode_celsius(report: &[u8]) -> Result<f64, SensorError> {
    let [hi, lo] = report
        .get(2..4)
        .and_then(|bytes| <[u8; 2]>::try_from(bytes).ok())
        .ok_or(SensorError::ShortReport(report.len()))?;
    Ok(f64::from(i16::from_be_bytes([hi, lo])) / 256.0)
}

pub fn celsius_to_fahrenheit(celsius: f64) -> f64 {
    celsius * 9.0 / 5.0 + 32.0
}

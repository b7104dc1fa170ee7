use std::{
    fs::{self, OpenOptions},
    io::{ErrorKind, Read, Write},
    path::{Path, PathBuf},
};

use tracing::debug;

use crate::{
    temper::{
        celsius_to_fahrenheit, decode_celsius, is_temper, Calibration, READ_TEMPERATURE_REPORT,
        REPORT_LEN, TEMPER_DATA_INTERFACE,
    },
    SensorError,
};

const SYSFS_ROOT: &str = "/sys";
const DEV_ROOT: &str = "/dev";

/// Finds TEMPer thermometers exposed through the Linux `hidraw` driver.
#[derive(Debug, Clone)]
pub struct TemperHandler {
    sysfs_root: PathBuf,
    dev_root: PathBuf,
}

impl Default for TemperHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl TemperHandler {
    pub fn new() -> Self {
        Self::with_roots(SYSFS_ROOT, DEV_ROOT)
    }

    pub fn with_roots(sysfs_root: impl Into<PathBuf>, dev_root: impl Into<PathBuf>) -> Self {
        Self {
            sysfs_root: sysfs_root.into(),
            dev_root: dev_root.into(),
        }
    }

    /// Every attached TEMPer data interface, ordered by hidraw node number.
    pub fn devices(&self) -> Result<Vec<TemperDevice>, SensorError> {
        let class_dir = self.sysfs_root.join("class").join("hidraw");
        let entries = match fs::read_dir(&class_dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(SensorError::Io {
                    path: class_dir,
                    source,
                })
            }
        };

        let mut devices = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| SensorError::Io {
                path: class_dir.clone(),
                source,
            })?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let device_dir = entry.path().join("device");

            let Some((vendor_id, product_id)) = read_hid_id(&device_dir) else {
                continue;
            };
            if !is_temper(vendor_id, product_id) {
                continue;
            }
            if read_interface_number(&device_dir) != Some(TEMPER_DATA_INTERFACE) {
                debug!("skipping {name}: not the TEMPer data interface");
                continue;
            }

            devices.push(TemperDevice {
                node: self.dev_root.join(&name),
                name,
                product_id,
                calibration: Calibration::default(),
            });
        }

        devices.sort_by(|a, b| node_order(&a.name).cmp(&node_order(&b.name)));
        Ok(devices)
    }

    pub fn first_device(&self) -> Result<TemperDevice, SensorError> {
        self.devices()?
            .into_iter()
            .next()
            .ok_or(SensorError::NoDevice)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TemperDevice {
    pub name: String,
    pub node: PathBuf,
    pub product_id: u16,
    calibration: Calibration,
}

impl TemperDevice {
    pub fn with_calibration(mut self, calibration: Calibration) -> Self {
        self.calibration = calibration;
        self
    }

    pub fn read_celsius(&self) -> Result<f64, SensorError> {
        let io_err = |source: std::io::Error| SensorError::Io {
            path: self.node.clone(),
            source,
        };

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.node)
            .map_err(io_err)?;

        // Unnumbered reports are prefixed with report id 0 on write.
        let mut request = [0u8; REPORT_LEN + 1];
        request[1..].copy_from_slice(&READ_TEMPERATURE_REPORT);
        file.write_all(&request).map_err(io_err)?;

        let mut response = [0u8; REPORT_LEN];
        let read = file.read(&mut response).map_err(io_err)?;
        let raw = decode_celsius(&response[..read])?;
        Ok(self.calibration.apply(raw))
    }

    pub fn read_fahrenheit(&self) -> Result<f64, SensorError> {
        self.read_celsius().map(celsius_to_fahrenheit)
    }
}

/// `hidraw10` sorts after `hidraw2`; names without a number go last.
fn node_order(name: &str) -> (u32, &str) {
    let index = name
        .strip_prefix("hidraw")
        .and_then(|suffix| suffix.parse().ok())
        .unwrap_or(u32::MAX);
    (index, name)
}

/// Parses `HID_ID=<bus>:<vendor>:<product>` out of the device's uevent.
fn read_hid_id(device_dir: &Path) -> Option<(u16, u16)> {
    let uevent = fs::read_to_string(device_dir.join("uevent")).ok()?;
    uevent.lines().find_map(|line| {
        let value = line.strip_prefix("HID_ID=")?;
        let mut parts = value.split(':');
        let _bus = parts.next()?;
        let vendor = u32::from_str_radix(parts.next()?, 16).ok()?;
        let product = u32::from_str_radix(parts.next()?, 16).ok()?;
        Some((u16::try_from(vendor).ok()?, u16::try_from(product).ok()?))
    })
}

/// The HID device's parent is the USB interface carrying `bInterfaceNumber`.
fn read_interface_number(device_dir: &Path) -> Option<u8> {
    let raw = fs::read_to_string(device_dir.join("..").join("bInterfaceNumber")).ok()?;
    u8::from_str_radix(raw.trim(), 16).ok()
}

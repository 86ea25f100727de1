//! Hardware probe over `/proc/stat`, `/proc/cpuinfo` and `/sys`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{ProcfsError, Result};
use crate::introspect::{CpuInfo, CpuTicks, HardwareProbe, Sensor, SensorReading, TpmCaps};

const IIO_DEVICES: &str = "bus/iio/devices";
const TPM_DEVICE: &str = "class/tpm/tpm0";

/// [`HardwareProbe`] over `/proc` and `/sys`.
pub struct SysfsHardware {
    proc_root: PathBuf,
    sys_root: PathBuf,
    light: Option<PathBuf>,
    motion: Option<PathBuf>,
    ticks_per_second: u64,
}

impl SysfsHardware {
    /// Build the probe, discovering industrial-I/O sensors under `sys_root`.
    pub fn new(proc_root: impl Into<PathBuf>, sys_root: impl Into<PathBuf>) -> Self {
        let proc_root = proc_root.into();
        let sys_root = sys_root.into();
        let mut light = None;
        let mut motion = None;
        if let Ok(entries) = fs::read_dir(sys_root.join(IIO_DEVICES)) {
            let mut devices: Vec<PathBuf> =
                entries.filter_map(|e| e.ok()).map(|e| e.path()).collect();
            devices.sort();
            for device in devices {
                if light.is_none() && device.join("in_illuminance_raw").exists() {
                    info!("light sensor at {}", device.display());
                    light = Some(device.clone());
                }
                if motion.is_none() && device.join("in_accel_x_raw").exists() {
                    info!("motion sensor at {}", device.display());
                    motion = Some(device);
                }
            }
        }
        SysfsHardware {
            proc_root,
            sys_root,
            light,
            motion,
            ticks_per_second: procfs::ticks_per_second(),
        }
    }

    fn cpu_lines(&self) -> Result<Vec<String>> {
        let stat = fs::read_to_string(self.proc_root.join("stat"))
            .map_err(|e| ProcfsError::unavailable(format!("reading stat: {}", e)))?;
        Ok(stat
            .lines()
            .filter(|line| {
                line.strip_prefix("cpu")
                    .and_then(|rest| rest.chars().next())
                    .is_some_and(|c| c.is_ascii_digit())
            })
            .map(str::to_string)
            .collect())
    }

    fn model(&self, cpu: usize) -> String {
        let Ok(cpuinfo) = fs::read_to_string(self.proc_root.join("cpuinfo")) else {
            return "unknown".to_string();
        };
        let models: Vec<&str> = cpuinfo
            .lines()
            .filter_map(|line| {
                let (key, value) = line.split_once(':')?;
                (key.trim() == "model name").then(|| value.trim())
            })
            .collect();
        models
            .get(cpu)
            .or_else(|| models.first())
            .map(|m| m.to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }

    fn online(&self, cpu: usize) -> bool {
        let path = self
            .sys_root
            .join(format!("devices/system/cpu/cpu{}/online", cpu));
        match fs::read_to_string(path) {
            Ok(state) => state.trim() == "1",
            // The boot processor usually has no online switch.
            Err(_) => true,
        }
    }

    fn tpm_dir(&self) -> PathBuf {
        self.sys_root.join(TPM_DEVICE)
    }
}

fn read_raw(path: &Path) -> io::Result<i64> {
    let text = fs::read_to_string(path)?;
    text.trim()
        .parse()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

fn sample(paths: &[PathBuf]) -> SensorReading {
    let mut values = Vec::with_capacity(paths.len());
    for path in paths {
        match read_raw(path) {
            Ok(v) => values.push(v),
            Err(e) if e.raw_os_error() == Some(libc::EBUSY) => return SensorReading::Busy,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return SensorReading::NotAvailable,
            Err(e) => {
                debug!("sensor read {} failed: {}", path.display(), e);
                return SensorReading::Error(e.raw_os_error().unwrap_or(-1));
            }
        }
    }
    SensorReading::Values(values)
}

/// Decode a manufacturer id such as `0x49465800` into its ASCII form.
fn manufacturer_name(raw: &str) -> String {
    let hex = raw.trim().trim_start_matches("0x");
    match u32::from_str_radix(hex, 16) {
        Ok(id) => id
            .to_be_bytes()
            .iter()
            .filter(|b| b.is_ascii_graphic())
            .map(|&b| b as char)
            .collect(),
        Err(_) => raw.trim().to_string(),
    }
}

fn parse_pcr_bytes(hex: &str) -> Option<[u8; 20]> {
    let digits: String = hex.chars().filter(|c| c.is_ascii_hexdigit()).collect();
    if digits.len() != 40 {
        return None;
    }
    let mut out = [0u8; 20];
    for (i, byte) in out.iter_mut().enumerate() {
        *byte = u8::from_str_radix(digits.get(i * 2..i * 2 + 2)?, 16).ok()?;
    }
    Some(out)
}

impl HardwareProbe for SysfsHardware {
    fn processor_count(&self) -> Result<usize> {
        let count = self.cpu_lines()?.len();
        if count == 0 {
            return Err(ProcfsError::unavailable("no processors in stat"));
        }
        Ok(count)
    }

    fn cpu_info(&self, cpu: usize) -> Result<CpuInfo> {
        let prefix = format!("cpu{}", cpu);
        let lines = self.cpu_lines()?;
        let line = lines
            .iter()
            .find(|line| line.split_whitespace().next() == Some(prefix.as_str()))
            .ok_or_else(|| ProcfsError::no_such_entry(prefix.clone()))?;
        let fields: Vec<u64> = line
            .split_whitespace()
            .skip(1)
            .filter_map(|s| s.parse().ok())
            .collect();
        let at = |i: usize| fields.get(i).copied().unwrap_or(0);
        Ok(CpuInfo {
            slot: cpu,
            is_master: cpu == 0,
            running: self.online(cpu),
            model: self.model(cpu),
            ticks: CpuTicks {
                user: at(0),
                nice: at(1),
                system: at(2),
                idle: at(3),
            },
            ticks_per_second: self.ticks_per_second,
        })
    }

    fn read_sensor(&self, sensor: Sensor) -> SensorReading {
        match sensor {
            Sensor::Light => match &self.light {
                Some(dev) => sample(&[dev.join("in_illuminance_raw")]),
                None => SensorReading::NotAvailable,
            },
            Sensor::Motion => match &self.motion {
                Some(dev) => sample(&[
                    dev.join("in_accel_x_raw"),
                    dev.join("in_accel_y_raw"),
                    dev.join("in_accel_z_raw"),
                ]),
                None => SensorReading::NotAvailable,
            },
            Sensor::Mouse => SensorReading::NotAvailable,
        }
    }

    fn tpm_caps(&self) -> Result<TpmCaps> {
        let caps = fs::read_to_string(self.tpm_dir().join("device/caps"))
            .map_err(|e| ProcfsError::unavailable(format!("no TPM: {}", e)))?;
        let field = |key: &str| {
            caps.lines()
                .find_map(|line| {
                    let (k, v) = line.split_once(':')?;
                    (k.trim() == key).then(|| v.trim().to_string())
                })
                .unwrap_or_default()
        };
        Ok(TpmCaps {
            vendor: manufacturer_name(&field("Manufacturer")),
            model: field("Firmware version"),
            version: field("TCG version"),
        })
    }

    fn tpm_pcrs(&self) -> Result<Vec<[u8; 20]>> {
        let dir = self.tpm_dir();
        if let Ok(pcrs) = fs::read_to_string(dir.join("device/pcrs")) {
            // TPM 1.2: "PCR-00: 00 11 ..."
            return Ok(pcrs
                .lines()
                .filter_map(|line| parse_pcr_bytes(line.split_once(':')?.1))
                .collect());
        }
        // TPM 2.0 exposes one file per register.
        let bank = dir.join("pcr-sha1");
        let mut indices: Vec<usize> = fs::read_dir(&bank)
            .map_err(|e| ProcfsError::unavailable(format!("no TPM: {}", e)))?
            .filter_map(|e| e.ok())
            .filter_map(|e| e.file_name().to_str()?.parse().ok())
            .collect();
        indices.sort_unstable();
        indices
            .into_iter()
            .map(|i| {
                let text = fs::read_to_string(bank.join(i.to_string()))?;
                parse_pcr_bytes(&text)
                    .ok_or_else(|| ProcfsError::unavailable(format!("malformed pcr {}", i)))
            })
            .collect()
    }
}

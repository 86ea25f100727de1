//! The `/hardware` subtree.

use crate::attr::{NodeAttr, NodeKind};
use crate::compose::{push_all, DirSink, Fill};
use crate::context::ProcContext;
use crate::error::Result;
use crate::introspect::{CpuInfo, Sensor, SensorReading};
use crate::route::Captures;

/// Dynamic entries of `/hardware/cpus`.
pub fn list_cpus(ctx: &ProcContext, _args: &Captures, sink: &mut dyn DirSink) -> Result<Fill> {
    let names = (0..ctx.processor_count).map(|cpu| cpu.to_string());
    Ok(push_all(sink, NodeKind::Directory, names))
}

fn cpu_index(ctx: &ProcContext, args: &Captures) -> Result<usize> {
    let cpu = args.number(0)?;
    if cpu < ctx.processor_count {
        Ok(cpu)
    } else {
        Err(args.no_such_entry())
    }
}

/// Attributes of `/hardware/cpus/<n>`.
pub fn cpu_dir_attr(ctx: &ProcContext, args: &Captures) -> Result<NodeAttr> {
    cpu_index(ctx, args)?;
    Ok(NodeAttr::default_dir())
}

/// Attributes of `/hardware/cpus/<n>/data`.
pub fn cpu_data_attr(ctx: &ProcContext, args: &Captures) -> Result<NodeAttr> {
    cpu_index(ctx, args)?;
    Ok(NodeAttr::default_file())
}

fn format_uptime(ticks: u64, ticks_per_second: u64) -> String {
    let secs = ticks / ticks_per_second.max(1);
    format!("{}h {}m {}s", secs / 3600, (secs / 60) % 60, secs % 60)
}

/// Text of a processor's data file.
pub fn format_cpu(info: &CpuInfo) -> String {
    let master = if info.is_master { " (master)" } else { "" };
    let running = if info.running { "running" } else { "not running" };
    let t = &info.ticks;
    format!(
        "slot {}{}, {}\nmodel {}\nticks user {} system {} idle {} nice {} total {}\nuptime {}\n",
        info.slot,
        master,
        running,
        info.model,
        t.user,
        t.system,
        t.idle,
        t.nice,
        t.total(),
        format_uptime(t.total(), info.ticks_per_second),
    )
}

/// `/hardware/cpus/<n>/data`
pub fn render_cpu(ctx: &ProcContext, args: &Captures) -> Result<String> {
    let cpu = cpu_index(ctx, args)?;
    Ok(format_cpu(&ctx.hardware.cpu_info(cpu)?))
}

/// Text of a sensor file.
pub fn format_sensor(reading: &SensorReading) -> String {
    match reading {
        SensorReading::NotAvailable => "not available\n".to_string(),
        SensorReading::Busy => "busy\n".to_string(),
        SensorReading::Error(code) => format!("error {}\n", code),
        SensorReading::Values(values) => {
            let values: Vec<String> = values.iter().map(|v| v.to_string()).collect();
            format!("{}\n", values.join(" "))
        }
    }
}

/// `/hardware/{lightsensor,motionsensor,mouse}/data`
pub fn render_sensor(ctx: &ProcContext, args: &Captures) -> Result<String> {
    let sensor = Sensor::from_name(&args[0]).ok_or_else(|| args.no_such_entry())?;
    Ok(format_sensor(&ctx.hardware.read_sensor(sensor)))
}

#[cfg(feature = "tpm")]
pub use tpm::*;

#[cfg(feature = "tpm")]
mod tpm {
    use super::*;

    /// Length of a rendered PCR: 20 bytes as `xx ` with a final newline.
    pub const PCR_TEXT_LEN: u64 = 60;

    /// `/hardware/tpm/{hwmodel,hwvendor,hwversion}`
    pub fn render_tpm_caps(ctx: &ProcContext, args: &Captures) -> Result<String> {
        let caps = ctx.hardware.tpm_caps()?;
        let text = match &args[0] {
            "hwmodel" => caps.model,
            "hwvendor" => caps.vendor,
            "hwversion" => caps.version,
            _ => return Err(args.no_such_entry()),
        };
        Ok(format!("{}\n", text))
    }

    /// Dynamic entries of `/hardware/tpm/pcrs`.
    pub fn list_pcrs(ctx: &ProcContext, _args: &Captures, sink: &mut dyn DirSink) -> Result<Fill> {
        let count = ctx.hardware.tpm_pcrs()?.len();
        let names = (0..count).map(|i| format!("pcr{:02}", i));
        Ok(push_all(sink, NodeKind::File, names))
    }

    fn pcr(ctx: &ProcContext, args: &Captures) -> Result<[u8; 20]> {
        let index = args.number(0)?;
        let pcrs = ctx.hardware.tpm_pcrs()?;
        pcrs.get(index).copied().ok_or_else(|| args.no_such_entry())
    }

    /// Attributes of `/hardware/tpm/pcrs/<n>`.
    pub fn pcr_attr(ctx: &ProcContext, args: &Captures) -> Result<NodeAttr> {
        pcr(ctx, args)?;
        Ok(NodeAttr::new_file(PCR_TEXT_LEN, 0o444))
    }

    /// `/hardware/tpm/pcrs/pcr<NN>`
    pub fn render_pcr(ctx: &ProcContext, args: &Captures) -> Result<String> {
        let value = pcr(ctx, args)?;
        let bytes: Vec<String> = value.iter().map(|b| format!("{:02x}", b)).collect();
        Ok(format!("{}\n", bytes.join(" ")))
    }
}

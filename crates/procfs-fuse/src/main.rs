//! procfs mount daemon

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use procfs_fuse::config::ProcfsConfig;
use procfs_fuse::context::ProcContext;
use procfs_fuse::facade::Procfs;
use procfs_fuse::filesystem::ProcFilesystem;
use procfs_fuse::mount::{apply_mount_options, MountHandle};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "procfs")]
#[command(about = "Live process and hardware state as a read-only filesystem")]
struct Cli {
    /// Directory to mount on. Overrides the config file.
    mountpoint: Option<PathBuf>,

    /// Config file, TOML or JSON.
    #[arg(short, long, env = "PROCFS_CONFIG")]
    config: Option<PathBuf>,

    /// Comma-separated mount options, e.g. allow_other,fsname=live
    #[arg(short = 'o', long = "options")]
    options: Option<String>,

    /// Process tree to serve instead of /proc.
    #[arg(long, env = "PROCFS_PROC_ROOT")]
    proc_root: Option<PathBuf>,

    /// Emit logs as JSON.
    #[arg(long, env = "PROCFS_LOG_JSON")]
    log_json: bool,
}

fn load_config(cli: &Cli) -> Result<ProcfsConfig> {
    let mut config = match &cli.config {
        Some(path) => ProcfsConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ProcfsConfig::default(),
    };
    if let Some(mountpoint) = &cli.mountpoint {
        config.mountpoint = Some(mountpoint.clone());
    }
    if let Some(proc_root) = &cli.proc_root {
        config.proc_root = proc_root.clone();
    }
    if let Some(options) = &cli.options {
        config.mount = apply_mount_options(config.mount, options)?;
    }
    Ok(config)
}

fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let (plain, structured) = if json {
        (None, Some(fmt::layer().json()))
    } else {
        (Some(fmt::layer()), None)
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(plain)
        .with(structured)
        .init();
}

#[cfg(target_os = "linux")]
fn build_context(config: &ProcfsConfig) -> Result<ProcContext> {
    use procfs_fuse::introspect::linux::LinuxIntrospector;
    use procfs_fuse::introspect::sysfs::SysfsHardware;

    let introspector = LinuxIntrospector::new(config.proc_root.clone(), config.etc_root.clone());
    let hardware = SysfsHardware::new(config.proc_root.clone(), config.sys_root.clone());
    ProcContext::new(Arc::new(introspector), Arc::new(hardware))
        .context("probing processors")
}

#[cfg(not(target_os = "linux"))]
fn build_context(_config: &ProcfsConfig) -> Result<ProcContext> {
    anyhow::bail!("no introspection backend for this platform")
}

async fn shutdown_signal() -> Result<()> {
    let mut term = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res?,
        _ = term.recv() => {}
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    init_tracing(&config.log_level, cli.log_json);

    tracing::info!("procfs daemon starting...");

    let mountpoint = config
        .mountpoint
        .clone()
        .context("no mountpoint given on the command line or in the config")?;

    let ctx = build_context(&config)?;
    let procfs = Procfs::with_default_routes(ctx)?;
    tracing::info!(
        "{} routes, {} processors",
        procfs.tables().len(),
        procfs.context().processor_count
    );

    let fs = ProcFilesystem::new(procfs, config.filesystem_config());
    let mut handle = MountHandle::mount(fs, &mountpoint, &config.mount)
        .with_context(|| format!("mounting on {}", mountpoint.display()))?;

    shutdown_signal().await?;
    tracing::info!("shutdown requested");
    handle.unmount();
    Ok(())
}

//! Introspection backends.
//!
//! The routing engine never talks to the operating system directly. Every
//! data handler goes through [`Introspector`] (processes, tasks, threads and
//! descriptors) or [`HardwareProbe`] (processors, sensors, TPM). Bulk
//! enumerations hand out opaque handles that must be returned through the
//! matching `release_*` call; see [`crate::handles`] for the scoped wrappers
//! that guarantee it.

#[cfg(target_os = "linux")]
pub mod linux;
#[cfg(target_os = "linux")]
pub mod sysfs;

use std::time::Duration;

use crate::error::{ProcfsError, Result};

/// Process or thread identifier.
pub type Pid = i32;

/// Opaque reference to a task (process) held by a backend.
#[derive(Debug, PartialEq, Eq)]
pub struct TaskHandle {
    pid: Pid,
    raw: u64,
}

impl TaskHandle {
    /// Wrap a backend reference to `pid`.
    pub fn new(pid: Pid, raw: u64) -> Self {
        TaskHandle { pid, raw }
    }

    /// Process the handle refers to.
    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// Backend-private identifier.
    pub fn raw(&self) -> u64 {
        self.raw
    }
}

/// Opaque reference to one thread of a task.
#[derive(Debug, PartialEq, Eq)]
pub struct ThreadHandle {
    tid: Pid,
    raw: u64,
}

impl ThreadHandle {
    /// Wrap a backend reference to `tid`.
    pub fn new(tid: Pid, raw: u64) -> Self {
        ThreadHandle { tid, raw }
    }

    /// Thread the handle refers to.
    pub fn tid(&self) -> Pid {
        self.tid
    }

    /// Backend-private identifier.
    pub fn raw(&self) -> u64 {
        self.raw
    }
}

/// What a port name (open descriptor) refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortType {
    /// Regular file.
    File,
    /// Directory.
    Directory,
    /// Socket.
    Socket,
    /// Pipe.
    Pipe,
    /// Anonymous inode such as an eventfd.
    AnonInode,
    /// Anything else.
    Other,
}

/// Parallel arrays of port names and their types, as returned by the backend.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PortList {
    /// Descriptor numbers, ascending.
    pub names: Vec<u32>,
    /// Type of each descriptor.
    pub types: Vec<PortType>,
}

impl PortList {
    /// Number of ports.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether there are no ports.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Find a port by its hex rendering, the form used in paths.
    pub fn find_hex(&self, hex: &str) -> Option<(u32, PortType)> {
        self.names
            .iter()
            .zip(self.types.iter())
            .find(|(name, _)| format!("{:x}", name) == hex)
            .map(|(name, ty)| (*name, *ty))
    }
}

/// User and group identities of a process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    /// Real user id.
    pub ruid: u32,
    /// Effective user id.
    pub euid: u32,
    /// Saved user id.
    pub svuid: u32,
    /// Real group id.
    pub rgid: u32,
    /// Effective group id.
    pub egid: u32,
    /// Saved group id.
    pub svgid: u32,
    /// Supplementary groups.
    pub groups: Vec<u32>,
}

/// Identity and relationships of a process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcInfo {
    /// Process id.
    pub pid: Pid,
    /// Parent process id.
    pub ppid: Pid,
    /// Process group id.
    pub pgid: Pid,
    /// Session id.
    pub sid: Pid,
    /// Foreground process group of the terminal.
    pub tpgid: Pid,
    /// Command name.
    pub comm: String,
    /// Controlling terminal device name, if any.
    pub tty: Option<String>,
    /// Kernel function the process sleeps in.
    pub wchan: Option<String>,
    /// Credentials.
    pub cred: Credentials,
}

/// Scheduling and memory summary of a task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskBasicInfo {
    /// Scheduling policy.
    pub policy: u32,
    /// Nice value.
    pub nice: i32,
    /// Kernel priority.
    pub priority: i32,
    /// Resident memory.
    pub resident_bytes: u64,
    /// Virtual memory.
    pub virtual_bytes: u64,
    /// One if the task is stopped.
    pub suspend_count: u32,
    /// Time spent in user mode.
    pub user_time: Duration,
    /// Time spent in the kernel.
    pub system_time: Duration,
}

/// Event counters of a task. `None` where the backend cannot tell.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskEvents {
    /// Page faults.
    pub faults: u64,
    /// Faults that needed I/O.
    pub pageins: u64,
    /// Voluntary context switches.
    pub voluntary_csw: Option<u64>,
    /// Involuntary context switches.
    pub involuntary_csw: Option<u64>,
    /// Read system calls.
    pub syscalls_read: Option<u64>,
    /// Write system calls.
    pub syscalls_write: Option<u64>,
}

/// One mapping of a task's address space.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VmRegion {
    /// First address.
    pub start: u64,
    /// End address, exclusive.
    pub end: u64,
    /// Readable.
    pub readable: bool,
    /// Writable.
    pub writable: bool,
    /// Executable.
    pub executable: bool,
    /// Shared with other processes.
    pub shared: bool,
    /// Offset into the mapped object.
    pub offset: u64,
    /// Mapped file or pseudo-name.
    pub path: Option<String>,
}

/// Scheduling state of one thread.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThreadBasicInfo {
    /// Thread id.
    pub tid: Pid,
    /// Thread name.
    pub name: String,
    /// Single-letter run state.
    pub run_state: char,
    /// Kernel flags.
    pub flags: u32,
    /// Scheduling policy.
    pub policy: u32,
    /// One if the thread is stopped.
    pub suspend_count: u32,
    /// Scaled to 1000 for a thread using a full processor.
    pub cpu_usage: u32,
    /// Time spent in user mode.
    pub user_time: Duration,
    /// Time spent in the kernel.
    pub system_time: Duration,
    /// Kernel function the thread sleeps in.
    pub wchan: Option<String>,
}

/// State of one open descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortInfo {
    /// Open flags.
    pub flags: u32,
    /// File position.
    pub pos: u64,
    /// What it refers to.
    pub target: String,
}

/// Per-process symbolic links.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessLink {
    /// Working directory.
    Cwd,
    /// Executable.
    Exe,
    /// Root directory.
    Root,
}

impl ProcessLink {
    /// Parse a link's file name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "cwd" => Some(ProcessLink::Cwd),
            "exe" => Some(ProcessLink::Exe),
            "root" => Some(ProcessLink::Root),
            _ => None,
        }
    }

    /// File name of the link.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessLink::Cwd => "cwd",
            ProcessLink::Exe => "exe",
            ProcessLink::Root => "root",
        }
    }
}

/// Process, task, thread and descriptor queries.
pub trait Introspector: Send + Sync {
    /// Whether `pid` names a live process.
    fn process_exists(&self, pid: Pid) -> bool;
    /// Identity of `pid`.
    fn proc_info(&self, pid: Pid) -> Result<ProcInfo>;
    /// Arguments of `pid`.
    fn cmdline(&self, pid: Pid) -> Result<Vec<String>>;
    /// Target of one of `pid`'s links.
    fn process_link(&self, pid: Pid, link: ProcessLink) -> Result<String>;
    /// Login name of `uid`.
    fn user_name(&self, uid: u32) -> Option<String>;
    /// Name of group `gid`.
    fn group_name(&self, gid: u32) -> Option<String>;

    /// Take a handle on `pid`.
    fn task_for_pid(&self, pid: Pid) -> Result<TaskHandle>;
    /// Give back a handle from [`Introspector::task_for_pid`].
    fn release_task(&self, task: TaskHandle);
    /// Handles on every task.
    fn acquire_tasks(&self) -> Result<Vec<TaskHandle>>;
    /// Give back the handles from [`Introspector::acquire_tasks`].
    fn release_tasks(&self, tasks: Vec<TaskHandle>);

    /// Process a task handle refers to.
    fn pid_for_task(&self, task: &TaskHandle) -> Result<Pid> {
        Ok(task.pid())
    }

    /// Scheduling and memory summary.
    fn task_basic_info(&self, task: &TaskHandle) -> Result<TaskBasicInfo>;
    /// Event counters.
    fn task_events(&self, task: &TaskHandle) -> Result<TaskEvents>;
    /// Command name.
    fn task_name(&self, task: &TaskHandle) -> Result<String>;
    /// Audit token as eight integers.
    fn audit_token(&self, task: &TaskHandle) -> Result<Vec<u32>>;
    /// Security label.
    fn security_token(&self, task: &TaskHandle) -> Result<String>;
    /// Address space mappings.
    fn vm_regions(&self, task: &TaskHandle) -> Result<Vec<VmRegion>>;

    /// Handles on every thread of `task`.
    fn acquire_threads(&self, task: &TaskHandle) -> Result<Vec<ThreadHandle>>;
    /// Give back the handles from [`Introspector::acquire_threads`].
    fn release_threads(&self, threads: Vec<ThreadHandle>);
    /// Scheduling state of one thread.
    fn thread_basic_info(&self, task: &TaskHandle, thread: &ThreadHandle)
        -> Result<ThreadBasicInfo>;

    /// Open descriptors of `task`.
    fn acquire_ports(&self, task: &TaskHandle) -> Result<PortList>;
    /// Give back the list from [`Introspector::acquire_ports`].
    fn release_ports(&self, ports: PortList);
    /// State of descriptor `name`.
    fn port_info(&self, task: &TaskHandle, name: u32) -> Result<PortInfo>;
}

/// Cumulative clock ticks of one processor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuTicks {
    /// User mode.
    pub user: u64,
    /// Kernel mode.
    pub system: u64,
    /// Idle.
    pub idle: u64,
    /// Niced user mode.
    pub nice: u64,
}

impl CpuTicks {
    /// Sum of all states.
    pub fn total(&self) -> u64 {
        self.user + self.system + self.idle + self.nice
    }
}

/// State of one processor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CpuInfo {
    /// Processor number.
    pub slot: usize,
    /// Whether this is the boot processor.
    pub is_master: bool,
    /// Whether the processor is online.
    pub running: bool,
    /// Model name.
    pub model: String,
    /// Time spent per state.
    pub ticks: CpuTicks,
    /// Tick rate of `ticks`.
    pub ticks_per_second: u64,
}

/// Sensors exposed under `/hardware`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sensor {
    /// Ambient light.
    Light,
    /// Accelerometer.
    Motion,
    /// Pointer.
    Mouse,
}

impl Sensor {
    /// Parse a sensor file name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "lightsensor" => Some(Sensor::Light),
            "motionsensor" => Some(Sensor::Motion),
            "mouse" => Some(Sensor::Mouse),
            _ => None,
        }
    }
}

/// Result of sampling a sensor. Sensor failures are content, not errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SensorReading {
    /// No such device.
    NotAvailable,
    /// The device is busy.
    Busy,
    /// Raw readings.
    Values(Vec<i64>),
    /// Read failed with this errno.
    Error(i32),
}

/// Identification of the TPM.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TpmCaps {
    /// Manufacturer.
    pub vendor: String,
    /// Model or firmware.
    pub model: String,
    /// TCG version.
    pub version: String,
}

/// Machine-wide hardware queries. Devices are discovered once when the probe
/// is built and read on every query.
pub trait HardwareProbe: Send + Sync {
    /// Number of processors.
    fn processor_count(&self) -> Result<usize>;
    /// State of processor `cpu`.
    fn cpu_info(&self, cpu: usize) -> Result<CpuInfo>;
    /// Sample `sensor`.
    fn read_sensor(&self, sensor: Sensor) -> SensorReading;

    /// Identification of the TPM.
    fn tpm_caps(&self) -> Result<TpmCaps> {
        Err(ProcfsError::unavailable("no TPM"))
    }

    /// SHA-1 PCR bank.
    fn tpm_pcrs(&self) -> Result<Vec<[u8; 20]>> {
        Err(ProcfsError::unavailable("no TPM"))
    }
}

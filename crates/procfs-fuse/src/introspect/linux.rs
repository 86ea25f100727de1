//! Introspection backed by a Linux `/proc` tree.
//!
//! File contents are parsed with the `procfs` crate. Task handles obtained
//! through [`Introspector::task_for_pid`] hold the process directory open and
//! reach every file, thread and descriptor through that descriptor, so a
//! handle keeps referring to the process it was created for even if the pid
//! is reused. Handles from bulk enumeration are lightweight and read by path.
//! Every live handle is tracked in a registry so leaks are observable.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io;
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use procfs::process::{FDTarget, Io, MMPermissions, MMapPath, MemoryMaps, Process, Stat, Status};
use procfs::FromRead;
use tracing::{debug, warn};

use crate::error::{ProcfsError, Result};
use crate::introspect::{
    Credentials, Introspector, Pid, PortInfo, PortList, PortType, ProcInfo, ProcessLink,
    TaskBasicInfo, TaskEvents, TaskHandle, ThreadBasicInfo, ThreadHandle, VmRegion,
};

/// Mach-style scale for a thread using one full processor.
const CPU_USAGE_SCALE: f64 = 1000.0;

/// Where the kernel exposes this process's own descriptors by number.
const FD_ANCHOR: &str = "/proc/self/fd";

fn credentials(status: &Status) -> Credentials {
    Credentials {
        ruid: status.ruid,
        euid: status.euid,
        svuid: status.suid,
        rgid: status.rgid,
        egid: status.egid,
        svgid: status.sgid,
        groups: status.groups.iter().map(|&g| g as u32).collect(),
    }
}

fn mapping_name(path: &MMapPath) -> Option<String> {
    match path {
        MMapPath::Path(path) => Some(path.display().to_string()),
        MMapPath::Heap => Some("[heap]".to_string()),
        MMapPath::Stack => Some("[stack]".to_string()),
        MMapPath::TStack(tid) => Some(format!("[stack:{}]", tid)),
        MMapPath::Vdso => Some("[vdso]".to_string()),
        MMapPath::Vvar => Some("[vvar]".to_string()),
        MMapPath::Vsyscall => Some("[vsyscall]".to_string()),
        MMapPath::Other(name) => Some(name.clone()),
        _ => None,
    }
}

/// Terminal name for a `tty_nr` device number.
pub fn tty_name(tty_nr: i32) -> Option<String> {
    if tty_nr == 0 {
        return None;
    }
    let major = (tty_nr >> 8) & 0xfff;
    let minor = (tty_nr & 0xff) | ((tty_nr >> 12) & 0xfff00);
    Some(match major {
        4 => format!("tty{}", minor),
        136..=143 => format!("pts/{}", minor + (major - 136) * 256),
        _ => format!("{}:{}", major, minor),
    })
}

/// First field of the line in a colon-separated database whose third field
/// is `id`.
fn lookup_name(db: &Path, id: u32) -> Option<String> {
    let content = fs::read_to_string(db).ok()?;
    content.lines().find_map(|line| {
        let mut parts = line.split(':');
        let name = parts.next()?;
        let _password = parts.next()?;
        let entry_id: u32 = parts.next()?.parse().ok()?;
        (entry_id == id).then(|| name.to_string())
    })
}

/// Value of a `key:\tvalue` line in an fdinfo file.
fn fdinfo_field<'a>(text: &'a str, key: &str) -> Option<&'a str> {
    text.lines()
        .find_map(|line| line.strip_prefix(key)?.strip_prefix(':'))
        .map(str::trim)
}

fn port_type(target: &FDTarget, is_dir: bool) -> PortType {
    match target {
        FDTarget::Socket(_) => PortType::Socket,
        FDTarget::Pipe(_) => PortType::Pipe,
        FDTarget::AnonInode(_) => PortType::AnonInode,
        FDTarget::Path(_) if is_dir => PortType::Directory,
        FDTarget::Path(_) => PortType::File,
        _ => PortType::Other,
    }
}

fn ticks_to_duration(ticks: u64, per_second: u64) -> Duration {
    let per_second = per_second.max(1);
    Duration::from_secs(ticks / per_second)
        + Duration::from_nanos((ticks % per_second) * 1_000_000_000 / per_second)
}

fn numeric_entries(path: &Path) -> io::Result<Vec<Pid>> {
    let mut ids: Vec<Pid> = fs::read_dir(path)?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().to_str()?.parse().ok())
        .collect();
    ids.sort_unstable();
    Ok(ids)
}

/// A directory the backend reads from: either held open or addressed by path.
#[derive(Debug, Clone)]
enum Node {
    Open(Arc<File>),
    Path(PathBuf),
}

impl Node {
    /// Path naming this directory. An open directory is reached through its
    /// descriptor, so the path keeps naming it after a rename or pid reuse.
    fn dir(&self) -> PathBuf {
        match self {
            Node::Open(dir) => Path::new(FD_ANCHOR).join(dir.as_raw_fd().to_string()),
            Node::Path(path) => path.clone(),
        }
    }

    fn read(&self, name: &str) -> Result<String> {
        let bytes = fs::read(self.dir().join(name))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn parse<T: FromRead>(&self, name: &str) -> Result<T> {
        let file = File::open(self.dir().join(name))?;
        Ok(T::from_read(file)?)
    }
}

#[derive(Debug)]
struct Registered {
    pid: Pid,
    node: Node,
}

/// [`Introspector`] over a `/proc` tree.
pub struct LinuxIntrospector {
    proc_root: PathBuf,
    etc_root: PathBuf,
    clock_ticks: u64,
    page_size: u64,
    registry: Mutex<HashMap<u64, Registered>>,
    next_id: AtomicU64,
}

impl LinuxIntrospector {
    /// Serve processes under `proc_root`, naming users from `etc_root`.
    pub fn new(proc_root: impl Into<PathBuf>, etc_root: impl Into<PathBuf>) -> Self {
        LinuxIntrospector {
            proc_root: proc_root.into(),
            etc_root: etc_root.into(),
            clock_ticks: procfs::ticks_per_second(),
            page_size: procfs::page_size(),
            registry: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Bytes per memory page.
    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    /// Clock ticks per second.
    pub fn clock_ticks(&self) -> u64 {
        self.clock_ticks
    }

    /// Number of task and thread handles not yet released.
    pub fn outstanding_handles(&self) -> usize {
        self.registry().len()
    }

    fn registry(&self) -> MutexGuard<'_, HashMap<u64, Registered>> {
        self.registry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn register(&self, pid: Pid, node: Node) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.registry().insert(id, Registered { pid, node });
        id
    }

    fn unregister(&self, id: u64) {
        if self.registry().remove(&id).is_none() {
            warn!("released unknown handle {}", id);
        }
    }

    fn node(&self, id: u64) -> Result<Node> {
        self.registry()
            .get(&id)
            .map(|r| r.node.clone())
            .ok_or_else(|| ProcfsError::unavailable(format!("stale handle {}", id)))
    }

    fn pid_dir(&self, pid: Pid) -> PathBuf {
        self.proc_root.join(pid.to_string())
    }

    fn process(&self, pid: Pid) -> Result<Process> {
        Ok(Process::new_with_root(self.pid_dir(pid))?)
    }

    fn uptime(&self) -> Option<f64> {
        let text = fs::read_to_string(self.proc_root.join("uptime")).ok()?;
        text.split_whitespace().next()?.parse().ok()
    }

    fn open_dir(path: &Path) -> Result<File> {
        let dir = File::open(path)?;
        if !dir.metadata()?.is_dir() {
            return Err(ProcfsError::no_such_entry(path.display().to_string()));
        }
        Ok(dir)
    }
}

fn wchan_of(node: &Node) -> Option<String> {
    node.read("wchan")
        .ok()
        .map(|w| w.trim().to_string())
        .filter(|w| !w.is_empty() && w != "0")
}

impl Introspector for LinuxIntrospector {
    fn process_exists(&self, pid: Pid) -> bool {
        pid >= 0 && self.pid_dir(pid).is_dir()
    }

    fn proc_info(&self, pid: Pid) -> Result<ProcInfo> {
        let process = self.process(pid)?;
        let stat = process.stat()?;
        let status = process.status()?;
        Ok(ProcInfo {
            pid,
            ppid: stat.ppid,
            pgid: stat.pgrp,
            sid: stat.session,
            tpgid: stat.tpgid,
            comm: stat.comm,
            tty: tty_name(stat.tty_nr),
            wchan: wchan_of(&Node::Path(self.pid_dir(pid))),
            cred: credentials(&status),
        })
    }

    fn cmdline(&self, pid: Pid) -> Result<Vec<String>> {
        let args = self.process(pid)?.cmdline()?;
        Ok(args.into_iter().filter(|arg| !arg.is_empty()).collect())
    }

    fn process_link(&self, pid: Pid, link: ProcessLink) -> Result<String> {
        let process = self.process(pid)?;
        let target = match link {
            ProcessLink::Cwd => process.cwd()?,
            ProcessLink::Exe => process.exe()?,
            ProcessLink::Root => process.root()?,
        };
        Ok(target.to_string_lossy().into_owned())
    }

    fn user_name(&self, uid: u32) -> Option<String> {
        lookup_name(&self.etc_root.join("passwd"), uid)
    }

    fn group_name(&self, gid: u32) -> Option<String> {
        lookup_name(&self.etc_root.join("group"), gid)
    }

    fn task_for_pid(&self, pid: Pid) -> Result<TaskHandle> {
        if pid < 0 {
            return Err(ProcfsError::no_such_entry(pid.to_string()));
        }
        let dir = Self::open_dir(&self.pid_dir(pid))?;
        let id = self.register(pid, Node::Open(Arc::new(dir)));
        Ok(TaskHandle::new(pid, id))
    }

    fn release_task(&self, task: TaskHandle) {
        self.unregister(task.raw());
    }

    fn acquire_tasks(&self) -> Result<Vec<TaskHandle>> {
        let processes = procfs::process::all_processes_with_root(&self.proc_root)
            .map_err(|e| ProcfsError::unavailable(format!("enumerating processes: {}", e)))?;
        // Entries that fail to open belong to processes that already exited.
        let mut pids: Vec<Pid> = processes.filter_map(|p| p.ok()).map(|p| p.pid()).collect();
        pids.sort_unstable();
        Ok(pids
            .into_iter()
            .map(|pid| {
                let id = self.register(pid, Node::Path(self.pid_dir(pid)));
                TaskHandle::new(pid, id)
            })
            .collect())
    }

    fn release_tasks(&self, tasks: Vec<TaskHandle>) {
        for task in tasks {
            self.unregister(task.raw());
        }
    }

    fn pid_for_task(&self, task: &TaskHandle) -> Result<Pid> {
        let pid = self
            .registry()
            .get(&task.raw())
            .map(|r| r.pid)
            .ok_or_else(|| ProcfsError::unavailable(format!("stale handle {}", task.raw())))?;
        if self.process_exists(pid) {
            Ok(pid)
        } else {
            Err(ProcfsError::no_such_entry(pid.to_string()))
        }
    }

    fn task_basic_info(&self, task: &TaskHandle) -> Result<TaskBasicInfo> {
        let stat: Stat = self.node(task.raw())?.parse("stat")?;
        Ok(TaskBasicInfo {
            policy: stat.policy.unwrap_or(0),
            nice: stat.nice as i32,
            priority: stat.priority as i32,
            resident_bytes: stat.rss * self.page_size,
            virtual_bytes: stat.vsize,
            suspend_count: u32::from(matches!(stat.state, 'T' | 't')),
            user_time: ticks_to_duration(stat.utime, self.clock_ticks),
            system_time: ticks_to_duration(stat.stime, self.clock_ticks),
        })
    }

    fn task_events(&self, task: &TaskHandle) -> Result<TaskEvents> {
        let node = self.node(task.raw())?;
        let stat: Stat = node.parse("stat")?;
        let status: Status = node.parse("status")?;
        // io is only readable by the owner.
        let io: Option<Io> = node.parse("io").ok();
        Ok(TaskEvents {
            faults: stat.minflt + stat.majflt,
            pageins: stat.majflt,
            voluntary_csw: status.voluntary_ctxt_switches,
            involuntary_csw: status.nonvoluntary_ctxt_switches,
            syscalls_read: io.as_ref().map(|io| io.syscr),
            syscalls_write: io.as_ref().map(|io| io.syscw),
        })
    }

    fn task_name(&self, task: &TaskHandle) -> Result<String> {
        let comm = self.node(task.raw())?.read("comm")?;
        Ok(comm.trim_end().to_string())
    }

    fn audit_token(&self, task: &TaskHandle) -> Result<Vec<u32>> {
        let node = self.node(task.raw())?;
        let cred = credentials(&node.parse::<Status>("status")?);
        let read_id = |name: &str| {
            node.read(name)
                .ok()
                .and_then(|v| v.trim().parse::<u32>().ok())
                .unwrap_or(u32::MAX)
        };
        Ok(vec![
            read_id("loginuid"),
            cred.euid,
            cred.egid,
            cred.ruid,
            cred.rgid,
            task.pid() as u32,
            read_id("sessionid"),
            0,
        ])
    }

    fn security_token(&self, task: &TaskHandle) -> Result<String> {
        let node = self.node(task.raw())?;
        match fs::read(node.dir().join("attr/current")) {
            Ok(label) => Ok(String::from_utf8_lossy(&label)
                .trim_end_matches(['\0', '\n'])
                .to_string()),
            // No LSM loaded.
            Err(e)
                if e.kind() == io::ErrorKind::NotFound
                    || e.raw_os_error() == Some(libc::EINVAL) =>
            {
                Ok("unconfined".to_string())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn vm_regions(&self, task: &TaskHandle) -> Result<Vec<VmRegion>> {
        let maps: MemoryMaps = self.node(task.raw())?.parse("maps")?;
        Ok(maps
            .into_iter()
            .filter(|map| map.address.0 <= map.address.1)
            .map(|map| VmRegion {
                start: map.address.0,
                end: map.address.1,
                readable: map.perms.contains(MMPermissions::READ),
                writable: map.perms.contains(MMPermissions::WRITE),
                executable: map.perms.contains(MMPermissions::EXECUTE),
                shared: map.perms.contains(MMPermissions::SHARED),
                offset: map.offset,
                path: mapping_name(&map.pathname),
            })
            .collect())
    }

    fn acquire_threads(&self, task: &TaskHandle) -> Result<Vec<ThreadHandle>> {
        let task_dir = self.node(task.raw())?.dir().join("task");
        let tids = numeric_entries(&task_dir)?;
        let mut threads = Vec::with_capacity(tids.len());
        for tid in tids {
            match Self::open_dir(&task_dir.join(tid.to_string())) {
                Ok(dir) => {
                    let id = self.register(tid, Node::Open(Arc::new(dir)));
                    threads.push(ThreadHandle::new(tid, id));
                }
                Err(e) => debug!("thread {} vanished: {}", tid, e),
            }
        }
        Ok(threads)
    }

    fn release_threads(&self, threads: Vec<ThreadHandle>) {
        for thread in threads {
            self.unregister(thread.raw());
        }
    }

    fn thread_basic_info(
        &self,
        _task: &TaskHandle,
        thread: &ThreadHandle,
    ) -> Result<ThreadBasicInfo> {
        let node = self.node(thread.raw())?;
        let stat: Stat = node.parse("stat")?;
        let name = node.read("comm")?.trim_end().to_string();
        let ticks = self.clock_ticks.max(1) as f64;
        let cpu_usage = match self.uptime() {
            Some(uptime) => {
                let elapsed = uptime - stat.starttime as f64 / ticks;
                if elapsed > 0.0 {
                    let busy = (stat.utime + stat.stime) as f64 / ticks;
                    (busy / elapsed * CPU_USAGE_SCALE).min(CPU_USAGE_SCALE) as u32
                } else {
                    0
                }
            }
            None => 0,
        };
        Ok(ThreadBasicInfo {
            tid: thread.tid(),
            name,
            run_state: stat.state,
            flags: stat.flags,
            policy: stat.policy.unwrap_or(0),
            suspend_count: u32::from(matches!(stat.state, 'T' | 't')),
            cpu_usage,
            user_time: ticks_to_duration(stat.utime, self.clock_ticks),
            system_time: ticks_to_duration(stat.stime, self.clock_ticks),
            wchan: wchan_of(&node),
        })
    }

    fn acquire_ports(&self, task: &TaskHandle) -> Result<PortList> {
        let fd_dir = self.node(task.raw())?.dir().join("fd");
        let names: Vec<u32> = numeric_entries(&fd_dir)?
            .into_iter()
            .filter_map(|fd| u32::try_from(fd).ok())
            .collect();
        let types = names
            .iter()
            .map(|&name| {
                let path = fd_dir.join(name.to_string());
                let is_dir = fs::metadata(&path).map(|m| m.is_dir()).unwrap_or(false);
                fs::read_link(&path)
                    .ok()
                    .and_then(|t| t.to_string_lossy().parse::<FDTarget>().ok())
                    .map(|target| port_type(&target, is_dir))
                    .unwrap_or(PortType::Other)
            })
            .collect();
        Ok(PortList { names, types })
    }

    fn release_ports(&self, ports: PortList) {
        debug!("released {} port names", ports.len());
    }

    fn port_info(&self, task: &TaskHandle, name: u32) -> Result<PortInfo> {
        let node = self.node(task.raw())?;
        let fdinfo = node.read(&format!("fdinfo/{}", name))?;
        let pos = fdinfo_field(&fdinfo, "pos")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let flags = fdinfo_field(&fdinfo, "flags")
            .and_then(|v| u32::from_str_radix(v, 8).ok())
            .unwrap_or(0);
        let target = fs::read_link(node.dir().join("fd").join(name.to_string()))?
            .to_string_lossy()
            .into_owned();
        Ok(PortInfo { flags, pos, target })
    }
}

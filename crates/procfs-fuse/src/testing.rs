//! In-memory backends for unit tests.
//!
//! `MockIntrospector` counts every handle it hands out and every handle it
//! gets back, so tests can assert acquire/release parity after arbitrary
//! sequences of calls. Failures can be injected per query family.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::error::{ProcfsError, Result};
use crate::introspect::{
    CpuInfo, CpuTicks, Credentials, HardwareProbe, Introspector, Pid, PortInfo, PortList,
    PortType, ProcInfo, ProcessLink, Sensor, SensorReading, TaskBasicInfo, TaskEvents,
    TaskHandle, ThreadBasicInfo, ThreadHandle, TpmCaps, VmRegion,
};

#[derive(Debug, Clone)]
pub(crate) struct MockPort {
    pub name: u32,
    pub kind: PortType,
    pub info: PortInfo,
}

#[derive(Debug, Clone)]
pub(crate) struct MockProcess {
    pub info: ProcInfo,
    pub cmdline: Vec<String>,
    pub cwd: String,
    pub exe: String,
    pub root: String,
    pub basic: TaskBasicInfo,
    pub events: TaskEvents,
    pub threads: Vec<ThreadBasicInfo>,
    pub ports: Vec<MockPort>,
    pub regions: Vec<VmRegion>,
    pub security: String,
}

impl MockProcess {
    pub fn new(pid: Pid, name: &str) -> Self {
        MockProcess {
            info: ProcInfo {
                pid,
                ppid: if pid > 1 { 1 } else { 0 },
                pgid: pid,
                sid: pid,
                tpgid: -1,
                comm: name.to_string(),
                tty: None,
                wchan: None,
                cred: Credentials::default(),
            },
            cmdline: vec![format!("/usr/bin/{}", name)],
            cwd: "/".to_string(),
            exe: format!("/usr/bin/{}", name),
            root: "/".to_string(),
            basic: TaskBasicInfo {
                policy: 0,
                nice: 0,
                priority: 20,
                resident_bytes: 4096 * 1024,
                virtual_bytes: 16384 * 1024,
                suspend_count: 0,
                user_time: Duration::from_micros(1_500_000),
                system_time: Duration::from_micros(250_000),
            },
            events: TaskEvents {
                faults: 10,
                pageins: 2,
                voluntary_csw: Some(5),
                involuntary_csw: Some(3),
                syscalls_read: None,
                syscalls_write: None,
            },
            threads: vec![Self::thread(pid, 0, name)],
            ports: Vec::new(),
            regions: Vec::new(),
            security: "unconfined".to_string(),
        }
    }

    fn thread(pid: Pid, index: usize, name: &str) -> ThreadBasicInfo {
        ThreadBasicInfo {
            tid: pid * 1000 + index as Pid,
            name: name.to_string(),
            run_state: 'S',
            flags: 0,
            policy: 0,
            suspend_count: 0,
            cpu_usage: 0,
            user_time: Duration::from_micros(1_000_000),
            system_time: Duration::from_micros(500_000),
            wchan: None,
        }
    }

    pub fn with_threads(mut self, count: usize) -> Self {
        let pid = self.info.pid;
        let name = self.info.comm.clone();
        self.threads = (0..count).map(|i| Self::thread(pid, i, &name)).collect();
        self
    }

    pub fn with_ports(mut self, names: &[u32]) -> Self {
        self.ports = names
            .iter()
            .map(|&name| MockPort {
                name,
                kind: PortType::File,
                info: PortInfo {
                    flags: 0o2,
                    pos: 0,
                    target: format!("/dev/pts/{}", name),
                },
            })
            .collect();
        self
    }

    pub fn with_cred(mut self, cred: Credentials) -> Self {
        self.info.cred = cred;
        self
    }

    pub fn with_cmdline(mut self, args: &[&str]) -> Self {
        self.cmdline = args.iter().map(|a| a.to_string()).collect();
        self
    }
}

#[derive(Default)]
pub(crate) struct MockIntrospector {
    processes: Mutex<Vec<MockProcess>>,
    users: Mutex<HashMap<u32, String>>,
    groups: Mutex<HashMap<u32, String>>,
    acquired: AtomicUsize,
    released: AtomicUsize,
    fail_acquire_tasks: AtomicBool,
    fail_acquire_threads: AtomicBool,
    fail_acquire_ports: AtomicBool,
    fail_task_info: AtomicBool,
    fail_thread_info: AtomicBool,
}

impl MockIntrospector {
    pub fn new() -> Self {
        let mock = Self::default();
        mock.add_user(0, "root");
        mock.add_group(0, "wheel");
        mock
    }

    pub fn add_process(&self, process: MockProcess) {
        self.processes.lock().unwrap().push(process);
    }

    /// Simulate a process exiting between enumeration and query.
    pub fn remove_process(&self, pid: Pid) {
        self.processes.lock().unwrap().retain(|p| p.info.pid != pid);
    }

    pub fn update_process(&self, pid: Pid, f: impl FnOnce(&mut MockProcess)) {
        let mut processes = self.processes.lock().unwrap();
        if let Some(p) = processes.iter_mut().find(|p| p.info.pid == pid) {
            f(p);
        }
    }

    pub fn add_user(&self, uid: u32, name: &str) {
        self.users.lock().unwrap().insert(uid, name.to_string());
    }

    pub fn add_group(&self, gid: u32, name: &str) {
        self.groups.lock().unwrap().insert(gid, name.to_string());
    }

    pub fn fail_acquire_tasks(&self, fail: bool) {
        self.fail_acquire_tasks.store(fail, Ordering::SeqCst);
    }

    pub fn fail_acquire_threads(&self, fail: bool) {
        self.fail_acquire_threads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_acquire_ports(&self, fail: bool) {
        self.fail_acquire_ports.store(fail, Ordering::SeqCst);
    }

    pub fn fail_task_info(&self, fail: bool) {
        self.fail_task_info.store(fail, Ordering::SeqCst);
    }

    pub fn fail_thread_info(&self, fail: bool) {
        self.fail_thread_info.store(fail, Ordering::SeqCst);
    }

    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    pub fn outstanding(&self) -> usize {
        self.acquired() - self.released()
    }

    pub fn balanced(&self) -> bool {
        self.acquired() == self.released()
    }

    fn with_process<T>(&self, pid: Pid, f: impl FnOnce(&MockProcess) -> Result<T>) -> Result<T> {
        let processes = self.processes.lock().unwrap();
        match processes.iter().find(|p| p.info.pid == pid) {
            Some(p) => f(p),
            None => Err(ProcfsError::no_such_entry(format!("/{}", pid))),
        }
    }

    fn check_task_info(&self) -> Result<()> {
        if self.fail_task_info.load(Ordering::SeqCst) {
            return Err(ProcfsError::unavailable("injected task_info failure"));
        }
        Ok(())
    }

    fn count_acquired(&self, n: usize) {
        self.acquired.fetch_add(n, Ordering::SeqCst);
    }

    fn count_released(&self, n: usize) {
        self.released.fetch_add(n, Ordering::SeqCst);
    }
}

impl Introspector for MockIntrospector {
    fn process_exists(&self, pid: Pid) -> bool {
        self.processes
            .lock()
            .unwrap()
            .iter()
            .any(|p| p.info.pid == pid)
    }

    fn proc_info(&self, pid: Pid) -> Result<ProcInfo> {
        self.with_process(pid, |p| Ok(p.info.clone()))
    }

    fn cmdline(&self, pid: Pid) -> Result<Vec<String>> {
        self.with_process(pid, |p| Ok(p.cmdline.clone()))
    }

    fn process_link(&self, pid: Pid, link: ProcessLink) -> Result<String> {
        self.with_process(pid, |p| {
            Ok(match link {
                ProcessLink::Cwd => p.cwd.clone(),
                ProcessLink::Exe => p.exe.clone(),
                ProcessLink::Root => p.root.clone(),
            })
        })
    }

    fn user_name(&self, uid: u32) -> Option<String> {
        self.users.lock().unwrap().get(&uid).cloned()
    }

    fn group_name(&self, gid: u32) -> Option<String> {
        self.groups.lock().unwrap().get(&gid).cloned()
    }

    fn task_for_pid(&self, pid: Pid) -> Result<TaskHandle> {
        self.with_process(pid, |_| Ok(()))?;
        self.count_acquired(1);
        Ok(TaskHandle::new(pid, pid as u64))
    }

    fn release_task(&self, _task: TaskHandle) {
        self.count_released(1);
    }

    fn acquire_tasks(&self) -> Result<Vec<TaskHandle>> {
        if self.fail_acquire_tasks.load(Ordering::SeqCst) {
            return Err(ProcfsError::unavailable("injected processor_set_tasks failure"));
        }
        let tasks: Vec<TaskHandle> = self
            .processes
            .lock()
            .unwrap()
            .iter()
            .map(|p| TaskHandle::new(p.info.pid, p.info.pid as u64))
            .collect();
        self.count_acquired(tasks.len());
        Ok(tasks)
    }

    fn release_tasks(&self, tasks: Vec<TaskHandle>) {
        self.count_released(tasks.len());
    }

    fn task_basic_info(&self, task: &TaskHandle) -> Result<TaskBasicInfo> {
        self.check_task_info()?;
        self.with_process(task.pid(), |p| Ok(p.basic.clone()))
    }

    fn task_events(&self, task: &TaskHandle) -> Result<TaskEvents> {
        self.check_task_info()?;
        self.with_process(task.pid(), |p| Ok(p.events.clone()))
    }

    fn task_name(&self, task: &TaskHandle) -> Result<String> {
        self.with_process(task.pid(), |p| Ok(p.info.comm.clone()))
    }

    fn audit_token(&self, task: &TaskHandle) -> Result<Vec<u32>> {
        self.with_process(task.pid(), |p| {
            let c = &p.info.cred;
            Ok(vec![
                c.euid,
                c.euid,
                c.egid,
                c.ruid,
                c.rgid,
                p.info.pid as u32,
                p.info.sid as u32,
                0,
            ])
        })
    }

    fn security_token(&self, task: &TaskHandle) -> Result<String> {
        self.with_process(task.pid(), |p| Ok(p.security.clone()))
    }

    fn vm_regions(&self, task: &TaskHandle) -> Result<Vec<VmRegion>> {
        self.with_process(task.pid(), |p| Ok(p.regions.clone()))
    }

    fn acquire_threads(&self, task: &TaskHandle) -> Result<Vec<ThreadHandle>> {
        if self.fail_acquire_threads.load(Ordering::SeqCst) {
            return Err(ProcfsError::unavailable("injected task_threads failure"));
        }
        let threads = self.with_process(task.pid(), |p| {
            Ok(p.threads
                .iter()
                .enumerate()
                .map(|(i, t)| ThreadHandle::new(t.tid, i as u64))
                .collect::<Vec<_>>())
        })?;
        self.count_acquired(threads.len());
        Ok(threads)
    }

    fn release_threads(&self, threads: Vec<ThreadHandle>) {
        self.count_released(threads.len());
    }

    fn thread_basic_info(
        &self,
        task: &TaskHandle,
        thread: &ThreadHandle,
    ) -> Result<ThreadBasicInfo> {
        if self.fail_thread_info.load(Ordering::SeqCst) {
            return Err(ProcfsError::unavailable("injected thread_info failure"));
        }
        self.with_process(task.pid(), |p| {
            p.threads
                .get(thread.raw() as usize)
                .cloned()
                .ok_or_else(|| ProcfsError::no_such_entry(format!("thread {}", thread.tid())))
        })
    }

    fn acquire_ports(&self, task: &TaskHandle) -> Result<PortList> {
        if self.fail_acquire_ports.load(Ordering::SeqCst) {
            return Err(ProcfsError::unavailable("injected mach_port_names failure"));
        }
        let ports = self.with_process(task.pid(), |p| {
            Ok(PortList {
                names: p.ports.iter().map(|port| port.name).collect(),
                types: p.ports.iter().map(|port| port.kind).collect(),
            })
        })?;
        self.count_acquired(1);
        Ok(ports)
    }

    fn release_ports(&self, _ports: PortList) {
        self.count_released(1);
    }

    fn port_info(&self, task: &TaskHandle, name: u32) -> Result<PortInfo> {
        self.with_process(task.pid(), |p| {
            p.ports
                .iter()
                .find(|port| port.name == name)
                .map(|port| port.info.clone())
                .ok_or_else(|| ProcfsError::no_such_entry(format!("port {:x}", name)))
        })
    }
}

pub(crate) struct MockHardware {
    pub cpus: Vec<CpuInfo>,
    pub sensors: HashMap<Sensor, SensorReading>,
    pub tpm: Option<(TpmCaps, Vec<[u8; 20]>)>,
}

impl MockHardware {
    pub fn new(cpu_count: usize) -> Self {
        let cpus = (0..cpu_count)
            .map(|slot| CpuInfo {
                slot,
                is_master: slot == 0,
                running: true,
                model: "Mock CPU @ 2.00GHz".to_string(),
                ticks: CpuTicks {
                    user: 100,
                    system: 50,
                    idle: 3450,
                    nice: 0,
                },
                ticks_per_second: 100,
            })
            .collect();
        MockHardware {
            cpus,
            sensors: HashMap::new(),
            tpm: None,
        }
    }

    pub fn with_sensor(mut self, sensor: Sensor, reading: SensorReading) -> Self {
        self.sensors.insert(sensor, reading);
        self
    }

    pub fn with_tpm(mut self, caps: TpmCaps, pcrs: Vec<[u8; 20]>) -> Self {
        self.tpm = Some((caps, pcrs));
        self
    }
}

impl HardwareProbe for MockHardware {
    fn processor_count(&self) -> Result<usize> {
        Ok(self.cpus.len())
    }

    fn cpu_info(&self, cpu: usize) -> Result<CpuInfo> {
        self.cpus
            .get(cpu)
            .cloned()
            .ok_or_else(|| ProcfsError::no_such_entry(format!("cpu {}", cpu)))
    }

    fn read_sensor(&self, sensor: Sensor) -> SensorReading {
        self.sensors
            .get(&sensor)
            .cloned()
            .unwrap_or(SensorReading::NotAvailable)
    }

    fn tpm_caps(&self) -> Result<TpmCaps> {
        self.tpm
            .as_ref()
            .map(|(caps, _)| caps.clone())
            .ok_or_else(|| ProcfsError::unavailable("no TPM"))
    }

    fn tpm_pcrs(&self) -> Result<Vec<[u8; 20]>> {
        self.tpm
            .as_ref()
            .map(|(_, pcrs)| pcrs.clone())
            .ok_or_else(|| ProcfsError::unavailable("no TPM"))
    }
}

/// A context over a shared mock so tests can inspect handle counters after
/// driving the filesystem.
pub(crate) fn mock_context(
    mock: std::sync::Arc<MockIntrospector>,
    hardware: MockHardware,
) -> crate::context::ProcContext {
    crate::context::ProcContext::new(mock, std::sync::Arc::new(hardware)).unwrap()
}

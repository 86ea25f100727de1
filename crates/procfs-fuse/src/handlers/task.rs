//! The `/<pid>/task` subtree: task counters, descriptors (ports), threads,
//! tokens and the memory map.

use std::time::Duration;

use tracing::warn;

use crate::attr::{NodeAttr, NodeKind};
use crate::compose::{push_all, DirSink, Fill};
use crate::content::seconds_micros;
use crate::context::ProcContext;
use crate::error::{ProcfsError, Result};
use crate::handles::{self, TaskGuard};
use crate::introspect::{Introspector, PortInfo, TaskHandle, ThreadBasicInfo, VmRegion};
use crate::route::Captures;

fn open_task<'a>(ctx: &'a ProcContext, args: &Captures) -> Result<TaskGuard<'a>> {
    handles::task_for_pid(ctx.introspector(), args.pid(0)?)
}

/// Name of a scheduling policy.
pub fn policy_name(policy: u32) -> &'static str {
    match policy {
        0 => "SCHED_OTHER",
        1 => "SCHED_FIFO",
        2 => "SCHED_RR",
        3 => "SCHED_BATCH",
        5 => "SCHED_IDLE",
        6 => "SCHED_DEADLINE",
        _ => "UNKNOWN",
    }
}

/// Sum of user and system time over the live threads of a task. Threads that
/// exit between enumeration and query are skipped.
fn thread_times(
    introspector: &dyn Introspector,
    task: &TaskHandle,
) -> Result<(Duration, Duration)> {
    let threads = handles::acquire_threads(introspector, task)?;
    let mut user = Duration::ZERO;
    let mut system = Duration::ZERO;
    for thread in threads.iter() {
        match introspector.thread_basic_info(task, thread) {
            Ok(info) => {
                user += info.user_time;
                system += info.system_time;
            }
            Err(ProcfsError::NoSuchEntry { .. }) => {
                warn!("thread {} exited during enumeration", thread.tid());
            }
            Err(e) => return Err(e),
        }
    }
    Ok((user, system))
}

/// `/<pid>/task/absolutetime_info/<field>`, in nanoseconds.
pub fn render_absolutetime(ctx: &ProcContext, args: &Captures) -> Result<String> {
    let introspector = ctx.introspector();
    let task = open_task(ctx, args)?;
    let nanos = match &args[1] {
        "total_user" => introspector.task_basic_info(&task)?.user_time,
        "total_system" => introspector.task_basic_info(&task)?.system_time,
        "threads_user" => thread_times(introspector, &task)?.0,
        "threads_system" => thread_times(introspector, &task)?.1,
        _ => return Err(args.no_such_entry()),
    }
    .as_nanos();
    Ok(format!("{}\n", nanos))
}

/// `/<pid>/task/basic_info/<field>`
pub fn render_basic_info(ctx: &ProcContext, args: &Captures) -> Result<String> {
    let task = open_task(ctx, args)?;
    let info = ctx.introspector().task_basic_info(&task)?;
    let text = match &args[1] {
        "policy" => policy_name(info.policy).to_string(),
        "resident_size" => format!("{} KB", info.resident_bytes >> 10),
        "virtual_size" => format!("{} KB", info.virtual_bytes >> 10),
        "suspend_count" => info.suspend_count.to_string(),
        "user_time" => seconds_micros(info.user_time),
        "system_time" => seconds_micros(info.system_time),
        _ => return Err(args.no_such_entry()),
    };
    Ok(format!("{}\n", text))
}

fn counter(value: Option<u64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

/// `/<pid>/task/events_info/<field>`
pub fn render_events(ctx: &ProcContext, args: &Captures) -> Result<String> {
    let task = open_task(ctx, args)?;
    let events = ctx.introspector().task_events(&task)?;
    let text = match &args[1] {
        "csw" => counter(
            events
                .voluntary_csw
                .zip(events.involuntary_csw)
                .map(|(v, i)| v + i),
        ),
        "faults" => events.faults.to_string(),
        "pageins" => events.pageins.to_string(),
        "voluntary_csw" => counter(events.voluntary_csw),
        "involuntary_csw" => counter(events.involuntary_csw),
        "syscalls_read" => counter(events.syscalls_read),
        "syscalls_write" => counter(events.syscalls_write),
        _ => return Err(args.no_such_entry()),
    };
    Ok(format!("{}\n", text))
}

/// `/<pid>/task/thread_times_info/{user_time,system_time}`
pub fn render_thread_times(ctx: &ProcContext, args: &Captures) -> Result<String> {
    let task = open_task(ctx, args)?;
    let (user, system) = thread_times(ctx.introspector(), &task)?;
    let text = match &args[1] {
        "user_time" => seconds_micros(user),
        "system_time" => seconds_micros(system),
        _ => return Err(args.no_such_entry()),
    };
    Ok(format!("{}\n", text))
}

/// `/<pid>/task/{name,nice,priority}`
pub fn render_task_field(ctx: &ProcContext, args: &Captures) -> Result<String> {
    let introspector = ctx.introspector();
    let task = open_task(ctx, args)?;
    let text = match &args[1] {
        "name" => introspector.task_name(&task)?,
        "nice" => introspector.task_basic_info(&task)?.nice.to_string(),
        "priority" => introspector.task_basic_info(&task)?.priority.to_string(),
        _ => return Err(args.no_such_entry()),
    };
    Ok(format!("{}\n", text))
}

/// `/<pid>/task/tokens/{audit,security}`
pub fn render_token(ctx: &ProcContext, args: &Captures) -> Result<String> {
    let introspector = ctx.introspector();
    let task = open_task(ctx, args)?;
    let text = match &args[1] {
        "audit" => introspector
            .audit_token(&task)?
            .iter()
            .map(|word| format!("{:x}", word))
            .collect::<Vec<_>>()
            .join(" "),
        "security" => introspector.security_token(&task)?,
        _ => return Err(args.no_such_entry()),
    };
    Ok(format!("{}\n", text))
}

fn protection(region: &VmRegion) -> String {
    let mut prot = String::with_capacity(3);
    prot.push(if region.readable { 'r' } else { '-' });
    prot.push(if region.writable { 'w' } else { '-' });
    prot.push(if region.executable { 'x' } else { '-' });
    prot
}

/// One line of the memory map.
pub fn format_region(region: &VmRegion) -> String {
    let prot = protection(region);
    format!(
        "{:016x}-{:016x} {:>8}K {}/{} {} {:08x} {}",
        region.start,
        region.end,
        region.end.saturating_sub(region.start) >> 10,
        prot,
        prot,
        if region.shared { "SHM" } else { "PRV" },
        region.offset,
        region.path.as_deref().unwrap_or(""),
    )
    .trim_end()
    .to_string()
}

/// `/<pid>/task/vmmap`
pub fn render_vmmap(ctx: &ProcContext, args: &Captures) -> Result<String> {
    let task = open_task(ctx, args)?;
    let regions = ctx.introspector().vm_regions(&task)?;
    let mut out = String::new();
    for region in &regions {
        out.push_str(&format_region(region));
        out.push('\n');
    }
    Ok(out)
}

/// Dynamic entries of `/<pid>/task/ports`: open descriptors in hex.
pub fn list_ports(ctx: &ProcContext, args: &Captures, sink: &mut dyn DirSink) -> Result<Fill> {
    let task = open_task(ctx, args)?;
    let ports = handles::acquire_ports(ctx.introspector(), &task)?;
    let names = ports.names.iter().map(|name| format!("{:x}", name));
    Ok(push_all(sink, NodeKind::Directory, names))
}

/// Look up the port named by capture 1 in a freshly acquired list.
fn port_info(ctx: &ProcContext, args: &Captures) -> Result<PortInfo> {
    let introspector = ctx.introspector();
    let task = open_task(ctx, args)?;
    let ports = handles::acquire_ports(introspector, &task)?;
    let (name, _) = ports
        .find_hex(&args[1])
        .ok_or_else(|| args.no_such_entry())?;
    introspector.port_info(&task, name)
}

/// Attributes of `/<pid>/task/ports/<name>`; the port must exist.
pub fn port_dir_attr(ctx: &ProcContext, args: &Captures) -> Result<NodeAttr> {
    let introspector = ctx.introspector();
    let task = open_task(ctx, args)?;
    let ports = handles::acquire_ports(introspector, &task)?;
    match ports.find_hex(&args[1]) {
        Some(_) => Ok(NodeAttr::default_dir()),
        None => Err(args.no_such_entry()),
    }
}

fn access_rights(flags: u32) -> String {
    let mut rights = match flags & libc::O_ACCMODE as u32 {
        m if m == libc::O_RDONLY as u32 => vec!["READ"],
        m if m == libc::O_WRONLY as u32 => vec!["WRITE"],
        m if m == libc::O_RDWR as u32 => vec!["READ", "WRITE"],
        _ => Vec::new(),
    };
    if flags & libc::O_APPEND as u32 != 0 {
        rights.push("APPEND");
    }
    if flags & libc::O_NONBLOCK as u32 != 0 {
        rights.push("NONBLOCK");
    }
    if flags & libc::O_CLOEXEC as u32 != 0 {
        rights.push("CLOEXEC");
    }
    rights.join(" ")
}

/// `/<pid>/task/ports/<name>/{flags,pos,task_rights}`
pub fn render_port(ctx: &ProcContext, args: &Captures) -> Result<String> {
    let info = port_info(ctx, args)?;
    let text = match &args[2] {
        "flags" => format!("{:o}", info.flags),
        "pos" => info.pos.to_string(),
        "task_rights" => access_rights(info.flags),
        _ => return Err(args.no_such_entry()),
    };
    Ok(format!("{}\n", text))
}

/// `/<pid>/task/ports/<name>/object`
pub fn port_object(ctx: &ProcContext, args: &Captures) -> Result<String> {
    Ok(port_info(ctx, args)?.target)
}

/// Dynamic entries of `/<pid>/task/threads`: enumeration indices in hex.
pub fn list_threads(ctx: &ProcContext, args: &Captures, sink: &mut dyn DirSink) -> Result<Fill> {
    let task = open_task(ctx, args)?;
    let threads = handles::acquire_threads(ctx.introspector(), &task)?;
    let names = (0..threads.count()).map(|i| format!("{:x}", i));
    Ok(push_all(sink, NodeKind::Directory, names))
}

/// Query the thread at the hex index in capture 1.
fn thread_info(ctx: &ProcContext, args: &Captures) -> Result<ThreadBasicInfo> {
    let introspector = ctx.introspector();
    let task = open_task(ctx, args)?;
    let threads = handles::acquire_threads(introspector, &task)?;
    let index = args.hex(1)? as usize;
    let thread = threads.get(index).ok_or_else(|| args.no_such_entry())?;
    introspector.thread_basic_info(&task, thread)
}

/// Attributes of `/<pid>/task/threads/<index>`; the thread must exist.
pub fn thread_dir_attr(ctx: &ProcContext, args: &Captures) -> Result<NodeAttr> {
    let task = open_task(ctx, args)?;
    let threads = handles::acquire_threads(ctx.introspector(), &task)?;
    if (args.hex(1)? as usize) < threads.count() {
        Ok(NodeAttr::default_dir())
    } else {
        Err(args.no_such_entry())
    }
}

fn run_state(state: char) -> (u32, &'static str) {
    match state {
        'R' => (1, "RUNNING"),
        'T' | 't' => (2, "STOPPED"),
        'S' | 'I' => (3, "WAITING"),
        'D' => (4, "UNINTERRUPTIBLE"),
        'Z' | 'X' => (5, "HALTED"),
        _ => (0, "UNKNOWN"),
    }
}

/// `/<pid>/task/threads/<index>/basic_info/<field>`
pub fn render_thread_basic_info(ctx: &ProcContext, args: &Captures) -> Result<String> {
    let info = thread_info(ctx, args)?;
    let text = match &args[2] {
        "cpu_usage" => info.cpu_usage.to_string(),
        "flags" => format!("{:x}", info.flags),
        "policy" => policy_name(info.policy).to_string(),
        "run_state" => {
            let (code, name) = run_state(info.run_state);
            format!("{} ({})", code, name)
        }
        "suspend_count" => info.suspend_count.to_string(),
        "system_time" => seconds_micros(info.system_time),
        "user_time" => seconds_micros(info.user_time),
        _ => return Err(args.no_such_entry()),
    };
    Ok(format!("{}\n", text))
}

/// `/<pid>/task/threads/<index>/{name,tid,wchan}`
pub fn render_thread_field(ctx: &ProcContext, args: &Captures) -> Result<String> {
    let info = thread_info(ctx, args)?;
    let text = match &args[2] {
        "name" => info.name,
        "tid" => info.tid.to_string(),
        "wchan" => match info.wchan {
            Some(w) if !w.is_empty() => w,
            _ => "-".to_string(),
        },
        _ => return Err(args.no_such_entry()),
    };
    Ok(format!("{}\n", text))
}

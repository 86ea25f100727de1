//! Per-process files, credentials and links, and the root process listing.

use tracing::warn;

use crate::attr::{NodeAttr, NodeKind};
use crate::compose::{DirSink, Fill};
use crate::context::ProcContext;
use crate::error::Result;
use crate::handles;
use crate::introspect::{Credentials, Introspector, ProcessLink};
use crate::route::Captures;

/// Dynamic entries of `/`: one directory per live process.
pub fn list_processes(ctx: &ProcContext, _args: &Captures, sink: &mut dyn DirSink) -> Result<Fill> {
    let introspector = ctx.introspector();
    let tasks = handles::acquire_tasks(introspector)?;
    for task in tasks.iter() {
        let pid = match introspector.pid_for_task(task) {
            Ok(pid) => pid,
            Err(e) => {
                warn!("skipping task {}: {}", task.raw(), e);
                continue;
            }
        };
        if !sink.push(&pid.to_string(), NodeKind::Directory) {
            return Ok(Fill::BufferFull);
        }
    }
    Ok(Fill::Done)
}

/// `/<pid>/{cmdline,comm,pgid,ppid,sid,tdev,tpgid,wchan}`
pub fn render_summary(ctx: &ProcContext, args: &Captures) -> Result<String> {
    let pid = args.pid(0)?;
    let introspector = ctx.introspector();
    if &args[1] == "cmdline" {
        if pid == 0 {
            return Ok("kernel\n".to_string());
        }
        let argv = introspector.cmdline(pid)?;
        if argv.is_empty() {
            // Kernel threads have no argument vector.
            let info = introspector.proc_info(pid)?;
            return Ok(format!("[{}]\n", info.comm));
        }
        return Ok(format!("{}\n", argv.join(" ")));
    }

    let info = introspector.proc_info(pid)?;
    let text = match &args[1] {
        "comm" => info.comm,
        "pgid" => info.pgid.to_string(),
        "ppid" => info.ppid.to_string(),
        "sid" => info.sid.to_string(),
        "tpgid" => info.tpgid.to_string(),
        "tdev" => info.tty.unwrap_or_else(|| "none".to_string()),
        "wchan" => match info.wchan {
            Some(w) if !w.is_empty() => w,
            _ => "-".to_string(),
        },
        _ => return Err(args.no_such_entry()),
    };
    Ok(format!("{}\n", text))
}

const PCRED_FIELDS: &[&str] = &["rgid", "ruid", "svgid", "svuid"];
const UCRED_FIELDS: &[&str] = &["groups", "uid"];

fn is_cred_field(set: &str, field: &str) -> bool {
    let fields = match set {
        "pcred" => PCRED_FIELDS,
        "ucred" => UCRED_FIELDS,
        _ => return false,
    };
    fields.iter().any(|f| *f == field)
}

/// Attributes for credential files; only the fields listed by the parent
/// directory exist.
pub fn cred_attr(_ctx: &ProcContext, args: &Captures) -> Result<NodeAttr> {
    if is_cred_field(&args[1], &args[2]) {
        Ok(NodeAttr::default_file())
    } else {
        Err(args.no_such_entry())
    }
}

fn user(introspector: &dyn Introspector, uid: u32) -> String {
    let name = introspector.user_name(uid);
    format!("{}({})", uid, name.as_deref().unwrap_or("?"))
}

fn group(introspector: &dyn Introspector, gid: u32) -> String {
    let name = introspector.group_name(gid);
    format!("{}({})", gid, name.as_deref().unwrap_or("?"))
}

fn render_cred_field(
    introspector: &dyn Introspector,
    cred: &Credentials,
    field: &str,
) -> Option<String> {
    Some(match field {
        "uid" => user(introspector, cred.euid),
        "ruid" => user(introspector, cred.ruid),
        "svuid" => user(introspector, cred.svuid),
        "rgid" => group(introspector, cred.rgid),
        "svgid" => group(introspector, cred.svgid),
        "groups" => cred
            .groups
            .iter()
            .map(|&gid| group(introspector, gid))
            .collect::<Vec<_>>()
            .join(" "),
        _ => return None,
    })
}

/// `/<pid>/{pcred,ucred}/<field>`
pub fn render_cred(ctx: &ProcContext, args: &Captures) -> Result<String> {
    if !is_cred_field(&args[1], &args[2]) {
        return Err(args.no_such_entry());
    }
    let pid = args.pid(0)?;
    let introspector = ctx.introspector();
    let info = introspector.proc_info(pid)?;
    let text = render_cred_field(introspector, &info.cred, &args[2])
        .ok_or_else(|| args.no_such_entry())?;
    Ok(format!("{}\n", text))
}

/// `/<pid>/{cwd,exe,root}`
pub fn link_target(ctx: &ProcContext, args: &Captures) -> Result<String> {
    let pid = args.pid(0)?;
    let link = ProcessLink::from_name(&args[1]).ok_or_else(|| args.no_such_entry())?;
    ctx.introspector().process_link(pid, link)
}

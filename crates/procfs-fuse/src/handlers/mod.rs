//! Data handlers and the route table that binds them to paths.

pub mod hardware;
pub mod process;
pub mod task;

use crate::content::Rendered;
use crate::error::RouteError;
use crate::route::{Route, RouteTables};

/// Every route served by the filesystem, in declaration order.
pub fn default_routes() -> Vec<Route> {
    let mut routes = Vec::new();
    routes.extend(file_routes());
    routes.extend(link_routes());
    routes.extend(dir_routes());
    routes
}

/// Compile [`default_routes`].
pub fn default_tables() -> Result<RouteTables, RouteError> {
    RouteTables::build(default_routes())
}

fn file_routes() -> Vec<Route> {
    let mut routes = vec![
        Route::file(
            r"/hardware/(lightsensor|motionsensor|mouse)/data",
            1,
            Rendered(hardware::render_sensor),
        ),
        Route::file(r"/hardware/cpus/(\d+)/data", 1, Rendered(hardware::render_cpu))
            .attr(hardware::cpu_data_attr),
    ];
    #[cfg(feature = "tpm")]
    routes.extend([
        Route::file(
            r"/hardware/tpm/(hwmodel|hwvendor|hwversion)",
            1,
            Rendered(hardware::render_tpm_caps),
        ),
        Route::file(r"/hardware/tpm/pcrs/pcr(\d+)", 1, Rendered(hardware::render_pcr))
            .attr(hardware::pcr_attr),
    ]);
    routes.extend([
        Route::file(
            r"/(\d+)/(cmdline|comm|pgid|ppid|sid|tdev|tpgid|wchan)",
            2,
            Rendered(process::render_summary),
        ),
        Route::file(
            r"/(\d+)/task/absolutetime_info/(threads_system|threads_user|total_system|total_user)",
            2,
            Rendered(task::render_absolutetime),
        ),
        Route::file(
            r"/(\d+)/task/basic_info/(policy|resident_size|suspend_count|system_time|user_time|virtual_size)",
            2,
            Rendered(task::render_basic_info),
        ),
        Route::file(
            r"/(\d+)/task/events_info/(csw|faults|involuntary_csw|pageins|syscalls_read|syscalls_write|voluntary_csw)",
            2,
            Rendered(task::render_events),
        ),
        Route::file(
            r"/(\d+)/task/thread_times_info/(system_time|user_time)",
            2,
            Rendered(task::render_thread_times),
        ),
        Route::file(
            r"/(\d+)/task/(name|nice|priority)",
            2,
            Rendered(task::render_task_field),
        ),
        Route::file(
            r"/(\d+)/task/ports/([a-f\d]+)/(flags|pos|task_rights)",
            3,
            Rendered(task::render_port),
        ),
        Route::file(
            r"/(\d+)/task/threads/([a-f\d]+)/basic_info/(cpu_usage|flags|policy|run_state|suspend_count|system_time|user_time)",
            3,
            Rendered(task::render_thread_basic_info),
        ),
        Route::file(
            r"/(\d+)/task/threads/([a-f\d]+)/(name|tid|wchan)",
            3,
            Rendered(task::render_thread_field),
        ),
        Route::file(
            r"/(\d+)/task/tokens/(audit|security)",
            2,
            Rendered(task::render_token),
        ),
        Route::file(r"/(\d+)/task/vmmap", 1, Rendered(task::render_vmmap)),
        Route::file(
            r"/(\d+)/(ucred|pcred)/(groups|rgid|ruid|svgid|svuid|uid)",
            3,
            Rendered(process::render_cred),
        )
        .attr(process::cred_attr),
    ]);
    routes
}

fn link_routes() -> Vec<Route> {
    vec![
        Route::link(r"/(\d+)/(cwd|exe|root)", 2, process::link_target),
        Route::link(r"/(\d+)/task/ports/([a-f\d]+)/object", 2, task::port_object),
    ]
}

fn dir_routes() -> Vec<Route> {
    let mut hardware_dirs = vec!["cpus", "lightsensor", "motionsensor", "mouse"];
    if cfg!(feature = "tpm") {
        hardware_dirs.push("tpm");
    }

    let mut routes = vec![
        Route::dir("/")
            .list(process::list_processes)
            .dirs(&["hardware"]),
        Route::dir("/hardware").dirs(&hardware_dirs),
        Route::dir("/hardware/cpus").list(hardware::list_cpus),
        Route::dir(r"/hardware/cpus/(\d+)")
            .arity(1)
            .attr(hardware::cpu_dir_attr)
            .files(&["data"]),
        Route::dir("/hardware/lightsensor").files(&["data"]),
        Route::dir("/hardware/motionsensor").files(&["data"]),
        Route::dir("/hardware/mouse").files(&["data"]),
    ];
    #[cfg(feature = "tpm")]
    routes.extend([
        Route::dir("/hardware/tpm")
            .dirs(&["pcrs"])
            .files(&["hwmodel", "hwvendor", "hwversion"]),
        Route::dir("/hardware/tpm/pcrs").list(hardware::list_pcrs),
    ]);
    routes.extend([
        Route::dir(r"/\d+")
            .dirs(&["pcred", "task", "ucred"])
            .files(&[
                "cmdline", "comm", "pgid", "ppid", "sid", "tdev", "tpgid", "wchan",
            ])
            .links(&["cwd", "exe", "root"]),
        Route::dir(r"/\d+/pcred").files(&["rgid", "ruid", "svgid", "svuid"]),
        Route::dir(r"/\d+/ucred").files(&["groups", "uid"]),
        Route::dir(r"/\d+/task")
            .dirs(&[
                "absolutetime_info",
                "basic_info",
                "events_info",
                "ports",
                "thread_times_info",
                "threads",
                "tokens",
            ])
            .files(&["name", "nice", "priority", "vmmap"]),
        Route::dir(r"/\d+/task/absolutetime_info").files(&[
            "threads_system",
            "threads_user",
            "total_system",
            "total_user",
        ]),
        Route::dir(r"/\d+/task/basic_info").files(&[
            "policy",
            "resident_size",
            "suspend_count",
            "system_time",
            "user_time",
            "virtual_size",
        ]),
        Route::dir(r"/\d+/task/events_info").files(&[
            "csw",
            "faults",
            "involuntary_csw",
            "pageins",
            "syscalls_read",
            "syscalls_write",
            "voluntary_csw",
        ]),
        Route::dir(r"/\d+/task/thread_times_info").files(&["system_time", "user_time"]),
        Route::dir(r"/\d+/task/tokens").files(&["audit", "security"]),
        Route::dir(r"/(\d+)/task/ports")
            .arity(1)
            .list(task::list_ports),
        Route::dir(r"/(\d+)/task/ports/([a-f\d]+)")
            .arity(2)
            .attr(task::port_dir_attr)
            .files(&["flags", "pos", "task_rights"])
            .links(&["object"]),
        Route::dir(r"/(\d+)/task/threads")
            .arity(1)
            .list(task::list_threads),
        Route::dir(r"/(\d+)/task/threads/([a-f\d]+)")
            .arity(2)
            .attr(task::thread_dir_attr)
            .dirs(&["basic_info"])
            .files(&["name", "tid", "wchan"]),
        Route::dir(r"/\d+/task/threads/[a-f\d]+/basic_info").files(&[
            "cpu_usage",
            "flags",
            "policy",
            "run_state",
            "suspend_count",
            "system_time",
            "user_time",
        ]),
    ]);
    routes
}

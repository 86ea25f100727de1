//! Scoped acquisition of backend handles.
//!
//! Every handle list and task handle obtained from an [`Introspector`] is
//! wrapped in a guard that returns it to the backend when dropped. Handlers
//! can therefore use `?` freely between acquisition and the end of the call:
//! the early-return path releases exactly like the normal one.

use std::marker::PhantomData;
use std::ops::Deref;

use tracing::trace;

use crate::error::Result;
use crate::introspect::{Introspector, Pid, PortList, TaskHandle, ThreadHandle};

/// One family of bulk enumeration and how to give it back.
pub trait HandleKind {
    /// What the backend hands out.
    type Items: Default;

    /// Name used in trace output.
    const NAME: &'static str;

    /// Number of handles held.
    fn count(items: &Self::Items) -> usize;
    /// Hand the handles back to the backend.
    fn release(backend: &dyn Introspector, items: Self::Items);
}

/// Every task on the system.
pub enum Tasks {}

/// Threads of one task.
pub enum Threads {}

/// Port names and types of one task.
pub enum Ports {}

impl HandleKind for Tasks {
    type Items = Vec<TaskHandle>;
    const NAME: &'static str = "tasks";

    fn count(items: &Self::Items) -> usize {
        items.len()
    }

    fn release(backend: &dyn Introspector, items: Self::Items) {
        backend.release_tasks(items);
    }
}

impl HandleKind for Threads {
    type Items = Vec<ThreadHandle>;
    const NAME: &'static str = "threads";

    fn count(items: &Self::Items) -> usize {
        items.len()
    }

    fn release(backend: &dyn Introspector, items: Self::Items) {
        backend.release_threads(items);
    }
}

impl HandleKind for Ports {
    type Items = PortList;
    const NAME: &'static str = "ports";

    fn count(items: &Self::Items) -> usize {
        items.len()
    }

    fn release(backend: &dyn Introspector, items: Self::Items) {
        backend.release_ports(items);
    }
}

/// A handle list that is released on drop.
pub struct HandleList<'a, K: HandleKind> {
    backend: &'a dyn Introspector,
    items: K::Items,
    _kind: PhantomData<K>,
}

impl<'a, K: HandleKind> HandleList<'a, K> {
    fn new(backend: &'a dyn Introspector, items: K::Items) -> Self {
        trace!("acquired {} {}", K::count(&items), K::NAME);
        HandleList {
            backend,
            items,
            _kind: PhantomData,
        }
    }

    /// Number of handles held.
    pub fn count(&self) -> usize {
        K::count(&self.items)
    }
}

impl<K: HandleKind> Deref for HandleList<'_, K> {
    type Target = K::Items;

    fn deref(&self) -> &K::Items {
        &self.items
    }
}

impl<K: HandleKind> Drop for HandleList<'_, K> {
    fn drop(&mut self) {
        let items = std::mem::take(&mut self.items);
        trace!("releasing {} {}", K::count(&items), K::NAME);
        K::release(self.backend, items);
    }
}

/// Enumerate every task.
pub fn acquire_tasks(backend: &dyn Introspector) -> Result<HandleList<'_, Tasks>> {
    let items = backend.acquire_tasks()?;
    Ok(HandleList::new(backend, items))
}

/// Enumerate the threads of `task`.
pub fn acquire_threads<'a>(
    backend: &'a dyn Introspector,
    task: &TaskHandle,
) -> Result<HandleList<'a, Threads>> {
    let items = backend.acquire_threads(task)?;
    Ok(HandleList::new(backend, items))
}

/// Enumerate the open descriptors of `task`.
pub fn acquire_ports<'a>(
    backend: &'a dyn Introspector,
    task: &TaskHandle,
) -> Result<HandleList<'a, Ports>> {
    let items = backend.acquire_ports(task)?;
    Ok(HandleList::new(backend, items))
}

/// A single task handle that is released on drop.
pub struct TaskGuard<'a> {
    backend: &'a dyn Introspector,
    task: Option<TaskHandle>,
}

impl Deref for TaskGuard<'_> {
    type Target = TaskHandle;

    fn deref(&self) -> &TaskHandle {
        match self.task.as_ref() {
            Some(task) => task,
            None => unreachable!("task handle used after release"),
        }
    }
}

impl Drop for TaskGuard<'_> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            self.backend.release_task(task);
        }
    }
}

/// Take a handle on `pid`.
pub fn task_for_pid(backend: &dyn Introspector, pid: Pid) -> Result<TaskGuard<'_>> {
    let task = backend.task_for_pid(pid)?;
    Ok(TaskGuard {
        backend,
        task: Some(task),
    })
}

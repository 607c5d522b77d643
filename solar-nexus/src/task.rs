//! Background work owned by component instances.
//!
//! Every [`crate::Context`] carries a [`TaskTracker`]. Work spawned through
//! [`crate::Context::spawn`] is recorded there and aborted when the registry
//! destroys the instance, after its `teardown` hook has run. A component
//! that fails to initialize drops its context, which aborts anything it
//! already started.

use tokio::task::{AbortHandle, JoinHandle};

use crate::component::InstanceId;

/// Handle to spawned background work.
#[derive(Debug)]
pub struct TaskHandle {
    owner: Option<InstanceId>,
    abort_handle: AbortHandle,
}

impl TaskHandle {
    pub(crate) fn new(owner: Option<InstanceId>, join: &JoinHandle<()>) -> Self {
        Self {
            owner,
            abort_handle: join.abort_handle(),
        }
    }

    /// The component instance that spawned the work, if any.
    pub fn owner(&self) -> Option<InstanceId> {
        self.owner
    }

    /// Cancel the work at its next await point.
    pub fn abort(&self) {
        self.abort_handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.abort_handle.is_finished()
    }
}

/// The running work of one component instance.
#[derive(Debug)]
pub struct TaskTracker {
    owner: InstanceId,
    handles: Vec<AbortHandle>,
}

impl TaskTracker {
    pub(crate) fn new(owner: InstanceId) -> Self {
        Self {
            owner,
            handles: Vec::new(),
        }
    }

    pub(crate) fn track(&mut self, join: &JoinHandle<()>) {
        self.handles.retain(|h| !h.is_finished());
        self.handles.push(join.abort_handle());
    }

    pub fn owner(&self) -> InstanceId {
        self.owner
    }

    /// Abort everything still running. Returns how many tasks were live.
    pub fn abort_all(&mut self) -> usize {
        let mut aborted = 0;
        for handle in self.handles.drain(..) {
            if !handle.is_finished() {
                handle.abort();
                aborted += 1;
            }
        }
        if aborted > 0 {
            tracing::debug!(instance = %self.owner, aborted, "aborted component tasks");
        }
        aborted
    }

    pub fn active_count(&self) -> usize {
        self.handles.iter().filter(|h| !h.is_finished()).count()
    }
}

impl Drop for TaskTracker {
    fn drop(&mut self) {
        self.abort_all();
    }
}

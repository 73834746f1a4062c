//! Process-wide "workflow in progress" gate.

use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use usbmaker_error::{WorkflowError, WorkflowResult};

static GLOBAL_GATE: Lazy<Arc<WorkflowGate>> = Lazy::new(|| Arc::new(WorkflowGate::new()));

#[derive(Debug, Default)]
pub struct WorkflowGate {
    busy: AtomicBool,
}

impl WorkflowGate {
    pub const fn new() -> Self {
        Self {
            busy: AtomicBool::new(false),
        }
    }

    /// Gate shared by every orchestrator that was not given its own.
    pub fn global() -> Arc<WorkflowGate> {
        Arc::clone(&GLOBAL_GATE)
    }

    pub fn try_acquire(&self) -> WorkflowResult<GateGuard<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| WorkflowError::Busy)?;
        Ok(GateGuard { gate: self })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

#[derive(Debug)]
pub struct GateGuard<'a> {
    gate: &'a WorkflowGate,
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        self.gate.busy.store(false, Ordering::Release);
    }
}

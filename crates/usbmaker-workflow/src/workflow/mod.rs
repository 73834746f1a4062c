//! Workflow Orchestrator.
//!
//! Composes the inspector, partitioning, formatting, mounts, raw writer and boot
//! installer into the three end-to-end workflows. Steps run strictly in order on
//! one thread; the first failure ends the run and nothing is rolled back.

mod gate;
mod request;
mod sequences;

pub use gate::{GateGuard, WorkflowGate};
pub use request::{BadblocksRequest, WorkflowKind, WorkflowReport, WorkflowRequest};

use crate::config::UsbMakerConfig;
use crate::decision::{Decider, NoAnswer};
use crate::deps::DependencyPaths;
use crate::progress::{LogSink, StatusSink};
use crate::temp_paths::TempPaths;
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use usbmaker_error::WorkflowResult;
use usbmaker_hal::{DeviceInspector, UsbHal};

pub const COMPLETED_STATUS: &str = "Completed";

pub struct Orchestrator {
    hal: Arc<dyn UsbHal>,
    inspector: DeviceInspector,
    deps: DependencyPaths,
    temp: TempPaths,
    sink: Arc<dyn StatusSink>,
    decider: Arc<dyn Decider>,
    gate: Arc<WorkflowGate>,
    verify_default: bool,
}

impl Orchestrator {
    pub fn new(
        hal: Arc<dyn UsbHal>,
        inspector: DeviceInspector,
        deps: DependencyPaths,
        temp: TempPaths,
    ) -> Self {
        Self {
            hal,
            inspector,
            deps,
            temp,
            sink: Arc::new(LogSink),
            decider: Arc::new(NoAnswer),
            gate: WorkflowGate::global(),
            verify_default: true,
        }
    }

    /// Device roots, temp dir, dependency search and verify default from `config`.
    pub fn from_config(hal: Arc<dyn UsbHal>, config: &UsbMakerConfig) -> Self {
        Self {
            verify_default: config.verify_raw_writes,
            ..Self::new(
                hal,
                config.inspector(),
                DependencyPaths::discover(config),
                TempPaths::new(config.temp_root()),
            )
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn StatusSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_decider(mut self, decider: Arc<dyn Decider>) -> Self {
        self.decider = decider;
        self
    }

    pub fn with_gate(mut self, gate: Arc<WorkflowGate>) -> Self {
        self.gate = gate;
        self
    }

    pub fn with_verify_default(mut self, verify: bool) -> Self {
        self.verify_default = verify;
        self
    }

    pub fn dependencies(&self) -> &DependencyPaths {
        &self.deps
    }

    /// Run `request` to completion on the calling thread.
    ///
    /// Fails with `WorkflowError::Busy` without touching anything when another
    /// workflow holds the gate.
    pub fn run(&self, request: &WorkflowRequest) -> WorkflowResult<WorkflowReport> {
        let _gate = self.gate.try_acquire()?;
        log::info!("🚀 Starting {} workflow", request.kind);
        self.sink.on_enabled_changed(false);

        let mut tracker = Tracker::new(self.sink.as_ref());
        let result = self.execute(request, &mut tracker);
        match &result {
            Ok(_) => {
                tracker.set(100);
                tracker.status(COMPLETED_STATUS);
            }
            Err(err) => {
                log::error!("❌ {} workflow failed: {}", request.kind, err);
                let reached = match tracker.last_stage() {
                    Some(stage) => format!(" (last step: {})", stage.trim_end_matches("...")),
                    None => String::new(),
                };
                tracker.status(&format!(
                    "Failed: {}{}. The device was left as it is now; nothing was rolled back.",
                    err, reached
                ));
            }
        }

        self.sink.on_enabled_changed(true);
        result
    }

    /// Run `request` on a dedicated worker thread.
    pub fn spawn(
        self: Arc<Self>,
        request: WorkflowRequest,
    ) -> io::Result<JoinHandle<WorkflowResult<WorkflowReport>>> {
        thread::Builder::new()
            .name("usbmaker-workflow".to_string())
            .spawn(move || self.run(&request))
    }

    fn execute(
        &self,
        request: &WorkflowRequest,
        tracker: &mut Tracker<'_>,
    ) -> WorkflowResult<WorkflowReport> {
        let target = self.check_preconditions(request)?;
        match request.kind {
            WorkflowKind::Format => self.format_only(request, &target, tracker),
            WorkflowKind::RawImage => self.raw_image(request, &target, tracker),
            WorkflowKind::Iso => self.iso_bootable(request, &target, tracker),
        }
    }
}

/// Monotonic progress plus status lines, mirrored to the log.
pub(crate) struct Tracker<'s> {
    sink: &'s dyn StatusSink,
    percent: u8,
    last_stage: Option<String>,
}

impl<'s> Tracker<'s> {
    fn new(sink: &'s dyn StatusSink) -> Self {
        sink.on_progress(0);
        Self {
            sink,
            percent: 0,
            last_stage: None,
        }
    }

    fn last_stage(&self) -> Option<&str> {
        self.last_stage.as_deref()
    }

    pub(crate) fn status(&self, text: &str) {
        log::info!("{}", text);
        self.sink.on_status(text);
    }

    /// Announce a step and move the bar to `percent`.
    pub(crate) fn stage(&mut self, text: &str, percent: u8) {
        self.last_stage = Some(text.to_string());
        self.status(text);
        self.set(percent);
    }

    pub(crate) fn set(&mut self, percent: u8) {
        let percent = percent.min(100);
        if percent > self.percent {
            self.percent = percent;
            self.sink.on_progress(percent);
        }
    }

    /// Map `done / total` onto `from..=to`.
    pub(crate) fn span(&mut self, from: u8, to: u8, done: u64, total: u64) {
        let fraction = if total == 0 {
            1.0
        } else {
            (done as f64 / total as f64).min(1.0)
        };
        let percent = from as f64 + fraction * to.saturating_sub(from) as f64;
        self.set(percent as u8);
    }
}

//! Status/progress notification interface.

use std::sync::mpsc::{Sender, SyncSender};
use std::sync::Mutex;

/// One notification emitted by a running workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressUpdate {
    Status(String),
    Progress(u8),
    /// `false` while a workflow owns the device, `true` once it finished either way.
    Enabled(bool),
}

/// Receiver of workflow notifications. Called synchronously from the worker thread.
pub trait StatusSink: Send + Sync {
    fn on_status(&self, text: &str);
    fn on_progress(&self, percent: u8);
    fn on_enabled_changed(&self, enabled: bool);
}

fn forward(send: impl FnOnce(ProgressUpdate) -> bool, update: ProgressUpdate) {
    // A caller that dropped its receiver no longer cares; the workflow keeps going.
    if !send(update) {
        log::debug!("progress receiver gone");
    }
}

impl StatusSink for Sender<ProgressUpdate> {
    fn on_status(&self, text: &str) {
        forward(|u| self.send(u).is_ok(), ProgressUpdate::Status(text.to_string()));
    }

    fn on_progress(&self, percent: u8) {
        forward(|u| self.send(u).is_ok(), ProgressUpdate::Progress(percent));
    }

    fn on_enabled_changed(&self, enabled: bool) {
        forward(|u| self.send(u).is_ok(), ProgressUpdate::Enabled(enabled));
    }
}

impl StatusSink for SyncSender<ProgressUpdate> {
    fn on_status(&self, text: &str) {
        forward(|u| self.send(u).is_ok(), ProgressUpdate::Status(text.to_string()));
    }

    fn on_progress(&self, percent: u8) {
        forward(|u| self.send(u).is_ok(), ProgressUpdate::Progress(percent));
    }

    fn on_enabled_changed(&self, enabled: bool) {
        forward(|u| self.send(u).is_ok(), ProgressUpdate::Enabled(enabled));
    }
}

/// Sink for headless runs: the workflow already logs every status line.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl StatusSink for LogSink {
    fn on_status(&self, _text: &str) {}

    fn on_progress(&self, percent: u8) {
        log::debug!("progress {}%", percent);
    }

    fn on_enabled_changed(&self, enabled: bool) {
        log::debug!("controls enabled: {}", enabled);
    }
}

/// Keeps every update in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    updates: Mutex<Vec<ProgressUpdate>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn updates(&self) -> Vec<ProgressUpdate> {
        match self.updates.lock() {
            Ok(g) => g.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn statuses(&self) -> Vec<String> {
        self.updates()
            .into_iter()
            .filter_map(|u| match u {
                ProgressUpdate::Status(s) => Some(s),
                _ => None,
            })
            .collect()
    }

    pub fn percents(&self) -> Vec<u8> {
        self.updates()
            .into_iter()
            .filter_map(|u| match u {
                ProgressUpdate::Progress(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    fn push(&self, update: ProgressUpdate) {
        match self.updates.lock() {
            Ok(mut g) => g.push(update),
            Err(poisoned) => poisoned.into_inner().push(update),
        }
    }
}

impl StatusSink for RecordingSink {
    fn on_status(&self, text: &str) {
        self.push(ProgressUpdate::Status(text.to_string()));
    }

    fn on_progress(&self, percent: u8) {
        self.push(ProgressUpdate::Progress(percent));
    }

    fn on_enabled_changed(&self, enabled: bool) {
        self.push(ProgressUpdate::Enabled(enabled));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn channel_sink_forwards_updates() {
        let (tx, rx) = mpsc::channel();
        tx.on_enabled_changed(false);
        tx.on_status("Formatting...");
        tx.on_progress(40);
        let got: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            got,
            vec![
                ProgressUpdate::Enabled(false),
                ProgressUpdate::Status("Formatting...".into()),
                ProgressUpdate::Progress(40),
            ]
        );
    }

    #[test]
    fn dropped_receiver_is_harmless() {
        let (tx, rx) = mpsc::sync_channel(4);
        drop(rx);
        tx.on_status("nobody listens");
    }

    #[test]
    fn recording_sink_splits_kinds() {
        let sink = RecordingSink::new();
        sink.on_status("a");
        sink.on_progress(5);
        sink.on_status("b");
        assert_eq!(sink.statuses(), vec!["a", "b"]);
        assert_eq!(sink.percents(), vec![5]);
    }
}

mod common;

use common::Rig;
use usbmaker_workflow::{FilesystemKind, ProgressUpdate, WorkflowError, WorkflowRequest};

/// Nothing may reach the HAL when a run is rejected up front.
fn assert_rejected_untouched(rig: &Rig, err: &WorkflowError) {
    assert_eq!(rig.hal.operation_count(), 0, "HAL touched after {}", err);
    let status = rig.last_status();
    assert!(status.starts_with("Failed:"), "{}", status);
    rig.assert_enabled_bracket();
}

#[test]
fn non_root_is_rejected() {
    let rig = Rig::new();
    rig.hal.set_root(false);
    let err = rig
        .orchestrator()
        .run(&WorkflowRequest::format(common::DEVICE_ID, FilesystemKind::Fat32))
        .expect_err("not root");
    assert!(matches!(err, WorkflowError::Precondition(ref m) if m.contains("root")));
    assert_rejected_untouched(&rig, &err);
}

#[test]
fn missing_device_is_rejected() {
    let rig = Rig::new();
    let mut request = WorkflowRequest::format(common::DEVICE_ID, FilesystemKind::Fat32);
    request.device = None;
    let err = rig.orchestrator().run(&request).expect_err("no device");
    assert!(matches!(err, WorkflowError::Precondition(_)));
    assert_rejected_untouched(&rig, &err);
}

#[test]
fn unknown_device_is_not_found() {
    let rig = Rig::new();
    let err = rig
        .orchestrator()
        .run(&WorkflowRequest::format("usb-Gone_Stick-0:0", FilesystemKind::Fat32))
        .expect_err("unknown id");
    assert!(matches!(err, WorkflowError::DeviceNotFound(ref id) if id == "usb-Gone_Stick-0:0"));
    assert_rejected_untouched(&rig, &err);
}

#[test]
fn missing_source_image_is_rejected() {
    let rig = Rig::new();
    let missing = rig.root().join("images/nope.iso");
    let err = rig
        .orchestrator()
        .run(&WorkflowRequest::raw_image(common::DEVICE_ID, &missing))
        .expect_err("no image");
    assert!(matches!(err, WorkflowError::Precondition(ref m) if m.contains("nope.iso")));
    assert_rejected_untouched(&rig, &err);
}

#[test]
fn scan_passes_out_of_range_are_rejected() {
    let rig = Rig::new();
    for passes in [0, 5] {
        let err = rig
            .orchestrator()
            .run(&WorkflowRequest::format(common::DEVICE_ID, FilesystemKind::Ext4).with_badblocks(passes, None))
            .expect_err("bad pass count");
        assert!(matches!(err, WorkflowError::Precondition(_)));
    }
    assert_eq!(rig.hal.operation_count(), 0);
}

#[test]
fn invalid_fat_cluster_size_is_rejected_before_partitioning() {
    let rig = Rig::new();
    let err = rig
        .orchestrator()
        .run(&WorkflowRequest::format(common::DEVICE_ID, FilesystemKind::Fat32).with_cluster_size(1536))
        .expect_err("cluster not a power of two");
    assert!(matches!(err, WorkflowError::UnsupportedFilesystem(_)));
    assert_rejected_untouched(&rig, &err);
}

#[test]
fn rejected_run_still_starts_progress_at_zero() {
    let rig = Rig::new();
    rig.hal.set_root(false);
    let _ = rig
        .orchestrator()
        .run(&WorkflowRequest::format(common::DEVICE_ID, FilesystemKind::Fat32));
    let updates = rig.sink.updates();
    assert_eq!(updates[1], ProgressUpdate::Progress(0));
    assert!(!updates.contains(&ProgressUpdate::Progress(100)));
}

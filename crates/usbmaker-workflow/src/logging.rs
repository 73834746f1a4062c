use env_logger::Target;
use std::fs;
use std::io;
use std::path::Path;

const LOG_FILE: &str = "/var/log/usbmaker/usbmaker.log";

/// Install the process-wide logger. Honours `RUST_LOG`; defaults to `info`.
///
/// Nothing in this crate calls it; the frontend that owns the process does,
/// once, before starting a workflow.
pub fn init() {
    init_with(Path::new(LOG_FILE));
}

/// Like [`init`], logging to `log_file` instead of the system location.
///
/// A second call is a no-op.
pub fn init_with(log_file: &Path) {
    // Prefer a stable log file next to the device being destroyed; if it cannot be
    // created (not root, read-only /var), fall back to stderr.
    let target = file_target(log_file).unwrap_or(Target::Stderr);

    let _ = env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .target(target)
        .try_init();
}

fn file_target(log_file: &Path) -> io::Result<Target> {
    if let Some(dir) = log_file.parent() {
        fs::create_dir_all(dir)?;
    }
    let file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)?;
    Ok(Target::Pipe(Box::new(file)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn log_file_and_its_directory_are_created() {
        let tmp = tempdir().unwrap();
        let log_file = tmp.path().join("logs/usbmaker.log");
        assert!(matches!(file_target(&log_file), Ok(Target::Pipe(_))));
        assert!(log_file.is_file());
    }

    #[test]
    fn unwritable_location_falls_back_to_stderr() {
        let tmp = tempdir().unwrap();
        let blocker = tmp.path().join("not-a-dir");
        fs::write(&blocker, b"").unwrap();
        assert!(file_target(&blocker.join("usbmaker.log")).is_err());
    }

    #[test]
    fn init_twice_is_harmless() {
        let tmp = tempdir().unwrap();
        let log_file = tmp.path().join("usbmaker.log");
        init_with(&log_file);
        init_with(&log_file);
        log::info!("logger smoke test");
    }
}

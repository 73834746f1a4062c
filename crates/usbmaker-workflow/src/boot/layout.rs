//! ISOLINUX to SYSLINUX layout conversion.

use super::detect::find_ci;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const DIR_RENAMES: &[(&str, &str)] = &[("boot/isolinux", "boot/syslinux"), ("isolinux", "syslinux")];

const CONFIG_RENAMES: &[(&str, &str)] = &[
    ("boot/syslinux/isolinux.cfg", "boot/syslinux/syslinux.cfg"),
    ("syslinux/isolinux.cfg", "syslinux/syslinux.cfg"),
    ("isolinux.cfg", "syslinux.cfg"),
];

/// SYSLINUX config locations, highest priority first.
pub const CONFIG_CANDIDATES: &[&str] = &[
    "boot/syslinux/syslinux.cfg",
    "syslinux/syslinux.cfg",
    "syslinux.cfg",
];

/// Rename the ISOLINUX directory and config under `root` to their SYSLINUX names.
///
/// Sources are matched ignoring case (`ISOLINUX/ISOLINUX.CFG`) and renamed to
/// the lower-case name. One rename at most per level; a level whose target
/// already exists is done. Returns the renames performed, so a second run
/// returns nothing.
pub fn transform_isolinux(root: &Path) -> io::Result<Vec<(PathBuf, PathBuf)>> {
    let mut done = Vec::new();
    for level in [DIR_RENAMES, CONFIG_RENAMES] {
        if let Some(renamed) = rename_first(root, level)? {
            done.push(renamed);
        }
    }
    Ok(done)
}

fn rename_first(root: &Path, candidates: &[(&str, &str)]) -> io::Result<Option<(PathBuf, PathBuf)>> {
    match pick(candidates, |rel| find_ci(root, rel).is_some()) {
        Some((from, to)) => {
            let Some(from) = find_ci(root, from) else {
                return Ok(None);
            };
            let to = canonical_sibling(&from, to);
            log::info!("🔁 {} -> {}", from.display(), to.display());
            fs::rename(&from, &to)?;
            Ok(Some((from, to)))
        }
        None => Ok(None),
    }
}

/// First rename whose source exists, stopping at a level already converted.
fn pick<'c>(candidates: &[(&'c str, &'c str)], exists: impl Fn(&str) -> bool) -> Option<(&'c str, &'c str)> {
    for &(from, to) in candidates {
        if exists(to) {
            return None;
        }
        if exists(from) {
            return Some((from, to));
        }
    }
    None
}

/// `from` renamed in place to the last component of `to`.
fn canonical_sibling(from: &Path, to: &str) -> PathBuf {
    let name = to.rsplit('/').next().unwrap_or(to);
    match from.parent() {
        Some(parent) => parent.join(name),
        None => PathBuf::from(name),
    }
}

/// SYSLINUX config that [`transform_isolinux`] would leave under `root`, without touching it.
///
/// Runs against the read-only image mount so an image whose menu cannot be
/// found is rejected before the target disk is wiped.
pub fn config_after_transform(root: &Path) -> Option<PathBuf> {
    let dir = pick(DIR_RENAMES, |rel| find_ci(root, rel).is_some());
    // Paths under a directory still to be renamed live at its old name.
    let exists = |rel: &str| {
        if let Some((from, to)) = dir {
            if let Some(rest) = rel.strip_prefix(to).and_then(|r| r.strip_prefix('/')) {
                return find_ci(root, &format!("{}/{}", from, rest)).is_some();
            }
        }
        find_ci(root, rel).is_some()
    };
    let config = pick(CONFIG_RENAMES, &exists);
    CONFIG_CANDIDATES
        .iter()
        .find(|rel| config.map_or(false, |(_, to)| to == **rel) || exists(**rel))
        .map(PathBuf::from)
}

/// First SYSLINUX config present under `root`, relative to it and in its on-disk case.
pub fn original_config(root: &Path) -> Option<PathBuf> {
    CONFIG_CANDIDATES
        .iter()
        .filter_map(|rel| find_ci(root, rel))
        .find(|path| path.is_file())
        .and_then(|path| path.strip_prefix(root).ok().map(Path::to_path_buf))
}

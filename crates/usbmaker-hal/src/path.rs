/// Partition name/path helper for block devices. Handles nvme/mmcblk postfixing.
pub fn partition_path(disk: &str, num: u32) -> String {
    let needs_p = disk
        .rsplit('/')
        .next()
        .is_some_and(|name| name.ends_with(|c: char| c.is_ascii_digit()));
    if needs_p || disk.contains("nvme") || disk.contains("mmcblk") {
        format!("{}p{}", disk, num)
    } else {
        format!("{}{}", disk, num)
    }
}

/// True when `candidate` names a partition of `disk` (`sdb` -> `sdb1`, `nvme0n1` -> `nvme0n1p2`).
pub fn is_partition_of(disk: &str, candidate: &str) -> bool {
    let Some(suffix) = candidate.strip_prefix(disk) else {
        return false;
    };
    let digits = suffix.strip_prefix('p').unwrap_or(suffix);
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
}

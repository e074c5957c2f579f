use std::io;
use std::path::Path;

/// Result of the admission check run before every single download, so a
/// long plan halts mid-way as space fills up.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Admission {
    Allowed,
    DiskFull { used_percent: f64 },
}

/// Check used space on the filesystem hosting the destination against the
/// configured threshold.
pub fn check(destination: &Path, max_used_percent: u8) -> io::Result<Admission> {
    let total = fs2::total_space(destination)?;
    let free = fs2::free_space(destination)?;
    Ok(admission(total, free, max_used_percent))
}

fn admission(total: u64, free: u64, max_used_percent: u8) -> Admission {
    let used = total.saturating_sub(free);
    let used_percent = used as f64 / total as f64 * 100.0;
    if used_percent > f64::from(max_used_percent) {
        Admission::DiskFull { used_percent }
    } else {
        Admission::Allowed
    }
}

use std::io::Write;

use chrono::Local;
use log::LevelFilter;

/// Event categories. The core tags what it emits; the CLI layer decides
/// here which categories get rendered at which verbosity.
///
/// `ROUTINE` carries the download notices for normal and manual recordings,
/// the one thing a scheduler-driven run is expected to report. `OFFLINE`
/// carries expected device-off-network conditions, which are quiet in cron
/// mode and visible interactively. Everything else logs under the module
/// path and follows the general level.
pub const ROUTINE: &str = "routine";
pub const OFFLINE: &str = "offline";

/// Map the verbosity flags onto (general, routine) level filters.
///
/// Defaults mirror unattended use: in cron mode only routine downloads and
/// errors surface; interactively, warnings and up.
fn levels(verbose: u8, quiet: bool, cron: bool) -> (LevelFilter, LevelFilter) {
    if quiet {
        return (LevelFilter::Error, LevelFilter::Error);
    }
    match verbose {
        0 if cron => (LevelFilter::Error, LevelFilter::Info),
        0 => (LevelFilter::Warn, LevelFilter::Warn),
        1 => (LevelFilter::Info, LevelFilter::Info),
        _ => (LevelFilter::Debug, LevelFilter::Debug),
    }
}

pub fn init(verbose: u8, quiet: bool, cron: bool) {
    let (general, routine) = levels(verbose, quiet, cron);

    env_logger::Builder::new()
        .filter_level(general)
        .filter_module(ROUTINE, routine)
        .format(|buf, record| {
            writeln!(
                buf,
                "{}: {} {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .init();
}

mod catalog;
mod cli;
mod disk;
mod download;
mod filename;
mod listing;
mod lock;
mod logging;
mod planner;
mod retention;

use std::fs;
use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::{debug, error, info, warn};

use crate::cli::Args;
use crate::disk::Admission;
use crate::download::{DownloadOutcome, Downloader};
use crate::lock::{InstanceLock, LockError};

/// How a run ended. An offline device and an overlapping invocation are
/// expected steady-state conditions, not failures; a disk-guard halt gets
/// its own exit code so the scheduler can tell the three apart.
enum RunStatus {
    Completed,
    DeviceOffline,
    AlreadyRunning,
    DiskFull,
}

fn main() -> ExitCode {
    let args = Args::parse();
    logging::init(args.verbose, args.quiet, args.cron);

    match run(&args) {
        Ok(RunStatus::Completed | RunStatus::DeviceOffline | RunStatus::AlreadyRunning) => {
            ExitCode::SUCCESS
        }
        Ok(RunStatus::DiskFull) => ExitCode::from(2),
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<RunStatus> {
    if args.timeout <= 0.0 {
        bail!("TIMEOUT must be greater than zero");
    }
    if args.dry_run {
        info!("DRY RUN No action will be taken");
    }

    let cutoff = args
        .keep
        .map(|keep| keep.cutoff_from(chrono::Local::now().date_naive()));
    if let Some(cutoff) = cutoff {
        info!("Recording cutoff date : {cutoff}");
    }

    verify_destination(&args.destination)?;

    let _lock = match InstanceLock::acquire(&args.destination) {
        Ok(lock) => lock,
        Err(e @ LockError::AlreadyRunning(_)) => {
            debug!("{e}");
            return Ok(RunStatus::AlreadyRunning);
        }
        Err(LockError::Io(e)) => {
            return Err(e).with_context(|| {
                format!(
                    "destination directory not writable : {}",
                    args.destination.display()
                )
            })
        }
    };

    let local = catalog::scan(&args.destination)?;
    debug!(
        "destination holds {} completed recording file(s)",
        local.complete_count()
    );

    let timeout = Duration::from_secs_f64(args.timeout);
    // no whole-request deadline: a recording transfer on a slow link can
    // legitimately take minutes
    let client = reqwest::blocking::Client::builder()
        .connect_timeout(timeout)
        .read_timeout(timeout)
        .timeout(None::<Duration>)
        .build()
        .context("cannot build HTTP client")?;
    let base_url = format!("http://{}", args.address);

    let remote = match listing::fetch(&client, &base_url) {
        Ok(remote) => remote,
        Err(e) if e.is_offline() => {
            warn!(target: logging::OFFLINE, "{e}");
            return Ok(RunStatus::DeviceOffline);
        }
        Err(e) => return Err(e.into()),
    };
    debug!("dashcam lists {} recording file(s)", remote.len());

    let plan = planner::plan(remote.clone(), &local, args.priority, cutoff);
    info!("{} recording file(s) to download", plan.len());

    let downloader = Downloader {
        client: &client,
        base_url: &base_url,
        destination: &args.destination,
        dry_run: args.dry_run,
        show_progress: !args.quiet && !args.cron,
    };

    let mut disk_full = false;
    let mut downloaded_files = 0usize;
    let mut downloaded_bytes = 0u64;
    let mut skipped = 0usize;

    for item in &plan {
        if !args.dry_run {
            match disk::check(&args.destination, args.max_used_disk)
                .context("cannot determine disk usage for destination")?
            {
                Admission::Allowed => {}
                Admission::DiskFull { used_percent } => {
                    error!(
                        "Not enough disk space left : {used_percent:.1}% used, maximum allowed : {}%",
                        args.max_used_disk
                    );
                    disk_full = true;
                    break;
                }
            }
        }

        let group = retention::group_dir(args.grouping, item.recording.datetime);
        match downloader.download(item, group.as_deref())? {
            DownloadOutcome::Downloaded { bytes } => {
                downloaded_files += 1;
                downloaded_bytes += bytes;
                notice_downloaded(item, args.dry_run);
            }
            DownloadOutcome::AlreadyPresent => {}
            DownloadOutcome::Skipped(reason) => {
                skipped += 1;
                warn!(
                    "Could not download recording file : {} ; {reason} ; ignoring",
                    item.recording.filename
                );
            }
        }
    }

    if downloaded_files > 0 {
        info!("Downloaded {downloaded_files} recording file(s), {downloaded_bytes} byte(s)");
    }
    if skipped > 0 {
        info!("Skipped {skipped} recording file(s); they will be retried on the next run");
    }

    // temp files for recordings the camera has rotated away can never be
    // resumed; only a fully attempted plan can tell
    if !disk_full {
        download::remove_orphaned_temps(&args.destination, &remote, &local, args.dry_run)?;
    }

    let prune_groups = planner::prune_set(&local, cutoff);
    retention::prune(&prune_groups, &args.destination, args.dry_run)?;

    Ok(if disk_full {
        RunStatus::DiskFull
    } else {
        RunStatus::Completed
    })
}

/// Downloads of normal and manual videos are reported on the routine
/// stream so they stay visible in cron mode; sidecar kinds only show at
/// debug verbosity.
fn notice_downloaded(item: &listing::RemoteFile, dry_run: bool) {
    let prefix = if dry_run {
        "DRY RUN Would download"
    } else {
        "Downloaded"
    };
    let message = format!("{prefix} recording file : {}", item.recording.filename);
    if item.recording.kind != filename::FileKind::Video {
        debug!("{message}");
    } else if item.recording.is_routine() {
        info!(target: logging::ROUTINE, "{message}");
    } else {
        info!("{message}");
    }
}

fn verify_destination(destination: &Path) -> Result<()> {
    if !destination.exists() {
        fs::create_dir_all(destination).with_context(|| {
            format!(
                "cannot create destination directory : {}",
                destination.display()
            )
        })?;
        return Ok(());
    }
    if !destination.is_dir() {
        bail!("destination is not a directory : {}", destination.display());
    }
    Ok(())
}

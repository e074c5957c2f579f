use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use log::debug;
use reqwest::blocking::Client;
use reqwest::header::RANGE;
use reqwest::StatusCode;
use thiserror::Error;

use crate::catalog::LocalCatalog;
use crate::filename;
use crate::listing::RemoteFile;

const BUFFER_SIZE: usize = 256 * 1024; // 256 KB

/// Why a single file was skipped. The rest of the plan continues; the
/// temporary file, if one was started, resumes on a future run.
#[derive(Debug, Error)]
pub enum SkipReason {
    #[error("status code : {0}")]
    HttpStatus(StatusCode),
    #[error("timeout")]
    Timeout,
    #[error("connection failed")]
    Connect,
    #[error("connection lost after {received} of {expected} bytes")]
    Disconnected { received: u64, expected: u64 },
}

#[derive(Debug)]
pub enum DownloadOutcome {
    /// Data was transferred (or would be, on a dry run) and the file sits
    /// at its final grouped location.
    Downloaded { bytes: u64 },
    /// The final file already exists at full size.
    AlreadyPresent,
    /// This file failed; the plan moves on.
    Skipped(SkipReason),
}

enum Transfer {
    Complete { transferred: u64 },
    Skip(SkipReason),
}

/// Sequential single-file transfers: one camera connection, one file at a
/// time. Each file goes Pending → InProgress → Completed or Skipped; a
/// file never re-enters the plan within a run. Resumption across runs
/// works purely through the dot-prefixed temporary file in the
/// destination root.
pub struct Downloader<'a> {
    pub client: &'a Client,
    pub base_url: &'a str,
    pub destination: &'a Path,
    pub dry_run: bool,
    pub show_progress: bool,
}

impl Downloader<'_> {
    pub fn download(&self, file: &RemoteFile, group_dir: Option<&str>) -> Result<DownloadOutcome> {
        let final_dir = match group_dir {
            Some(group) => self.destination.join(group),
            None => self.destination.to_path_buf(),
        };
        let final_path = final_dir.join(&file.recording.filename);

        if let Ok(meta) = fs::metadata(&final_path) {
            if meta.len() == file.size {
                debug!(
                    "ignoring already downloaded recording file : {}",
                    file.recording.filename
                );
                return Ok(DownloadOutcome::AlreadyPresent);
            }
            debug!(
                "local size {} differs from remote size {}, downloading again : {}",
                meta.len(),
                file.size,
                file.recording.filename
            );
        }

        let temp_path = self
            .destination
            .join(filename::temp_name(&file.recording.filename));
        let resume_from = fs::metadata(&temp_path).map(|m| m.len()).unwrap_or(0);
        if resume_from > 0 {
            debug!(
                "found incomplete download : {} ({resume_from} bytes)",
                temp_path.display()
            );
        }

        if self.dry_run {
            return Ok(DownloadOutcome::Downloaded {
                bytes: file.size.saturating_sub(resume_from),
            });
        }

        match self.transfer(file, &temp_path, resume_from)? {
            Transfer::Complete { transferred } => {
                self.finalize(&temp_path, &final_dir, &final_path)?;
                Ok(DownloadOutcome::Downloaded { bytes: transferred })
            }
            Transfer::Skip(reason) => Ok(DownloadOutcome::Skipped(reason)),
        }
    }

    fn transfer(&self, file: &RemoteFile, temp_path: &Path, resume_from: u64) -> Result<Transfer> {
        let url = format!("{}{}", self.base_url, file.path);
        let mut request = self.client.get(&url);
        if resume_from > 0 {
            request = request.header(RANGE, format!("bytes={resume_from}-"));
        }

        let response = match request.send() {
            Ok(response) => response,
            Err(e) if e.is_timeout() => return Ok(Transfer::Skip(SkipReason::Timeout)),
            Err(_) => return Ok(Transfer::Skip(SkipReason::Connect)),
        };

        let status = response.status();
        if status == StatusCode::RANGE_NOT_SATISFIABLE && resume_from >= file.size {
            // the temporary file already holds the whole recording
            return Ok(Transfer::Complete { transferred: 0 });
        }
        if !status.is_success() {
            return Ok(Transfer::Skip(SkipReason::HttpStatus(status)));
        }

        let (mut output, start_offset) = if status == StatusCode::PARTIAL_CONTENT {
            let output = OpenOptions::new()
                .append(true)
                .open(temp_path)
                .with_context(|| format!("cannot append to {}", temp_path.display()))?;
            (output, resume_from)
        } else {
            // server ignored the range request; start over
            let output = File::create(temp_path)
                .with_context(|| format!("cannot create {}", temp_path.display()))?;
            (output, 0)
        };

        let pb = self.progress_bar(file, start_offset)?;
        let started = Instant::now();
        let mut position = start_offset;
        let mut response = response;
        let mut buffer = vec![0u8; BUFFER_SIZE];
        loop {
            let read = match response.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    pb.finish_and_clear();
                    debug!(
                        "transfer interrupted after {position} bytes : {} : {e}",
                        file.recording.filename
                    );
                    return Ok(Transfer::Skip(SkipReason::Disconnected {
                        received: position,
                        expected: file.size,
                    }));
                }
            };
            output
                .write_all(&buffer[..read])
                .with_context(|| format!("cannot write to {}", temp_path.display()))?;
            position += read as u64;
            pb.inc(read as u64);
        }
        pb.finish_and_clear();

        let transferred = position - start_offset;
        log_throughput(&file.recording.filename, transferred, started.elapsed());

        // a clean EOF short of the advertised size is still a lost
        // connection; keep the temporary file for the next run
        if position < file.size {
            return Ok(Transfer::Skip(SkipReason::Disconnected {
                received: position,
                expected: file.size,
            }));
        }

        Ok(Transfer::Complete { transferred })
    }

    fn finalize(&self, temp_path: &Path, final_dir: &Path, final_path: &Path) -> Result<()> {
        fs::create_dir_all(final_dir)
            .with_context(|| format!("cannot create grouping directory : {}", final_dir.display()))?;
        fs::rename(temp_path, final_path).with_context(|| {
            format!(
                "cannot move completed download into place : {}",
                final_path.display()
            )
        })
    }

    fn progress_bar(&self, file: &RemoteFile, position: u64) -> Result<ProgressBar> {
        if !self.show_progress {
            return Ok(ProgressBar::hidden());
        }
        let pb = ProgressBar::new(file.size);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{msg}\n{wide_bar} {percent}% {bytes}/{total_bytes} [{eta}]")?
                .progress_chars("=> "),
        );
        pb.set_message(file.recording.filename.clone());
        pb.set_position(position);
        Ok(pb)
    }
}

fn log_throughput(filename: &str, transferred: u64, elapsed: Duration) {
    let secs = elapsed.as_secs_f64();
    if transferred == 0 || secs <= 0.0 {
        return;
    }
    let mib_per_sec = transferred as f64 / (1024.0 * 1024.0) / secs;
    debug!("transferred {transferred} bytes in {secs:.1}s ({mib_per_sec:.2} MiB/s) : {filename}");
}

/// Remove leftover temporary files whose recording no longer appears in
/// the remote listing; the camera has rotated them away and they can never
/// be resumed. Only called after a fully successful download phase.
pub fn remove_orphaned_temps(
    destination: &Path,
    remote: &[RemoteFile],
    local: &LocalCatalog,
    dry_run: bool,
) -> Result<usize> {
    let remote_names: HashSet<&str> = remote
        .iter()
        .map(|f| f.recording.filename.as_str())
        .collect();

    let mut removed = 0;
    for name in local.partial_names() {
        if remote_names.contains(name) {
            continue;
        }
        let path = destination.join(filename::temp_name(name));
        let size = local.partial_size(name).unwrap_or(0);
        if dry_run {
            debug!("DRY RUN Would remove temporary file : {}", path.display());
            continue;
        }
        debug!("removing temporary file : {} ({size} bytes)", path.display());
        match fs::remove_file(&path) {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("cannot remove temporary file : {}", path.display()))
            }
        }
    }
    Ok(removed)
}

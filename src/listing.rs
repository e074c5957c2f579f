use log::{debug, warn};
use reqwest::blocking::Client;
use reqwest::StatusCode;
use thiserror::Error;

use crate::filename::{self, Recording};

/// Fixed path of the camera's file-listing endpoint.
const LISTING_PATH: &str = "/blackvue_vod.cgi";

/// Failures talking to the camera's listing endpoint.
///
/// `Unreachable` and `Timeout` are the normal state of a dashcam that is
/// away from the network; callers treat them as a clean no-op. The other
/// two indicate a device or firmware problem and fail the run.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("cannot communicate with dashcam at {url} : {source}")]
    Unreachable { url: String, source: reqwest::Error },

    #[error("timeout communicating with dashcam at {url} : {source}")]
    Timeout { url: String, source: reqwest::Error },

    #[error("server error from dashcam at {url} : status {status}")]
    ServerError { url: String, status: StatusCode },

    #[error("unexpected response from dashcam at {url} : {reason}")]
    Protocol { url: String, reason: String },
}

impl RemoteError {
    /// Expected steady-state condition (device off-network), as opposed to
    /// a firmware incompatibility.
    pub fn is_offline(&self) -> bool {
        matches!(self, Self::Unreachable { .. } | Self::Timeout { .. })
    }

    fn from_request(url: &str, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::Timeout {
                url: url.to_string(),
                source,
            }
        } else {
            Self::Unreachable {
                url: url.to_string(),
                source,
            }
        }
    }
}

/// One file advertised by the camera: parsed recording metadata plus the
/// device-side path and the size the listing reported for it.
#[derive(Debug, Clone)]
pub struct RemoteFile {
    pub recording: Recording,
    pub path: String,
    pub size: u64,
}

/// Fetch and parse the camera's recording index.
pub fn fetch(client: &Client, base_url: &str) -> Result<Vec<RemoteFile>, RemoteError> {
    let url = format!("{base_url}{LISTING_PATH}");
    debug!("fetching recording index from {url}");

    let response = client
        .get(&url)
        .send()
        .map_err(|e| RemoteError::from_request(&url, e))?;

    let status = response.status();
    if status.is_server_error() {
        return Err(RemoteError::ServerError { url, status });
    }
    if !status.is_success() {
        return Err(RemoteError::Protocol {
            url,
            reason: format!("status {status}"),
        });
    }

    let body = response
        .text()
        .map_err(|e| RemoteError::from_request(&url, e))?;

    parse_listing(&url, &body)
}

/// Parse the line-oriented listing body: a `v:<version>` marker followed by
/// one `n:<path>,s:<size>` line per file. Individual lines that do not
/// parse are skipped with a warning; a body with no recognizable lines at
/// all is a protocol error.
fn parse_listing(url: &str, body: &str) -> Result<Vec<RemoteFile>, RemoteError> {
    let mut files = Vec::new();
    let mut recognized_any = false;

    for line in body.lines() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }

        if line.starts_with("v:") {
            recognized_any = true;
            debug!("dashcam index version marker : {line}");
            continue;
        }

        let Some(entry) = parse_entry(line) else {
            warn!("skipping unrecognized index line : {line}");
            continue;
        };
        recognized_any = true;

        match entry {
            Entry::File(file) => files.push(file),
            Entry::UnknownFile(name) => {
                // e.g. a firmware revision with new codes; never aborts the run
                warn!("skipping recording with unrecognized filename : {name}");
            }
        }
    }

    if !recognized_any {
        return Err(RemoteError::Protocol {
            url: url.to_string(),
            reason: "response body is not a recording index".to_string(),
        });
    }

    Ok(files)
}

enum Entry {
    File(RemoteFile),
    UnknownFile(String),
}

fn parse_entry(line: &str) -> Option<Entry> {
    let rest = line.strip_prefix("n:")?;
    let (path, size) = rest.rsplit_once(",s:")?;
    let size: u64 = size.parse().ok()?;

    let name = path.rsplit('/').next().unwrap_or(path);
    let entry = match filename::parse(name) {
        Some(recording) => Entry::File(RemoteFile {
            recording,
            path: path.to_string(),
            size,
        }),
        None => Entry::UnknownFile(name.to_string()),
    };
    Some(entry)
}

//! Makes sure a single remote csv ends up complete on disk.
//!
//! A fetch first decides whether anything needs to move: a local file matching the
//! remote length, or a ledger entry pointing at an already converted file, both count
//! as done. Otherwise the transfer continues from the size of whatever partial file is
//! present. Interrupted transfers leave that partial file behind for the next call.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};

use camino::Utf8Path;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::domain::{CanonicalName, RemoteResource, StorageFormat};
use crate::error::HarvestError;
use crate::ledger;
use crate::progress::{ProgressEvent, ProgressSink};
use crate::remote::{BodyReader, RangeBody, RemoteSource};

pub const CHUNK_SIZE: usize = 655_360;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum FetchOutcome {
    AlreadyPresent { size: u64 },
    AlreadyConverted { format: StorageFormat },
    Downloaded { resumed_from: u64, bytes_written: u64 },
}

impl FetchOutcome {
    pub fn action(&self) -> &'static str {
        match self {
            FetchOutcome::AlreadyPresent { .. } => "present",
            FetchOutcome::AlreadyConverted { .. } => "converted",
            FetchOutcome::Downloaded { resumed_from: 0, .. } => "downloaded",
            FetchOutcome::Downloaded { .. } => "resumed",
        }
    }

    pub fn transferred(&self) -> bool {
        matches!(self, FetchOutcome::Downloaded { .. })
    }
}

#[derive(Clone)]
pub struct Fetcher<R: RemoteSource> {
    remote: R,
}

impl<R: RemoteSource> Fetcher<R> {
    pub fn new(remote: R) -> Self {
        Self { remote }
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    pub fn ensure_downloaded(
        &self,
        url: &str,
        local_path: &Utf8Path,
        sink: &dyn ProgressSink,
    ) -> Result<FetchOutcome, HarvestError> {
        let resource = RemoteResource {
            url: url.to_string(),
            expected_length: self.remote.content_length(url)?,
        };

        let name = CanonicalName::from_path(local_path);
        if let Some(outcome) = completion_state(&resource, local_path)? {
            debug!(url, path = %local_path, ?outcome, "already downloaded");
            // A crash between the last chunk and the ledger write leaves a complete csv unrecorded.
            if matches!(outcome, FetchOutcome::AlreadyPresent { .. })
                && ledger::get_format(containing_dir(local_path), &name)?.is_none()
            {
                ledger::record(containing_dir(local_path), &name, StorageFormat::Csv)?;
                info!(url, path = %local_path, "recorded complete csv missing from ledger");
            }
            sink.event(ProgressEvent::AlreadyDownloaded {
                url: url.to_string(),
            });
            return Ok(outcome);
        }

        let (resumed_from, bytes_written) = self.transfer(&resource, local_path, sink)?;
        ledger::record(containing_dir(local_path), &name, StorageFormat::Csv)?;
        if resumed_from > 0 && bytes_written == 0 {
            debug!(url, path = %local_path, size = resumed_from, "server had nothing past local size");
            return Ok(FetchOutcome::AlreadyPresent { size: resumed_from });
        }
        info!(url, path = %local_path, resumed_from, bytes_written, "download complete");
        Ok(FetchOutcome::Downloaded {
            resumed_from,
            bytes_written,
        })
    }

    fn transfer(
        &self,
        resource: &RemoteResource,
        local_path: &Utf8Path,
        sink: &dyn ProgressSink,
    ) -> Result<(u64, u64), HarvestError> {
        let url = resource.url.as_str();
        let expected = resource.expected_length;
        let mut offset = file_size(local_path)?.unwrap_or(0);
        if expected.is_some_and(|expected| offset > expected) {
            warn!(url, path = %local_path, offset, ?expected, "local file larger than remote, restarting");
            offset = 0;
        }

        if offset > 0 {
            sink.event(ProgressEvent::Resuming {
                url: url.to_string(),
                offset,
                expected,
            });
        } else {
            sink.event(ProgressEvent::Downloading {
                url: url.to_string(),
                expected,
            });
        }

        let reader = match self.remote.open_range(url, offset)? {
            RangeBody::Partial(reader) => reader,
            RangeBody::Full(reader) => {
                if offset > 0 {
                    warn!(url, offset, "server ignored range request, restarting");
                    offset = 0;
                }
                reader
            }
            RangeBody::Exhausted => {
                if expected.is_some_and(|expected| offset < expected) {
                    return Err(HarvestError::TransferError {
                        url: url.to_string(),
                        message: format!(
                            "server refused range at {offset} of {} bytes",
                            expected.unwrap_or_default()
                        ),
                    });
                }
                sink.event(ProgressEvent::Completed {
                    url: url.to_string(),
                });
                return Ok((offset, 0));
            }
        };

        let written = write_body(reader, resource, local_path, offset, sink)?;
        let total = offset + written;
        if let Some(expected) = expected {
            if total < expected {
                return Err(HarvestError::TransferError {
                    url: url.to_string(),
                    message: format!("connection closed after {total} of {expected} bytes"),
                });
            }
            if total > expected {
                warn!(url, total, expected, "received more bytes than announced");
            }
        }
        sink.event(ProgressEvent::Completed {
            url: url.to_string(),
        });
        Ok((offset, written))
    }
}

/// `Some` when nothing needs to be transferred for `resource`.
pub fn completion_state(
    resource: &RemoteResource,
    local_path: &Utf8Path,
) -> Result<Option<FetchOutcome>, HarvestError> {
    if let (Some(size), Some(expected)) = (file_size(local_path)?, resource.expected_length) {
        if size == expected {
            return Ok(Some(FetchOutcome::AlreadyPresent { size }));
        }
    }

    let name = CanonicalName::from_path(local_path);
    match ledger::get_format(containing_dir(local_path), &name)? {
        Some(format)
            if format != StorageFormat::Csv
                && name.with_extension(format).as_std_path().is_file() =>
        {
            Ok(Some(FetchOutcome::AlreadyConverted { format }))
        }
        _ => Ok(None),
    }
}

fn write_body(
    mut reader: BodyReader,
    resource: &RemoteResource,
    local_path: &Utf8Path,
    offset: u64,
    sink: &dyn ProgressSink,
) -> Result<u64, HarvestError> {
    let mut file = open_target(local_path, offset)?;
    let mut buffer = vec![0u8; CHUNK_SIZE];
    let mut written = 0u64;

    loop {
        let (filled, read_error) = fill_chunk(&mut reader, &mut buffer);
        if filled > 0 {
            file.write_all(&buffer[..filled])
                .map_err(|err| HarvestError::Filesystem(format!("write {local_path}: {err}")))?;
            written += filled as u64;
            let received = offset + written;
            sink.event(ProgressEvent::Bytes {
                received: resource
                    .expected_length
                    .map_or(received, |expected| received.min(expected)),
                expected: resource.expected_length,
            });
        }
        if let Some(err) = read_error {
            file.flush()
                .map_err(|err| HarvestError::Filesystem(format!("flush {local_path}: {err}")))?;
            warn!(url = %resource.url, path = %local_path, kept = offset + written, "transfer interrupted");
            return Err(HarvestError::TransferError {
                url: resource.url.clone(),
                message: err.to_string(),
            });
        }
        if filled < buffer.len() {
            break;
        }
    }

    file.flush()
        .map_err(|err| HarvestError::Filesystem(format!("flush {local_path}: {err}")))?;
    Ok(written)
}

/// Reads until `buffer` is full or the body ends; bytes read before an error are kept.
fn fill_chunk(reader: &mut impl Read, buffer: &mut [u8]) -> (usize, Option<io::Error>) {
    let mut filled = 0;
    while filled < buffer.len() {
        match reader.read(&mut buffer[filled..]) {
            Ok(0) => break,
            Ok(read) => filled += read,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return (filled, Some(err)),
        }
    }
    (filled, None)
}

fn open_target(local_path: &Utf8Path, offset: u64) -> Result<File, HarvestError> {
    let result = if offset > 0 {
        OpenOptions::new().append(true).open(local_path.as_std_path())
    } else {
        File::create(local_path.as_std_path())
    };
    result.map_err(|err| HarvestError::Filesystem(format!("open {local_path}: {err}")))
}

fn file_size(path: &Utf8Path) -> Result<Option<u64>, HarvestError> {
    match fs::metadata(path.as_std_path()) {
        Ok(meta) if meta.is_file() => Ok(Some(meta.len())),
        Ok(_) => Err(HarvestError::Filesystem(format!("not a file: {path}"))),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(HarvestError::Filesystem(format!("stat {path}: {err}"))),
    }
}

pub(crate) fn containing_dir(path: &Utf8Path) -> &Utf8Path {
    path.parent().unwrap_or(Utf8Path::new(""))
}

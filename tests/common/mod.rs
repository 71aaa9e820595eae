#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::io::{self, Cursor, Read};
use std::sync::Mutex;

use camino::Utf8PathBuf;
use tempfile::TempDir;

use tlc_harvest::error::HarvestError;
use tlc_harvest::progress::{ProgressEvent, ProgressSink};
use tlc_harvest::remote::{RangeBody, RemoteSource};

/// In-memory stand-in for an HTTP server.
#[derive(Default)]
pub struct MockRemote {
    resources: HashMap<String, Vec<u8>>,
    unreachable: HashSet<String>,
    pub ignores_range: bool,
    pub hides_length: bool,
    /// Bytes delivered before the next body fails; consumed by that body.
    pub fail_after: Mutex<Option<usize>>,
    pub head_calls: Mutex<usize>,
    pub range_calls: Mutex<Vec<(String, u64)>>,
}

impl MockRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resource(mut self, url: &str, content: Vec<u8>) -> Self {
        self.resources.insert(url.to_string(), content);
        self
    }

    pub fn with_unreachable(mut self, url: &str) -> Self {
        self.unreachable.insert(url.to_string());
        self
    }

    pub fn range_offsets(&self) -> Vec<u64> {
        self.range_calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, offset)| *offset)
            .collect()
    }

    fn lookup(&self, url: &str) -> Result<&Vec<u8>, HarvestError> {
        if self.unreachable.contains(url) {
            return Err(HarvestError::UnreachableResource {
                url: url.to_string(),
                message: "connection refused".to_string(),
            });
        }
        self.resources
            .get(url)
            .ok_or_else(|| HarvestError::UnreachableResource {
                url: url.to_string(),
                message: "status 404".to_string(),
            })
    }
}

impl RemoteSource for MockRemote {
    fn content_length(&self, url: &str) -> Result<Option<u64>, HarvestError> {
        *self.head_calls.lock().unwrap() += 1;
        let content = self.lookup(url)?;
        if self.hides_length || content.is_empty() {
            return Ok(None);
        }
        Ok(Some(content.len() as u64))
    }

    fn open_range(&self, url: &str, offset: u64) -> Result<RangeBody, HarvestError> {
        self.range_calls
            .lock()
            .unwrap()
            .push((url.to_string(), offset));
        let content = self.lookup(url)?.clone();
        let fail_after = self.fail_after.lock().unwrap().take();
        if offset > 0 && !self.ignores_range {
            if offset >= content.len() as u64 {
                return Ok(RangeBody::Exhausted);
            }
            let tail = content[offset as usize..].to_vec();
            return Ok(RangeBody::Partial(Box::new(FlakyReader::new(tail, fail_after))));
        }
        Ok(RangeBody::Full(Box::new(FlakyReader::new(content, fail_after))))
    }
}

struct FlakyReader {
    inner: Cursor<Vec<u8>>,
    remaining: Option<usize>,
}

impl FlakyReader {
    fn new(content: Vec<u8>, fail_after: Option<usize>) -> Self {
        Self {
            inner: Cursor::new(content),
            remaining: fail_after,
        }
    }
}

impl Read for FlakyReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.remaining {
            Some(0) => Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "connection reset by peer",
            )),
            Some(remaining) => {
                let len = buf.len().min(remaining);
                let read = self.inner.read(&mut buf[..len])?;
                self.remaining = Some(remaining - read);
                Ok(read)
            }
            None => self.inner.read(buf),
        }
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub events: RefCell<Vec<ProgressEvent>>,
}

impl ProgressSink for RecordingSink {
    fn event(&self, event: ProgressEvent) {
        self.events.borrow_mut().push(event);
    }
}

pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

pub fn utf8_tempdir() -> (TempDir, Utf8PathBuf) {
    let temp = tempfile::tempdir().unwrap();
    let path = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    (temp, path)
}

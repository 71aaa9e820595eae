use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Downloading {
        url: String,
        expected: Option<u64>,
    },
    Resuming {
        url: String,
        offset: u64,
        expected: Option<u64>,
    },
    AlreadyDownloaded {
        url: String,
    },
    /// Bytes on disk so far, never above `expected` when it is known.
    Bytes {
        received: u64,
        expected: Option<u64>,
    },
    Completed {
        url: String,
    },
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

/// 1-based position of a link within the whole batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Position {
    pub current: usize,
    pub total: usize,
}

pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn event(&self, _event: ProgressEvent) {}
}

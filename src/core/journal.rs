//! The output journal of a service.
//!
//! The Process Runner copies every line its child writes to stdout or stderr
//! into the journal of the service. The journal keeps the most recent lines in
//! a bounded ring buffer and forwards every new entry to the live followers.
use chrono::{DateTime, Utc};
use derive_more::Display;
use parking_lot::Mutex;
use ringbuf::traits::{Consumer, Observer, RingBuffer};
use ringbuf::HeapRb;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

const LIVE_CAPACITY: usize = 256;

#[derive(Serialize, Deserialize, Copy, Clone, Debug, Display, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Stream {
    #[display("stdout")]
    Stdout,
    #[display("stderr")]
    Stderr,
}

/// One line of output.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Line {
    /// The process that wrote the line.
    pub pid: u32,
    pub stream: Stream,
    pub text: String,
    pub at: DateTime<Utc>,
}

impl Line {
    #[must_use]
    pub fn new(pid: u32, stream: Stream, text: String) -> Self {
        Self {
            pid,
            stream,
            text,
            at: Utc::now(),
        }
    }
}

/// What the followers of a journal receive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Entry {
    Line(Line),
    /// The process is gone; no more lines will come from it.
    Exited { pid: u32, code: i32 },
}

/// Where a follower of one process starts from.
#[derive(Debug)]
pub enum Follow {
    /// The process is still running; its entries arrive here.
    Live(broadcast::Receiver<Entry>),
    /// The process had already exited with this code.
    Exited(i32),
}

pub struct Journal {
    lines: Mutex<HeapRb<Line>>,
    live: broadcast::Sender<Entry>,
    /// The last process that exited and its code.
    last_exit: Mutex<Option<(u32, i32)>>,
}

impl std::fmt::Debug for Journal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Journal").field("len", &self.lines.lock().occupied_len()).finish()
    }
}

impl Journal {
    /// Creates a journal keeping the last `capacity` lines (at least one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (live, _) = broadcast::channel(LIVE_CAPACITY);

        Self {
            lines: Mutex::new(HeapRb::new(capacity.max(1))),
            live,
            last_exit: Mutex::new(None),
        }
    }

    /// Appends a line, dropping the oldest one when the journal is full.
    pub fn push(&self, line: Line) {
        self.lines.lock().push_overwrite(line.clone());

        // Nobody following is fine.
        let _ = self.live.send(Entry::Line(line));
    }

    /// Tells the followers that the process has exited.
    pub fn exited(&self, pid: u32, code: i32) {
        let mut last_exit = self.last_exit.lock();
        *last_exit = Some((pid, code));

        let _ = self.live.send(Entry::Exited { pid, code });
    }

    /// Returns the last `count` lines, oldest first.
    #[must_use]
    pub fn tail(&self, count: usize) -> Vec<Line> {
        let lines = self.lines.lock();
        let skip = lines.occupied_len().saturating_sub(count);

        lines.iter().skip(skip).cloned().collect()
    }

    /// Subscribes to the entries pushed from now on.
    #[must_use]
    pub fn follow(&self) -> broadcast::Receiver<Entry> {
        self.live.subscribe()
    }

    /// Follows one process. A follower that arrives after the exit of the
    /// process gets its code instead of a stream that would never end.
    #[must_use]
    pub fn follow_process(&self, pid: u32) -> Follow {
        let last_exit = self.last_exit.lock();

        match *last_exit {
            Some((exited, code)) if exited == pid => Follow::Exited(code),
            _ => Follow::Live(self.live.subscribe()),
        }
    }
}

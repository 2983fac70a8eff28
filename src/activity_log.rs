use chrono::{
    DateTime,
    Local,
};
use std::{
    collections::VecDeque,
    fmt,
    sync::{
        Arc,
        Mutex,
        MutexGuard,
        PoisonError,
    },
};

pub const DEFAULT_LOG_CAPACITY: usize = 200;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActivityLogEntry {
    pub timestamp: DateTime<Local>,
    pub message: String,
}

impl fmt::Display for ActivityLogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.timestamp.format("%H:%M:%S"), self.message)
    }
}

/// Human readable history of what the client did, newest first.
///
/// Cloning hands out another handle to the same log.
#[derive(Clone, Debug)]
pub struct ActivityLog {
    entries: Arc<Mutex<VecDeque<ActivityLogEntry>>>,
    capacity: usize,
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_LOG_CAPACITY)
    }
}

impl ActivityLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    pub fn append(&self, message: impl Into<String>) {
        let entry = ActivityLogEntry {
            timestamp: Local::now(),
            message: message.into(),
        };
        tracing::info!(target: "activity", "{}", entry.message);
        let mut entries = self.lock();
        entries.push_front(entry);
        entries.truncate(self.capacity);
    }

    pub fn entries(&self) -> Vec<ActivityLogEntry> {
        self.lock().iter().cloned().collect()
    }

    pub fn latest(&self) -> Option<ActivityLogEntry> {
        self.lock().front().cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // a panicking writer cannot leave a half-pushed entry behind, so poisoning is ignored
    fn lock(&self) -> MutexGuard<'_, VecDeque<ActivityLogEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

//! Write counters for bulk loads
//!
//! Two levels:
//! - [`WriteCounters`]: plain per-task-attempt accumulators. Owned by one
//!   task, reset at the start of every attempt, never shared.
//! - [`JobCounters`]: job-wide aggregate. Tasks flush their counters into it
//!   when an attempt finishes; all fields are `AtomicU64` so concurrent
//!   flushes need no coordination.
//!
//! Counters are the only externally visible signal of degraded outcomes:
//! a nonzero `NULL_VERTEX_EDGES_IGNORED` means edges were dropped because
//! an endpoint never made it into the target store.
//!
//! # Example
//!
//! ```
//! use bulkgraph::counters::{Counter, JobCounters, WriteCounters};
//!
//! let job = JobCounters::new();
//! let mut task = WriteCounters::new();
//! task.increment(Counter::VerticesWritten, 1);
//! job.absorb(&task);
//! assert_eq!(job.snapshot().vertices_written, 1);
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

const COUNTER_KINDS: usize = 9;

/// Every counter a load maintains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Counter {
    VerticesRetrieved,
    VerticesWritten,
    VertexPropertiesWritten,
    EdgesWritten,
    EdgePropertiesWritten,
    /// Edges skipped because the far endpoint was never resolved
    NullVertexEdgesIgnored,
    /// Vertices skipped because their own write never happened
    NullVerticesIgnored,
    SuccessfulTransactions,
    FailedTransactions,
}

impl Counter {
    pub const ALL: [Counter; COUNTER_KINDS] = [
        Counter::VerticesRetrieved,
        Counter::VerticesWritten,
        Counter::VertexPropertiesWritten,
        Counter::EdgesWritten,
        Counter::EdgePropertiesWritten,
        Counter::NullVertexEdgesIgnored,
        Counter::NullVerticesIgnored,
        Counter::SuccessfulTransactions,
        Counter::FailedTransactions,
    ];

    /// Name used in logs and reports
    pub fn name(&self) -> &'static str {
        match self {
            Counter::VerticesRetrieved => "VERTICES_RETRIEVED",
            Counter::VerticesWritten => "VERTICES_WRITTEN",
            Counter::VertexPropertiesWritten => "VERTEX_PROPERTIES_WRITTEN",
            Counter::EdgesWritten => "EDGES_WRITTEN",
            Counter::EdgePropertiesWritten => "EDGE_PROPERTIES_WRITTEN",
            Counter::NullVertexEdgesIgnored => "NULL_VERTEX_EDGES_IGNORED",
            Counter::NullVerticesIgnored => "NULL_VERTICES_IGNORED",
            Counter::SuccessfulTransactions => "SUCCESSFUL_TRANSACTIONS",
            Counter::FailedTransactions => "FAILED_TRANSACTIONS",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Per-task-attempt counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteCounters {
    values: [u64; COUNTER_KINDS],
}

impl WriteCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&mut self, counter: Counter, by: u64) {
        self.values[counter.index()] += by;
    }

    pub fn get(&self, counter: Counter) -> u64 {
        self.values[counter.index()]
    }

    /// Zero every counter. Called at the start of each task attempt.
    pub fn reset(&mut self) {
        self.values = [0; COUNTER_KINDS];
    }

    pub fn is_empty(&self) -> bool {
        self.values.iter().all(|v| *v == 0)
    }
}

/// Job-wide aggregate of all finished task attempts.
pub struct JobCounters {
    values: [AtomicU64; COUNTER_KINDS],

    /// Number of task attempts flushed into this aggregate
    attempts_flushed: AtomicU64,

    /// When the job started
    started_at: Instant,
}

/// Point-in-time copy of [`JobCounters`]. Plain values, no atomics.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CountersSnapshot {
    pub vertices_retrieved: u64,
    pub vertices_written: u64,
    pub vertex_properties_written: u64,
    pub edges_written: u64,
    pub edge_properties_written: u64,
    pub null_vertex_edges_ignored: u64,
    pub null_vertices_ignored: u64,
    pub successful_transactions: u64,
    pub failed_transactions: u64,
    /// Task attempts flushed (successful and failed)
    pub attempts_flushed: u64,
    /// Milliseconds since the job counters were created
    pub elapsed_ms: u64,
}

impl CountersSnapshot {
    pub fn get(&self, counter: Counter) -> u64 {
        match counter {
            Counter::VerticesRetrieved => self.vertices_retrieved,
            Counter::VerticesWritten => self.vertices_written,
            Counter::VertexPropertiesWritten => self.vertex_properties_written,
            Counter::EdgesWritten => self.edges_written,
            Counter::EdgePropertiesWritten => self.edge_properties_written,
            Counter::NullVertexEdgesIgnored => self.null_vertex_edges_ignored,
            Counter::NullVerticesIgnored => self.null_vertices_ignored,
            Counter::SuccessfulTransactions => self.successful_transactions,
            Counter::FailedTransactions => self.failed_transactions,
        }
    }

    /// True when no vertex or edge was dropped
    pub fn is_lossless(&self) -> bool {
        self.null_vertex_edges_ignored == 0 && self.null_vertices_ignored == 0
    }
}

impl fmt::Display for CountersSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for counter in Counter::ALL {
            writeln!(f, "{:<27} {}", counter.name(), self.get(counter))?;
        }
        write!(f, "{:<27} {}ms", "ELAPSED", self.elapsed_ms)
    }
}

impl JobCounters {
    pub fn new() -> Self {
        Self {
            values: std::array::from_fn(|_| AtomicU64::new(0)),
            attempts_flushed: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    /// Add one task attempt's counters to the aggregate.
    pub fn absorb(&self, task: &WriteCounters) {
        for counter in Counter::ALL {
            let by = task.get(counter);
            if by > 0 {
                self.values[counter.index()].fetch_add(by, Ordering::Relaxed);
            }
        }
        self.attempts_flushed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self, counter: Counter) -> u64 {
        self.values[counter.index()].load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> CountersSnapshot {
        CountersSnapshot {
            vertices_retrieved: self.get(Counter::VerticesRetrieved),
            vertices_written: self.get(Counter::VerticesWritten),
            vertex_properties_written: self.get(Counter::VertexPropertiesWritten),
            edges_written: self.get(Counter::EdgesWritten),
            edge_properties_written: self.get(Counter::EdgePropertiesWritten),
            null_vertex_edges_ignored: self.get(Counter::NullVertexEdgesIgnored),
            null_vertices_ignored: self.get(Counter::NullVerticesIgnored),
            successful_transactions: self.get(Counter::SuccessfulTransactions),
            failed_transactions: self.get(Counter::FailedTransactions),
            attempts_flushed: self.attempts_flushed.load(Ordering::Relaxed),
            elapsed_ms: self.started_at.elapsed().as_millis() as u64,
        }
    }
}

impl Default for JobCounters {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_write_counters_increment_and_reset() {
        let mut c = WriteCounters::new();
        assert!(c.is_empty());

        c.increment(Counter::EdgesWritten, 3);
        c.increment(Counter::EdgesWritten, 2);
        assert_eq!(c.get(Counter::EdgesWritten), 5);
        assert_eq!(c.get(Counter::VerticesWritten), 0);

        c.reset();
        assert!(c.is_empty());
    }

    #[test]
    fn test_counter_indices_match_all_order() {
        for (i, counter) in Counter::ALL.iter().enumerate() {
            assert_eq!(counter.index(), i);
        }
    }

    #[test]
    fn test_absorb_accumulates() {
        let job = JobCounters::new();
        let mut a = WriteCounters::new();
        a.increment(Counter::VerticesWritten, 2);
        a.increment(Counter::NullVerticesIgnored, 1);
        let mut b = WriteCounters::new();
        b.increment(Counter::VerticesWritten, 3);

        job.absorb(&a);
        job.absorb(&b);

        let snap = job.snapshot();
        assert_eq!(snap.vertices_written, 5);
        assert_eq!(snap.null_vertices_ignored, 1);
        assert_eq!(snap.attempts_flushed, 2);
        assert!(!snap.is_lossless());
    }

    #[test]
    fn test_snapshot_get_matches_fields() {
        let job = JobCounters::new();
        let mut task = WriteCounters::new();
        for (i, counter) in Counter::ALL.iter().enumerate() {
            task.increment(*counter, i as u64 + 1);
        }
        job.absorb(&task);

        let snap = job.snapshot();
        for (i, counter) in Counter::ALL.iter().enumerate() {
            assert_eq!(snap.get(*counter), i as u64 + 1, "{}", counter.name());
        }
    }

    #[test]
    fn test_display_lists_every_counter() {
        let text = JobCounters::new().snapshot().to_string();
        for counter in Counter::ALL {
            assert!(text.contains(counter.name()));
        }
    }

    #[test]
    fn test_thread_safety() {
        let job = Arc::new(JobCounters::new());
        let mut handles = vec![];

        for _ in 0..10 {
            let j = Arc::clone(&job);
            handles.push(thread::spawn(move || {
                let mut task = WriteCounters::new();
                task.increment(Counter::EdgesWritten, 100);
                j.absorb(&task);
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        let snap = job.snapshot();
        assert_eq!(snap.edges_written, 1000);
        assert_eq!(snap.attempts_flushed, 10);
    }
}

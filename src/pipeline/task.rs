//! Per-task store lifecycle
//!
//! Every map task attempt owns one [`TaskContext`]:
//!
//! ```text
//! setup:   open connection -> begin (if transactional) -> probe policy
//! run:     policy writes through the connection, counters accumulate
//! commit:  commit (if transactional) -> SUCCESSFUL_TRANSACTIONS -> shutdown
//! abort:   rollback (if transactional) -> FAILED_TRANSACTIONS -> shutdown
//! ```
//!
//! Counters reach the job aggregate only when the attempt ends. A committed
//! attempt flushes everything; an aborted one flushes only its
//! `FAILED_TRANSACTIONS`, since its writes were rolled back. A context
//! dropped without either (a panic inside a policy or store call) is
//! aborted on drop.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::counters::{Counter, JobCounters, WriteCounters};
use crate::error::{LoadError, Result};
use crate::policy::{ResolvedPolicy, WritePolicy};
use crate::record::{EdgeRecord, TargetId, VertexRecord};
use crate::store::{vertex_exists, GraphStore, StoreFactory};

/// Pipeline stage a task belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    VertexWrite,
    Reconcile,
    EdgeWrite,
}

impl Phase {
    pub fn name(&self) -> &'static str {
        match self {
            Phase::VertexWrite => "vertex-write",
            Phase::Reconcile => "reconcile",
            Phase::EdgeWrite => "edge-write",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// State of one task attempt, built at setup and threaded through the task.
pub struct TaskContext<'a> {
    phase: Phase,
    partition: usize,
    store: Box<dyn GraphStore>,
    policy: ResolvedPolicy,
    counters: WriteCounters,
    transactional: bool,
    finished: bool,
    job: &'a JobCounters,
}

impl<'a> TaskContext<'a> {
    /// Open a connection, begin a transaction when supported, probe the policy.
    pub fn setup(
        phase: Phase,
        partition: usize,
        factory: &dyn StoreFactory,
        policy: &Arc<dyn WritePolicy>,
        job: &'a JobCounters,
    ) -> Result<Self> {
        let mut store = factory.open()?;
        let transactional = store.supports_transactions();
        if transactional {
            if let Err(e) = store.begin() {
                if let Err(close) = store.shutdown() {
                    warn!(%phase, partition, error = %close, "shutdown failed");
                }
                return Err(e);
            }
        }
        debug!(%phase, partition, transactional, "task setup");

        Ok(Self {
            phase,
            partition,
            store,
            policy: ResolvedPolicy::probe(Arc::clone(policy)),
            counters: WriteCounters::new(),
            transactional,
            finished: false,
            job,
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn partition(&self) -> usize {
        self.partition
    }

    pub fn counters(&self) -> &WriteCounters {
        &self.counters
    }

    pub fn increment(&mut self, counter: Counter) {
        self.counters.increment(counter, 1);
    }

    pub fn get_or_create_vertex(&mut self, vertex: &VertexRecord) -> Result<TargetId> {
        self.policy
            .get_or_create_vertex(vertex, self.store.as_mut(), &mut self.counters)
    }

    pub fn get_or_create_edge(
        &mut self,
        edge: &EdgeRecord,
        out: TargetId,
        in_: TargetId,
    ) -> Result<TargetId> {
        self.policy
            .get_or_create_edge(edge, out, in_, self.store.as_mut(), &mut self.counters)
    }

    pub fn vertex_exists(&self, id: TargetId) -> Result<bool> {
        vertex_exists(self.store.as_ref(), id)
    }

    /// Finish cleanly. A failed commit turns into an abort.
    pub fn commit(mut self) -> Result<()> {
        if self.transactional {
            if let Err(e) = self.store.commit() {
                error!(phase = %self.phase, partition = self.partition, error = %e, "commit failed");
                return Err(self.abort(e));
            }
            self.counters.increment(Counter::SuccessfulTransactions, 1);
        }
        self.finished = true;
        let shutdown = self.store.shutdown();
        self.job.absorb(&self.counters);
        debug!(phase = %self.phase, partition = self.partition, "task committed");
        shutdown
    }

    /// Roll back after `cause` and hand it back for propagation.
    pub fn abort(mut self, cause: LoadError) -> LoadError {
        error!(phase = %self.phase, partition = self.partition, error = %cause, "task aborted");
        self.roll_back();
        cause
    }

    /// Roll back, shut down and flush the `FAILED_TRANSACTIONS` residue.
    fn roll_back(&mut self) {
        self.finished = true;
        let mut residue = WriteCounters::new();
        if self.transactional {
            if let Err(e) = self.store.rollback() {
                error!(phase = %self.phase, partition = self.partition, error = %e, "rollback failed");
            }
            residue.increment(Counter::FailedTransactions, 1);
        }
        if let Err(e) = self.store.shutdown() {
            warn!(phase = %self.phase, partition = self.partition, error = %e, "shutdown failed");
        }
        self.job.absorb(&residue);
    }
}

impl Drop for TaskContext<'_> {
    fn drop(&mut self) {
        if !self.finished {
            error!(phase = %self.phase, partition = self.partition, "task dropped before commit");
            self.roll_back();
        }
    }
}

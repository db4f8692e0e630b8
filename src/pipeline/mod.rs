//! Three-phase bulk loader
//!
//! Two jobs, run back to back:
//!
//! ```text
//! vertex job:  VertexWrite (map, N tasks)  --shuffle-->  Reconcile (reduce, R tasks)
//! edge job:    EdgeWrite (map, R tasks, one per reconcile output partition)
//! ```
//!
//! Map tasks run on a rayon pool, each with its own store connection and
//! transaction (see [`task`]). A task attempt that fails is rolled back and
//! retried up to `max_task_attempts`; only a committed attempt's output
//! reaches the next phase. Speculative execution is never enabled: a
//! duplicate attempt would write duplicate elements.

pub mod edge_phase;
pub mod reconcile;
pub mod shuffle;
pub mod task;
pub mod vertex_phase;

pub use shuffle::{Partitioner, Shuffle};
pub use task::{Phase, TaskContext};

use std::collections::HashSet;
use std::io::BufRead;
use std::sync::Arc;

use rayon::prelude::*;
use tracing::{info, warn};

use crate::config::LoadConfig;
use crate::counters::{CountersSnapshot, JobCounters, WriteCounters};
use crate::error::{LoadError, Result};
use crate::graphson;
use crate::policy::{PolicyRegistry, WritePolicy};
use crate::record::{VertexRecord, TERMINATOR_ID};
use crate::store::StoreFactory;

/// One job of the plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobStage {
    pub name: &'static str,
    pub map: Phase,
    pub reduce: Option<Phase>,
    pub map_tasks: usize,
    pub reduce_tasks: usize,
    pub speculative_execution: bool,
}

/// Ordered job definitions for one load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobPlan {
    pub jobs: Vec<JobStage>,
}

impl JobPlan {
    pub fn for_config(config: &LoadConfig) -> Self {
        Self {
            jobs: vec![
                JobStage {
                    name: "vertex",
                    map: Phase::VertexWrite,
                    reduce: Some(Phase::Reconcile),
                    map_tasks: config.effective_map_tasks(),
                    reduce_tasks: config.reduce_tasks,
                    speculative_execution: false,
                },
                JobStage {
                    name: "edge",
                    map: Phase::EdgeWrite,
                    reduce: None,
                    map_tasks: config.reduce_tasks,
                    reduce_tasks: 0,
                    speculative_execution: false,
                },
            ],
        }
    }
}

/// Outcome of a finished load.
#[derive(Debug, Clone)]
pub struct LoadReport {
    pub counters: CountersSnapshot,
    /// Vertices that came out of the reconcile phase
    pub reconciled: usize,
    /// Terminator records emitted by the edge phase, one per reconciled vertex
    pub terminators: usize,
}

/// Local runner for the job plan.
pub struct BulkLoader {
    factory: Arc<dyn StoreFactory>,
    policy: Arc<dyn WritePolicy>,
    config: LoadConfig,
    plan: JobPlan,
}

impl BulkLoader {
    pub fn new(
        factory: Arc<dyn StoreFactory>,
        policy: Arc<dyn WritePolicy>,
        config: LoadConfig,
    ) -> Result<Self> {
        config.validate()?;
        let plan = JobPlan::for_config(&config);
        Ok(Self { factory, policy, config, plan })
    }

    /// Resolve the configured policy name against the built-in registry.
    pub fn from_config(factory: Arc<dyn StoreFactory>, config: LoadConfig) -> Result<Self> {
        let policy = PolicyRegistry::with_builtins(&config.merge_key).resolve(&config.policy)?;
        Self::new(factory, policy, config)
    }

    pub fn config(&self) -> &LoadConfig {
        &self.config
    }

    pub fn plan(&self) -> &JobPlan {
        &self.plan
    }

    /// Read line-oriented JSON vertices, partition them and load.
    pub fn run_input<R: BufRead>(&self, input: R) -> Result<LoadReport> {
        let vertices = graphson::read_vertices(input)?;
        info!(vertices = vertices.len(), "input read");
        self.run(graphson::partition(vertices, self.config.effective_map_tasks()))
    }

    /// Run both jobs over pre-partitioned input.
    ///
    /// Source ids must be unique across all partitions; a repeated id (or
    /// the terminator id) fails the load before anything is written.
    pub fn run(&self, partitions: Vec<Vec<VertexRecord>>) -> Result<LoadReport> {
        check_source_ids(&partitions)?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.effective_threads())
            .build()
            .map_err(|e| LoadError::InvalidConfig(format!("rayon pool: {e}")))?;

        let job = JobCounters::new();
        let (reconciled, terminators) = pool.install(|| self.run_jobs(&partitions, &job))?;

        let counters = job.snapshot();
        info!(
            policy = self.policy.name(),
            reconciled,
            terminators,
            vertices_written = counters.vertices_written,
            edges_written = counters.edges_written,
            null_vertices_ignored = counters.null_vertices_ignored,
            null_vertex_edges_ignored = counters.null_vertex_edges_ignored,
            elapsed_ms = counters.elapsed_ms,
            "load finished"
        );
        Ok(LoadReport { counters, reconciled, terminators })
    }

    fn run_jobs(&self, partitions: &[Vec<VertexRecord>], job: &JobCounters) -> Result<(usize, usize)> {
        // ── Vertex job: map ──────────────────────────────────────────
        let shuffle = Shuffle::new(self.config.reduce_tasks);
        partitions
            .par_iter()
            .enumerate()
            .try_for_each(|(partition, vertices)| -> Result<()> {
                let out = self.with_retries(Phase::VertexWrite, partition, || {
                    let ctx = self.setup(Phase::VertexWrite, partition, job)?;
                    vertex_phase::run_task(ctx, vertices)
                })?;
                shuffle.writer().publish(out)
            })?;
        info!(tasks = partitions.len(), "vertex-write phase done");

        // ── Vertex job: reduce ───────────────────────────────────────
        let reconciled: Vec<Vec<VertexRecord>> = shuffle
            .finish()?
            .into_par_iter()
            .map(|groups| -> Result<Vec<VertexRecord>> {
                let mut counters = WriteCounters::new();
                let out = reconcile::run_partition(groups, &mut counters)?;
                job.absorb(&counters);
                Ok(out)
            })
            .collect::<Result<_>>()?;
        let reconciled_total: usize = reconciled.iter().map(Vec::len).sum();
        info!(tasks = reconciled.len(), vertices = reconciled_total, "reconcile phase done");

        // ── Edge job: map ────────────────────────────────────────────
        let terminators: Vec<usize> = reconciled
            .par_iter()
            .enumerate()
            .map(|(partition, vertices)| {
                self.with_retries(Phase::EdgeWrite, partition, || {
                    let ctx = self.setup(Phase::EdgeWrite, partition, job)?;
                    edge_phase::run_task(ctx, vertices).map(|t| t.len())
                })
            })
            .collect::<Result<_>>()?;
        info!(tasks = reconciled.len(), "edge-write phase done");

        Ok((reconciled_total, terminators.into_iter().sum()))
    }

    fn setup<'a>(&self, phase: Phase, partition: usize, job: &'a JobCounters) -> Result<TaskContext<'a>> {
        TaskContext::setup(phase, partition, self.factory.as_ref(), &self.policy, job)
    }

    /// Run `attempt` until it succeeds or attempts run out.
    fn with_retries<T>(
        &self,
        phase: Phase,
        partition: usize,
        mut attempt: impl FnMut() -> Result<T>,
    ) -> Result<T> {
        let max = self.config.max_task_attempts;
        let mut tried = 0;
        loop {
            tried += 1;
            match attempt() {
                Ok(value) => return Ok(value),
                Err(e) if tried < max => {
                    warn!(%phase, partition, attempt = tried, error = %e, "task attempt failed, retrying");
                }
                Err(e) => {
                    return Err(LoadError::TaskFailed {
                        phase: phase.name(),
                        partition,
                        attempts: tried,
                        source: Box::new(e),
                    });
                }
            }
        }
    }
}

fn check_source_ids(partitions: &[Vec<VertexRecord>]) -> Result<()> {
    let mut seen = HashSet::new();
    for vertex in partitions.iter().flatten() {
        if vertex.id == TERMINATOR_ID {
            return Err(LoadError::ReservedVertexId(vertex.id));
        }
        if !seen.insert(vertex.id) {
            return Err(LoadError::DuplicateVertex(vertex.id));
        }
    }
    Ok(())
}

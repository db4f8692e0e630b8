//! Shuffle between the vertex-write and reconcile phases.
//!
//! Map tasks publish `(key, envelope)` pairs after their transaction
//! commits. Each pair is bincode-encoded and sent down the channel of the
//! reduce partition its key hashes to. Once every map task is done the
//! channels are drained and grouped by key, ascending.

use std::collections::BTreeMap;

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::error::{LoadError, Result};
use crate::record::TaggedEnvelope;

/// Deterministic key -> reduce partition assignment.
#[derive(Debug, Clone, Copy)]
pub struct Partitioner {
    partitions: usize,
}

impl Partitioner {
    /// # Panics
    ///
    /// Panics if `partitions` is 0.
    pub fn new(partitions: usize) -> Self {
        assert!(partitions > 0, "partitions must be > 0");
        Self { partitions }
    }

    pub fn partitions(&self) -> usize {
        self.partitions
    }

    /// blake3 of the little-endian key, reduced via modulo.
    pub fn partition_of(&self, key: u64) -> usize {
        let hash = blake3::hash(&key.to_le_bytes());
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&hash.as_bytes()[0..8]);
        (u64::from_le_bytes(prefix) % self.partitions as u64) as usize
    }
}

type Frame = (u64, Vec<u8>);

/// Sending side, shared by all map tasks.
#[derive(Clone)]
pub struct ShuffleWriter {
    partitioner: Partitioner,
    senders: Vec<Sender<Frame>>,
}

impl ShuffleWriter {
    /// Publish one committed attempt's output.
    pub fn publish(&self, records: Vec<(u64, TaggedEnvelope)>) -> Result<()> {
        for (key, envelope) in records {
            let bytes = envelope.encode()?;
            let partition = self.partitioner.partition_of(key);
            self.senders[partition]
                .send((key, bytes))
                .map_err(|_| LoadError::Shuffle(format!("partition {partition} closed")))?;
        }
        Ok(())
    }
}

/// Grouped input of one reduce partition
pub type ReduceInput = BTreeMap<u64, Vec<TaggedEnvelope>>;

/// One shuffle instance per vertex job.
pub struct Shuffle {
    writer: ShuffleWriter,
    receivers: Vec<Receiver<Frame>>,
}

impl Shuffle {
    pub fn new(partitions: usize) -> Self {
        let partitioner = Partitioner::new(partitions);
        let (senders, receivers) = (0..partitions).map(|_| unbounded()).unzip();
        Self {
            writer: ShuffleWriter { partitioner, senders },
            receivers,
        }
    }

    pub fn writer(&self) -> &ShuffleWriter {
        &self.writer
    }

    /// Close the sending side and group every partition by key.
    ///
    /// Must be called after all map tasks returned; clones of the writer
    /// still alive would keep the channels open.
    pub fn finish(self) -> Result<Vec<ReduceInput>> {
        let Shuffle { writer, receivers } = self;
        drop(writer);

        receivers
            .into_iter()
            .map(|rx| -> Result<ReduceInput> {
                let mut groups = ReduceInput::new();
                for (key, bytes) in rx.try_iter() {
                    groups.entry(key).or_default().push(TaggedEnvelope::decode(&bytes)?);
                }
                Ok(groups)
            })
            .collect()
    }
}

//! The static three-stage kernel chain.
//!
//! digestA and digestB both read the raw candidate; combine reads their two
//! outputs. All three are enqueued back to back on the in-order queue and
//! the batch ends with a blocking read of the combined buffers, so no host
//! synchronisation happens between stages.

use chain_core::CandidateGenerator;
use engine_host::ComputeBackend;

use crate::buffers::{BufferRole, BufferSet, PairRole};
use crate::config::{EntryPoints, LengthLayout};
use crate::linker::LinkedProgram;
use crate::release::ReleaseStack;
use crate::SearchError;

/// A pipeline stage: kernel symbol plus positional buffer bindings.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Stage {
    pub name: &'static str,
    pub entry_point: String,
    pub bindings: Vec<BufferRole>,
}

/// The pipeline topology, in enqueue order.
pub fn stage_table(entry_points: &EntryPoints) -> [Stage; 3] {
    use BufferRole::{Length, Value};
    use PairRole::{Candidate, Combined, DigestA, DigestB};

    [
        Stage {
            name: "digestA",
            entry_point: entry_points.digest_a.clone(),
            bindings: vec![
                Value(Candidate),
                Length(Candidate),
                Value(DigestA),
                Length(DigestA),
            ],
        },
        Stage {
            name: "digestB",
            entry_point: entry_points.digest_b.clone(),
            bindings: vec![
                Value(Candidate),
                Length(Candidate),
                Value(DigestB),
                Length(DigestB),
            ],
        },
        Stage {
            name: "combine",
            entry_point: entry_points.combine.clone(),
            bindings: vec![
                Value(DigestA),
                Length(DigestA),
                Value(DigestB),
                Length(DigestB),
                Value(Combined),
                Length(Combined),
            ],
        },
    ]
}

struct BoundStage<B: ComputeBackend> {
    stage: Stage,
    kernel: B::Kernel,
}

/// Host-side candidate data for one batch.
pub struct CandidateBatch {
    start: u64,
    words: Vec<u32>,
    lengths: Vec<u32>,
    generator: CandidateGenerator,
}

impl CandidateBatch {
    pub fn new(
        batch_size: usize,
        block_words: usize,
        layout: LengthLayout,
        candidate_bytes: usize,
    ) -> Self {
        Self {
            start: 0,
            words: vec![0; batch_size * block_words],
            lengths: vec![candidate_bytes as u32; layout.words(batch_size)],
            generator: CandidateGenerator::new(block_words),
        }
    }

    /// Re-encode the batch to hold candidates `start..start + batch_size`.
    pub fn refill(&mut self, start: u64) {
        self.start = start;
        self.generator.fill_batch(start, &mut self.words);
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn words(&self) -> &[u32] {
        &self.words
    }

    pub fn lengths(&self) -> &[u32] {
        &self.lengths
    }
}

/// Host copy of the combined value and length buffers after a batch.
pub struct BatchReadback {
    pub values: Vec<u32>,
    pub lengths: Vec<u32>,
}

impl BatchReadback {
    pub fn new(value_words: usize, length_words: usize) -> Self {
        Self {
            values: vec![0; value_words],
            lengths: vec![0; length_words],
        }
    }
}

/// Kernels of the three stages, created from one linked program.
pub struct KernelPipeline<B: ComputeBackend> {
    stages: ReleaseStack<BoundStage<B>>,
}

impl<B: ComputeBackend> KernelPipeline<B> {
    /// Create one kernel per stage. A missing entry point is fatal.
    pub fn new(
        backend: &B,
        program: &LinkedProgram<B>,
        entry_points: &EntryPoints,
    ) -> Result<Self, SearchError> {
        let table = stage_table(entry_points);
        let mut stages = ReleaseStack::with_capacity(table.len());
        for stage in table {
            let kernel = backend
                .create_kernel(program.program(), &stage.entry_point)
                .map_err(|e| SearchError::in_stage(stage.name, e))?;
            log::debug!(target: "search", "stage {} -> kernel {}", stage.name, stage.entry_point);
            stages.push(BoundStage { stage, kernel });
        }
        Ok(Self { stages })
    }

    pub fn stages(&self) -> impl Iterator<Item = &Stage> {
        self.stages.iter().map(|s| &s.stage)
    }

    /// Run one batch through all stages and read back the combined output.
    pub fn execute(
        &self,
        backend: &B,
        buffers: &BufferSet<B>,
        batch: &CandidateBatch,
        readback: &mut BatchReadback,
    ) -> Result<(), SearchError> {
        backend.write_buffer(buffers.get(BufferRole::Value(PairRole::Candidate)), batch.words())?;
        backend.write_buffer(
            buffers.get(BufferRole::Length(PairRole::Candidate)),
            batch.lengths(),
        )?;

        for bound in self.stages.iter() {
            let args: Vec<&B::Buffer> = bound
                .stage
                .bindings
                .iter()
                .map(|role| buffers.get(*role))
                .collect();
            backend
                .enqueue_kernel(&bound.kernel, &args, buffers.batch_size())
                .map_err(|e| SearchError::in_stage(bound.stage.name, e))?;
        }

        backend.read_buffer(
            buffers.get(BufferRole::Value(PairRole::Combined)),
            &mut readback.values,
        )?;
        backend.read_buffer(
            buffers.get(BufferRole::Length(PairRole::Combined)),
            &mut readback.lengths,
        )?;
        Ok(())
    }
}

use std::time::{Duration, Instant};

use chain_core::{digests_match, CandidateGenerator};
use engine_host::ComputeBackend;

use crate::buffers::BufferSet;
use crate::config::{LengthLayout, SearchConfig};
use crate::pipeline::{BatchReadback, CandidateBatch, KernelPipeline};
use crate::SearchError;

/// Lifecycle of a search: `Idle -> Running -> {Found | Exhausted}`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SearchPhase {
    Idle,
    Running,
    Found,
    Exhausted,
}

/// Progress of one search, mutated only by [`SearchLoop`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SearchState {
    pub phase: SearchPhase,
    pub current_iteration: u64,
    pub batch_size: usize,
    pub max_iterations: u64,
    pub found: bool,
    pub matched_index: Option<u64>,
}

impl SearchState {
    pub fn new(batch_size: usize, max_iterations: u64) -> Self {
        Self {
            phase: SearchPhase::Idle,
            current_iteration: 0,
            batch_size,
            max_iterations,
            found: false,
            matched_index: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.found || self.current_iteration == self.max_iterations
    }
}

/// The matching candidate.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MatchedCandidate {
    /// Absolute candidate index, `iteration * batch_size + slot`.
    pub index: u64,
    pub iteration: u64,
    pub slot: usize,
    /// Combined output bytes that matched the target.
    pub digest: Vec<u8>,
}

/// Final outcome of a search.
#[derive(Clone, Debug)]
pub enum SearchStatus {
    Found {
        candidate: MatchedCandidate,
        hash_count: u64,
        elapsed: Duration,
    },
    Exhausted {
        hash_count: u64,
        elapsed: Duration,
    },
}

impl SearchStatus {
    pub fn hash_count(&self) -> u64 {
        match self {
            SearchStatus::Found { hash_count, .. } | SearchStatus::Exhausted { hash_count, .. } => {
                *hash_count
            }
        }
    }

    pub fn elapsed(&self) -> Duration {
        match self {
            SearchStatus::Found { elapsed, .. } | SearchStatus::Exhausted { elapsed, .. } => {
                *elapsed
            }
        }
    }

    pub fn found_index(&self) -> Option<u64> {
        match self {
            SearchStatus::Found { candidate, .. } => Some(candidate.index),
            SearchStatus::Exhausted { .. } => None,
        }
    }
}

/// Scan the combined output of one batch for the target.
///
/// Slots are visited in increasing order and the first match wins. The
/// declared length of every visited slot must be in `1..=slot_bytes`.
pub fn scan_batch(
    values: &[u32],
    lengths: &[u32],
    layout: LengthLayout,
    slot_bytes: usize,
    target: &[u8],
) -> Result<Option<usize>, SearchError> {
    if slot_bytes == 0 {
        return Ok(None);
    }
    let bytes: &[u8] = bytemuck::cast_slice(values);
    for (slot, output) in bytes.chunks_exact(slot_bytes).enumerate() {
        let at = match layout {
            LengthLayout::PerSlot => slot,
            LengthLayout::Shared => 0,
        };
        let declared = lengths.get(at).copied().unwrap_or(0);
        if declared == 0 || declared as usize > slot_bytes {
            return Err(SearchError::KernelContract {
                slot,
                declared,
                capacity: slot_bytes,
            });
        }
        if digests_match(output, target, declared as usize) {
            return Ok(Some(slot));
        }
    }
    Ok(None)
}

/// Drives batches through the pipeline until a match or the iteration budget
/// runs out.
pub struct SearchLoop<'a, B: ComputeBackend> {
    backend: &'a B,
    pipeline: &'a KernelPipeline<B>,
    buffers: &'a BufferSet<B>,
    config: &'a SearchConfig,
    state: SearchState,
}

impl<'a, B: ComputeBackend> SearchLoop<'a, B> {
    pub fn new(
        backend: &'a B,
        pipeline: &'a KernelPipeline<B>,
        buffers: &'a BufferSet<B>,
        config: &'a SearchConfig,
    ) -> Self {
        Self {
            backend,
            pipeline,
            buffers,
            config,
            state: SearchState::new(buffers.batch_size(), config.max_iterations),
        }
    }

    pub fn state(&self) -> &SearchState {
        &self.state
    }

    pub fn run(&mut self) -> Result<SearchStatus, SearchError> {
        let started = Instant::now();
        let batch_size = self.buffers.batch_size();
        let slot_bytes = self.buffers.value_bytes() / batch_size.max(1);
        let target = self.config.target.as_bytes();

        let mut batch = CandidateBatch::new(
            batch_size,
            self.buffers.block_words(),
            self.buffers.layout(),
            self.config.candidate_bytes,
        );
        let mut readback =
            BatchReadback::new(self.buffers.value_words(), self.buffers.length_words());

        self.state.phase = SearchPhase::Running;
        log::info!(
            target: "search",
            "Searching {} batches of {} candidates on {}",
            self.state.max_iterations,
            batch_size,
            self.backend.name()
        );

        let mut hash_count: u64 = 0;
        while self.state.current_iteration < self.state.max_iterations {
            let iteration = self.state.current_iteration;
            let start = CandidateGenerator::batch_start(iteration, batch_size);
            batch.refill(start);
            self.pipeline
                .execute(self.backend, self.buffers, &batch, &mut readback)?;

            let hit = scan_batch(
                &readback.values,
                &readback.lengths,
                self.buffers.layout(),
                slot_bytes,
                target,
            )?;

            if let Some(slot) = hit {
                let index = CandidateGenerator::slot_index(start, slot);
                hash_count = hash_count.saturating_add(slot as u64 + 1);
                #[cfg(feature = "metrics")]
                {
                    metrics::record_batch(slot as u64 + 1);
                    metrics::set_search_found(true);
                }

                let bytes: &[u8] = bytemuck::cast_slice(&readback.values);
                let offset = slot * slot_bytes;
                let digest = bytes[offset..offset + target.len().min(slot_bytes)].to_vec();

                self.state.phase = SearchPhase::Found;
                self.state.found = true;
                self.state.matched_index = Some(index);
                return Ok(SearchStatus::Found {
                    candidate: MatchedCandidate {
                        index,
                        iteration,
                        slot,
                        digest,
                    },
                    hash_count,
                    elapsed: started.elapsed(),
                });
            }

            hash_count = hash_count.saturating_add(batch_size as u64);
            #[cfg(feature = "metrics")]
            metrics::record_batch(batch_size as u64);

            self.state.current_iteration += 1;
            if self.config.progress_every > 0
                && self.state.current_iteration % self.config.progress_every == 0
            {
                let secs = started.elapsed().as_secs_f64();
                let rate = if secs > 0.0 {
                    hash_count as f64 / secs
                } else {
                    0.0
                };
                log::debug!(
                    target: "search",
                    "batch {}/{}: {} candidates, {:.0} H/s",
                    self.state.current_iteration,
                    self.state.max_iterations,
                    hash_count,
                    rate
                );
            }
        }

        self.backend.finish()?;
        self.state.phase = SearchPhase::Exhausted;
        Ok(SearchStatus::Exhausted {
            hash_count,
            elapsed: started.elapsed(),
        })
    }
}

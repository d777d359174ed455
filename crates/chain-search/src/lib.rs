#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

//! Device program setup and the batched candidate search.
//!
//! A run goes through two phases:
//! - setup: compile every source unit (through the source cache), link them
//!   into one program, create the three stage kernels and allocate the
//!   buffer table;
//! - search: enumerate consecutive candidate indices batch by batch, run
//!   the digest pipeline on each batch and compare every slot of the combined
//!   output against the target.
//!
//! Every failure is fatal and surfaces as a [`SearchError`]. Device objects
//! are released in reverse creation order however the run ends.

pub mod buffers;
pub mod config;
mod error;
pub mod linker;
pub mod module_cache;
pub mod pipeline;
mod release;
pub mod search;

#[cfg(test)]
mod end_to_end_tests;

pub use buffers::{BufferPair, BufferRole, BufferSet, PairRole};
pub use config::{
    EntryPoints, LengthLayout, Preset, SearchConfig, SourceLayout, SourceUnit,
    DEFAULT_CACHE_SUFFIX, DEFAULT_COMPILE_OPTIONS,
};
pub use error::SearchError;
pub use linker::LinkedProgram;
pub use module_cache::{ModuleCache, ModuleOrigin, SourceModule};
pub use pipeline::{KernelPipeline, Stage};
pub use search::{MatchedCandidate, SearchLoop, SearchPhase, SearchState, SearchStatus};

use engine_host::ComputeBackend;

/// A backend with everything a search needs already created on it.
pub struct SearchEngine<B: ComputeBackend> {
    // Field order is drop order: newest device objects first, the backend
    // (queue and context) last.
    buffers: BufferSet<B>,
    pipeline: KernelPipeline<B>,
    program: LinkedProgram<B>,
    modules: ModuleCache<B>,
    config: SearchConfig,
    backend: B,
}

impl<B: ComputeBackend> SearchEngine<B> {
    /// Build the program, kernels and buffers for `config` on `backend`.
    ///
    /// On failure everything created so far is released before the error is
    /// returned.
    pub fn setup(backend: B, config: SearchConfig) -> Result<Self, SearchError> {
        config.validate()?;
        log::info!(target: "search", "Setting up {} backend", backend.name());

        let modules = ModuleCache::build(&backend, &config.sources, &config.compile_options)?;
        let program = linker::link(&backend, &modules.link_inputs(), &config.compile_options)?;
        let pipeline = KernelPipeline::new(&backend, &program, &config.entry_points)?;
        let buffers = BufferSet::allocate(
            &backend,
            config.batch_size,
            config.block_words,
            config.length_layout,
        )?;

        #[cfg(feature = "metrics")]
        {
            metrics::set_batch_size(config.batch_size as i64);
            metrics::set_max_iterations(config.max_iterations as i64);
            metrics::set_search_found(false);
        }

        Ok(Self {
            buffers,
            pipeline,
            program,
            modules,
            config,
            backend,
        })
    }

    /// Run the search loop to completion.
    pub fn run(&self) -> Result<SearchStatus, SearchError> {
        SearchLoop::new(&self.backend, &self.pipeline, &self.buffers, &self.config).run()
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn modules(&self) -> &ModuleCache<B> {
        &self.modules
    }

    pub fn program(&self) -> &LinkedProgram<B> {
        &self.program
    }

    pub fn pipeline(&self) -> &KernelPipeline<B> {
        &self.pipeline
    }

    pub fn buffers(&self) -> &BufferSet<B> {
        &self.buffers
    }
}

/// Set up an engine on `backend`, search once and tear everything down.
pub fn search<B: ComputeBackend>(
    backend: B,
    config: SearchConfig,
) -> Result<SearchStatus, SearchError> {
    let engine = SearchEngine::setup(backend, config)?;
    engine.run()
}

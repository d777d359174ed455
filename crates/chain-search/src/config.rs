use std::fmt;
use std::path::{Path, PathBuf};

use chain_core::{TargetDigest, DEFAULT_BLOCK_WORDS, WORD_SIZE};

use crate::SearchError;

/// Options passed to both the per-module compile and the link step.
pub const DEFAULT_COMPILE_OPTIONS: &str = "-cl-fast-relaxed-math -Werror";

/// Suffix of the cache file kept beside each cached source unit.
pub const DEFAULT_CACHE_SUFFIX: &str = ".bin";

/// How the length buffers of the pipeline are laid out.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum LengthLayout {
    /// One 32-bit length per candidate slot.
    #[default]
    PerSlot,
    /// One 32-bit length shared by the whole batch.
    Shared,
}

impl LengthLayout {
    /// Words in one length buffer for a batch of `batch_size` slots.
    pub fn words(self, batch_size: usize) -> usize {
        match self {
            LengthLayout::PerSlot => batch_size,
            LengthLayout::Shared => 1,
        }
    }
}

impl fmt::Display for LengthLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LengthLayout::PerSlot => "per-slot",
            LengthLayout::Shared => "shared",
        })
    }
}

/// Batch geometry of the two host programs the engine replaces.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Preset {
    /// 1 Mi candidates per batch, 100 batches.
    Narrow,
    /// 8 Mi candidates per batch, 512 batches.
    Wide,
}

impl Preset {
    pub fn batch_size(self) -> usize {
        match self {
            Preset::Narrow => 1 << 20,
            Preset::Wide => 1 << 23,
        }
    }

    pub fn max_iterations(self) -> u64 {
        match self {
            Preset::Narrow => 100,
            Preset::Wide => 512,
        }
    }
}

/// Kernel entry-point symbols for the three pipeline stages.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EntryPoints {
    pub digest_a: String,
    pub digest_b: String,
    pub combine: String,
}

impl Default for EntryPoints {
    fn default() -> Self {
        Self {
            digest_a: "simple_sha512".to_string(),
            digest_b: "simple_md5".to_string(),
            combine: "simple_xor".to_string(),
        }
    }
}

/// One device source file.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SourceUnit {
    pub file: String,
    /// Whether a cache copy is consulted and refreshed for this unit.
    pub cached: bool,
}

impl SourceUnit {
    pub fn cached(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            cached: true,
        }
    }

    pub fn uncached(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            cached: false,
        }
    }
}

/// Location and link order of the device sources.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SourceLayout {
    pub kernel_dir: PathBuf,
    /// Units in link order.
    pub units: Vec<SourceUnit>,
    pub cache_suffix: String,
}

impl SourceLayout {
    /// The standard unit set rooted at `kernel_dir`: four cached library
    /// units around the uncached main entry unit.
    ///
    /// Units are compiled in link order, so `main.cl` is compiled fourth
    /// rather than after all four libraries.
    pub fn standard(kernel_dir: impl Into<PathBuf>) -> Self {
        Self {
            kernel_dir: kernel_dir.into(),
            units: vec![
                SourceUnit::cached("inc_hash_md5.cl"),
                SourceUnit::cached("inc_platform.cl"),
                SourceUnit::cached("inc_common.cl"),
                SourceUnit::uncached("main.cl"),
                SourceUnit::cached("inc_hash_sha512.cl"),
            ],
            cache_suffix: DEFAULT_CACHE_SUFFIX.to_string(),
        }
    }

    pub fn source_path(&self, unit: &SourceUnit) -> PathBuf {
        self.kernel_dir.join(&unit.file)
    }

    pub fn cache_path(&self, unit: &SourceUnit) -> PathBuf {
        self.kernel_dir
            .join(format!("{}{}", unit.file, self.cache_suffix))
    }

    /// Treat every unit as uncached.
    pub fn without_cache(mut self) -> Self {
        for unit in &mut self.units {
            unit.cached = false;
        }
        self
    }
}

impl Default for SourceLayout {
    fn default() -> Self {
        Self::standard("kernels")
    }
}

/// Run configuration handed to the search engine.
#[derive(Clone, Debug)]
pub struct SearchConfig {
    pub target: TargetDigest,
    /// Candidates per batch.
    pub batch_size: usize,
    pub max_iterations: u64,
    /// Bytes of each candidate the digest stages consume.
    pub candidate_bytes: usize,
    /// Words per slot in every value buffer.
    pub block_words: usize,
    pub length_layout: LengthLayout,
    pub sources: SourceLayout,
    pub compile_options: String,
    pub entry_points: EntryPoints,
    /// Log progress every this many batches (0 disables).
    pub progress_every: u64,
}

impl SearchConfig {
    pub fn from_preset(preset: Preset) -> Self {
        Self {
            target: TargetDigest::default(),
            batch_size: preset.batch_size(),
            max_iterations: preset.max_iterations(),
            candidate_bytes: 4,
            block_words: DEFAULT_BLOCK_WORDS,
            length_layout: LengthLayout::default(),
            sources: SourceLayout::default(),
            compile_options: DEFAULT_COMPILE_OPTIONS.to_string(),
            entry_points: EntryPoints::default(),
            progress_every: 10,
        }
    }

    /// Bytes in one candidate slot.
    pub fn slot_bytes(&self) -> usize {
        self.block_words.saturating_mul(WORD_SIZE)
    }

    /// Number of candidates the run may test, if it fits in 64 bits.
    pub fn search_space(&self) -> Option<u64> {
        (self.batch_size as u64).checked_mul(self.max_iterations)
    }

    pub fn validate(&self) -> Result<(), SearchError> {
        let invalid = |msg: String| Err(SearchError::Config(msg));

        if self.batch_size == 0 {
            return invalid("batch size must be positive".into());
        }
        if self.max_iterations == 0 {
            return invalid("max iterations must be positive".into());
        }
        if self.block_words == 0 {
            return invalid("block words must be positive".into());
        }
        if self
            .batch_size
            .checked_mul(self.block_words)
            .and_then(|w| w.checked_mul(WORD_SIZE))
            .is_none()
        {
            return invalid(format!(
                "batch of {} x {} words does not fit in memory",
                self.batch_size, self.block_words
            ));
        }
        let max_candidate = self.slot_bytes().min(8);
        if !(1..=max_candidate).contains(&self.candidate_bytes) {
            return invalid(format!(
                "candidate bytes must be in 1..={max_candidate}, got {}",
                self.candidate_bytes
            ));
        }
        if self.target.len() > self.slot_bytes() {
            return invalid(format!(
                "target of {} bytes is wider than a {}-byte slot",
                self.target.len(),
                self.slot_bytes()
            ));
        }
        if self.sources.units.is_empty() {
            return invalid("no source units configured".into());
        }

        let space = self.search_space().ok_or_else(|| {
            SearchError::Config(format!(
                "{} batches of {} candidates overflow a 64-bit index",
                self.max_iterations, self.batch_size
            ))
        })?;
        if self.candidate_bytes < 8 {
            let width = 1u64 << (8 * self.candidate_bytes);
            if space > width {
                return invalid(format!(
                    "{space} candidates exceed the {width} distinct {}-byte values",
                    self.candidate_bytes
                ));
            }
        }
        Ok(())
    }

    pub fn kernel_dir(&self) -> &Path {
        &self.sources.kernel_dir
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self::from_preset(Preset::Narrow)
    }
}

impl fmt::Display for SearchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "batch_size={}, max_iterations={}, candidate_bytes={}, block_words={}, lengths={}, kernel_dir={}, options=\"{}\", target={}",
            self.batch_size,
            self.max_iterations,
            self.candidate_bytes,
            self.block_words,
            self.length_layout,
            self.sources.kernel_dir.display(),
            self.compile_options,
            self.target
        )
    }
}

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use chain_core::TargetDigest;
use chain_search::{
    LengthLayout, Preset, SearchConfig, SearchEngine, SearchStatus, SourceLayout,
    DEFAULT_COMPILE_OPTIONS,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use engine_host::{ComputeBackend, HostBackend};
use rand::RngCore;

/// Batches run by `benchmark` unless `--max-iterations` is given.
const BENCHMARK_ITERATIONS: u64 = 8;

#[derive(Subcommand, Debug)]
enum Command {
    /// Search for the candidate whose digest chain equals the target (default)
    Search(SearchArgs),
    /// Measure pipeline throughput against a random, unmatchable target
    Benchmark(SearchArgs),
}

/// chainbrute: batched accelerator search over a SHA-512/MD5/XOR digest chain
#[derive(Parser, Debug)]
#[command(
    author,
    version = option_env!("CHAINBRUTE_VERSION").unwrap_or(env!("CARGO_PKG_VERSION")),
    about,
    long_about = None,
    args_conflicts_with_subcommands = true
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    search: SearchArgs,
}

#[derive(Args, Debug, Clone)]
struct SearchArgs {
    /// Compute backend
    #[arg(long, env = "CHAINBRUTE_BACKEND", value_enum, default_value_t = BackendCli::Host)]
    backend: BackendCli,

    /// Batch geometry preset (narrow: 1Mi x 100, wide: 8Mi x 512)
    #[arg(long, env = "CHAINBRUTE_PRESET", value_enum, default_value_t = PresetCli::Narrow)]
    preset: PresetCli,

    /// Candidates per batch (overrides the preset)
    #[arg(long = "batch-size", env = "CHAINBRUTE_BATCH_SIZE")]
    batch_size: Option<usize>,

    /// Number of batches to run before giving up (overrides the preset)
    #[arg(long = "max-iterations", env = "CHAINBRUTE_MAX_ITERATIONS")]
    max_iterations: Option<u64>,

    /// Target digest: hex, or a comma-separated list of decimal bytes
    #[arg(long, env = "CHAINBRUTE_TARGET")]
    target: Option<String>,

    /// Bytes of each candidate index fed to the digest stages
    #[arg(long = "candidate-bytes", env = "CHAINBRUTE_CANDIDATE_BYTES", default_value_t = 4)]
    candidate_bytes: usize,

    /// 32-bit words per candidate slot in every device buffer
    #[arg(long = "block-words", env = "CHAINBRUTE_BLOCK_WORDS", default_value_t = chain_core::DEFAULT_BLOCK_WORDS)]
    block_words: usize,

    /// Directory holding the device source units and their cache files
    #[arg(long = "kernel-dir", env = "CHAINBRUTE_KERNEL_DIR", default_value = "kernels")]
    kernel_dir: PathBuf,

    /// Options passed to the device compiler and linker
    #[arg(long = "compile-options", env = "CHAINBRUTE_COMPILE_OPTIONS", default_value = DEFAULT_COMPILE_OPTIONS, allow_hyphen_values = true)]
    compile_options: String,

    /// Layout of the length buffers
    #[arg(long = "length-layout", env = "CHAINBRUTE_LENGTH_LAYOUT", value_enum, default_value_t = LengthLayoutCli::PerSlot)]
    length_layout: LengthLayoutCli,

    /// Compile every unit from source and never write cache files
    #[arg(long = "no-cache", env = "CHAINBRUTE_NO_CACHE")]
    no_cache: bool,

    /// Log progress every N batches (0 disables)
    #[arg(long = "progress-every", env = "CHAINBRUTE_PROGRESS_EVERY", default_value_t = 10)]
    progress_every: u64,

    /// Entry point of the first digest stage
    #[arg(long = "digest-a-entry", env = "CHAINBRUTE_DIGEST_A_ENTRY")]
    digest_a_entry: Option<String>,

    /// Entry point of the second digest stage
    #[arg(long = "digest-b-entry", env = "CHAINBRUTE_DIGEST_B_ENTRY")]
    digest_b_entry: Option<String>,

    /// Entry point of the combine stage
    #[arg(long = "combine-entry", env = "CHAINBRUTE_COMBINE_ENTRY")]
    combine_entry: Option<String>,

    /// OpenCL platform index
    #[arg(long, env = "CHAINBRUTE_PLATFORM", default_value_t = 0)]
    platform: usize,

    /// OpenCL device index within the platform
    #[arg(long, env = "CHAINBRUTE_DEVICE", default_value_t = 0)]
    device: usize,

    /// Print Prometheus metrics to stdout when the run ends
    #[arg(long = "print-metrics", env = "CHAINBRUTE_PRINT_METRICS")]
    print_metrics: bool,

    /// Enable verbose logging (per-batch progress, module and kernel details)
    #[arg(short, long, env = "CHAINBRUTE_VERBOSE")]
    verbose: bool,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum BackendCli {
    /// In-process reference backend (SHA-512, MD5 and XOR on the CPU)
    Host,
    /// OpenCL device (requires the `opencl` build feature)
    Opencl,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum PresetCli {
    Narrow,
    Wide,
}

impl From<PresetCli> for Preset {
    fn from(value: PresetCli) -> Self {
        match value {
            PresetCli::Narrow => Preset::Narrow,
            PresetCli::Wide => Preset::Wide,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum LengthLayoutCli {
    /// One length per candidate slot
    PerSlot,
    /// One length shared by the whole batch
    Shared,
}

impl From<LengthLayoutCli> for LengthLayout {
    fn from(value: LengthLayoutCli) -> Self {
        match value {
            LengthLayoutCli::PerSlot => LengthLayout::PerSlot,
            LengthLayoutCli::Shared => LengthLayout::Shared,
        }
    }
}

impl SearchArgs {
    fn to_config(&self) -> Result<SearchConfig> {
        let mut config = SearchConfig::from_preset(self.preset.into());
        if let Some(n) = self.batch_size {
            config.batch_size = n;
        }
        if let Some(n) = self.max_iterations {
            config.max_iterations = n;
        }
        if let Some(text) = &self.target {
            config.target = text
                .parse::<TargetDigest>()
                .with_context(|| format!("invalid target digest `{text}`"))?;
        }
        config.candidate_bytes = self.candidate_bytes;
        config.block_words = self.block_words;
        config.length_layout = self.length_layout.into();
        config.sources = SourceLayout::standard(&self.kernel_dir);
        if self.no_cache {
            config.sources = config.sources.without_cache();
        }
        config.compile_options = self.compile_options.clone();
        config.progress_every = self.progress_every;
        if let Some(name) = &self.digest_a_entry {
            config.entry_points.digest_a = name.clone();
        }
        if let Some(name) = &self.digest_b_entry {
            config.entry_points.digest_b = name.clone();
        }
        if let Some(name) = &self.combine_entry {
            config.entry_points.combine = name.clone();
        }
        Ok(config)
    }
}

fn init_logging(verbose: bool) {
    // If RUST_LOG is not set, pick a default from the verbose flag
    if std::env::var("RUST_LOG").is_err() {
        let filter = if verbose {
            "debug,search=debug,engine_host=debug"
        } else {
            "info,search=info"
        };
        std::env::set_var("RUST_LOG", filter);
    }
    env_logger::init();
}

fn main() {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Search(cli.search)) {
        Command::Search(args) => {
            init_logging(args.verbose);
            if let Err(e) = run_search_command(&args) {
                log::error!("Search failed: {e:#}");
                std::process::exit(1);
            }
        }
        Command::Benchmark(args) => {
            init_logging(args.verbose);
            if let Err(e) = run_benchmark_command(&args) {
                log::error!("Benchmark failed: {e:#}");
                std::process::exit(1);
            }
        }
    }
}

/// Set up the selected backend and run one search on it.
fn run_with_backend(args: &SearchArgs, config: SearchConfig) -> Result<SearchStatus> {
    match args.backend {
        BackendCli::Host => run_engine(HostBackend::new(), config),
        BackendCli::Opencl => run_opencl(args, config),
    }
}

#[cfg(feature = "opencl")]
fn run_opencl(args: &SearchArgs, config: SearchConfig) -> Result<SearchStatus> {
    let backend = engine_opencl::OpenClBackend::new(args.platform, args.device)
        .map_err(chain_search::SearchError::from)?;
    run_engine(backend, config)
}

#[cfg(not(feature = "opencl"))]
fn run_opencl(args: &SearchArgs, _config: SearchConfig) -> Result<SearchStatus> {
    anyhow::bail!(
        "cannot open OpenCL platform {} device {}: {}",
        args.platform,
        args.device,
        engine_opencl::unavailable_reason()
    )
}

fn run_engine<B: ComputeBackend>(backend: B, config: SearchConfig) -> Result<SearchStatus> {
    let setup_start = Instant::now();
    let engine = SearchEngine::setup(backend, config)?;
    log::info!(
        "Engine ready on {} in {:.2}s ({} modules, {} stages)",
        engine.backend().name(),
        setup_start.elapsed().as_secs_f64(),
        engine.modules().modules().len(),
        engine.pipeline().stages().count()
    );
    Ok(engine.run()?)
}

fn run_search_command(args: &SearchArgs) -> Result<()> {
    log::info!("Starting chainbrute search...");
    let config = args.to_config()?;
    log::info!("Effective config: {config}");

    let status = run_with_backend(args, config)?;
    match &status {
        SearchStatus::Found {
            candidate,
            hash_count,
            elapsed,
        } => {
            log::info!(
                "Match at index {} (batch {}, slot {}) after {} candidates",
                candidate.index,
                candidate.iteration,
                candidate.slot,
                hash_count
            );
            println!(
                "Found: index {} in {:.3}s",
                candidate.index,
                elapsed.as_secs_f64()
            );
        }
        SearchStatus::Exhausted {
            hash_count,
            elapsed,
        } => {
            log::info!("Search space exhausted after {hash_count} candidates");
            println!(
                "Not found: {} candidates searched in {:.3}s",
                hash_count,
                elapsed.as_secs_f64()
            );
        }
    }

    if args.print_metrics {
        print!("{}", metrics::encode_text());
    }
    Ok(())
}

fn run_benchmark_command(args: &SearchArgs) -> Result<()> {
    let mut config = args.to_config()?;
    config.max_iterations = args.max_iterations.unwrap_or(BENCHMARK_ITERATIONS);
    let mut target = vec![0u8; chain_core::reference::DIGEST_A_LEN];
    rand::thread_rng().fill_bytes(&mut target);
    config.target = TargetDigest::new(target)?;

    println!("🚀 chainbrute benchmark");
    println!("=======================");
    println!("Backend: {:?}", args.backend);
    println!("Batch size: {}", config.batch_size);
    println!("Batches: {}", config.max_iterations);
    println!();

    let started = Instant::now();
    let status = run_with_backend(args, config)?;
    let total = started.elapsed();

    if let Some(index) = status.found_index() {
        // A random 64-byte target matching is not a realistic outcome.
        log::warn!("Benchmark target unexpectedly matched index {index}");
    }

    let search_secs = status.elapsed().as_secs_f64();
    let rate = if search_secs > 0.0 {
        status.hash_count() as f64 / search_secs
    } else {
        0.0
    };

    println!("📊 Benchmark Results");
    println!("===================");
    println!("Total time (incl. setup): {:.2} seconds", total.as_secs_f64());
    println!("Search time: {search_secs:.2} seconds");
    println!("Candidates: {}", status.hash_count());
    println!("Average rate: {}", format_rate(rate));

    if args.print_metrics {
        println!();
        print!("{}", metrics::encode_text());
    }
    println!("✅ Benchmark completed successfully!");
    Ok(())
}

fn format_rate(rate: f64) -> String {
    if rate >= 1_000_000.0 {
        format!("{:.2}M H/s", rate / 1_000_000.0)
    } else if rate >= 1_000.0 {
        format!("{:.2}K H/s", rate / 1_000.0)
    } else {
        format!("{rate:.0} H/s")
    }
}

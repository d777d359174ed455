#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

//! Prometheus metrics for chainbrute searches.
//!
//! - `chainbrute_candidates_total`: candidates pushed through the pipeline
//! - `chainbrute_batches_total`: batches executed
//! - `chainbrute_hash_rate`: candidates per second since the first batch
//! - `chainbrute_batch_size`: configured candidates per batch
//! - `chainbrute_max_iterations`: configured batch budget
//! - `chainbrute_search_found`: 1 once a match was reported, else 0
//!
//! [`encode_text`] renders the registry in the text exposition format.

use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use std::sync::Mutex;
use std::time::Instant;

// ---------------------------------------------------------------------------
// Global Registry
// ---------------------------------------------------------------------------

static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

fn gauge(name: &str, help: &str) -> IntGauge {
    let g = IntGauge::new(name, help).expect("create gauge");
    REGISTRY
        .register(Box::new(g.clone()))
        .expect("register gauge");
    g
}

fn counter(name: &str, help: &str) -> IntCounter {
    let c = IntCounter::new(name, help).expect("create counter");
    REGISTRY
        .register(Box::new(c.clone()))
        .expect("register counter");
    c
}

// ---------------------------------------------------------------------------
// Counters
// ---------------------------------------------------------------------------

static CANDIDATES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    counter(
        "chainbrute_candidates_total",
        "Candidates pushed through the digest pipeline",
    )
});

static BATCHES_TOTAL: Lazy<IntCounter> =
    Lazy::new(|| counter("chainbrute_batches_total", "Pipeline batches executed"));

// ---------------------------------------------------------------------------
// Gauges
// ---------------------------------------------------------------------------

static HASH_RATE: Lazy<IntGauge> = Lazy::new(|| {
    gauge(
        "chainbrute_hash_rate",
        "Candidates per second since the first recorded batch",
    )
});

static BATCH_SIZE: Lazy<IntGauge> =
    Lazy::new(|| gauge("chainbrute_batch_size", "Candidates per batch"));

static MAX_ITERATIONS: Lazy<IntGauge> =
    Lazy::new(|| gauge("chainbrute_max_iterations", "Batch budget of the search"));

static SEARCH_FOUND: Lazy<IntGauge> = Lazy::new(|| {
    gauge(
        "chainbrute_search_found",
        "1 once the search reported a match",
    )
});

// ---------------------------------------------------------------------------
// Hash Rate Tracking
// ---------------------------------------------------------------------------

struct HashRateTracker {
    total: u64,
    /// Set on the first recorded batch.
    start_time: Option<Instant>,
}

impl HashRateTracker {
    const fn new() -> Self {
        Self {
            total: 0,
            start_time: None,
        }
    }

    fn record(&mut self, candidates: u64) {
        let start = *self.start_time.get_or_insert_with(Instant::now);
        self.total = self.total.saturating_add(candidates);
        let elapsed = start.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            HASH_RATE.set((self.total as f64 / elapsed) as i64);
        }
    }
}

static HASH_TRACKER: Mutex<HashRateTracker> = Mutex::new(HashRateTracker::new());

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Record one executed batch of `candidates` candidates.
pub fn record_batch(candidates: u64) {
    CANDIDATES_TOTAL.inc_by(candidates);
    BATCHES_TOTAL.inc();
    if let Ok(mut tracker) = HASH_TRACKER.lock() {
        tracker.record(candidates);
    }
}

pub fn set_batch_size(n: i64) {
    BATCH_SIZE.set(n);
}

pub fn set_max_iterations(n: i64) {
    MAX_ITERATIONS.set(n);
}

pub fn set_search_found(found: bool) {
    SEARCH_FOUND.set(i64::from(found));
}

pub fn candidates_total() -> u64 {
    CANDIDATES_TOTAL.get()
}

/// Render every registered metric in the Prometheus text format.
pub fn encode_text() -> String {
    // Touch the statics so that unrecorded metrics still show up as zero.
    Lazy::force(&CANDIDATES_TOTAL);
    Lazy::force(&BATCHES_TOTAL);
    Lazy::force(&HASH_RATE);
    Lazy::force(&BATCH_SIZE);
    Lazy::force(&MAX_ITERATIONS);
    Lazy::force(&SEARCH_FOUND);

    let encoder = TextEncoder::new();
    let mut buffer = Vec::with_capacity(2048);
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        log::warn!("metrics encoding failed: {e}");
    }
    String::from_utf8(buffer).unwrap_or_default()
}

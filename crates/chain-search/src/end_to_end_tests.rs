use std::fs;
use std::path::{Path, PathBuf};

use chain_core::{reference, TargetDigest};
use engine_host::{HostBackend, KernelOp};

use super::*;

const UNITS: [(&str, &str); 5] = [
    (
        "inc_hash_md5.cl",
        "// MD5 block transform\n\
         __kernel void simple_md5(__global const uint *in, __global const uint *in_len,\n\
                                  __global uint *out, __global uint *out_len) { }\n",
    ),
    (
        "inc_platform.cl",
        "uint hc_rotl32(const uint a, const int n) { return (a << n) | (a >> (32 - n)); }\n",
    ),
    (
        "inc_common.cl",
        "/* shared helpers */\nuint hc_swap32(const uint v) { return v; }\n",
    ),
    (
        "main.cl",
        "__kernel void simple_xor(__global const uint *a, __global const uint *a_len,\n\
                                  __global const uint *b, __global const uint *b_len,\n\
                                  __global uint *out, __global uint *out_len) { }\n",
    ),
    (
        "inc_hash_sha512.cl",
        "__kernel void simple_sha512(__global const uint *in, __global const uint *in_len,\n\
                                     __global uint *out, __global uint *out_len) { }\n",
    ),
];

fn kernel_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir()
        .join("chain-search-e2e")
        .join(format!("{name}-{}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).expect("create kernel dir");
    for (file, text) in UNITS {
        fs::write(dir.join(file), text).expect("write kernel source");
    }
    dir
}

fn config_for(dir: &Path, index: u64, candidate_bytes: usize, batch_size: usize) -> SearchConfig {
    let target = TargetDigest::new(reference::chain_for_index(index, candidate_bytes))
        .expect("target");
    let mut config = SearchConfig::default();
    config.target = target;
    config.batch_size = batch_size;
    config.max_iterations = (index + 1).div_ceil(batch_size as u64);
    config.candidate_bytes = candidate_bytes;
    config.sources = SourceLayout::standard(dir);
    config.progress_every = 0;
    config
}

fn expected_teardown() -> Vec<String> {
    [
        "buffer:combined-length",
        "buffer:combined-value",
        "buffer:stageB-length",
        "buffer:stageB-value",
        "buffer:stageA-length",
        "buffer:stageA-value",
        "buffer:candidate-length",
        "buffer:candidate-value",
        "kernel:simple_xor",
        "kernel:simple_md5",
        "kernel:simple_sha512",
        "program",
        "module:inc_hash_sha512.cl",
        "module:main.cl",
        "module:inc_common.cl",
        "module:inc_platform.cl",
        "module:inc_hash_md5.cl",
        "queue",
        "context",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[test]
fn finds_planted_candidate_in_last_batch() {
    let dir = kernel_dir("found");
    let config = config_for(&dir, 1000, 4, 64);
    assert_eq!(config.max_iterations, 16);

    match search(HostBackend::new(), config).expect("search") {
        SearchStatus::Found {
            candidate,
            hash_count,
            ..
        } => {
            assert_eq!(candidate.index, 1000);
            assert_eq!(candidate.iteration, 15);
            assert_eq!(candidate.slot, 40);
            assert_eq!(hash_count, 1001);
            assert_eq!(candidate.digest, reference::chain_for_index(1000, 4));
        }
        other => panic!("expected Found, got {other:?}"),
    }

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn matches_known_two_byte_vector() {
    let dir = kernel_dir("two-byte");
    let config = config_for(&dir, 54321, 2, 1024);
    let target_hex = config.target.to_hex();
    assert!(target_hex.starts_with("a074f354"), "{target_hex}");
    assert!(target_hex.ends_with("4db4ec"), "{target_hex}");

    let status = search(HostBackend::new(), config).expect("search");
    assert_eq!(status.found_index(), Some(54321));

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn shared_length_layout_finds_the_same_index() {
    let dir = kernel_dir("shared");
    let mut config = config_for(&dir, 777, 4, 128);
    config.length_layout = LengthLayout::Shared;

    let status = search(HostBackend::new(), config).expect("search");
    assert_eq!(status.found_index(), Some(777));

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn target_outside_range_is_exhausted() {
    let dir = kernel_dir("exhausted");
    let mut config = config_for(&dir, 5000, 4, 256);
    config.max_iterations = 4;

    let backend = HostBackend::new();
    let journal = backend.journal();
    match search(backend, config).expect("search") {
        SearchStatus::Exhausted { hash_count, .. } => assert_eq!(hash_count, 1024),
        other => panic!("expected Exhausted, got {other:?}"),
    }
    assert_eq!(journal.entries(), expected_teardown());

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn teardown_after_found_releases_in_reverse_creation_order() {
    let dir = kernel_dir("teardown");
    let backend = HostBackend::new();
    let journal = backend.journal();

    let engine = SearchEngine::setup(backend, config_for(&dir, 3, 4, 4)).expect("setup");
    assert!(journal.entries().is_empty());
    assert_eq!(engine.run().expect("run").found_index(), Some(3));
    assert_eq!(engine.backend().kernels_enqueued(), 3);
    drop(engine);

    assert_eq!(journal.entries(), expected_teardown());

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn setup_failure_releases_what_was_built() {
    let dir = kernel_dir("broken-main");
    fs::write(dir.join("main.cl"), "#error missing platform header\n").expect("break main");

    let backend = HostBackend::new();
    let journal = backend.journal();
    match SearchEngine::setup(backend, config_for(&dir, 3, 4, 4)) {
        Err(SearchError::Compilation { path, log }) => {
            assert_eq!(path, dir.join("main.cl"));
            assert!(log.contains("main.cl:1: error: #error"), "{log}");
        }
        Ok(_) => panic!("expected Compilation error"),
        Err(other) => panic!("expected Compilation error, got {other:?}"),
    }
    assert_eq!(
        journal.entries(),
        [
            "module:inc_common.cl",
            "module:inc_platform.cl",
            "module:inc_hash_md5.cl",
            "queue",
            "context"
        ]
    );

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn missing_entry_point_is_fatal_at_setup() {
    let dir = kernel_dir("entry-point");
    let mut config = config_for(&dir, 3, 4, 4);
    config.entry_points.combine = "xor_v2".to_string();

    let backend = HostBackend::new();
    let journal = backend.journal();
    match SearchEngine::setup(backend, config) {
        Err(SearchError::EntryPoint { stage, name, .. }) => {
            assert_eq!(stage, "combine");
            assert_eq!(name, "xor_v2");
        }
        Ok(_) => panic!("expected EntryPoint error"),
        Err(other) => panic!("expected EntryPoint error, got {other:?}"),
    }
    let released = journal.entries();
    assert_eq!(released[..3], ["kernel:simple_md5", "kernel:simple_sha512", "program"]);
    assert_eq!(released.last().map(String::as_str), Some("context"));

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn mismatched_kernel_signature_aborts_the_run() {
    let dir = kernel_dir("arity");
    let backend = HostBackend::new().with_kernel("simple_xor", KernelOp::DigestA);
    let engine = SearchEngine::setup(backend, config_for(&dir, 3, 4, 4)).expect("setup");
    match engine.run() {
        Err(SearchError::ArgumentBinding { stage, .. }) => assert_eq!(stage, "combine"),
        other => panic!("expected ArgumentBinding, got {other:?}"),
    }

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn cache_is_written_then_reused_and_corruption_falls_back() {
    let dir = kernel_dir("cache");
    let config = config_for(&dir, 42, 4, 16);

    let cold = SearchEngine::setup(HostBackend::new(), config.clone()).expect("cold setup");
    assert!(cold
        .modules()
        .modules()
        .iter()
        .all(|m| m.origin() == ModuleOrigin::Source));
    drop(cold);

    for (file, text) in UNITS {
        let cache = dir.join(format!("{file}.bin"));
        if file == "main.cl" {
            assert!(!cache.exists(), "main unit must not be cached");
        } else {
            assert_eq!(fs::read_to_string(&cache).expect("cache written"), text);
        }
    }

    let warm = SearchEngine::setup(HostBackend::new(), config.clone()).expect("warm setup");
    let origins: Vec<ModuleOrigin> = warm.modules().modules().iter().map(|m| m.origin()).collect();
    assert_eq!(
        origins,
        [
            ModuleOrigin::Cache,
            ModuleOrigin::Cache,
            ModuleOrigin::Cache,
            ModuleOrigin::Source,
            ModuleOrigin::Cache
        ]
    );
    drop(warm);

    fs::write(dir.join("inc_common.cl.bin"), [0xC3, 0x28, 0xFF]).expect("corrupt cache");
    let engine = SearchEngine::setup(HostBackend::new(), config).expect("fallback setup");
    assert_eq!(engine.modules().modules()[2].origin(), ModuleOrigin::Source);
    assert_eq!(engine.run().expect("run").found_index(), Some(42));

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn garbled_text_cache_falls_back_to_source() {
    let dir = kernel_dir("garbled-cache");
    let config = config_for(&dir, 77, 4, 16);
    drop(SearchEngine::setup(HostBackend::new(), config.clone()).expect("cold setup"));

    let cache = dir.join("inc_hash_sha512.cl.bin");
    fs::write(&cache, "garbled cache contents\n").expect("garble cache");
    let engine = SearchEngine::setup(HostBackend::new(), config).expect("fallback setup");
    let modules = engine.modules().modules();
    assert_eq!(modules[4].origin(), ModuleOrigin::Source);
    assert!(modules[..3].iter().all(|m| m.origin() == ModuleOrigin::Cache));
    match engine.run().expect("run") {
        SearchStatus::Found { candidate, .. } => assert_eq!(candidate.index, 77),
        other => panic!("expected Found, got {other:?}"),
    }
    assert_eq!(
        fs::read_to_string(&cache).expect("cache rewritten"),
        UNITS[4].1
    );

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn disabled_cache_writes_nothing() {
    let dir = kernel_dir("no-cache");
    let mut config = config_for(&dir, 9, 4, 8);
    config.sources = config.sources.without_cache();

    let status = search(HostBackend::new(), config).expect("search");
    assert_eq!(status.found_index(), Some(9));
    assert!(UNITS
        .iter()
        .all(|(file, _)| !dir.join(format!("{file}.bin")).exists()));

    let _ = fs::remove_dir_all(&dir);
}

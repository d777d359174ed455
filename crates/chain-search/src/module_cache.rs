//! Per-unit compilation with a source-level cache.
//!
//! The cache file beside a unit holds the raw source text of the last
//! successful compile. It lets a rebuild skip reading the source unit; it
//! is not a portable device binary. A cache that cannot be read or compiled
//! is ignored and the unit is rebuilt from source. A cache that cannot be
//! written is ignored too.

use std::fs;
use std::path::{Path, PathBuf};

use engine_host::ComputeBackend;

use crate::config::SourceLayout;
use crate::release::ReleaseStack;
use crate::SearchError;

/// Where a compiled module came from.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ModuleOrigin {
    Cache,
    Source,
}

/// A compiled unit, owned until shutdown.
pub struct SourceModule<B: ComputeBackend> {
    compiled: B::Module,
    source_path: PathBuf,
    cache_path: Option<PathBuf>,
    origin: ModuleOrigin,
}

impl<B: ComputeBackend> SourceModule<B> {
    pub fn compiled(&self) -> &B::Module {
        &self.compiled
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn cache_path(&self) -> Option<&Path> {
        self.cache_path.as_deref()
    }

    pub fn origin(&self) -> ModuleOrigin {
        self.origin
    }
}

fn unit_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Compile `source_path`, trying the copy at `cache_path` first.
pub fn compile_or_load<B: ComputeBackend>(
    backend: &B,
    source_path: &Path,
    cache_path: &Path,
    options: &str,
) -> Result<SourceModule<B>, SearchError> {
    let label = unit_label(source_path);

    if cache_path.exists() {
        match fs::read(cache_path) {
            Ok(bytes) => match backend.compile_module(&label, &bytes, options) {
                Ok(compiled) => {
                    log::info!(target: "search", "{label}: compiled from cache {}", cache_path.display());
                    return Ok(SourceModule {
                        compiled,
                        source_path: source_path.to_path_buf(),
                        cache_path: Some(cache_path.to_path_buf()),
                        origin: ModuleOrigin::Cache,
                    });
                }
                Err(e) => log::warn!(
                    target: "search",
                    "{label}: cache {} rejected, rebuilding from source: {e}",
                    cache_path.display()
                ),
            },
            Err(e) => log::warn!(
                target: "search",
                "{label}: cache {} unreadable, rebuilding from source: {e}",
                cache_path.display()
            ),
        }
    }

    let (compiled, source) = compile_from_file(backend, &label, source_path, options)?;
    match fs::write(cache_path, &source) {
        Ok(()) => log::debug!(target: "search", "{label}: cache written to {}", cache_path.display()),
        Err(e) => log::debug!(
            target: "search",
            "{label}: cache write to {} skipped: {e}",
            cache_path.display()
        ),
    }

    Ok(SourceModule {
        compiled,
        source_path: source_path.to_path_buf(),
        cache_path: Some(cache_path.to_path_buf()),
        origin: ModuleOrigin::Source,
    })
}

/// Compile `source_path` without consulting or refreshing any cache.
pub fn compile_source<B: ComputeBackend>(
    backend: &B,
    source_path: &Path,
    options: &str,
) -> Result<SourceModule<B>, SearchError> {
    let label = unit_label(source_path);
    let (compiled, _) = compile_from_file(backend, &label, source_path, options)?;
    Ok(SourceModule {
        compiled,
        source_path: source_path.to_path_buf(),
        cache_path: None,
        origin: ModuleOrigin::Source,
    })
}

fn compile_from_file<B: ComputeBackend>(
    backend: &B,
    label: &str,
    source_path: &Path,
    options: &str,
) -> Result<(B::Module, Vec<u8>), SearchError> {
    let source = fs::read(source_path).map_err(|e| SearchError::Compilation {
        path: source_path.to_path_buf(),
        log: format!("cannot read source: {e}"),
    })?;
    let compiled = backend
        .compile_module(label, &source, options)
        .map_err(|e| SearchError::compiling(source_path, e))?;
    log::info!(target: "search", "{label}: compiled from source");
    Ok((compiled, source))
}

/// Every compiled unit of a run, in link order.
pub struct ModuleCache<B: ComputeBackend> {
    modules: ReleaseStack<SourceModule<B>>,
}

impl<B: ComputeBackend> ModuleCache<B> {
    /// Compile every unit of `sources`. The first failure aborts; modules
    /// already compiled are released.
    pub fn build(backend: &B, sources: &SourceLayout, options: &str) -> Result<Self, SearchError> {
        let mut modules = ReleaseStack::with_capacity(sources.units.len());
        for unit in &sources.units {
            let source_path = sources.source_path(unit);
            let module = if unit.cached {
                compile_or_load(backend, &source_path, &sources.cache_path(unit), options)?
            } else {
                compile_source(backend, &source_path, options)?
            };
            modules.push(module);
        }
        log::info!(target: "search", "{} modules compiled", modules.len());
        Ok(Self { modules })
    }

    pub fn modules(&self) -> &[SourceModule<B>] {
        &self.modules
    }

    /// Compiled handles in link order.
    pub fn link_inputs(&self) -> Vec<&B::Module> {
        self.modules.iter().map(SourceModule::compiled).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_host::HostBackend;

    const UNIT: &[u8] = b"__kernel void simple_md5(__global uint *a) { }\n";

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir()
            .join("chain-search-module-cache")
            .join(format!("{name}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).expect("create scratch dir");
        dir
    }

    #[test]
    fn first_compile_writes_cache_and_second_uses_it() {
        let dir = scratch_dir("warm");
        let source = dir.join("inc_hash_md5.cl");
        let cache = dir.join("inc_hash_md5.cl.bin");
        fs::write(&source, UNIT).expect("write source");
        let backend = HostBackend::new();

        let first = compile_or_load(&backend, &source, &cache, "").expect("cold compile");
        assert_eq!(first.origin(), ModuleOrigin::Source);
        assert_eq!(fs::read(&cache).expect("cache written"), UNIT);

        let second = compile_or_load(&backend, &source, &cache, "").expect("warm compile");
        assert_eq!(second.origin(), ModuleOrigin::Cache);
        assert_eq!(second.compiled().symbols(), ["simple_md5"]);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn corrupt_cache_falls_back_to_source() {
        let dir = scratch_dir("corrupt");
        let source = dir.join("inc_common.cl");
        let cache = dir.join("inc_common.cl.bin");
        fs::write(&source, UNIT).expect("write source");
        fs::write(&cache, [0xFF, 0x00, 0xC3]).expect("write corrupt cache");
        let backend = HostBackend::new();

        let module = compile_or_load(&backend, &source, &cache, "").expect("fallback");
        assert_eq!(module.origin(), ModuleOrigin::Source);
        assert_eq!(fs::read(&cache).expect("cache refreshed"), UNIT);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn unwritable_cache_is_ignored() {
        let dir = scratch_dir("unwritable");
        let source = dir.join("inc_platform.cl");
        fs::write(&source, UNIT).expect("write source");
        let cache = dir.join("missing-subdir").join("inc_platform.cl.bin");
        let backend = HostBackend::new();

        let module = compile_or_load(&backend, &source, &cache, "").expect("compile");
        assert_eq!(module.origin(), ModuleOrigin::Source);
        assert!(!cache.exists());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn broken_source_is_a_compilation_error_with_log() {
        let dir = scratch_dir("broken");
        let source = dir.join("main.cl");
        fs::write(&source, b"__kernel void simple_xor( {\n").expect("write source");
        let backend = HostBackend::new();

        match compile_source(&backend, &source, "") {
            Err(SearchError::Compilation { path, log }) => {
                assert_eq!(path, source);
                assert!(log.contains("main.cl:1"), "{log}");
            }
            Ok(_) => panic!("expected Compilation error"),
            Err(other) => panic!("expected Compilation error, got {other:?}"),
        }

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_source_is_a_compilation_error() {
        let dir = scratch_dir("missing");
        let backend = HostBackend::new();
        let result = compile_or_load(
            &backend,
            &dir.join("nope.cl"),
            &dir.join("nope.cl.bin"),
            "",
        );
        assert!(matches!(result, Err(SearchError::Compilation { .. })));

        let _ = fs::remove_dir_all(&dir);
    }
}

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use crate::journal::{ReleaseJournal, Releaser};
use crate::kernels::{self, KernelOp};
use crate::source;
use crate::{BackendError, ComputeBackend};

/// Compiled host module: the kernel symbols its unit declares.
#[derive(Debug)]
pub struct HostModule {
    label: String,
    symbols: Vec<String>,
    _release: Releaser,
}

impl HostModule {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }
}

/// Linked host program.
#[derive(Debug)]
pub struct HostProgram {
    symbols: Vec<String>,
    _release: Releaser,
}

impl HostProgram {
    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }
}

#[derive(Debug)]
pub struct HostKernel {
    name: String,
    op: KernelOp,
    _release: Releaser,
}

impl HostKernel {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn op(&self) -> KernelOp {
        self.op
    }
}

#[derive(Debug)]
pub struct HostBuffer {
    label: String,
    data: RefCell<Vec<u32>>,
    _release: Releaser,
}

impl HostBuffer {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn len_words(&self) -> usize {
        self.data.borrow().len()
    }
}

/// In-process emulation of a single-queue compute device.
///
/// Commands run synchronously at enqueue time, which trivially satisfies
/// in-order queue semantics. Kernel entry points are served by built-in host
/// implementations registered by name.
pub struct HostBackend {
    kernels: HashMap<String, KernelOp>,
    journal: ReleaseJournal,
    enqueued: Cell<u64>,
}

impl HostBackend {
    /// Backend serving the default entry points
    /// (`simple_sha512`, `simple_md5`, `simple_xor`).
    pub fn new() -> Self {
        let kernels = [KernelOp::DigestA, KernelOp::DigestB, KernelOp::Combine]
            .into_iter()
            .map(|op| (op.default_entry_point().to_string(), op))
            .collect();
        log::debug!(target: "engine_host", "host backend created");
        Self {
            kernels,
            journal: ReleaseJournal::new(),
            enqueued: Cell::new(0),
        }
    }

    /// Serve `entry_point` with the host implementation of `op`.
    pub fn with_kernel(mut self, entry_point: impl Into<String>, op: KernelOp) -> Self {
        self.kernels.insert(entry_point.into(), op);
        self
    }

    /// Shared handle to the release journal of this backend.
    pub fn journal(&self) -> ReleaseJournal {
        self.journal.clone()
    }

    /// Kernels enqueued so far.
    pub fn kernels_enqueued(&self) -> u64 {
        self.enqueued.get()
    }
}

impl Default for HostBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for HostBackend {
    fn drop(&mut self) {
        self.journal.record("queue".to_string());
        self.journal.record("context".to_string());
    }
}

impl ComputeBackend for HostBackend {
    type Module = HostModule;
    type Program = HostProgram;
    type Kernel = HostKernel;
    type Buffer = HostBuffer;

    fn name(&self) -> &'static str {
        "host-reference"
    }

    fn compile_module(
        &self,
        label: &str,
        source: &[u8],
        options: &str,
    ) -> Result<HostModule, BackendError> {
        let symbols =
            source::scan_unit(label, source).map_err(|log| BackendError::Compile { log })?;
        log::debug!(
            target: "engine_host",
            "compiled {label} ({} bytes, options `{options}`): kernels {symbols:?}",
            source.len()
        );
        Ok(HostModule {
            label: label.to_string(),
            symbols,
            _release: Releaser::new(&self.journal, format!("module:{label}")),
        })
    }

    fn link_program(
        &self,
        modules: &[&HostModule],
        options: &str,
    ) -> Result<HostProgram, BackendError> {
        if modules.is_empty() {
            return Err(BackendError::Link {
                log: "error: no modules to link".to_string(),
            });
        }

        let mut owners: HashMap<&str, &str> = HashMap::new();
        let mut symbols = Vec::new();
        let mut log = Vec::new();
        for module in modules {
            for symbol in &module.symbols {
                match owners.insert(symbol.as_str(), module.label.as_str()) {
                    Some(first) => log.push(format!(
                        "error: duplicate symbol `{symbol}` in {} (first defined in {first})",
                        module.label
                    )),
                    None => symbols.push(symbol.clone()),
                }
            }
        }
        if !log.is_empty() {
            return Err(BackendError::Link {
                log: log.join("\n"),
            });
        }

        log::debug!(
            target: "engine_host",
            "linked {} modules (options `{options}`): kernels {symbols:?}",
            modules.len()
        );
        Ok(HostProgram {
            symbols,
            _release: Releaser::new(&self.journal, "program".to_string()),
        })
    }

    fn create_kernel(
        &self,
        program: &HostProgram,
        entry_point: &str,
    ) -> Result<HostKernel, BackendError> {
        if !program.symbols.iter().any(|s| s == entry_point) {
            return Err(BackendError::EntryPoint {
                name: entry_point.to_string(),
                reason: "not defined by the linked program".to_string(),
            });
        }
        let op = *self
            .kernels
            .get(entry_point)
            .ok_or_else(|| BackendError::EntryPoint {
                name: entry_point.to_string(),
                reason: "no host implementation registered".to_string(),
            })?;
        Ok(HostKernel {
            name: entry_point.to_string(),
            op,
            _release: Releaser::new(&self.journal, format!("kernel:{entry_point}")),
        })
    }

    fn create_buffer(&self, label: &str, len_words: usize) -> Result<HostBuffer, BackendError> {
        if len_words == 0 {
            return Err(BackendError::Device {
                op: "create_buffer",
                detail: format!("{label}: zero-sized buffer"),
            });
        }
        Ok(HostBuffer {
            label: label.to_string(),
            data: RefCell::new(vec![0u32; len_words]),
            _release: Releaser::new(&self.journal, format!("buffer:{label}")),
        })
    }

    fn write_buffer(&self, buffer: &HostBuffer, data: &[u32]) -> Result<(), BackendError> {
        let mut dst = buffer.data.borrow_mut();
        let capacity = dst.len();
        let region = dst.get_mut(..data.len()).ok_or_else(|| BackendError::Device {
            op: "write_buffer",
            detail: format!(
                "{}: {} words do not fit in {capacity}",
                buffer.label,
                data.len()
            ),
        })?;
        region.copy_from_slice(data);
        Ok(())
    }

    fn enqueue_kernel(
        &self,
        kernel: &HostKernel,
        args: &[&HostBuffer],
        global_work_size: usize,
    ) -> Result<(), BackendError> {
        if args.len() != kernel.op.arity() {
            return Err(BackendError::ArgumentBinding {
                kernel: kernel.name.clone(),
                detail: format!(
                    "expected {} buffer arguments, got {}",
                    kernel.op.arity(),
                    args.len()
                ),
            });
        }
        for (i, a) in args.iter().enumerate() {
            if let Some(j) = args[i + 1..].iter().position(|b| std::ptr::eq(*a, *b)) {
                return Err(BackendError::ArgumentBinding {
                    kernel: kernel.name.clone(),
                    detail: format!(
                        "buffer `{}` bound to arguments {i} and {}",
                        a.label,
                        i + 1 + j
                    ),
                });
            }
        }

        self.enqueued.set(self.enqueued.get() + 1);
        if global_work_size == 0 {
            return Ok(());
        }

        match kernel.op {
            KernelOp::DigestA | KernelOp::DigestB => {
                let input = args[0].data.borrow();
                let input_len = args[1].data.borrow();
                let mut out = args[2].data.borrow_mut();
                let mut out_len = args[3].data.borrow_mut();
                kernels::run_digest(
                    kernel.op,
                    &kernel.name,
                    &input,
                    &input_len,
                    &mut out,
                    &mut out_len,
                    global_work_size,
                )
            }
            KernelOp::Combine => {
                let a = args[0].data.borrow();
                let a_len = args[1].data.borrow();
                let b = args[2].data.borrow();
                let b_len = args[3].data.borrow();
                let mut out = args[4].data.borrow_mut();
                let mut out_len = args[5].data.borrow_mut();
                kernels::run_combine(
                    &kernel.name,
                    &a,
                    &a_len,
                    &b,
                    &b_len,
                    &mut out,
                    &mut out_len,
                    global_work_size,
                )
            }
        }
    }

    fn read_buffer(&self, buffer: &HostBuffer, out: &mut [u32]) -> Result<(), BackendError> {
        let src = buffer.data.borrow();
        let region = src.get(..out.len()).ok_or_else(|| BackendError::Device {
            op: "read_buffer",
            detail: format!(
                "{}: {} words requested from {}",
                buffer.label,
                out.len(),
                src.len()
            ),
        })?;
        out.copy_from_slice(region);
        Ok(())
    }

    fn finish(&self) -> Result<(), BackendError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIBRARY: &[u8] = b"__kernel void simple_sha512(__global u32 *a) { }\n\
                             __kernel void simple_md5(__global u32 *a) { }\n";
    const MAIN: &[u8] = b"__kernel void simple_xor(__global u32 *a) { }\n\
                          __kernel void helper_only(void) { }\n";

    fn linked(backend: &HostBackend) -> HostProgram {
        let lib = backend.compile_module("lib.cl", LIBRARY, "").expect("lib");
        let main = backend.compile_module("main.cl", MAIN, "").expect("main");
        backend.link_program(&[&lib, &main], "").expect("link")
    }

    #[test]
    fn link_rejects_empty_module_list() {
        let backend = HostBackend::new();
        match backend.link_program(&[], "") {
            Err(BackendError::Link { log }) => assert!(log.contains("no modules"), "{log}"),
            other => panic!("expected Link error, got {other:?}"),
        }
    }

    #[test]
    fn link_rejects_duplicate_symbols() {
        let backend = HostBackend::new();
        let a = backend.compile_module("a.cl", LIBRARY, "").expect("a");
        let b = backend.compile_module("b.cl", LIBRARY, "").expect("b");
        match backend.link_program(&[&a, &b], "") {
            Err(BackendError::Link { log }) => {
                assert!(log.contains("duplicate symbol `simple_md5` in b.cl"), "{log}");
            }
            other => panic!("expected Link error, got {other:?}"),
        }
    }

    #[test]
    fn kernel_creation_requires_symbol_and_host_implementation() {
        let backend = HostBackend::new();
        let program = linked(&backend);

        assert!(backend.create_kernel(&program, "simple_xor").is_ok());
        match backend.create_kernel(&program, "missing") {
            Err(BackendError::EntryPoint { reason, .. }) => assert!(reason.contains("not defined")),
            other => panic!("expected EntryPoint error, got {other:?}"),
        }
        match backend.create_kernel(&program, "helper_only") {
            Err(BackendError::EntryPoint { reason, .. }) => {
                assert!(reason.contains("no host implementation"))
            }
            other => panic!("expected EntryPoint error, got {other:?}"),
        }
    }

    #[test]
    fn remapped_entry_point_is_served() {
        let backend = HostBackend::new().with_kernel("helper_only", KernelOp::Combine);
        let program = linked(&backend);
        let kernel = backend.create_kernel(&program, "helper_only").expect("kernel");
        assert_eq!(kernel.op(), KernelOp::Combine);
    }

    #[test]
    fn enqueue_checks_arity_and_aliasing() {
        let backend = HostBackend::new();
        let program = linked(&backend);
        let kernel = backend.create_kernel(&program, "simple_md5").expect("kernel");
        let a = backend.create_buffer("a", 16).expect("a");
        let b = backend.create_buffer("b", 1).expect("b");
        let c = backend.create_buffer("c", 16).expect("c");

        match backend.enqueue_kernel(&kernel, &[&a, &b, &c], 1) {
            Err(BackendError::ArgumentBinding { detail, .. }) => {
                assert!(detail.contains("expected 4"), "{detail}")
            }
            other => panic!("expected ArgumentBinding, got {other:?}"),
        }
        match backend.enqueue_kernel(&kernel, &[&a, &b, &a, &b], 1) {
            Err(BackendError::ArgumentBinding { detail, .. }) => {
                assert!(detail.contains("bound to arguments 0 and 2"), "{detail}")
            }
            other => panic!("expected ArgumentBinding, got {other:?}"),
        }
        assert_eq!(backend.kernels_enqueued(), 0);
    }

    #[test]
    fn buffers_round_trip_through_write_and_read() {
        let backend = HostBackend::new();
        let buf = backend.create_buffer("value", 4).expect("buffer");
        backend.write_buffer(&buf, &[1, 2]).expect("write");
        let mut out = [9u32; 4];
        backend.read_buffer(&buf, &mut out).expect("read");
        assert_eq!(out, [1, 2, 0, 0]);
        assert!(backend.write_buffer(&buf, &[0; 5]).is_err());
        assert!(backend.create_buffer("empty", 0).is_err());
    }

    #[test]
    fn journal_records_releases_in_drop_order() {
        let backend = HostBackend::new();
        let journal = backend.journal();
        {
            let lib = backend.compile_module("lib.cl", LIBRARY, "").expect("lib");
            let main = backend.compile_module("main.cl", MAIN, "").expect("main");
            let program = backend.link_program(&[&lib, &main], "").expect("link");
            let _kernel = backend.create_kernel(&program, "simple_md5").expect("kernel");
        }
        drop(backend);
        assert_eq!(
            journal.entries(),
            vec![
                "kernel:simple_md5",
                "program",
                "module:main.cl",
                "module:lib.cl",
                "queue",
                "context"
            ]
        );
    }
}

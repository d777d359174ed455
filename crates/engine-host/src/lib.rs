#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

//! Compute backend interface and the host reference backend.
//!
//! The search layer drives a device only through [`ComputeBackend`], so the
//! orchestration code does not know whether it talks to an OpenCL queue or to
//! the in-process emulation in [`HostBackend`].
//!
//! Handle types are owned: dropping a module, program, kernel or buffer
//! releases the underlying device object. Callers control teardown order by
//! controlling drop order.

mod host;
mod journal;
mod kernels;
mod source;

pub use host::{HostBackend, HostBuffer, HostKernel, HostModule, HostProgram};
pub use journal::ReleaseJournal;
pub use kernels::KernelOp;

use thiserror::Error;

/// Failure reported by a compute backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Platform, device, context or queue acquisition failed.
    #[error("device setup failed: {0}")]
    Setup(String),
    /// The compiler rejected a module. `log` is the compiler output.
    #[error("compilation failed:\n{log}")]
    Compile { log: String },
    /// The linker rejected the module set. `log` is the linker output.
    #[error("link failed:\n{log}")]
    Link { log: String },
    /// The linked program cannot provide the requested kernel.
    #[error("entry point `{name}`: {reason}")]
    EntryPoint { name: String, reason: String },
    /// Kernel arguments do not fit the kernel signature.
    #[error("argument binding for `{kernel}`: {detail}")]
    ArgumentBinding { kernel: String, detail: String },
    /// Buffer allocation, transfer or kernel execution failed.
    #[error("device operation `{op}` failed: {detail}")]
    Device { op: &'static str, detail: String },
}

/// A device with a single in-order command queue.
///
/// Commands are executed in submission order. `read_buffer` blocks until
/// every previously enqueued command has completed.
pub trait ComputeBackend {
    type Module;
    type Program;
    type Kernel;
    type Buffer;

    /// Human-readable backend name (for logs/metrics).
    fn name(&self) -> &'static str;

    /// Compile one source unit into a linkable module.
    fn compile_module(
        &self,
        label: &str,
        source: &[u8],
        options: &str,
    ) -> Result<Self::Module, BackendError>;

    /// Link compiled modules into one executable program.
    fn link_program(
        &self,
        modules: &[&Self::Module],
        options: &str,
    ) -> Result<Self::Program, BackendError>;

    fn create_kernel(
        &self,
        program: &Self::Program,
        entry_point: &str,
    ) -> Result<Self::Kernel, BackendError>;

    /// Allocate a zeroed buffer of `len_words` 32-bit words.
    fn create_buffer(&self, label: &str, len_words: usize) -> Result<Self::Buffer, BackendError>;

    /// Copy `data` into the start of `buffer`.
    fn write_buffer(&self, buffer: &Self::Buffer, data: &[u32]) -> Result<(), BackendError>;

    /// Bind `args` positionally and enqueue `global_work_size` work items.
    fn enqueue_kernel(
        &self,
        kernel: &Self::Kernel,
        args: &[&Self::Buffer],
        global_work_size: usize,
    ) -> Result<(), BackendError>;

    /// Blocking read of the start of `buffer` into `out`.
    fn read_buffer(&self, buffer: &Self::Buffer, out: &mut [u32]) -> Result<(), BackendError>;

    /// Block until the queue is drained.
    fn finish(&self) -> Result<(), BackendError>;
}

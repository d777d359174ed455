#![deny(rust_2018_idioms)]
#![deny(unsafe_code)]

//! OpenCL compute backend.
//!
//! The backend implements `engine_host::ComputeBackend` on top of the `ocl`
//! crate: one platform, one device, one context and one in-order queue.
//! Modules are compiled separately (`clCompileProgram`) and linked into a
//! single program (`clLinkProgram`) so that compiler and linker diagnostics
//! can be reported per step.
//!
//! OpenCL bindings are gated behind the `opencl` feature because they link
//! the system ICD loader. Without it the crate only reports that support was
//! not compiled in, and callers fall back to the host backend.

#[cfg(feature = "opencl")]
mod device;

#[cfg(feature = "opencl")]
pub use device::{ClBuffer, ClKernel, ClModule, ClProgram, OpenClBackend};

/// Whether this build has OpenCL support compiled in.
pub fn opencl_available() -> bool {
    cfg!(feature = "opencl")
}

/// Error text for callers that requested OpenCL from a build without it.
pub fn unavailable_reason() -> &'static str {
    "chainbrute was built without the `opencl` feature; rebuild with `--features opencl`"
}

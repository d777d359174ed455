use std::ffi::CString;

use engine_host::{BackendError, ComputeBackend};
use ocl::core::{self, ffi, ArgVal, KernelInfo, KernelInfoResult, ProgramBuildInfo};
use ocl::{Buffer, Context, Device, Platform, Queue};

/// Separately compiled module, ready for linking.
pub struct ClModule {
    label: String,
    program: core::Program,
}

impl ClModule {
    pub fn label(&self) -> &str {
        &self.label
    }
}

/// Linked executable program.
pub struct ClProgram(core::Program);

pub struct ClKernel {
    name: String,
    kernel: core::Kernel,
    num_args: u32,
}

pub struct ClBuffer {
    label: String,
    buffer: Buffer<u32>,
}

/// OpenCL device with one in-order command queue.
///
/// Field order is release order: the queue goes before the context.
pub struct OpenClBackend {
    queue: Queue,
    context: Context,
    device: Device,
    platform: Platform,
}

fn device_error(op: &'static str, e: impl std::fmt::Display) -> BackendError {
    BackendError::Device {
        op,
        detail: e.to_string(),
    }
}

/// Message for a failed `clLinkProgram`, with the program's build log when
/// the driver returned one.
fn link_failure(errcode: i32, log: &str) -> String {
    let log = log.trim_end_matches('\0').trim();
    if log.is_empty() {
        format!("clLinkProgram failed with status {errcode}")
    } else {
        format!("clLinkProgram failed with status {errcode}\n{log}")
    }
}

fn setup_error(step: &str, e: impl std::fmt::Display) -> BackendError {
    BackendError::Setup(format!("{step}: {e}"))
}

impl OpenClBackend {
    /// Acquire device `device_index` of platform `platform_index`.
    pub fn new(platform_index: usize, device_index: usize) -> Result<Self, BackendError> {
        let platforms = Platform::list();
        let platform = *platforms.get(platform_index).ok_or_else(|| {
            BackendError::Setup(format!(
                "platform {platform_index} not found ({} available)",
                platforms.len()
            ))
        })?;
        let devices = Device::list_all(platform).map_err(|e| setup_error("list devices", e))?;
        let device = *devices.get(device_index).ok_or_else(|| {
            BackendError::Setup(format!(
                "device {device_index} not found on platform {platform_index} ({} available)",
                devices.len()
            ))
        })?;

        let context = Context::builder()
            .platform(platform)
            .devices(device)
            .build()
            .map_err(|e| setup_error("create context", e))?;
        let queue =
            Queue::new(&context, device, None).map_err(|e| setup_error("create queue", e))?;

        log::info!(
            target: "engine_opencl",
            "OpenCL device: {} ({})",
            device.name().unwrap_or_else(|_| "unknown".into()),
            platform.name().unwrap_or_else(|_| "unknown".into())
        );

        Ok(Self {
            queue,
            context,
            device,
            platform,
        })
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn device(&self) -> Device {
        self.device
    }

    fn build_log(&self, program: &core::Program) -> String {
        match core::get_program_build_info(program, &self.device, ProgramBuildInfo::BuildLog) {
            Ok(info) => info.to_string(),
            Err(e) => format!("<build log unavailable: {e}>"),
        }
    }

    fn options(options: &str) -> Result<CString, BackendError> {
        CString::new(options).map_err(|e| BackendError::Setup(format!("compile options: {e}")))
    }
}

impl ComputeBackend for OpenClBackend {
    type Module = ClModule;
    type Program = ClProgram;
    type Kernel = ClKernel;
    type Buffer = ClBuffer;

    fn name(&self) -> &'static str {
        "opencl"
    }

    fn compile_module(
        &self,
        label: &str,
        source: &[u8],
        options: &str,
    ) -> Result<ClModule, BackendError> {
        let text = CString::new(source).map_err(|e| BackendError::Compile {
            log: format!("{label}: source contains a NUL byte at offset {}", e.nul_position()),
        })?;
        let program = core::create_program_with_source(self.context.as_core(), &[text])
            .map_err(|e| BackendError::Compile {
                log: format!("{label}: {e}"),
            })?;
        let devices = [*self.device.as_core()];
        if let Err(e) = core::compile_program(
            &program,
            Some(&devices[..]),
            &Self::options(options)?,
            &[],
            &[],
            None,
            None,
            None,
        ) {
            let log = self.build_log(&program);
            return Err(BackendError::Compile {
                log: format!("{label}: {e}\n{log}"),
            });
        }
        log::debug!(target: "engine_opencl", "compiled {label}");
        Ok(ClModule {
            label: label.to_string(),
            program,
        })
    }

    fn link_program(
        &self,
        modules: &[&ClModule],
        options: &str,
    ) -> Result<ClProgram, BackendError> {
        if modules.is_empty() {
            return Err(BackendError::Link {
                log: "error: no modules to link".to_string(),
            });
        }
        let options = Self::options(options)?;
        let inputs: Vec<ffi::cl_program> = modules.iter().map(|m| m.program.as_ptr()).collect();
        let devices = [self.device.as_core().as_raw()];
        let mut errcode: ffi::cl_int = ffi::CL_SUCCESS;
        // `core::link_program` drops the returned handle on failure, which
        // also drops the linker log with it.
        #[allow(unsafe_code)]
        let program = unsafe {
            let ptr = ffi::clLinkProgram(
                self.context.as_core().as_ptr(),
                devices.len() as ffi::cl_uint,
                devices.as_ptr(),
                options.as_ptr(),
                inputs.len() as ffi::cl_uint,
                inputs.as_ptr(),
                None,
                std::ptr::null_mut(),
                &mut errcode,
            );
            (!ptr.is_null()).then(|| core::Program::from_raw_create_ptr(ptr))
        };
        let program = match (program, errcode) {
            (Some(program), ffi::CL_SUCCESS) => program,
            (Some(program), code) => {
                return Err(BackendError::Link {
                    log: link_failure(code, &self.build_log(&program)),
                })
            }
            (None, code) => {
                return Err(BackendError::Link {
                    log: link_failure(code, ""),
                })
            }
        };
        Ok(ClProgram(program))
    }

    fn create_kernel(
        &self,
        program: &ClProgram,
        entry_point: &str,
    ) -> Result<ClKernel, BackendError> {
        let kernel =
            core::create_kernel(&program.0, entry_point).map_err(|e| BackendError::EntryPoint {
                name: entry_point.to_string(),
                reason: e.to_string(),
            })?;
        let num_args = match core::get_kernel_info(&kernel, KernelInfo::NumArgs) {
            Ok(KernelInfoResult::NumArgs(n)) => n,
            Ok(other) => {
                return Err(BackendError::EntryPoint {
                    name: entry_point.to_string(),
                    reason: format!("unexpected kernel info: {other}"),
                })
            }
            Err(e) => {
                return Err(BackendError::EntryPoint {
                    name: entry_point.to_string(),
                    reason: e.to_string(),
                })
            }
        };
        Ok(ClKernel {
            name: entry_point.to_string(),
            kernel,
            num_args,
        })
    }

    fn create_buffer(&self, label: &str, len_words: usize) -> Result<ClBuffer, BackendError> {
        let buffer = Buffer::<u32>::builder()
            .queue(self.queue.clone())
            .len(len_words)
            .fill_val(0u32)
            .build()
            .map_err(|e| BackendError::Device {
                op: "create_buffer",
                detail: format!("{label}: {e}"),
            })?;
        Ok(ClBuffer {
            label: label.to_string(),
            buffer,
        })
    }

    fn write_buffer(&self, buffer: &ClBuffer, data: &[u32]) -> Result<(), BackendError> {
        buffer
            .buffer
            .write(data)
            .enq()
            .map_err(|e| device_error("write_buffer", format!("{}: {e}", buffer.label)))
    }

    fn enqueue_kernel(
        &self,
        kernel: &ClKernel,
        args: &[&ClBuffer],
        global_work_size: usize,
    ) -> Result<(), BackendError> {
        if args.len() != kernel.num_args as usize {
            return Err(BackendError::ArgumentBinding {
                kernel: kernel.name.clone(),
                detail: format!(
                    "expected {} buffer arguments, got {}",
                    kernel.num_args,
                    args.len()
                ),
            });
        }
        for (i, a) in args.iter().enumerate() {
            if args[i + 1..].iter().any(|b| std::ptr::eq(*a, *b)) {
                return Err(BackendError::ArgumentBinding {
                    kernel: kernel.name.clone(),
                    detail: format!("buffer `{}` bound more than once", a.label),
                });
            }
            core::set_kernel_arg(&kernel.kernel, i as u32, ArgVal::mem(a.buffer.as_core()))
                .map_err(|e| BackendError::ArgumentBinding {
                    kernel: kernel.name.clone(),
                    detail: format!("argument {i} (`{}`): {e}", a.label),
                })?;
        }

        let dims = [global_work_size, 1, 1];
        // Every argument was bound above against a live buffer owned by the caller.
        #[allow(unsafe_code)]
        let enqueued = unsafe {
            core::enqueue_kernel(
                self.queue.as_core(),
                &kernel.kernel,
                1,
                None,
                &dims,
                None,
                None::<core::Event>,
                None::<&mut core::Event>,
            )
        };
        enqueued.map_err(|e| device_error("enqueue_kernel", format!("{}: {e}", kernel.name)))
    }

    fn read_buffer(&self, buffer: &ClBuffer, out: &mut [u32]) -> Result<(), BackendError> {
        buffer
            .buffer
            .read(out)
            .enq()
            .map_err(|e| device_error("read_buffer", format!("{}: {e}", buffer.label)))
    }

    fn finish(&self) -> Result<(), BackendError> {
        self.queue.finish().map_err(|e| device_error("finish", e))
    }
}

use engine_host::ComputeBackend;

use crate::SearchError;

/// The executable program every pipeline kernel is created from.
pub struct LinkedProgram<B: ComputeBackend> {
    program: B::Program,
    module_count: usize,
    options: String,
}

impl<B: ComputeBackend> LinkedProgram<B> {
    pub fn program(&self) -> &B::Program {
        &self.program
    }

    pub fn module_count(&self) -> usize {
        self.module_count
    }

    pub fn options(&self) -> &str {
        &self.options
    }
}

/// Link `modules` into one program.
///
/// An empty module list or any linker failure is a [`SearchError::Link`];
/// no partially linked program is ever returned.
pub fn link<B: ComputeBackend>(
    backend: &B,
    modules: &[&B::Module],
    options: &str,
) -> Result<LinkedProgram<B>, SearchError> {
    if modules.is_empty() {
        return Err(SearchError::Link {
            log: "no compiled modules to link".to_string(),
        });
    }
    log::info!(target: "search", "Linking {} modules...", modules.len());
    let program = backend
        .link_program(modules, options)
        .map_err(|e| match e {
            engine_host::BackendError::Link { log } => SearchError::Link { log },
            other => SearchError::Link {
                log: other.to_string(),
            },
        })?;
    log::info!(target: "search", "All modules linked successfully");
    Ok(LinkedProgram {
        program,
        module_count: modules.len(),
        options: options.to_string(),
    })
}

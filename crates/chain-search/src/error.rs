use std::path::PathBuf;

use engine_host::BackendError;
use thiserror::Error;

/// Every failure that ends a search run. None of them is retried.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("device setup failed: {0}")]
    Setup(String),
    #[error("failed to compile {}:\n{log}", path.display())]
    Compilation { path: PathBuf, log: String },
    #[error("failed to link program:\n{log}")]
    Link { log: String },
    #[error("stage {stage}: entry point `{name}` unavailable: {reason}")]
    EntryPoint {
        stage: &'static str,
        name: String,
        reason: String,
    },
    #[error("stage {stage}: argument binding failed: {detail}")]
    ArgumentBinding { stage: &'static str, detail: String },
    #[error("device operation `{op}` failed: {detail}")]
    Device { op: &'static str, detail: String },
    #[error(
        "kernel contract violated: slot {slot} declared {declared} bytes, slot holds {capacity}"
    )]
    KernelContract {
        slot: usize,
        declared: u32,
        capacity: usize,
    },
}

impl SearchError {
    /// Attach a stage name to a backend error raised while running that stage.
    pub(crate) fn in_stage(stage: &'static str, e: BackendError) -> Self {
        match e {
            BackendError::EntryPoint { name, reason } => Self::EntryPoint {
                stage,
                name,
                reason,
            },
            BackendError::ArgumentBinding { kernel, detail } => Self::ArgumentBinding {
                stage,
                detail: format!("{kernel}: {detail}"),
            },
            other => other.into(),
        }
    }

    /// Attach a source path to a backend error raised while compiling it.
    pub(crate) fn compiling(path: impl Into<PathBuf>, e: BackendError) -> Self {
        let log = match e {
            BackendError::Compile { log } => log,
            other => other.to_string(),
        };
        Self::Compilation {
            path: path.into(),
            log,
        }
    }
}

impl From<BackendError> for SearchError {
    fn from(e: BackendError) -> Self {
        match e {
            BackendError::Setup(msg) => Self::Setup(msg),
            BackendError::Compile { log } => Self::Compilation {
                path: PathBuf::new(),
                log,
            },
            BackendError::Link { log } => Self::Link { log },
            BackendError::EntryPoint { name, reason } => Self::EntryPoint {
                stage: "unknown",
                name,
                reason,
            },
            BackendError::ArgumentBinding { kernel, detail } => Self::ArgumentBinding {
                stage: "unknown",
                detail: format!("{kernel}: {detail}"),
            },
            BackendError::Device { op, detail } => Self::Device { op, detail },
        }
    }
}

//! Execution device selection

/// Where a model runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    /// Host CPU
    Cpu,
    /// GPU with the given ordinal
    Gpu(usize),
}

impl std::fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cpu => write!(f, "cpu"),
            Self::Gpu(index) => write!(f, "gpu:{index}"),
        }
    }
}

/// Device binding handed to a model before restore
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionDevice {
    /// Target device
    pub kind: DeviceKind,
    /// Require bit-reproducible kernels
    pub deterministic: bool,
}

impl ExecutionDevice {
    /// Binding used for evaluation: non-deterministic kernels are acceptable
    #[must_use]
    pub const fn for_inference(kind: DeviceKind) -> Self {
        Self {
            kind,
            deterministic: false,
        }
    }
}

use ort::execution_providers::ExecutionProviderDispatch;

use crate::detection::domain::landmark_model::Backend;

/// ONNX execution providers for the requested compute backend.
///
/// `Gpu` asks for the platform accelerator; ort falls back to CPU when it
/// is unavailable. `Cpu` registers nothing so the default CPU provider runs.
pub fn execution_providers_for(backend: Backend) -> Vec<ExecutionProviderDispatch> {
    match backend {
        Backend::Gpu => preferred_gpu_providers(),
        Backend::Cpu => Vec::new(),
    }
}

fn preferred_gpu_providers() -> Vec<ExecutionProviderDispatch> {
    #[cfg(target_os = "macos")]
    {
        vec![ort::execution_providers::CoreMLExecutionProvider::default().build()]
    }
    #[cfg(target_os = "windows")]
    {
        vec![ort::execution_providers::DirectMLExecutionProvider::default().build()]
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        vec![]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_registers_no_providers() {
        assert!(execution_providers_for(Backend::Cpu).is_empty());
    }
}

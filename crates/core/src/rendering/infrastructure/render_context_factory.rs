use crate::detection::domain::landmark_model::Backend;
use crate::rendering::domain::render_context::RenderContext;
use crate::rendering::domain::scene_stage::ContextFactory;

use super::cpu_render_context::CpuRenderContext;
use super::gpu_render_context::GpuRenderContext;

/// Creates the best available render context for `preference`.
///
/// `Gpu` probes for a wgpu adapter and falls back to the software renderer
/// when none is found or the surface exceeds its texture limit. Logs which
/// backend is selected.
pub fn create_render_context(preference: Backend, width: u32, height: u32) -> Box<dyn RenderContext> {
    if preference == Backend::Gpu {
        match GpuRenderContext::new(width, height) {
            Some(ctx) if ctx.fits(width, height) => {
                log::info!("Using GPU backend for overlay rendering ({width}x{height})");
                return Box::new(ctx);
            }
            Some(_) => log::info!(
                "Surface {width}x{height} exceeds GPU texture limit, using CPU backend for overlay rendering"
            ),
            None => log::info!(
                "No GPU available, using CPU backend for overlay rendering ({width}x{height})"
            ),
        }
    } else {
        log::info!("Using CPU backend for overlay rendering ({width}x{height})");
    }
    Box::new(CpuRenderContext::new())
}

/// `ContextFactory` bound to a backend preference.
pub fn context_factory(preference: Backend) -> ContextFactory {
    Box::new(move |width, height| create_render_context(preference, width, height))
}

/// Returns true if a GPU adapter is available for rendering.
pub fn gpu_available() -> bool {
    GpuRenderContext::new(1, 1).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_preference_is_honored() {
        assert_eq!(create_render_context(Backend::Cpu, 8, 8).name(), "cpu");
    }

    #[test]
    fn test_gpu_preference_matches_availability() {
        let ctx = create_render_context(Backend::Gpu, 8, 8);
        let expected = if gpu_available() { "gpu" } else { "cpu" };
        assert_eq!(ctx.name(), expected);
    }

    #[test]
    fn test_surface_beyond_texture_limit_uses_cpu() {
        let ctx = create_render_context(Backend::Gpu, 70_000, 1);
        assert_eq!(ctx.name(), "cpu");
    }
}

pub mod cpu_render_context;
pub mod glasses_renderer;
pub mod gpu_render_context;
pub mod image_asset_loader;
pub mod render_context_factory;

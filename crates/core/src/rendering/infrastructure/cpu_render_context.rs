use glam::{DMat4, DVec3, DVec4};

use crate::rendering::domain::render_context::RenderContext;
use crate::rendering::domain::scene::{OverlayMesh, PerspectiveCamera, Scene};
use crate::shared::surface::RenderSurface;

/// Software renderer for the overlay quad.
///
/// Casts a ray per covered pixel through the inverse model-view-projection,
/// intersects the quad's plane and samples the nearest texel.
#[derive(Debug, Default)]
pub struct CpuRenderContext;

impl CpuRenderContext {
    pub fn new() -> Self {
        Self
    }
}

impl RenderContext for CpuRenderContext {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn resize(&mut self, _width: u32, _height: u32) {}

    fn clear(&mut self, surface: &mut RenderSurface) {
        surface.clear();
    }

    fn draw(
        &mut self,
        scene: &Scene,
        camera: &PerspectiveCamera,
        surface: &mut RenderSurface,
    ) -> Result<(), Box<dyn std::error::Error>> {
        surface.clear();
        let Some(mesh) = scene.mesh() else {
            return Ok(());
        };
        if surface.width() == 0 || surface.height() == 0 || mesh.opacity <= 0.0 {
            return Ok(());
        }

        let mvp = camera.view_projection() * mesh.world_matrix();
        if mvp.determinant().abs() < f64::EPSILON {
            // Collapsed quad (zero scale); nothing visible.
            return Ok(());
        }
        rasterize(mesh, &mvp, surface);
        Ok(())
    }

    fn release(&mut self, _mesh_id: u64) {}

    fn dispose(&mut self) {}
}

fn rasterize(mesh: &OverlayMesh, mvp: &DMat4, surface: &mut RenderSurface) {
    let (sw, sh) = (surface.width(), surface.height());
    let inverse = mvp.inverse();
    let texture = mesh.texture();
    let (tw, th) = (texture.width(), texture.height());
    if tw == 0 || th == 0 {
        return;
    }

    let (x0, y0, x1, y1) = screen_bounds(mvp, sw, sh);
    let pixels = surface.pixels_mut();

    for py in y0..y1 {
        let ndc_y = 1.0 - (py as f64 + 0.5) / sh as f64 * 2.0;
        for px in x0..x1 {
            let ndc_x = (px as f64 + 0.5) / sw as f64 * 2.0 - 1.0;

            // Ray from near to far plane, in quad-local space.
            let near = inverse.project_point3(DVec3::new(ndc_x, ndc_y, 0.0));
            let far = inverse.project_point3(DVec3::new(ndc_x, ndc_y, 1.0));
            let dz = far.z - near.z;
            if dz.abs() < f64::EPSILON {
                continue;
            }
            let t = -near.z / dz;
            if !(0.0..=1.0).contains(&t) {
                continue;
            }
            let local = near + (far - near) * t;
            if local.x.abs() > 0.5 || local.y.abs() > 0.5 {
                continue;
            }

            // Local +Y is up; image rows go down.
            let tx = (((local.x + 0.5) * tw as f64) as u32).min(tw - 1);
            let ty = (((0.5 - local.y) * th as f64) as u32).min(th - 1);
            let texel = texture.texel(tx, ty);
            let alpha = (texel[3] as f32 * mesh.opacity).round().clamp(0.0, 255.0) as u8;
            if alpha == 0 {
                continue;
            }

            let i = (py as usize * sw as usize + px as usize) * 4;
            pixels[i..i + 3].copy_from_slice(&texel[..3]);
            pixels[i + 3] = alpha;
        }
    }
}

/// Pixel rectangle `[x0, x1) × [y0, y1)` covering the projected quad.
///
/// Falls back to the full surface when a corner is behind the camera.
fn screen_bounds(mvp: &DMat4, sw: u32, sh: u32) -> (u32, u32, u32, u32) {
    let corners = [(-0.5, -0.5), (0.5, -0.5), (0.5, 0.5), (-0.5, 0.5)];
    let mut min_x = f64::INFINITY;
    let mut min_y = f64::INFINITY;
    let mut max_x = f64::NEG_INFINITY;
    let mut max_y = f64::NEG_INFINITY;

    for (x, y) in corners {
        let clip = *mvp * DVec4::new(x, y, 0.0, 1.0);
        if clip.w <= 0.0 {
            return (0, 0, sw, sh);
        }
        let sx = (clip.x / clip.w + 1.0) / 2.0 * sw as f64;
        let sy = (1.0 - clip.y / clip.w) / 2.0 * sh as f64;
        min_x = min_x.min(sx);
        min_y = min_y.min(sy);
        max_x = max_x.max(sx);
        max_y = max_y.max(sy);
    }

    let clamp_x = |v: f64| v.clamp(0.0, sw as f64) as u32;
    let clamp_y = |v: f64| v.clamp(0.0, sh as f64) as u32;
    (
        clamp_x(min_x.floor()),
        clamp_y(min_y.floor()),
        clamp_x(max_x.ceil()),
        clamp_y(max_y.ceil()),
    )
}

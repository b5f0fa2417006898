use std::sync::{Arc, Mutex};

use super::frame::{Frame, FrameSize, FRAME_CHANNELS};

/// Drawable RGBA8 target the overlay is presented onto.
///
/// Pixels carry straight (non-premultiplied) alpha. A cleared surface is
/// fully transparent, so the host can composite it over the live video.
#[derive(Clone, Debug)]
pub struct RenderSurface {
    pixels: Vec<u8>,
    width: u32,
    height: u32,
}

/// Surface shared between the host (which presents it) and the renderer
/// (which draws into it).
pub type SharedSurface = Arc<Mutex<RenderSurface>>;

impl RenderSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            pixels: vec![0; (width as usize) * (height as usize) * 4],
            width,
            height,
        }
    }

    pub fn shared(width: u32, height: u32) -> SharedSurface {
        Arc::new(Mutex::new(Self::new(width, height)))
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn size(&self) -> FrameSize {
        FrameSize::new(self.width, self.height)
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    /// Reallocates the pixel buffer. Contents are discarded.
    pub fn resize(&mut self, width: u32, height: u32) {
        if self.width == width && self.height == height {
            return;
        }
        self.width = width;
        self.height = height;
        self.pixels = vec![0; (width as usize) * (height as usize) * 4];
    }

    pub fn clear(&mut self) {
        self.pixels.fill(0);
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = ((y as usize) * (self.width as usize) + x as usize) * 4;
        [
            self.pixels[i],
            self.pixels[i + 1],
            self.pixels[i + 2],
            self.pixels[i + 3],
        ]
    }

    pub fn is_transparent(&self) -> bool {
        self.pixels.chunks_exact(4).all(|p| p[3] == 0)
    }

    /// Mirrors the surface left to right.
    pub fn flip_horizontal(&mut self) {
        let row_bytes = self.width as usize * 4;
        if row_bytes == 0 {
            return;
        }
        for row in self.pixels.chunks_exact_mut(row_bytes) {
            row.reverse();
            for px in row.chunks_exact_mut(4) {
                px.reverse();
            }
        }
    }

    /// Alpha-blends this surface over an RGB frame of the same size.
    ///
    /// Frames with different dimensions are left untouched and `false` is
    /// returned.
    pub fn composite_onto(&self, frame: &mut Frame) -> bool {
        if frame.width() != self.width || frame.height() != self.height {
            return false;
        }
        let dst = frame.data_mut();
        for (px, rgb) in self
            .pixels
            .chunks_exact(4)
            .zip(dst.chunks_exact_mut(FRAME_CHANNELS))
        {
            let a = px[3] as u32;
            if a == 0 {
                continue;
            }
            for c in 0..3 {
                rgb[c] = ((px[c] as u32 * a + rgb[c] as u32 * (255 - a) + 127) / 255) as u8;
            }
        }
        true
    }
}

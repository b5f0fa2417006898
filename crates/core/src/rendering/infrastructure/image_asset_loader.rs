use std::path::Path;

use crate::rendering::domain::asset_loader::AssetLoader;
use crate::rendering::domain::scene::OverlayTexture;

/// Decodes overlay images from disk or over HTTP using the `image` crate.
#[derive(Debug, Default)]
pub struct ImageAssetLoader;

impl ImageAssetLoader {
    pub fn new() -> Self {
        Self
    }
}

impl AssetLoader for ImageAssetLoader {
    fn load(&self, url: &str) -> Result<OverlayTexture, Box<dyn std::error::Error>> {
        let img = if is_remote(url) {
            let bytes = reqwest::blocking::get(url)?.error_for_status()?.bytes()?;
            image::load_from_memory(&bytes)?
        } else {
            let path = url.strip_prefix("file://").unwrap_or(url);
            image::open(Path::new(path))?
        };

        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();
        if width == 0 || height == 0 {
            return Err(format!("overlay image {url} is empty").into());
        }
        log::debug!("Loaded overlay {url} ({width}x{height})");
        Ok(OverlayTexture::new(width, height, rgba.into_raw()))
    }
}

fn is_remote(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    #[rstest]
    #[case("https://cdn.example.com/a.png", true)]
    #[case("http://localhost/a.png", true)]
    #[case("/tmp/a.png", false)]
    #[case("file:///tmp/a.png", false)]
    fn test_is_remote(#[case] url: &str, #[case] expected: bool) {
        assert_eq!(is_remote(url), expected);
    }

    #[test]
    fn test_loads_png_with_alpha() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("overlay.png");
        let mut img = image::RgbaImage::new(4, 2);
        img.put_pixel(1, 0, image::Rgba([10, 20, 30, 128]));
        img.save(&path).unwrap();

        let texture = ImageAssetLoader::new()
            .load(path.to_str().unwrap())
            .unwrap();

        assert_eq!(texture.width(), 4);
        assert_eq!(texture.height(), 2);
        assert_eq!(texture.texel(1, 0), [10, 20, 30, 128]);
        assert_eq!(texture.texel(0, 0)[3], 0);
    }

    #[test]
    fn test_rgb_image_becomes_opaque() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("overlay.png");
        image::RgbImage::from_pixel(2, 2, image::Rgb([200, 100, 50]))
            .save(&path)
            .unwrap();

        let url = format!("file://{}", path.display());
        let texture = ImageAssetLoader::new().load(&url).unwrap();

        assert_eq!(texture.texel(1, 1), [200, 100, 50, 255]);
    }

    #[test]
    fn test_missing_file_is_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("missing.png");
        assert!(ImageAssetLoader::new().load(path.to_str().unwrap()).is_err());
    }
}

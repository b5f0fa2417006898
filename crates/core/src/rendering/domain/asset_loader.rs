use super::scene::OverlayTexture;

/// Fetches and decodes overlay images.
pub trait AssetLoader: Send {
    /// `url` is a local path or an http(s) URL.
    fn load(&self, url: &str) -> Result<OverlayTexture, Box<dyn std::error::Error>>;
}

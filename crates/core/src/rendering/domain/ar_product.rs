use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductCategory {
    Glasses,
    Hat,
    Lipstick,
    Mask,
    Earring,
}

impl fmt::Display for ProductCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProductCategory::Glasses => "glasses",
            ProductCategory::Hat => "hat",
            ProductCategory::Lipstick => "lipstick",
            ProductCategory::Mask => "mask",
            ProductCategory::Earring => "earring",
        };
        f.write_str(name)
    }
}

/// Mesh points a product attaches to, plus a fractional placement offset.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnchorConfig {
    pub primary: usize,
    #[serde(default)]
    pub secondary: Option<usize>,
    #[serde(default)]
    pub offset_ratio: [f64; 3],
}

/// A catalog item that can be tried on.
///
/// `overlay_url` is a local path or http(s) URL to a 2D image with alpha.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ArProduct {
    pub id: String,
    pub category: ProductCategory,
    pub overlay_url: String,
    #[serde(default)]
    pub model_url: Option<String>,
    #[serde(default)]
    pub anchor_points: Option<AnchorConfig>,
}

impl ArProduct {
    /// Eyewear product with only a 2D overlay.
    pub fn glasses(id: impl Into<String>, overlay_url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            category: ProductCategory::Glasses,
            overlay_url: overlay_url.into(),
            model_url: None,
            anchor_points: None,
        }
    }
}

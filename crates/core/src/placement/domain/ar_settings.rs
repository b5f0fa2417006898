use serde::{Deserialize, Serialize};

/// User-tunable placement knobs, each conventionally in 0–100.
///
/// `offset_x`/`offset_y` of 50 mean "centered"; `scale` and `opacity` of 100
/// mean "as calibrated" and "fully opaque".
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArSettings {
    pub scale: f64,
    pub offset_x: f64,
    pub offset_y: f64,
    pub opacity: f64,
}

impl Default for ArSettings {
    fn default() -> Self {
        Self {
            scale: 100.0,
            offset_x: 50.0,
            offset_y: 50.0,
            opacity: 100.0,
        }
    }
}

impl ArSettings {
    /// New value with every field present in `patch` replaced.
    pub fn merged(&self, patch: &SettingsPatch) -> Self {
        Self {
            scale: patch.scale.unwrap_or(self.scale),
            offset_x: patch.offset_x.unwrap_or(self.offset_x),
            offset_y: patch.offset_y.unwrap_or(self.offset_y),
            opacity: patch.opacity.unwrap_or(self.opacity),
        }
    }

    /// Overlay alpha in [0, 1].
    pub fn alpha(&self) -> f32 {
        (self.opacity / 100.0).clamp(0.0, 1.0) as f32
    }
}

/// Partial settings update.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsPatch {
    pub scale: Option<f64>,
    pub offset_x: Option<f64>,
    pub offset_y: Option<f64>,
    pub opacity: Option<f64>,
}

impl SettingsPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    #[test]
    fn test_defaults() {
        let s = ArSettings::default();
        assert_eq!(s.scale, 100.0);
        assert_eq!(s.offset_x, 50.0);
        assert_eq!(s.offset_y, 50.0);
        assert_eq!(s.opacity, 100.0);
    }

    #[test]
    fn test_merge_replaces_only_present_fields() {
        let base = ArSettings {
            scale: 120.0,
            ..ArSettings::default()
        };
        let merged = base.merged(&SettingsPatch {
            offset_x: Some(80.0),
            ..SettingsPatch::default()
        });

        assert_eq!(merged.scale, 120.0);
        assert_eq!(merged.offset_x, 80.0);
        assert_eq!(merged.offset_y, 50.0);
        assert_eq!(base.offset_x, 50.0);
    }

    #[rstest]
    #[case(100.0, 1.0)]
    #[case(50.0, 0.5)]
    #[case(0.0, 0.0)]
    #[case(150.0, 1.0)]
    #[case(-20.0, 0.0)]
    fn test_alpha_is_clamped(#[case] opacity: f64, #[case] expected: f32) {
        let s = ArSettings {
            opacity,
            ..ArSettings::default()
        };
        assert_relative_eq!(s.alpha(), expected);
    }

    #[test]
    fn test_partial_json_takes_defaults() {
        let s: ArSettings = serde_json::from_str(r#"{"offset_y": 10}"#).unwrap();
        assert_eq!(s.offset_y, 10.0);
        assert_eq!(s.scale, 100.0);

        let patch: SettingsPatch = serde_json::from_str(r#"{"opacity": 40}"#).unwrap();
        assert_eq!(patch.opacity, Some(40.0));
        assert!(patch.scale.is_none());
        assert!(!patch.is_empty());
    }
}

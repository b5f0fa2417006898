//! Dense face mesh produced by one detection pass.

use glam::{DVec2, DVec3};

/// Axis-aligned bounds of a mesh in frame pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub top_left: DVec2,
    pub bottom_right: DVec2,
}

impl BoundingBox {
    pub fn width(&self) -> f64 {
        self.bottom_right.x - self.top_left.x
    }

    pub fn height(&self) -> f64 {
        self.bottom_right.y - self.top_left.y
    }

    pub fn center(&self) -> DVec2 {
        (self.top_left + self.bottom_right) / 2.0
    }
}

/// Ordered mesh vertices of the first detected face plus derived bounds.
///
/// Point order is defined by the landmark model, so fixed indices
/// (see `shared::constants`) address the same facial feature every frame.
#[derive(Clone, Debug, PartialEq)]
pub struct FaceLandmarks {
    mesh: Vec<DVec3>,
    bounding_box: BoundingBox,
}

impl FaceLandmarks {
    /// Builds landmarks from raw mesh points. Returns `None` for an empty mesh.
    pub fn from_mesh(mesh: Vec<DVec3>) -> Option<Self> {
        let first = *mesh.first()?;
        let mut min = first.truncate();
        let mut max = first.truncate();
        for p in &mesh[1..] {
            min = min.min(p.truncate());
            max = max.max(p.truncate());
        }
        Some(Self {
            mesh,
            bounding_box: BoundingBox {
                top_left: min,
                bottom_right: max,
            },
        })
    }

    pub fn mesh(&self) -> &[DVec3] {
        &self.mesh
    }

    pub fn point(&self, index: usize) -> Option<DVec3> {
        self.mesh.get(index).copied()
    }

    pub fn len(&self) -> usize {
        self.mesh.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mesh.is_empty()
    }

    pub fn bounding_box(&self) -> &BoundingBox {
        &self.bounding_box
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_empty_mesh_yields_none() {
        assert!(FaceLandmarks::from_mesh(Vec::new()).is_none());
    }

    #[test]
    fn test_bounding_box_axes_are_independent() {
        // min x comes from one point, min y from another
        let lm = FaceLandmarks::from_mesh(vec![
            DVec3::new(10.0, 80.0, 0.0),
            DVec3::new(50.0, 20.0, -3.0),
            DVec3::new(90.0, 60.0, 2.0),
        ])
        .unwrap();

        let bb = lm.bounding_box();
        assert_eq!(bb.top_left, DVec2::new(10.0, 20.0));
        assert_eq!(bb.bottom_right, DVec2::new(90.0, 80.0));
        assert_relative_eq!(bb.width(), 80.0);
        assert_relative_eq!(bb.height(), 60.0);
        assert_eq!(bb.center(), DVec2::new(50.0, 50.0));
    }

    #[test]
    fn test_single_point_has_degenerate_box() {
        let lm = FaceLandmarks::from_mesh(vec![DVec3::new(5.0, 6.0, 7.0)]).unwrap();
        assert_relative_eq!(lm.bounding_box().width(), 0.0);
        assert_relative_eq!(lm.bounding_box().height(), 0.0);
    }

    #[test]
    fn test_point_lookup() {
        let lm = FaceLandmarks::from_mesh(vec![DVec3::ZERO, DVec3::ONE]).unwrap();
        assert_eq!(lm.len(), 2);
        assert_eq!(lm.point(1), Some(DVec3::ONE));
        assert_eq!(lm.point(2), None);
    }
}

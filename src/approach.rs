use nalgebra::{Isometry3, Point3, Translation3, Vector3};

use crate::intersection::{IntersectOptions, Intersection};
use crate::surface::Surface;

#[cfg(test)]
mod tests {

    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn cylinder_approach_picks_inner_from_inside() {
        let approach = ApproachDescriptor::cylinder(Isometry3::identity(), 30.0, 100.0, 2.0);
        let (surface, i) = approach
            .approach_surface(&Point3::origin(), &Vector3::x(), &IntersectOptions::new(1e-4))
            .unwrap();
        assert_relative_eq!(i.path_length, 29.0, epsilon = 1e-9);
        assert!(matches!(
            surface.bounds(),
            crate::surface::SurfaceBounds::Cylinder { radius, .. } if (*radius - 29.0).abs() < 1e-12
        ));
    }

    #[test]
    fn disc_approach_from_either_side() {
        let approach = ApproachDescriptor::disc(Isometry3::translation(0.0, 0.0, 50.0), 0.0, 100.0, 4.0);
        let opts = IntersectOptions::new(1e-4);
        let (_, forward) = approach
            .approach_surface(&Point3::new(10.0, 0.0, 0.0), &Vector3::z(), &opts)
            .unwrap();
        assert_relative_eq!(forward.path_length, 48.0, epsilon = 1e-9);
        let (_, backward) = approach
            .approach_surface(&Point3::new(10.0, 0.0, 100.0), &-Vector3::z(), &opts)
            .unwrap();
        assert_relative_eq!(backward.path_length, 48.0, epsilon = 1e-9);
    }

    #[test]
    fn no_approach_when_pointing_away() {
        let approach = ApproachDescriptor::disc(Isometry3::translation(0.0, 0.0, 50.0), 0.0, 100.0, 4.0);
        let none = approach.approach_surface(&Point3::origin(), &-Vector3::z(), &IntersectOptions::new(1e-4));
        assert!(none.is_none());
    }
}

/// Surfaces through which a layer is entered.
#[derive(Debug, Clone, PartialEq)]
pub struct ApproachDescriptor {
    surfaces: Vec<Surface>,
}

impl ApproachDescriptor {
    pub fn new(surfaces: Vec<Surface>) -> Self {
        Self { surfaces }
    }

    /// Inner and outer cylinders at `radius ∓ thickness / 2`.
    pub fn cylinder(transform: Isometry3<f64>, radius: f64, half_z: f64, thickness: f64) -> Self {
        let half = 0.5 * thickness;
        Self::new(vec![
            Surface::cylinder(transform, radius - half, half_z),
            Surface::cylinder(transform, radius + half, half_z),
        ])
    }

    /// Discs at `z ∓ thickness / 2` of the layer frame.
    pub fn disc(transform: Isometry3<f64>, r_min: f64, r_max: f64, thickness: f64) -> Self {
        let half = 0.5 * thickness;
        let shifted = |dz: f64| {
            let offset = transform.rotation * Vector3::new(0.0, 0.0, dz);
            Translation3::from(offset) * transform
        };
        Self::new(vec![
            Surface::disc(shifted(-half), r_min, r_max),
            Surface::disc(shifted(half), r_min, r_max),
        ])
    }

    /// Rectangles at local `z ∓ thickness / 2` of the layer frame.
    pub fn plane(transform: Isometry3<f64>, half_x: f64, half_y: f64, thickness: f64) -> Self {
        let half = 0.5 * thickness;
        let shifted = |dz: f64| {
            let offset = transform.rotation * Vector3::new(0.0, 0.0, dz);
            Translation3::from(offset) * transform
        };
        Self::new(vec![
            Surface::rectangle(shifted(-half), half_x, half_y),
            Surface::rectangle(shifted(half), half_x, half_y),
        ])
    }

    pub fn surfaces(&self) -> &[Surface] {
        &self.surfaces
    }

    pub(crate) fn surfaces_mut(&mut self) -> &mut [Surface] {
        &mut self.surfaces
    }

    /// The closest valid approach intersection ahead, if any.
    pub fn approach_surface(
        &self,
        position: &Point3<f64>,
        direction: &Vector3<f64>,
        options: &IntersectOptions,
    ) -> Option<(&Surface, Intersection)> {
        self.surfaces
            .iter()
            .map(|s| (s, s.intersect(position, direction, options)))
            .filter(|(_, i)| i.valid)
            .min_by(|(_, a), (_, b)| a.path_length.total_cmp(&b.path_length))
    }
}

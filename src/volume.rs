use nalgebra::{Isometry3, Point3, Vector3};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::identifier::{GeometryId, VolumeId};
use crate::intersection::{Candidate, IntersectOptions, Identified};
use crate::layer::{Layer, ResolveFilter};
use crate::surface::Surface;

#[cfg(test)]
mod tests {

    use super::*;
    use crate::layer::LayerType;
    use crate::material::{Material, MaterialProperties, SurfaceMaterial};

    fn volume_with_layers(radii: &[f64]) -> TrackingVolume {
        let layers = radii
            .iter()
            .map(|&r| {
                let material = SurfaceMaterial::homogeneous(MaterialProperties::new(Material::beryllium(), 1.0), 1.0);
                Layer::new(
                    Surface::cylinder(Isometry3::identity(), r, 100.0).with_material(material),
                    1.0,
                    LayerType::Passive,
                )
            })
            .collect();
        TrackingVolume {
            id: VolumeId(0),
            name: "test".to_string(),
            transform: Isometry3::identity(),
            bounds: CylinderVolumeBounds::new(0.0, 50.0, 100.0),
            layers,
            boundaries: Vec::new(),
            children: Vec::new(),
            parent: None,
        }
    }

    #[test]
    fn inside_with_tolerance() {
        let volume = volume_with_layers(&[]);
        assert!(volume.inside(&Point3::new(0.0, 50.00001, 0.0), 1e-4));
        assert!(!volume.inside(&Point3::new(0.0, 51.0, 0.0), 1e-4));
        assert!(!volume.inside(&Point3::new(0.0, 0.0, -101.0), 1e-4));
    }

    #[test]
    fn compatible_layers_skip_start() {
        let volume = volume_with_layers(&[10.0, 20.0, 30.0]);
        let filter = ResolveFilter::new(true, true, false);
        let opts = IntersectOptions::new(1e-4);
        let start = Point3::new(10.0, 0.0, 0.0);
        let layers = volume.compatible_layers(&start, &Vector3::x(), &opts, filter, Some(&volume.layers()[0]));
        assert_eq!(layers.len(), 2);

        let backwards = volume.compatible_layers(&start, &-Vector3::x(), &opts, filter, None);
        // through the axis: r = 10 again on the far side, then 20 and 30
        assert_eq!(backwards.len(), 3);
        assert!((backwards[0].path_length() - 20.0).abs() < 1e-9);
    }

    #[test]
    fn boundary_side_selection() {
        let boundary = BoundarySurface {
            surface: Surface::cylinder(Isometry3::identity(), 25.0, 100.0),
            face: BoundaryFace::OuterCylinder,
            along: Some(VolumeId(2)),
            opposite: Some(VolumeId(1)),
        };
        let at = Point3::new(25.0, 0.0, 0.0);
        assert_eq!(boundary.attached_volume(&at, &Vector3::x()), Some(VolumeId(2)));
        assert_eq!(boundary.attached_volume(&at, &-Vector3::x()), Some(VolumeId(1)));
    }

    #[test]
    fn associated_layer_by_thickness() {
        let volume = volume_with_layers(&[10.0, 20.0]);
        let layer = volume.associated_layer(&Point3::new(0.0, 20.3, 0.0), 1e-4).unwrap();
        assert_eq!(layer.ordering_key(), 20.0);
        assert!(volume.associated_layer(&Point3::new(0.0, 15.0, 0.0), 1e-4).is_none());
    }
}

/// Bounds of a cylindrical volume (tube when `r_min > 0`), in its local frame.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct CylinderVolumeBounds {
    pub r_min: f64,
    pub r_max: f64,
    pub half_z: f64,
}

impl CylinderVolumeBounds {
    pub fn new(r_min: f64, r_max: f64, half_z: f64) -> Self {
        Self { r_min, r_max, half_z }
    }
}

/// Which face of a cylinder volume a boundary surface sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BoundaryFace {
    InnerCylinder,
    OuterCylinder,
    NegativeDisc,
    PositiveDisc,
}

/// A volume-confining surface, linked to the volumes on either side.
///
/// `along` is the volume the surface normal points into, `opposite` the one
/// behind it. Either is `None` at the edge of the world.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundarySurface {
    pub surface: Surface,
    pub face: BoundaryFace,
    pub along: Option<VolumeId>,
    pub opposite: Option<VolumeId>,
}

impl BoundarySurface {
    /// The volume entered when moving along `direction` (already signed by
    /// the navigation direction) through `position`.
    pub fn attached_volume(&self, position: &Point3<f64>, direction: &Vector3<f64>) -> Option<VolumeId> {
        if self.surface.normal(position).dot(direction) > 0.0 {
            self.along
        } else {
            self.opposite
        }
    }
}

impl Identified for BoundarySurface {
    fn geo_id(&self) -> GeometryId {
        self.surface.geo_id()
    }
}

/// A region of the detector with its layers and confining boundaries.
/// Container volumes hold children and no layers.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackingVolume {
    pub(crate) id: VolumeId,
    pub(crate) name: String,
    pub(crate) transform: Isometry3<f64>,
    pub(crate) bounds: CylinderVolumeBounds,
    pub(crate) layers: Vec<Layer>,
    pub(crate) boundaries: Vec<BoundarySurface>,
    pub(crate) children: Vec<VolumeId>,
    pub(crate) parent: Option<VolumeId>,
}

impl TrackingVolume {
    pub fn id(&self) -> VolumeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn transform(&self) -> &Isometry3<f64> {
        &self.transform
    }

    pub fn bounds(&self) -> &CylinderVolumeBounds {
        &self.bounds
    }

    /// Layers in increasing radius (barrels) or z (endcaps).
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn boundaries(&self) -> &[BoundarySurface] {
        &self.boundaries
    }

    pub fn children(&self) -> &[VolumeId] {
        &self.children
    }

    pub fn parent(&self) -> Option<VolumeId> {
        self.parent
    }

    pub fn is_container(&self) -> bool {
        !self.children.is_empty()
    }

    pub fn geo_id(&self) -> GeometryId {
        GeometryId::from_volume(self.id)
    }

    pub fn inside(&self, point: &Point3<f64>, tolerance: f64) -> bool {
        let local = self.transform.inverse_transform_point(point);
        let r = local.coords.xy().norm();
        r >= self.bounds.r_min - tolerance
            && r <= self.bounds.r_max + tolerance
            && local.z.abs() <= self.bounds.half_z + tolerance
    }

    /// The layer whose thickness contains `position`, if any.
    pub fn associated_layer(&self, position: &Point3<f64>, tolerance: f64) -> Option<&Layer> {
        self.layers.iter().find(|l| l.is_on_layer(position, tolerance))
    }

    /// Layers ahead of `position` that pass `filter`, with their approach
    /// intersections. `skip` excludes the layer the trajectory started on.
    pub fn compatible_layers<'g>(
        &'g self,
        position: &Point3<f64>,
        direction: &Vector3<f64>,
        options: &IntersectOptions,
        filter: ResolveFilter,
        skip: Option<&Layer>,
    ) -> Vec<Candidate<'g, Layer>> {
        self.layers
            .iter()
            .filter(|l| l.resolve(filter.sensitive, filter.material, filter.passive))
            .filter(|l| !skip.is_some_and(|s| std::ptr::eq(*l, s)))
            .filter_map(|l| {
                let (surface, i) = l.approach_intersection(position, direction, options);
                i.valid.then(|| Candidate::new(l, surface, i))
            })
            .collect()
    }

    /// Boundary surfaces ahead of `position`.
    pub fn compatible_boundaries<'g>(
        &'g self,
        position: &Point3<f64>,
        direction: &Vector3<f64>,
        options: &IntersectOptions,
    ) -> Vec<Candidate<'g, BoundarySurface>> {
        self.boundaries
            .iter()
            .filter_map(|b| {
                let i = b.surface.intersect(position, direction, options);
                i.valid.then(|| Candidate::new(b, &b.surface, i))
            })
            .collect()
    }
}

impl fmt::Display for TrackingVolume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} '{}' r=[{}, {}] z={:+}±{} layers={} boundaries={}",
            self.id,
            self.name,
            self.bounds.r_min,
            self.bounds.r_max,
            self.transform.translation.vector.z,
            self.bounds.half_z,
            self.layers.len(),
            self.boundaries.len()
        )
    }
}

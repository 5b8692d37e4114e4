use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

use crate::approach::ApproachDescriptor;
use crate::identifier::GeometryId;
use crate::intersection::{Candidate, IntersectOptions, Identified, Intersection};
use crate::surface::{Surface, SurfaceBounds};
use crate::surface_array::SurfaceArray;

#[cfg(test)]
mod tests {

    use super::*;
    use crate::binning::{BinUtility, BinningData, BinningOption, BinningValue};
    use crate::material::{Material, MaterialProperties, SurfaceMaterial};
    use nalgebra::Isometry3;

    fn material() -> SurfaceMaterial {
        SurfaceMaterial::homogeneous(MaterialProperties::new(Material::silicon(), 1.0), 1.0)
    }

    /// Three planes across x at z = 10, 11, 12: sensitive, material and passive.
    fn plane_layer() -> Layer {
        let at = |z: f64| Isometry3::translation(0.0, 0.0, z);
        let sensitive = Surface::rectangle(at(10.0), 5.0, 5.0).as_sensitive();
        let array = SurfaceArray::new(
            vec![sensitive],
            BinUtility::new(
                vec![BinningData::equidistant(BinningValue::X, BinningOption::Open, 1, -5.0, 5.0).unwrap()],
                None,
            ),
        );
        Layer::new(Surface::rectangle(at(11.0), 5.0, 5.0).with_material(material()), 4.0, LayerType::Active)
            .with_surface_array(array)
            .with_approach(ApproachDescriptor::plane(at(11.0), 5.0, 5.0, 4.0))
    }

    #[test]
    fn resolve_switches() {
        let layer = plane_layer();
        assert!(layer.resolve(true, false, false));
        assert!(layer.resolve(false, true, false));
        assert!(layer.resolve(false, false, true));

        let passive = Layer::new(Surface::cylinder(Isometry3::identity(), 10.0, 10.0), 1.0, LayerType::Passive);
        assert!(!passive.resolve(true, true, false));
        assert!(passive.resolve(false, false, true));
    }

    #[test]
    fn compatible_surfaces_respect_filter() {
        let layer = plane_layer();
        let opts = IntersectOptions::new(1e-4);
        let start = Point3::new(0.0, 0.0, 9.0);

        let sensitive = layer.compatible_surfaces(&start, &Vector3::z(), &opts, ResolveFilter::new(true, false, false));
        assert_eq!(sensitive.len(), 1);
        assert!(sensitive[0].surface.is_sensitive());

        let material = layer.compatible_surfaces(&start, &Vector3::z(), &opts, ResolveFilter::new(false, true, false));
        assert_eq!(material.len(), 1);
        assert!(material[0].surface.has_material());

        // approach planes at z = 9 (standing on it) and z = 13
        let passive = layer.compatible_surfaces(&start, &Vector3::z(), &opts, ResolveFilter::new(false, false, true));
        assert_eq!(passive.len(), 1);
        assert!(passive[0].surface.is_passive());
    }

    #[test]
    fn approach_falls_back_to_representation() {
        let layer = Layer::new(Surface::cylinder(Isometry3::identity(), 19.0, 100.0), 0.8, LayerType::Passive);
        let i = layer.approach_intersection(&Point3::origin(), &Vector3::x(), &IntersectOptions::new(1e-4));
        assert!(i.1.valid);
        assert!((i.1.path_length - 19.0).abs() < 1e-9);
    }

    #[test]
    fn identifiers_assigned_down_the_layer() {
        let mut layer = plane_layer();
        layer.assign_geometry_id(GeometryId::new(2), 3);
        assert_eq!(layer.geo_id(), GeometryId::new(2).with_layer(3));
        let sensitive = layer.surface_array().unwrap().surfaces()[0].geo_id();
        assert_eq!(sensitive, GeometryId::new(2).with_layer(3).with_sensitive(1));
        assert!(layer.surface(&GeometryId::new(2).with_layer(3).with_approach(2)).is_some());
    }

    #[test]
    fn on_layer_within_thickness() {
        let layer = plane_layer();
        assert!(layer.is_on_layer(&Point3::new(0.0, 0.0, 12.5), 1e-4));
        assert!(!layer.is_on_layer(&Point3::new(0.0, 0.0, 13.5), 1e-4));
    }
}

/// Role of a layer in navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerType {
    /// Carries sensitive surfaces.
    Active,
    /// Material only.
    Passive,
    /// Geometric separator, nothing to resolve.
    Navigation,
}

/// Which surface categories may enter a candidate list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolveFilter {
    pub sensitive: bool,
    pub material: bool,
    pub passive: bool,
}

impl ResolveFilter {
    pub fn new(sensitive: bool, material: bool, passive: bool) -> Self {
        Self {
            sensitive,
            material,
            passive,
        }
    }

    pub fn accepts(&self, surface: &Surface) -> bool {
        (self.sensitive && surface.is_sensitive())
            || (self.material && surface.has_material())
            || (self.passive && surface.is_passive())
    }
}

/// A thin shell of the detector: a representing surface of some thickness,
/// optionally holding binned sensitive surfaces and approach surfaces.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    representation: Surface,
    thickness: f64,
    layer_type: LayerType,
    surface_array: Option<SurfaceArray>,
    approach: Option<ApproachDescriptor>,
}

impl Layer {
    pub fn new(representation: Surface, thickness: f64, layer_type: LayerType) -> Self {
        Self {
            representation,
            thickness,
            layer_type,
            surface_array: None,
            approach: None,
        }
    }

    pub fn with_surface_array(mut self, surface_array: SurfaceArray) -> Self {
        self.surface_array = Some(surface_array);
        self
    }

    pub fn with_approach(mut self, approach: ApproachDescriptor) -> Self {
        self.approach = Some(approach);
        self
    }

    pub fn representation(&self) -> &Surface {
        &self.representation
    }

    pub fn thickness(&self) -> f64 {
        self.thickness
    }

    pub fn layer_type(&self) -> LayerType {
        self.layer_type
    }

    pub fn surface_array(&self) -> Option<&SurfaceArray> {
        self.surface_array.as_ref()
    }

    pub fn approach(&self) -> Option<&ApproachDescriptor> {
        self.approach.as_ref()
    }

    fn approach_surfaces(&self) -> &[Surface] {
        self.approach.as_ref().map_or(&[], |a| a.surfaces())
    }

    fn sensitive_surfaces(&self) -> &[Surface] {
        self.surface_array.as_ref().map_or(&[], |a| a.surfaces())
    }

    /// Material on the representation, the approach or the sensitive surfaces.
    pub fn has_material(&self) -> bool {
        self.representation.has_material()
            || self.approach_surfaces().iter().any(Surface::has_material)
            || self.sensitive_surfaces().iter().any(Surface::has_material)
    }

    /// Whether navigation should stop at this layer for the given switches.
    pub fn resolve(&self, sensitive: bool, material: bool, passive: bool) -> bool {
        if passive {
            return true;
        }
        if self.layer_type == LayerType::Navigation {
            return false;
        }
        (sensitive && self.surface_array.is_some()) || (material && self.has_material())
    }

    /// Closest approach surface ahead, or the representing surface when the
    /// layer has no approach descriptor.
    pub fn approach_intersection(
        &self,
        position: &Point3<f64>,
        direction: &Vector3<f64>,
        options: &IntersectOptions,
    ) -> (&Surface, Intersection) {
        self.approach
            .as_ref()
            .and_then(|a| a.approach_surface(position, direction, options))
            .unwrap_or_else(|| {
                (
                    &self.representation,
                    self.representation.intersect(position, direction, options),
                )
            })
    }

    /// Within half the thickness of the representing surface.
    pub fn is_on_layer(&self, position: &Point3<f64>, tolerance: f64) -> bool {
        let half = 0.5 * self.thickness + tolerance;
        self.representation.distance(position) <= half
            && self
                .representation
                .bounds()
                .inside(&self.representation.to_local(position), tolerance)
    }

    /// Surfaces of this layer the trajectory will hit from `position`,
    /// restricted to the categories enabled in `filter`. Sensitive surfaces are
    /// taken from the bin neighbourhood of `position`.
    pub fn compatible_surfaces<'g>(
        &'g self,
        position: &Point3<f64>,
        direction: &Vector3<f64>,
        options: &IntersectOptions,
        filter: ResolveFilter,
    ) -> Vec<Candidate<'g, Surface>> {
        let sensitive = self
            .surface_array
            .as_ref()
            .map(|a| a.neighbors(position))
            .unwrap_or_default();

        self.approach_surfaces()
            .iter()
            .chain(sensitive)
            .chain(std::iter::once(&self.representation))
            .filter(|s| filter.accepts(s))
            .filter_map(|s| {
                let i = s.intersect(position, direction, options);
                i.valid.then(|| Candidate::new(s, s, i))
            })
            .collect()
    }

    /// Sorting key of layers inside a volume: radius of cylinder layers, z otherwise.
    pub fn ordering_key(&self) -> f64 {
        match self.representation.bounds() {
            SurfaceBounds::Cylinder { radius, .. } => *radius,
            SurfaceBounds::Disc { .. } | SurfaceBounds::Rectangle { .. } => self.representation.center().z,
        }
    }

    /// Looks up a surface of this layer by identifier.
    pub fn surface(&self, geo_id: &GeometryId) -> Option<&Surface> {
        if geo_id.is_sensitive() {
            return self.sensitive_surfaces().get(geo_id.sensitive as usize - 1);
        }
        if geo_id.is_approach() {
            return self.approach_surfaces().get(geo_id.approach as usize - 1);
        }
        (self.representation.geo_id() == *geo_id).then_some(&self.representation)
    }

    pub(crate) fn assign_geometry_id(&mut self, volume: GeometryId, layer: u32) {
        let id = volume.with_layer(layer);
        self.representation.set_geo_id(id);
        if let Some(approach) = self.approach.as_mut() {
            for (i, s) in approach.surfaces_mut().iter_mut().enumerate() {
                s.set_geo_id(id.with_approach(i as u32 + 1));
            }
        }
        if let Some(array) = self.surface_array.as_mut() {
            for (i, s) in array.surfaces_mut().iter_mut().enumerate() {
                s.set_geo_id(id.with_sensitive(i as u32 + 1));
            }
        }
    }
}

impl Identified for Layer {
    fn geo_id(&self) -> GeometryId {
        self.representation.geo_id()
    }
}

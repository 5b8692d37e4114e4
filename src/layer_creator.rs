//! Layers built from sets of sensitive surfaces.
//!
//! **Context**: Detector modules are placed individually, but navigation works
//! layer by layer. A layer needs a representing surface enclosing its modules,
//! approach surfaces to enter it, and a binned [`SurfaceArray`] so that only
//! the modules near the trajectory are intersected.
//!
//! **How it Works**: The extent of the modules is measured ([`ProtoLayer`]),
//! widened by an envelope or replaced by an explicit extent, and binned either
//! with fixed bin counts or with bins derived from the module positions
//! (clustered with the tolerances of [`LayerCreatorConfig`]). Every module
//! must be reachable through the resulting binning, otherwise the layer is
//! rejected with [`GeometryError::UnreachableSurfaces`].

use itertools::Itertools;
use log::debug;
use nalgebra::{Isometry3, Point3, Translation3};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::approach::ApproachDescriptor;
use crate::binning::{BinUtility, BinningData, BinningOption, BinningType, BinningValue, PHI_RANGE};
use crate::error::{GeometryError, Result};
use crate::layer::{Layer, LayerType};
use crate::surface::Surface;
use crate::surface_array::SurfaceArray;

#[cfg(test)]
mod tests {

    use super::*;
    use crate::detector::{barrel_module_placement, disc_module_placement};
    use approx::assert_relative_eq;

    fn barrel_modules(n_phi: usize, zs: &[f64]) -> Vec<Surface> {
        (0..n_phi)
            .cartesian_product(zs)
            .map(|(i, &z)| {
                let phi = -PI + (i as f64 + 0.5) * 2.0 * PI / n_phi as f64;
                Surface::rectangle(barrel_module_placement(30.0, phi, z, 0.0), 5.0, 10.0).as_sensitive()
            })
            .collect()
    }

    fn cylinder_spec(extent: CylinderExtent, binning: LayerBinning) -> CylinderLayerSpec {
        CylinderLayerSpec {
            extent,
            binning,
            transform: None,
            approach: None,
        }
    }

    #[test]
    fn cylinder_layer_with_bin_counts() {
        let creator = LayerCreator::new(LayerCreatorConfig::default());
        let spec = cylinder_spec(CylinderExtent::Envelope { r: 1.0, z: 1.0 }, LayerBinning::Bins(8, 3));
        let layer = creator.cylinder_layer(barrel_modules(8, &[-20.0, 0.0, 20.0]), &spec).unwrap();

        let array = layer.surface_array().unwrap();
        assert_eq!(array.surfaces().len(), 24);
        assert_eq!(array.binning().bins(), 24);
        assert!(layer.resolve(true, false, false));
        assert_eq!(layer.approach().unwrap().surfaces().len(), 2);
        match layer.representation().bounds() {
            crate::surface::SurfaceBounds::Cylinder { half_z, .. } => assert_relative_eq!(*half_z, 31.0),
            other => panic!("unexpected bounds {other:?}"),
        }
    }

    #[test]
    fn cylinder_layer_from_binning_types() {
        let creator = LayerCreator::new(LayerCreatorConfig::default());
        let modules = barrel_modules(8, &[-20.0, 0.0, 20.0]);
        for kind in [BinningType::Arbitrary, BinningType::Equidistant] {
            let spec = cylinder_spec(CylinderExtent::Envelope { r: 1.0, z: 1.0 }, LayerBinning::Types(kind, kind));
            let layer = creator.cylinder_layer(modules.clone(), &spec).unwrap();
            let axes = layer.surface_array().unwrap().binning().axes();
            assert_eq!(axes[0].bins(), 8);
            assert_eq!(axes[1].bins(), 3);
        }
    }

    #[test]
    fn explicit_extent_too_short_is_rejected() {
        let creator = LayerCreator::new(LayerCreatorConfig::default());
        let spec = cylinder_spec(
            CylinderExtent::Explicit {
                r_min: 25.0,
                r_max: 35.0,
                half_z: 12.0,
            },
            LayerBinning::Bins(8, 3),
        );
        let result = creator.cylinder_layer(barrel_modules(8, &[-20.0, 0.0, 20.0]), &spec);
        assert!(matches!(result, Err(GeometryError::UnreachableSurfaces { count: 16, total: 24 })));
    }

    #[test]
    fn empty_and_zero_bins_rejected() {
        let creator = LayerCreator::new(LayerCreatorConfig::default());
        let spec = cylinder_spec(CylinderExtent::Envelope { r: 1.0, z: 1.0 }, LayerBinning::Bins(8, 3));
        assert!(matches!(
            creator.cylinder_layer(Vec::new(), &spec),
            Err(GeometryError::EmptySurfaces("cylinder"))
        ));
        let zero = cylinder_spec(CylinderExtent::Envelope { r: 1.0, z: 1.0 }, LayerBinning::Bins(0, 3));
        assert!(creator.cylinder_layer(barrel_modules(8, &[0.0]), &zero).is_err());
    }

    #[test]
    fn disc_layer_ring() {
        let creator = LayerCreator::new(LayerCreatorConfig::default());
        let modules: Vec<Surface> = (0..12)
            .map(|i| {
                let phi = -PI + (i as f64 + 0.5) * PI / 6.0;
                Surface::rectangle(disc_module_placement(40.0, phi, 100.0), 6.0, 10.0).as_sensitive()
            })
            .collect();
        let spec = DiscLayerSpec {
            extent: DiscExtent::Envelope {
                r_min: 1.0,
                r_max: 1.0,
                z: 2.0,
            },
            binning: LayerBinning::Types(BinningType::Arbitrary, BinningType::Equidistant),
            transform: None,
            approach: None,
        };
        let layer = creator.disc_layer(modules, &spec).unwrap();
        assert_relative_eq!(layer.representation().center().z, 100.0, epsilon = 1e-9);
        assert_relative_eq!(layer.thickness(), 4.0, epsilon = 1e-9);
        let axes = layer.surface_array().unwrap().binning().axes();
        assert_eq!(axes[0].bins(), 1);
        assert_eq!(axes[1].bins(), 12);
    }

    #[test]
    fn plane_layer_grid() {
        let creator = LayerCreator::new(LayerCreatorConfig::default());
        let modules: Vec<Surface> = [(-5.0, -5.0), (5.0, -5.0), (-5.0, 5.0), (5.0, 5.0)]
            .iter()
            .map(|&(x, y)| Surface::rectangle(Isometry3::translation(x, y, 50.0), 5.0, 5.0).as_sensitive())
            .collect();
        let spec = PlaneLayerSpec {
            envelope_xy: 0.0,
            envelope_z: 1.0,
            bins_x: 2,
            bins_y: 2,
            transform: None,
            approach: None,
        };
        let layer = creator.plane_layer(modules, &spec).unwrap();
        assert_relative_eq!(layer.ordering_key(), 50.0, epsilon = 1e-9);
        let array = layer.surface_array().unwrap();
        assert_eq!(array.surfaces_at(&Point3::new(4.0, 4.0, 50.0))[0].center().x, 5.0);
    }

    #[test]
    fn clustering_merges_within_tolerance() {
        let clusters = cluster_centres([0.0, 0.05, 1.0, 1.04, 3.0], 0.1);
        assert_eq!(clusters.len(), 3);
        assert_relative_eq!(clusters[0], 0.025);
    }
}

/// Tolerances used when deriving bins from module positions.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct LayerCreatorConfig {
    /// Modules closer than this in z are in the same z bin.
    #[serde(default = "default_z_tolerance")]
    pub cylinder_z_tolerance: f64,
    /// Modules closer than this in phi are in the same phi bin.
    #[serde(default = "default_phi_tolerance")]
    pub cylinder_phi_tolerance: f64,
    /// Disc modules closer than this in r are in the same ring.
    #[serde(default = "default_r_tolerance")]
    pub disc_r_tolerance: f64,
}

fn default_z_tolerance() -> f64 {
    10.0
}

fn default_phi_tolerance() -> f64 {
    0.1
}

fn default_r_tolerance() -> f64 {
    10.0
}

impl Default for LayerCreatorConfig {
    fn default() -> Self {
        Self {
            cylinder_z_tolerance: default_z_tolerance(),
            cylinder_phi_tolerance: default_phi_tolerance(),
            disc_r_tolerance: default_r_tolerance(),
        }
    }
}

/// Bins of the two layer axes: (phi, z) for cylinders, (r, phi) for discs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerBinning {
    /// Fixed equidistant bin counts.
    Bins(usize, usize),
    /// Bins derived from the clustered module positions.
    Types(BinningType, BinningType),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CylinderExtent {
    /// Module extent widened by `r` in radius and `z` in length.
    Envelope { r: f64, z: f64 },
    Explicit { r_min: f64, r_max: f64, half_z: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DiscExtent {
    /// Module extent widened inwards by `r_min`, outwards by `r_max` and by `z` on both sides.
    Envelope { r_min: f64, r_max: f64, z: f64 },
    Explicit { z_min: f64, z_max: f64, r_min: f64, r_max: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CylinderLayerSpec {
    pub extent: CylinderExtent,
    pub binning: LayerBinning,
    pub transform: Option<Isometry3<f64>>,
    pub approach: Option<ApproachDescriptor>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiscLayerSpec {
    pub extent: DiscExtent,
    pub binning: LayerBinning,
    pub transform: Option<Isometry3<f64>>,
    pub approach: Option<ApproachDescriptor>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlaneLayerSpec {
    pub envelope_xy: f64,
    pub envelope_z: f64,
    pub bins_x: usize,
    pub bins_y: usize,
    pub transform: Option<Isometry3<f64>>,
    pub approach: Option<ApproachDescriptor>,
}

/// Extent of a set of surfaces in a given frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProtoLayer {
    pub r_min: f64,
    pub r_max: f64,
    pub z_min: f64,
    pub z_max: f64,
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

const VERTEX_SEGMENTS: usize = 24;

impl ProtoLayer {
    pub fn new(surfaces: &[Surface], frame: &Isometry3<f64>) -> Self {
        let init = Self {
            r_min: f64::INFINITY,
            r_max: f64::NEG_INFINITY,
            z_min: f64::INFINITY,
            z_max: f64::NEG_INFINITY,
            x_min: f64::INFINITY,
            x_max: f64::NEG_INFINITY,
            y_min: f64::INFINITY,
            y_max: f64::NEG_INFINITY,
        };
        surfaces
            .iter()
            .flat_map(|s| s.vertices(VERTEX_SEGMENTS))
            .map(|v| frame.inverse_transform_point(&v))
            .fold(init, |p, v| {
                let r = v.coords.xy().norm();
                Self {
                    r_min: p.r_min.min(r),
                    r_max: p.r_max.max(r),
                    z_min: p.z_min.min(v.z),
                    z_max: p.z_max.max(v.z),
                    x_min: p.x_min.min(v.x),
                    x_max: p.x_max.max(v.x),
                    y_min: p.y_min.min(v.y),
                    y_max: p.y_max.max(v.y),
                }
            })
    }
}

/// Means of the groups of `values` whose neighbours are within `tolerance`.
pub fn cluster_centres(values: impl IntoIterator<Item = f64>, tolerance: f64) -> Vec<f64> {
    let sorted: Vec<f64> = values.into_iter().sorted_by(f64::total_cmp).collect();
    let mut clusters: Vec<Vec<f64>> = Vec::new();
    for v in sorted {
        match clusters.last_mut() {
            Some(current) if current.last().is_some_and(|&last| v - last <= tolerance) => current.push(v),
            _ => clusters.push(vec![v]),
        }
    }
    clusters
        .iter()
        .map(|c| c.iter().sum::<f64>() / c.len() as f64)
        .collect()
}

/// Builds layers from sensitive surfaces.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerCreator {
    config: LayerCreatorConfig,
}

impl LayerCreator {
    pub fn new(config: LayerCreatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LayerCreatorConfig {
        &self.config
    }

    /// A cylinder layer around the beam axis, binned in (phi, z).
    pub fn cylinder_layer(&self, surfaces: Vec<Surface>, spec: &CylinderLayerSpec) -> Result<Layer> {
        if surfaces.is_empty() {
            return Err(GeometryError::EmptySurfaces("cylinder"));
        }
        let transform = spec.transform.unwrap_or_else(Isometry3::identity);
        let proto = ProtoLayer::new(&surfaces, &transform);

        let (r_min, r_max, half_z) = match spec.extent {
            CylinderExtent::Envelope { r, z } => (
                (proto.r_min - r).max(0.0),
                proto.r_max + r,
                proto.z_min.abs().max(proto.z_max.abs()) + z,
            ),
            CylinderExtent::Explicit { r_min, r_max, half_z } => (r_min, r_max, half_z),
        };
        if r_min < 0.0 || r_max <= r_min || half_z <= 0.0 {
            return Err(GeometryError::InvalidBounds {
                what: "cylinder layer".to_string(),
                reason: format!("r=[{r_min}, {r_max}] half_z={half_z}"),
            });
        }
        let radius = 0.5 * (r_min + r_max);
        let thickness = r_max - r_min;

        let centres = local_centres(&surfaces, &transform);
        let phis = centres.iter().map(|c| BinningValue::Phi.value(c));
        let zs = centres.iter().map(|c| c.z);
        let (phi_axis, z_axis) = match spec.binning {
            LayerBinning::Bins(n_phi, n_z) => (
                self.phi_equidistant(phis, n_phi)?,
                BinningData::equidistant(BinningValue::Z, BinningOption::Open, n_z, -half_z, half_z)?,
            ),
            LayerBinning::Types(phi_type, z_type) => (
                self.phi_from_modules(phis, phi_type)?,
                open_from_modules(BinningValue::Z, zs, z_type, self.config.cylinder_z_tolerance, -half_z, half_z)?,
            ),
        };

        let array = SurfaceArray::new(surfaces, BinUtility::new(vec![phi_axis, z_axis], spec.transform));
        check_binning(&array)?;
        debug!(
            "cylinder layer r={radius:.2} half_z={half_z:.2} with {} surfaces in {} bins",
            array.surfaces().len(),
            array.binning().bins()
        );

        let approach = spec
            .approach
            .clone()
            .unwrap_or_else(|| ApproachDescriptor::cylinder(transform, radius, half_z, thickness));
        Ok(Layer::new(Surface::cylinder(transform, radius, half_z), thickness, LayerType::Active)
            .with_surface_array(array)
            .with_approach(approach))
    }

    /// A disc layer perpendicular to the beam axis, binned in (r, phi).
    pub fn disc_layer(&self, surfaces: Vec<Surface>, spec: &DiscLayerSpec) -> Result<Layer> {
        if surfaces.is_empty() {
            return Err(GeometryError::EmptySurfaces("disc"));
        }
        let frame = spec.transform.unwrap_or_else(Isometry3::identity);
        let proto = ProtoLayer::new(&surfaces, &frame);

        let (z_min, z_max, r_min, r_max) = match spec.extent {
            DiscExtent::Envelope { r_min, r_max, z } => (
                proto.z_min - z,
                proto.z_max + z,
                (proto.r_min - r_min).max(0.0),
                proto.r_max + r_max,
            ),
            DiscExtent::Explicit {
                z_min,
                z_max,
                r_min,
                r_max,
            } => (z_min, z_max, r_min, r_max),
        };
        if r_min < 0.0 || r_max <= r_min || z_max < z_min {
            return Err(GeometryError::InvalidBounds {
                what: "disc layer".to_string(),
                reason: format!("r=[{r_min}, {r_max}] z=[{z_min}, {z_max}]"),
            });
        }
        let thickness = z_max - z_min;
        let transform = frame * Translation3::new(0.0, 0.0, 0.5 * (z_min + z_max));

        let centres = local_centres(&surfaces, &transform);
        let rs = centres.iter().map(|c| BinningValue::R.value(c));
        let phis = centres.iter().map(|c| BinningValue::Phi.value(c));
        let (r_axis, phi_axis) = match spec.binning {
            LayerBinning::Bins(n_r, n_phi) => (
                BinningData::equidistant(BinningValue::R, BinningOption::Open, n_r, r_min, r_max)?,
                self.phi_equidistant(phis, n_phi)?,
            ),
            LayerBinning::Types(r_type, phi_type) => (
                open_from_modules(BinningValue::R, rs, r_type, self.config.disc_r_tolerance, r_min, r_max)?,
                self.phi_from_modules(phis, phi_type)?,
            ),
        };

        let array = SurfaceArray::new(surfaces, BinUtility::new(vec![r_axis, phi_axis], Some(transform)));
        check_binning(&array)?;
        debug!(
            "disc layer z=[{z_min:.2}, {z_max:.2}] r=[{r_min:.2}, {r_max:.2}] with {} surfaces",
            array.surfaces().len()
        );

        let approach = spec
            .approach
            .clone()
            .unwrap_or_else(|| ApproachDescriptor::disc(transform, r_min, r_max, thickness));
        Ok(Layer::new(Surface::disc(transform, r_min, r_max), thickness, LayerType::Active)
            .with_surface_array(array)
            .with_approach(approach))
    }

    /// A rectangular layer in the local xy plane of `spec.transform`, binned in (x, y).
    pub fn plane_layer(&self, surfaces: Vec<Surface>, spec: &PlaneLayerSpec) -> Result<Layer> {
        if surfaces.is_empty() {
            return Err(GeometryError::EmptySurfaces("plane"));
        }
        let frame = spec.transform.unwrap_or_else(Isometry3::identity);
        let proto = ProtoLayer::new(&surfaces, &frame);

        let half_x = 0.5 * (proto.x_max - proto.x_min) + spec.envelope_xy;
        let half_y = 0.5 * (proto.y_max - proto.y_min) + spec.envelope_xy;
        let thickness = proto.z_max - proto.z_min + 2.0 * spec.envelope_z;
        if half_x <= 0.0 || half_y <= 0.0 {
            return Err(GeometryError::InvalidBounds {
                what: "plane layer".to_string(),
                reason: format!("half_x={half_x} half_y={half_y}"),
            });
        }
        let transform = frame
            * Translation3::new(
                0.5 * (proto.x_min + proto.x_max),
                0.5 * (proto.y_min + proto.y_max),
                0.5 * (proto.z_min + proto.z_max),
            );

        let axes = vec![
            BinningData::equidistant(BinningValue::X, BinningOption::Open, spec.bins_x, -half_x, half_x)?,
            BinningData::equidistant(BinningValue::Y, BinningOption::Open, spec.bins_y, -half_y, half_y)?,
        ];
        let array = SurfaceArray::new(surfaces, BinUtility::new(axes, Some(transform)));
        check_binning(&array)?;

        let approach = spec
            .approach
            .clone()
            .unwrap_or_else(|| ApproachDescriptor::plane(transform, half_x, half_y, thickness));
        Ok(Layer::new(Surface::rectangle(transform, half_x, half_y), thickness, LayerType::Active)
            .with_surface_array(array)
            .with_approach(approach))
    }

    /// `bins` equal phi bins, shifted so the first module sits at a bin centre.
    fn phi_equidistant(&self, phis: impl Iterator<Item = f64>, bins: usize) -> Result<BinningData> {
        if bins == 0 {
            return Err(GeometryError::InvalidBinning {
                value: BinningValue::Phi,
                reason: "zero bins".to_string(),
            });
        }
        let phi_min = phis.fold(PHI_RANGE.1, f64::min);
        let start = phi_min - PI / bins as f64;
        BinningData::equidistant(BinningValue::Phi, BinningOption::Closed, bins, start, start + 2.0 * PI)
    }

    fn phi_from_modules(&self, phis: impl Iterator<Item = f64>, kind: BinningType) -> Result<BinningData> {
        let mut clusters = cluster_centres(phis, self.config.cylinder_phi_tolerance);
        // the last cluster may be the first one seen across -pi
        if clusters.len() > 1 {
            if let (Some(&first), Some(&last)) = (clusters.first(), clusters.last()) {
                if first + 2.0 * PI - last <= self.config.cylinder_phi_tolerance {
                    clusters.pop();
                }
            }
        }
        match kind {
            BinningType::Equidistant => {
                let n = clusters.len();
                self.phi_equidistant(clusters.into_iter(), n)
            }
            BinningType::Arbitrary => {
                let n = clusters.len();
                let lower = if n == 1 {
                    clusters[0] - PI
                } else {
                    0.5 * (clusters[n - 1] - 2.0 * PI + clusters[0])
                };
                let boundaries = std::iter::once(lower)
                    .chain(clusters.iter().tuple_windows().map(|(a, b)| 0.5 * (a + b)))
                    .chain(std::iter::once(lower + 2.0 * PI))
                    .collect();
                BinningData::arbitrary(BinningValue::Phi, BinningOption::Closed, boundaries)
            }
        }
    }
}

/// An open axis over [`min`, `max`] with one bin per module cluster.
fn open_from_modules(
    value: BinningValue,
    values: impl Iterator<Item = f64>,
    kind: BinningType,
    tolerance: f64,
    min: f64,
    max: f64,
) -> Result<BinningData> {
    let clusters = cluster_centres(values, tolerance);
    match kind {
        BinningType::Equidistant => BinningData::equidistant(value, BinningOption::Open, clusters.len(), min, max),
        BinningType::Arbitrary => {
            let boundaries = std::iter::once(min)
                .chain(clusters.iter().tuple_windows().map(|(a, b)| 0.5 * (a + b)))
                .chain(std::iter::once(max))
                .collect();
            BinningData::arbitrary(value, BinningOption::Open, boundaries)
        }
    }
}

fn local_centres(surfaces: &[Surface], frame: &Isometry3<f64>) -> Vec<Point3<f64>> {
    surfaces
        .iter()
        .map(|s| frame.inverse_transform_point(&s.center()))
        .collect()
}

/// Every surface must be the content of at least one bin.
pub fn check_binning(array: &SurfaceArray) -> Result<()> {
    let unreachable = array.unreachable();
    if unreachable.is_empty() {
        Ok(())
    } else {
        Err(GeometryError::UnreachableSurfaces {
            count: unreachable.len(),
            total: array.surfaces().len(),
        })
    }
}

//! A cylindrical reference detector.
//!
//! Beam pipe and a barrel of planar silicon modules, optionally closed by
//! two endcaps of module discs:
//!
//! ```text
//!   | neg endcap |            barrel             | pos endcap |
//!   |            |-------------------------------|            |
//!   |            |           beam pipe           |            |
//! ```
//!
//! Barrel modules are tilted in phi and alternately staggered in r so that
//! neighbours overlap; consecutive modules in z overlap by `overlap_z`.

use log::info;
use nalgebra::{Isometry3, Rotation3, Translation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::builder::ProtoVolume;
use crate::error::{GeometryError, Result};
use crate::geometry::TrackingGeometry;
use crate::layer::Layer;
use crate::layer_creator::{
    CylinderExtent, CylinderLayerSpec, DiscExtent, DiscLayerSpec, LayerBinning, LayerCreator, LayerCreatorConfig,
};
use crate::material::{Material, MaterialProperties, SurfaceMaterial};
use crate::passive_layer_builder::{self, PassiveLayerConfig};
use crate::surface::Surface;
use crate::volume::CylinderVolumeBounds;

#[cfg(test)]
mod tests {

    use super::*;
    use crate::surface::SurfaceBounds;
    use approx::assert_relative_eq;
    use nalgebra::Point3;

    #[test]
    fn module_frames() {
        let t = barrel_module_placement(30.0, PI / 2.0, 5.0, 0.0);
        assert_relative_eq!(t * Point3::origin(), Point3::new(0.0, 30.0, 5.0), epsilon = 1e-12);
        assert_relative_eq!(t * Vector3::z(), Vector3::y(), epsilon = 1e-12);
        assert_relative_eq!(t * Vector3::y(), Vector3::z(), epsilon = 1e-12);

        let d = disc_module_placement(40.0, 0.0, -100.0);
        assert_relative_eq!(d * Vector3::y(), Vector3::x(), epsilon = 1e-12);
        assert_relative_eq!(d * Vector3::z(), Vector3::z(), epsilon = 1e-12);
    }

    #[test]
    fn default_detector_layout() {
        let geometry = build(&DetectorConfig::default(), &LayerCreatorConfig::default()).unwrap();
        let pipe = geometry.volume(&Point3::new(1.0, 0.0, 0.0)).unwrap();
        assert_eq!(pipe.name(), "BeamPipe");
        assert_eq!(pipe.layers().len(), 1);
        match pipe.layers()[0].representation().bounds() {
            SurfaceBounds::Cylinder { radius, .. } => assert_relative_eq!(*radius, 19.0),
            other => panic!("unexpected bounds {other:?}"),
        }

        let barrel = geometry.volume(&Point3::new(100.0, 0.0, 0.0)).unwrap();
        assert_eq!(barrel.name(), "Barrel");
        assert_eq!(barrel.layers().len(), 4);
        let modules: usize = barrel
            .layers()
            .iter()
            .map(|l| l.surface_array().unwrap().surfaces().len())
            .sum();
        assert_eq!(modules, (16 + 32 + 52 + 78) * 14);
        assert!(geometry.volume(&Point3::new(0.0, 0.0, 700.0)).is_none());
    }

    #[test]
    fn endcaps_extend_the_world() {
        let mut config = DetectorConfig::default();
        config.endcap.enabled = true;
        let geometry = build(&config, &LayerCreatorConfig::default()).unwrap();
        let endcap = geometry.volume(&Point3::new(100.0, 0.0, -700.0)).unwrap();
        assert_eq!(endcap.name(), "NegativeEndcap");
        assert_eq!(endcap.layers().len(), 3);
        assert!(endcap.layers()[0].ordering_key() < endcap.layers()[2].ordering_key());
    }

    #[test]
    fn inconsistent_barrel_rejected() {
        let mut config = DetectorConfig::default();
        config.barrel.phi_modules.pop();
        assert!(matches!(
            build(&config, &LayerCreatorConfig::default()),
            Err(GeometryError::ConfigMismatch(_))
        ));
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BeamPipeConfig {
    pub radius: f64,
    pub thickness: f64,
    pub material: Material,
    /// Outer radius of the beam pipe volume.
    pub volume_r_max: f64,
}

impl Default for BeamPipeConfig {
    fn default() -> Self {
        Self {
            radius: 19.0,
            thickness: 0.8,
            material: Material::beryllium(),
            volume_r_max: 25.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BarrelConfig {
    pub layer_radii: Vec<f64>,
    /// Modules per layer in phi.
    pub phi_modules: Vec<usize>,
    /// Modules per layer in z.
    pub z_modules: Vec<usize>,
    pub module_half_x: f64,
    pub module_half_y: f64,
    pub module_thickness: f64,
    pub module_material: Material,
    /// Rotation of the module normal away from radial (rad).
    pub tilt: f64,
    pub overlap_z: f64,
    pub stagger_r: f64,
    pub envelope_r: f64,
    pub envelope_z: f64,
    pub r_max: f64,
    pub half_z: f64,
}

impl Default for BarrelConfig {
    fn default() -> Self {
        Self {
            layer_radii: vec![32.0, 72.0, 116.0, 172.0],
            phi_modules: vec![16, 32, 52, 78],
            z_modules: vec![14; 4],
            module_half_x: 8.4,
            module_half_y: 36.0,
            module_thickness: 0.15,
            module_material: Material::silicon(),
            tilt: 0.145,
            overlap_z: 2.0,
            stagger_r: 2.0,
            envelope_r: 1.0,
            envelope_z: 1.0,
            r_max: 200.0,
            half_z: 500.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct EndcapConfig {
    pub enabled: bool,
    /// Inner z face of the endcap volumes, equal to the barrel half length.
    pub z_min: f64,
    pub z_max: f64,
    pub disc_z: Vec<f64>,
    pub ring_radii: Vec<f64>,
    pub ring_phi_modules: Vec<usize>,
    pub module_half_x: f64,
    pub module_half_y: f64,
    pub module_thickness: f64,
    pub module_material: Material,
    pub stagger_z: f64,
    pub envelope_r: f64,
    pub envelope_z: f64,
}

impl Default for EndcapConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            z_min: 500.0,
            z_max: 900.0,
            disc_z: vec![600.0, 700.0, 800.0],
            ring_radii: vec![50.0, 120.0],
            ring_phi_modules: vec![24, 48],
            module_half_x: 12.0,
            module_half_y: 36.0,
            module_thickness: 0.15,
            module_material: Material::silicon(),
            stagger_z: 2.0,
            envelope_r: 1.0,
            envelope_z: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub beam_pipe: BeamPipeConfig,
    pub barrel: BarrelConfig,
    pub endcap: EndcapConfig,
}

/// Frame of a barrel module centred at (`radius`, `phi`, `z`): local y along
/// the beam axis, local z the radial direction rotated by `tilt` around it.
pub fn barrel_module_placement(radius: f64, phi: f64, z: f64, tilt: f64) -> Isometry3<f64> {
    let radial = Vector3::new(phi.cos(), phi.sin(), 0.0);
    let normal = Rotation3::from_axis_angle(&Vector3::z_axis(), tilt) * radial;
    let along = Vector3::z();
    placement(along.cross(&normal), along, normal, radial * radius + Vector3::new(0.0, 0.0, z))
}

/// Frame of a disc module centred at (`radius`, `phi`, `z`): local y radial,
/// local z along the beam axis.
pub fn disc_module_placement(radius: f64, phi: f64, z: f64) -> Isometry3<f64> {
    let radial = Vector3::new(phi.cos(), phi.sin(), 0.0);
    let normal = Vector3::z();
    placement(radial.cross(&normal), radial, normal, radial * radius + Vector3::new(0.0, 0.0, z))
}

fn placement(x: Vector3<f64>, y: Vector3<f64>, z: Vector3<f64>, center: Vector3<f64>) -> Isometry3<f64> {
    let rotation = Rotation3::from_basis_unchecked(&[x, y, z]);
    Isometry3::from_parts(Translation3::from(center), UnitQuaternion::from_rotation_matrix(&rotation))
}

fn module(transform: Isometry3<f64>, half_x: f64, half_y: f64, thickness: f64, material: Material) -> Surface {
    let material = SurfaceMaterial::homogeneous(MaterialProperties::new(material, thickness), 1.0);
    Surface::rectangle(transform, half_x, half_y)
        .with_material(material)
        .as_sensitive()
}

fn phi_of(index: usize, count: usize) -> f64 {
    -PI + (index as f64 + 0.5) * 2.0 * PI / count as f64
}

fn mismatch(what: &str, len: usize, expected: usize) -> GeometryError {
    GeometryError::ConfigMismatch(format!("{what} has {len} entries, expected {expected}"))
}

fn barrel_layers(config: &BarrelConfig, creator: &LayerCreator) -> Result<Vec<Layer>> {
    let n = config.layer_radii.len();
    if config.phi_modules.len() != n {
        return Err(mismatch("barrel.phi_modules", config.phi_modules.len(), n));
    }
    if config.z_modules.len() != n {
        return Err(mismatch("barrel.z_modules", config.z_modules.len(), n));
    }

    let pitch = 2.0 * config.module_half_y - config.overlap_z;
    config
        .layer_radii
        .iter()
        .zip(config.phi_modules.iter().zip(&config.z_modules))
        .map(|(&radius, (&n_phi, &n_z))| {
            let z_start = -0.5 * (n_z as f64 - 1.0) * pitch;
            let modules = (0..n_phi)
                .flat_map(|i| (0..n_z).map(move |k| (i, k)))
                .map(|(i, k)| {
                    let stagger = if k % 2 == 0 { -0.5 } else { 0.5 } * config.stagger_r;
                    let z = z_start + k as f64 * pitch;
                    let transform = barrel_module_placement(radius + stagger, phi_of(i, n_phi), z, config.tilt);
                    module(
                        transform,
                        config.module_half_x,
                        config.module_half_y,
                        config.module_thickness,
                        config.module_material,
                    )
                })
                .collect();
            let spec = CylinderLayerSpec {
                extent: CylinderExtent::Envelope {
                    r: config.envelope_r,
                    z: config.envelope_z,
                },
                binning: LayerBinning::Bins(n_phi, n_z),
                transform: None,
                approach: None,
            };
            creator.cylinder_layer(modules, &spec)
        })
        .collect()
}

fn endcap_layers(config: &EndcapConfig, creator: &LayerCreator, side: f64) -> Result<Vec<Layer>> {
    let n_rings = config.ring_radii.len();
    if config.ring_phi_modules.len() != n_rings {
        return Err(mismatch("endcap.ring_phi_modules", config.ring_phi_modules.len(), n_rings));
    }
    let phi_bins = config.ring_phi_modules.iter().copied().min().unwrap_or(1);

    config
        .disc_z
        .iter()
        .map(|&disc_z| {
            let modules = config
                .ring_radii
                .iter()
                .zip(&config.ring_phi_modules)
                .enumerate()
                .flat_map(|(ring, (&radius, &n_phi))| {
                    let z = side * disc_z + if ring % 2 == 0 { -0.5 } else { 0.5 } * config.stagger_z;
                    (0..n_phi).map(move |i| disc_module_placement(radius, phi_of(i, n_phi), z))
                })
                .map(|transform| {
                    module(
                        transform,
                        config.module_half_x,
                        config.module_half_y,
                        config.module_thickness,
                        config.module_material,
                    )
                })
                .collect();
            let spec = DiscLayerSpec {
                extent: DiscExtent::Envelope {
                    r_min: config.envelope_r,
                    r_max: config.envelope_r,
                    z: config.envelope_z,
                },
                binning: LayerBinning::Bins(n_rings, phi_bins),
                transform: None,
                approach: None,
            };
            creator.disc_layer(modules, &spec)
        })
        .collect()
}

/// Builds the reference detector.
pub fn build(config: &DetectorConfig, creator_config: &LayerCreatorConfig) -> Result<TrackingGeometry> {
    let creator = LayerCreator::new(*creator_config);
    let bp = &config.beam_pipe;
    let barrel = &config.barrel;

    if bp.radius + 0.5 * bp.thickness >= bp.volume_r_max {
        return Err(GeometryError::InvalidBounds {
            what: "beam pipe".to_string(),
            reason: format!("radius {} does not fit in volume of radius {}", bp.radius, bp.volume_r_max),
        });
    }
    let passive = passive_layer_builder::build(&PassiveLayerConfig {
        central_radii: vec![bp.radius],
        central_half_z: vec![barrel.half_z],
        central_thickness: vec![bp.thickness],
        central_material: vec![bp.material],
        ..PassiveLayerConfig::default()
    })?;

    let beam_pipe = ProtoVolume::leaf(
        "BeamPipe",
        CylinderVolumeBounds::new(0.0, bp.volume_r_max, barrel.half_z),
        0.0,
        passive.central,
    )?;
    let barrel_volume = ProtoVolume::leaf(
        "Barrel",
        CylinderVolumeBounds::new(bp.volume_r_max, barrel.r_max, barrel.half_z),
        0.0,
        barrel_layers(barrel, &creator)?,
    )?;

    let world = if config.endcap.enabled {
        let endcap = &config.endcap;
        let central = ProtoVolume::container_in_r("Central", vec![beam_pipe, barrel_volume])?;
        let half_z = 0.5 * (endcap.z_max - endcap.z_min);
        let z_center = 0.5 * (endcap.z_max + endcap.z_min);
        let bounds = CylinderVolumeBounds::new(0.0, barrel.r_max, half_z);
        let negative = ProtoVolume::leaf("NegativeEndcap", bounds, -z_center, endcap_layers(endcap, &creator, -1.0)?)?;
        let positive = ProtoVolume::leaf("PositiveEndcap", bounds, z_center, endcap_layers(endcap, &creator, 1.0)?)?;
        ProtoVolume::container_in_z("World", vec![negative, central, positive])?
    } else {
        ProtoVolume::container_in_r("World", vec![beam_pipe, barrel_volume])?
    };

    let geometry = TrackingGeometry::build(world);
    info!(
        "built detector with {} volumes and {} layers",
        geometry.len(),
        geometry.volumes().iter().map(|v| v.layers().len()).sum::<usize>()
    );
    Ok(geometry)
}

use log::{debug, trace};
use nalgebra::Isometry3;
use serde::{Deserialize, Serialize};

use crate::error::{GeometryError, Result};
use crate::layer::{Layer, LayerType};
use crate::material::{Material, MaterialProperties, SurfaceMaterial};
use crate::surface::Surface;

#[cfg(test)]
mod tests {

    use super::*;

    fn beam_pipe() -> PassiveLayerConfig {
        PassiveLayerConfig {
            central_radii: vec![19.0],
            central_half_z: vec![500.0],
            central_thickness: vec![0.8],
            central_material: vec![Material::beryllium()],
            ..PassiveLayerConfig::default()
        }
    }

    #[test]
    fn central_layer_with_material() {
        let layers = build(&beam_pipe()).unwrap();
        assert_eq!(layers.central.len(), 1);
        assert!(layers.negative.is_empty() && layers.positive.is_empty());
        let pipe = &layers.central[0];
        assert_eq!(pipe.layer_type(), LayerType::Passive);
        assert!(pipe.approach().is_none());
        let material = pipe.representation().material().unwrap();
        assert_eq!(material.properties().thickness, 0.8);
        assert!(pipe.resolve(false, true, false));
    }

    #[test]
    fn discs_mirrored_in_z() {
        let config = PassiveLayerConfig {
            posneg_z: vec![300.0],
            posneg_r_min: vec![10.0],
            posneg_r_max: vec![100.0],
            posneg_thickness: vec![2.0],
            ..PassiveLayerConfig::default()
        };
        let layers = build(&config).unwrap();
        assert_eq!(layers.negative[0].representation().center().z, -300.0);
        assert_eq!(layers.positive[0].representation().center().z, 300.0);
        // no material configured
        assert!(!layers.positive[0].resolve(true, true, false));
    }

    #[test]
    fn mismatched_vectors_rejected() {
        let mut config = beam_pipe();
        config.central_half_z.push(10.0);
        assert!(matches!(build(&config), Err(GeometryError::ConfigMismatch(_))));

        let mut config = beam_pipe();
        config.central_material.clear();
        assert!(build(&config).is_ok());
    }
}

/// Parameters of passive (material only) layers: cylinders in the barrel
/// and discs mirrored at ±z. Materials are optional; when given there must
/// be one per layer.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct PassiveLayerConfig {
    pub central_radii: Vec<f64>,
    pub central_half_z: Vec<f64>,
    pub central_thickness: Vec<f64>,
    pub central_material: Vec<Material>,
    pub posneg_z: Vec<f64>,
    pub posneg_r_min: Vec<f64>,
    pub posneg_r_max: Vec<f64>,
    pub posneg_thickness: Vec<f64>,
    pub posneg_material: Vec<Material>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PassiveLayers {
    pub central: Vec<Layer>,
    pub negative: Vec<Layer>,
    pub positive: Vec<Layer>,
}

fn check_len(name: &str, len: usize, expected: usize) -> Result<()> {
    if len == expected {
        Ok(())
    } else {
        Err(GeometryError::ConfigMismatch(format!(
            "{name} has {len} entries, expected {expected}"
        )))
    }
}

fn material(materials: &[Material], index: usize, thickness: f64) -> Option<SurfaceMaterial> {
    materials
        .get(index)
        .map(|m| SurfaceMaterial::homogeneous(MaterialProperties::new(*m, thickness), 1.0))
}

/// Builds the configured passive layers.
pub fn build(config: &PassiveLayerConfig) -> Result<PassiveLayers> {
    let n_central = config.central_radii.len();
    check_len("central_half_z", config.central_half_z.len(), n_central)?;
    check_len("central_thickness", config.central_thickness.len(), n_central)?;
    if !config.central_material.is_empty() {
        check_len("central_material", config.central_material.len(), n_central)?;
    }

    let n_discs = config.posneg_z.len();
    check_len("posneg_r_min", config.posneg_r_min.len(), n_discs)?;
    check_len("posneg_r_max", config.posneg_r_max.len(), n_discs)?;
    check_len("posneg_thickness", config.posneg_thickness.len(), n_discs)?;
    if !config.posneg_material.is_empty() {
        check_len("posneg_material", config.posneg_material.len(), n_discs)?;
    }

    let mut layers = PassiveLayers::default();

    if n_central > 0 {
        debug!("building {n_central} passive central layers");
    }
    for i in 0..n_central {
        let (radius, half_z, thickness) = (
            config.central_radii[i],
            config.central_half_z[i],
            config.central_thickness[i],
        );
        trace!("- central layer {i} at r = {radius}, half_z = {half_z}");
        let mut surface = Surface::cylinder(Isometry3::identity(), radius, half_z);
        if let Some(m) = material(&config.central_material, i, thickness) {
            surface = surface.with_material(m);
        }
        layers.central.push(Layer::new(surface, thickness, LayerType::Passive));
    }

    if n_discs > 0 {
        debug!("building 2 * {n_discs} passive disc layers");
    }
    for i in 0..n_discs {
        let (z, r_min, r_max, thickness) = (
            config.posneg_z[i],
            config.posneg_r_min[i],
            config.posneg_r_max[i],
            config.posneg_thickness[i],
        );
        trace!("- disc layers {} and {} at ±z = {z}, r = [{r_min}, {r_max}]", 2 * i, 2 * i + 1);
        for (side, target) in [(-1.0, &mut layers.negative), (1.0, &mut layers.positive)] {
            let mut surface = Surface::disc(Isometry3::translation(0.0, 0.0, side * z), r_min, r_max);
            if let Some(m) = material(&config.posneg_material, i, thickness) {
                surface = surface.with_material(m);
            }
            target.push(Layer::new(surface, thickness, LayerType::Passive));
        }
    }

    Ok(layers)
}

use serde::{Deserialize, Serialize};

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn thickness_in_radiation_lengths() {
        let props = MaterialProperties::new(Material::silicon(), 0.15);
        assert!((props.thickness_in_x0() - 0.15 / 93.7).abs() < 1e-12);

        let empty = MaterialProperties::new(Material::vacuum(), 1.0);
        assert_eq!(empty.thickness_in_x0(), 0.0);
    }

    #[test]
    fn split_factor_partitions_material() {
        let mat = SurfaceMaterial::homogeneous(MaterialProperties::new(Material::beryllium(), 0.8), 0.25);
        let pre = mat.factor(MaterialStage::PreUpdate);
        let post = mat.factor(MaterialStage::PostUpdate);
        assert!((pre + post - 1.0).abs() < 1e-12);
        assert!((mat.factor(MaterialStage::FullUpdate) - 1.0).abs() < 1e-12);
    }
}

/// Bulk material description.
/// Lengths in mm, density in g/mm3.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct Material {
    /// radiation length
    pub x0: f64,
    /// nuclear interaction length
    pub l0: f64,
    pub a: f64,
    pub z: f64,
    pub rho: f64,
}

impl Material {
    pub fn vacuum() -> Self {
        Self {
            x0: f64::INFINITY,
            l0: f64::INFINITY,
            a: 0.0,
            z: 0.0,
            rho: 0.0,
        }
    }

    pub fn beryllium() -> Self {
        Self {
            x0: 352.8,
            l0: 407.0,
            a: 9.012,
            z: 4.0,
            rho: 1.848e-3,
        }
    }

    pub fn silicon() -> Self {
        Self {
            x0: 93.7,
            l0: 465.2,
            a: 28.0855,
            z: 14.0,
            rho: 2.329e-3,
        }
    }
}

/// A material slab of a given thickness.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct MaterialProperties {
    pub material: Material,
    pub thickness: f64,
}

impl MaterialProperties {
    pub fn new(material: Material, thickness: f64) -> Self {
        Self {
            material,
            thickness,
        }
    }

    pub fn thickness_in_x0(&self) -> f64 {
        if self.material.x0.is_finite() && self.material.x0 > 0.0 {
            self.thickness / self.material.x0
        } else {
            0.0
        }
    }

    pub fn thickness_in_l0(&self) -> f64 {
        if self.material.l0.is_finite() && self.material.l0 > 0.0 {
            self.thickness / self.material.l0
        } else {
            0.0
        }
    }
}

/// Whether the material is applied before, after or fully at a surface crossing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterialStage {
    PreUpdate,
    FullUpdate,
    PostUpdate,
}

/// Material attached to a surface.
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceMaterial {
    /// Same properties everywhere on the surface. The split factor is the
    /// share applied before the crossing.
    Homogeneous {
        properties: MaterialProperties,
        split_factor: f64,
    },
}

impl SurfaceMaterial {
    pub fn homogeneous(properties: MaterialProperties, split_factor: f64) -> Self {
        SurfaceMaterial::Homogeneous {
            properties,
            split_factor: split_factor.clamp(0.0, 1.0),
        }
    }

    pub fn properties(&self) -> &MaterialProperties {
        match self {
            SurfaceMaterial::Homogeneous { properties, .. } => properties,
        }
    }

    pub fn factor(&self, stage: MaterialStage) -> f64 {
        match (self, stage) {
            (_, MaterialStage::FullUpdate) => 1.0,
            (SurfaceMaterial::Homogeneous { split_factor, .. }, MaterialStage::PreUpdate) => {
                *split_factor
            }
            (SurfaceMaterial::Homogeneous { split_factor, .. }, MaterialStage::PostUpdate) => {
                1.0 - split_factor
            }
        }
    }
}

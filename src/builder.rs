//! Stacking of cylindrical volumes into a closed [`TrackingGeometry`].
//!
//! Volumes are first described as [`ProtoVolume`]s: leaves holding layers, and
//! containers stacking their children in r or in z. Stacking checks that the
//! children touch and share their other extent. [`TrackingGeometry::build`]
//! then flattens the tree into the volume arena, creates the boundary
//! surfaces of every volume with their neighbour links and stamps a
//! [`GeometryId`] on every navigable surface.

use log::debug;
use nalgebra::{Isometry3, Point3};

use crate::error::{GeometryError, Result};
use crate::geometry::{TrackingGeometry, GEOMETRY_TOLERANCE};
use crate::identifier::{GeometryId, VolumeId};
use crate::layer::Layer;
use crate::surface::{Surface, SurfaceBounds};
use crate::volume::{BoundaryFace, BoundarySurface, CylinderVolumeBounds, TrackingVolume};

#[cfg(test)]
mod tests {

    use super::*;
    use crate::layer::LayerType;
    use nalgebra::Vector3;

    fn bounds(r_min: f64, r_max: f64, half_z: f64) -> CylinderVolumeBounds {
        CylinderVolumeBounds::new(r_min, r_max, half_z)
    }

    fn empty(name: &str, r_min: f64, r_max: f64, half_z: f64, z: f64) -> ProtoVolume {
        ProtoVolume::leaf(name, bounds(r_min, r_max, half_z), z, Vec::new()).unwrap()
    }

    #[test]
    fn rejects_gaps_and_mismatches() {
        let gap = ProtoVolume::container_in_r("c", vec![empty("a", 0.0, 10.0, 50.0, 0.0), empty("b", 11.0, 20.0, 50.0, 0.0)]);
        assert!(matches!(gap, Err(GeometryError::NotContiguous { .. })));

        let length = ProtoVolume::container_in_r("c", vec![empty("a", 0.0, 10.0, 50.0, 0.0), empty("b", 10.0, 20.0, 40.0, 0.0)]);
        assert!(matches!(length, Err(GeometryError::NotContiguous { .. })));

        let radius = ProtoVolume::container_in_z("c", vec![empty("a", 0.0, 10.0, 5.0, -5.0), empty("b", 0.0, 12.0, 5.0, 5.0)]);
        assert!(matches!(radius, Err(GeometryError::NotContiguous { .. })));

        let bad = ProtoVolume::leaf("x", bounds(5.0, 4.0, 1.0), 0.0, Vec::new());
        assert!(matches!(bad, Err(GeometryError::InvalidBounds { .. })));
    }

    #[test]
    fn rejects_layer_outside() {
        let layer = Layer::new(Surface::cylinder(Isometry3::identity(), 30.0, 10.0), 1.0, LayerType::Passive);
        let result = ProtoVolume::leaf("x", bounds(0.0, 20.0, 50.0), 0.0, vec![layer]);
        assert!(matches!(result, Err(GeometryError::LayerOutsideVolume { layer: 0, .. })));
    }

    #[test]
    fn layers_sorted_and_identified() {
        let layer = |r: f64| Layer::new(Surface::cylinder(Isometry3::identity(), r, 10.0), 1.0, LayerType::Passive);
        let leaf = ProtoVolume::leaf("x", bounds(0.0, 20.0, 50.0), 0.0, vec![layer(15.0), layer(5.0)]).unwrap();
        let geometry = TrackingGeometry::build(leaf);
        let layers = geometry.world().layers();
        assert_eq!(layers[0].ordering_key(), 5.0);
        assert_eq!(layers[1].representation().geo_id(), GeometryId::new(1).with_layer(2));
    }

    #[test]
    fn neighbours_glued_across_containers() {
        let barrel = ProtoVolume::container_in_r(
            "barrel",
            vec![empty("pipe", 0.0, 10.0, 50.0, 0.0), empty("pixels", 10.0, 40.0, 50.0, 0.0)],
        )
        .unwrap();
        let world = ProtoVolume::container_in_z(
            "world",
            vec![empty("neg", 0.0, 40.0, 25.0, -75.0), barrel, empty("pos", 0.0, 40.0, 25.0, 75.0)],
        )
        .unwrap();
        assert_eq!(world.bounds().half_z, 100.0);
        let geometry = TrackingGeometry::build(world);

        let pixels = geometry.volume(&Point3::new(20.0, 0.0, 0.0)).unwrap();
        let inner = pixels.boundaries().iter().find(|b| b.face == BoundaryFace::InnerCylinder).unwrap();
        let at = Point3::new(10.0, 0.0, 0.0);
        assert_eq!(geometry.get(inner.attached_volume(&at, &-Vector3::x()).unwrap()).name(), "pipe");
        assert_eq!(inner.attached_volume(&at, &Vector3::x()), Some(pixels.id()));

        let pos = pixels.boundaries().iter().find(|b| b.face == BoundaryFace::PositiveDisc).unwrap();
        let next = pos.attached_volume(&Point3::new(20.0, 0.0, 50.0), &Vector3::z()).unwrap();
        assert_eq!(geometry.get(next).name(), "pos");

        // the endcap links back to the barrel container
        let neg_face = geometry
            .volume(&Point3::new(20.0, 0.0, 75.0))
            .unwrap()
            .boundaries()
            .iter()
            .find(|b| b.face == BoundaryFace::NegativeDisc)
            .unwrap();
        let back = neg_face.attached_volume(&Point3::new(5.0, 0.0, 50.0), &-Vector3::z()).unwrap();
        assert_eq!(geometry.get(back).name(), "barrel");
        let landed = geometry.lowest_volume_from(back, &Point3::new(5.0, 0.0, 49.9));
        assert_eq!(landed.name(), "pipe");

        let outer = geometry.world().boundaries().iter().find(|b| b.face == BoundaryFace::OuterCylinder).unwrap();
        assert_eq!(outer.attached_volume(&Point3::new(40.0, 0.0, 0.0), &Vector3::x()), None);
    }
}

/// How a container arranges its children.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stacking {
    InR,
    InZ,
}

#[derive(Debug, Clone, PartialEq)]
enum ProtoContent {
    Leaf(Vec<Layer>),
    Container(Stacking, Vec<ProtoVolume>),
}

/// A volume not yet placed in a geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct ProtoVolume {
    name: String,
    bounds: CylinderVolumeBounds,
    z_center: f64,
    content: ProtoContent,
}

impl ProtoVolume {
    /// A volume holding `layers`, centred at `z_center` on the beam axis.
    /// Layers are sorted by radius (cylinders) or z (discs and planes).
    pub fn leaf(
        name: &str,
        bounds: CylinderVolumeBounds,
        z_center: f64,
        mut layers: Vec<Layer>,
    ) -> Result<Self> {
        validate_bounds(name, &bounds)?;
        let volume = Self {
            name: name.to_string(),
            bounds,
            z_center,
            content: ProtoContent::Leaf(Vec::new()),
        };
        if let Some(index) = layers.iter().position(|l| !volume.contains_layer(l)) {
            return Err(GeometryError::LayerOutsideVolume {
                volume: name.to_string(),
                layer: index,
            });
        }
        layers.sort_by(|a, b| a.ordering_key().total_cmp(&b.ordering_key()));
        Ok(Self {
            content: ProtoContent::Leaf(layers),
            ..volume
        })
    }

    /// Tubes nested in radius sharing the same z extent.
    pub fn container_in_r(name: &str, mut children: Vec<ProtoVolume>) -> Result<Self> {
        let (first, last) = stack_ends(name, &mut children, |c| c.bounds.r_min)?;
        for (a, b) in children.iter().zip(children.iter().skip(1)) {
            if (a.bounds.r_max - b.bounds.r_min).abs() > GEOMETRY_TOLERANCE {
                return Err(not_contiguous(a, b, "radii do not touch"));
            }
            if (a.bounds.half_z - b.bounds.half_z).abs() > GEOMETRY_TOLERANCE
                || (a.z_center - b.z_center).abs() > GEOMETRY_TOLERANCE
            {
                return Err(not_contiguous(a, b, "different z extent"));
            }
        }
        let bounds = CylinderVolumeBounds::new(first.bounds.r_min, last.bounds.r_max, first.bounds.half_z);
        let z_center = first.z_center;
        Ok(Self {
            name: name.to_string(),
            bounds,
            z_center,
            content: ProtoContent::Container(Stacking::InR, children),
        })
    }

    /// Volumes placed one after the other along z with the same radii.
    pub fn container_in_z(name: &str, mut children: Vec<ProtoVolume>) -> Result<Self> {
        let (first, last) = stack_ends(name, &mut children, |c| c.z_center)?;
        for (a, b) in children.iter().zip(children.iter().skip(1)) {
            if (a.z_max() - b.z_min()).abs() > GEOMETRY_TOLERANCE {
                return Err(not_contiguous(a, b, "z faces do not touch"));
            }
            if (a.bounds.r_min - b.bounds.r_min).abs() > GEOMETRY_TOLERANCE
                || (a.bounds.r_max - b.bounds.r_max).abs() > GEOMETRY_TOLERANCE
            {
                return Err(not_contiguous(a, b, "different radii"));
            }
        }
        let (z_min, z_max) = (first.z_min(), last.z_max());
        let bounds = CylinderVolumeBounds::new(first.bounds.r_min, first.bounds.r_max, 0.5 * (z_max - z_min));
        Ok(Self {
            name: name.to_string(),
            bounds,
            z_center: 0.5 * (z_min + z_max),
            content: ProtoContent::Container(Stacking::InZ, children),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bounds(&self) -> &CylinderVolumeBounds {
        &self.bounds
    }

    pub fn z_center(&self) -> f64 {
        self.z_center
    }

    fn z_min(&self) -> f64 {
        self.z_center - self.bounds.half_z
    }

    fn z_max(&self) -> f64 {
        self.z_center + self.bounds.half_z
    }

    fn contains_layer(&self, layer: &Layer) -> bool {
        let tol = GEOMETRY_TOLERANCE;
        let inside = |p: &Point3<f64>| {
            let r = p.coords.xy().norm();
            r >= self.bounds.r_min - tol
                && r <= self.bounds.r_max + tol
                && (p.z - self.z_center).abs() <= self.bounds.half_z + tol
        };
        let representation = layer.representation();
        if !representation.vertices(16).iter().all(inside) {
            return false;
        }
        match representation.bounds() {
            SurfaceBounds::Cylinder { radius, .. } => {
                let half = 0.5 * layer.thickness();
                radius - half >= self.bounds.r_min - tol && radius + half <= self.bounds.r_max + tol
            }
            SurfaceBounds::Disc { .. } | SurfaceBounds::Rectangle { .. } => {
                let z = representation.center().z;
                let half = 0.5 * layer.thickness();
                z - half >= self.z_min() - tol && z + half <= self.z_max() + tol
            }
        }
    }

    /// Number of volumes this proto volume flattens into.
    fn subtree_size(&self) -> usize {
        match &self.content {
            ProtoContent::Leaf(_) => 1,
            ProtoContent::Container(_, children) => 1 + children.iter().map(Self::subtree_size).sum::<usize>(),
        }
    }
}

fn validate_bounds(name: &str, bounds: &CylinderVolumeBounds) -> Result<()> {
    let reason = if bounds.r_min < 0.0 {
        Some(format!("negative inner radius {}", bounds.r_min))
    } else if bounds.r_max <= bounds.r_min {
        Some(format!("outer radius {} not above inner radius {}", bounds.r_max, bounds.r_min))
    } else if bounds.half_z <= 0.0 {
        Some(format!("half length {} not positive", bounds.half_z))
    } else {
        None
    };
    match reason {
        Some(reason) => Err(GeometryError::InvalidBounds {
            what: format!("volume '{name}'"),
            reason,
        }),
        None => Ok(()),
    }
}

/// Sorts the children by `key` and returns clones of the first and last.
fn stack_ends(
    name: &str,
    children: &mut [ProtoVolume],
    key: impl Fn(&ProtoVolume) -> f64,
) -> Result<(ProtoVolume, ProtoVolume)> {
    children.sort_by(|a, b| key(a).total_cmp(&key(b)));
    match (children.first(), children.last()) {
        (Some(first), Some(last)) => Ok((first.shallow(), last.shallow())),
        _ => Err(GeometryError::InvalidBounds {
            what: format!("container '{name}'"),
            reason: "no children".to_string(),
        }),
    }
}

impl ProtoVolume {
    /// Extent only, without content.
    fn shallow(&self) -> Self {
        Self {
            name: self.name.clone(),
            bounds: self.bounds,
            z_center: self.z_center,
            content: ProtoContent::Leaf(Vec::new()),
        }
    }
}

fn not_contiguous(a: &ProtoVolume, b: &ProtoVolume, reason: &str) -> GeometryError {
    GeometryError::NotContiguous {
        first: a.name.clone(),
        second: b.name.clone(),
        reason: reason.to_string(),
    }
}

/// Volumes beyond each face of a volume.
#[derive(Debug, Clone, Copy, Default)]
struct FaceLinks {
    inner: Option<VolumeId>,
    outer: Option<VolumeId>,
    negative: Option<VolumeId>,
    positive: Option<VolumeId>,
}

impl TrackingGeometry {
    /// Flattens `world` into a closed geometry.
    pub fn build(world: ProtoVolume) -> TrackingGeometry {
        let mut volumes = Vec::with_capacity(world.subtree_size());
        let world_id = place(world, None, FaceLinks::default(), &mut volumes);
        let geometry = TrackingGeometry::from_arena(volumes, world_id);
        debug!("built tracking geometry:\n{geometry}");
        geometry
    }
}

/// Appends `proto` and its subtree to the arena in pre-order and returns its id.
fn place(
    proto: ProtoVolume,
    parent: Option<VolumeId>,
    links: FaceLinks,
    volumes: &mut Vec<TrackingVolume>,
) -> VolumeId {
    let id = VolumeId(volumes.len());
    let transform = Isometry3::translation(0.0, 0.0, proto.z_center);
    let volume_geo_id = GeometryId::from_volume(id);
    let boundaries = boundaries(id, &transform, &proto.bounds, &links);

    let (mut layers, stack) = match proto.content {
        ProtoContent::Leaf(layers) => (layers, None),
        ProtoContent::Container(stacking, children) => (Vec::new(), Some((stacking, children))),
    };
    for (i, layer) in layers.iter_mut().enumerate() {
        layer.assign_geometry_id(volume_geo_id, i as u32 + 1);
    }

    volumes.push(TrackingVolume {
        id,
        name: proto.name,
        transform,
        bounds: proto.bounds,
        layers,
        boundaries,
        children: Vec::new(),
        parent,
    });

    let mut child_ids = Vec::new();
    if let Some((stacking, children)) = stack {
        let mut next = id.0 + 1;
        let ids: Vec<VolumeId> = children
            .iter()
            .map(|c| {
                let child = VolumeId(next);
                next += c.subtree_size();
                child
            })
            .collect();
        let last = children.len() - 1;
        for (i, child) in children.into_iter().enumerate() {
            let before = if i == 0 { None } else { Some(ids[i - 1]) };
            let after = if i == last { None } else { Some(ids[i + 1]) };
            let child_links = match stacking {
                Stacking::InR => FaceLinks {
                    inner: before.or(links.inner),
                    outer: after.or(links.outer),
                    ..links
                },
                Stacking::InZ => FaceLinks {
                    negative: before.or(links.negative),
                    positive: after.or(links.positive),
                    ..links
                },
            };
            child_ids.push(place(child, Some(id), child_links, volumes));
        }
        debug_assert_eq!(child_ids, ids);
    }
    volumes[id.0].children = child_ids;
    id
}

/// Faces of a cylinder volume linked to the volume itself and its neighbours.
fn boundaries(
    id: VolumeId,
    transform: &Isometry3<f64>,
    bounds: &CylinderVolumeBounds,
    links: &FaceLinks,
) -> Vec<BoundarySurface> {
    let z = transform.translation.vector.z;
    let disc_at = |dz: f64| Surface::disc(Isometry3::translation(0.0, 0.0, z + dz), bounds.r_min, bounds.r_max);

    let mut faces = Vec::with_capacity(4);
    if bounds.r_min > 0.0 {
        faces.push((
            Surface::cylinder(*transform, bounds.r_min, bounds.half_z),
            BoundaryFace::InnerCylinder,
            Some(id),
            links.inner,
        ));
    }
    faces.push((
        Surface::cylinder(*transform, bounds.r_max, bounds.half_z),
        BoundaryFace::OuterCylinder,
        links.outer,
        Some(id),
    ));
    faces.push((disc_at(-bounds.half_z), BoundaryFace::NegativeDisc, Some(id), links.negative));
    faces.push((disc_at(bounds.half_z), BoundaryFace::PositiveDisc, links.positive, Some(id)));

    let volume_geo_id = GeometryId::from_volume(id);
    faces
        .into_iter()
        .enumerate()
        .map(|(i, (surface, face, along, opposite))| BoundarySurface {
            surface: surface.with_geo_id(volume_geo_id.with_boundary(i as u32 + 1)),
            face,
            along,
            opposite,
        })
        .collect()
}

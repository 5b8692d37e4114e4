//! The closed, immutable tracking geometry.
//!
//! A [`TrackingGeometry`] owns every [`TrackingVolume`] in one arena. Parent,
//! child and neighbour relations are [`VolumeId`] indices into that arena and
//! surfaces refer back to their layer and volume through their
//! [`GeometryId`], so the whole structure is plain data: it is `Send + Sync`
//! and can be shared by reference between any number of concurrent
//! propagations.
//!
//! # Key Components
//!
//! - [`TrackingGeometry::volume`]: point to deepest enclosing volume
//! - [`TrackingGeometry::find_surface`] / [`TrackingGeometry::layer`]: identifier lookups
//! - construction lives in [`builder`](crate::builder)

use nalgebra::Point3;
use std::fmt;

use crate::identifier::{GeometryId, VolumeId};
use crate::layer::Layer;
use crate::surface::Surface;
use crate::volume::TrackingVolume;

#[cfg(test)]
mod tests {

    use super::*;
    use crate::builder::ProtoVolume;
    use crate::volume::CylinderVolumeBounds;

    fn three_tubes() -> TrackingGeometry {
        let leaf = |name: &str, r_min: f64, r_max: f64| {
            ProtoVolume::leaf(name, CylinderVolumeBounds::new(r_min, r_max, 100.0), 0.0, Vec::new()).unwrap()
        };
        let world = ProtoVolume::container_in_r(
            "world",
            vec![leaf("inner", 0.0, 10.0), leaf("middle", 10.0, 20.0), leaf("outer", 20.0, 30.0)],
        )
        .unwrap();
        TrackingGeometry::build(world)
    }

    #[test]
    fn point_lookup_returns_leaf() {
        let geometry = three_tubes();
        assert_eq!(geometry.volume(&Point3::new(15.0, 0.0, 3.0)).unwrap().name(), "middle");
        assert_eq!(geometry.volume(&Point3::new(0.0, 0.0, 0.0)).unwrap().name(), "inner");
        assert!(geometry.volume(&Point3::new(0.0, 31.0, 0.0)).is_none());
        assert!(geometry.volume(&Point3::new(0.0, 0.0, 101.0)).is_none());
    }

    #[test]
    fn boundary_lookup_by_identifier() {
        let geometry = three_tubes();
        let middle = geometry.volume(&Point3::new(15.0, 0.0, 0.0)).unwrap();
        let boundary = &middle.boundaries()[0];
        let found = geometry.find_surface(&boundary.surface.geo_id()).unwrap();
        assert_eq!(found, &boundary.surface);
        assert_eq!(geometry.volume_of(&boundary.surface.geo_id()).unwrap().name(), "middle");
    }

    #[test]
    fn world_is_root() {
        let geometry = three_tubes();
        assert_eq!(geometry.world().name(), "world");
        assert!(geometry.world().parent().is_none());
        assert_eq!(geometry.world().children().len(), 3);
        assert_eq!(geometry.len(), 4);
    }
}

/// Points closer than this to a volume face count as inside when no volume
/// contains them exactly.
pub const GEOMETRY_TOLERANCE: f64 = 1e-6;

/// The full volume hierarchy of a detector.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackingGeometry {
    volumes: Vec<TrackingVolume>,
    world: VolumeId,
}

impl TrackingGeometry {
    pub(crate) fn from_arena(volumes: Vec<TrackingVolume>, world: VolumeId) -> Self {
        assert!(
            world.0 < volumes.len(),
            "world id is {}, but the geometry only has {} volumes",
            world,
            volumes.len()
        );
        Self { volumes, world }
    }

    pub fn world(&self) -> &TrackingVolume {
        &self.volumes[self.world.0]
    }

    /// Volume by arena index. Panics on an id from another geometry.
    pub fn get(&self, id: VolumeId) -> &TrackingVolume {
        assert!(
            id.0 < self.volumes.len(),
            "volume id is {}, but the geometry only has {} volumes",
            id,
            self.volumes.len()
        );
        &self.volumes[id.0]
    }

    pub fn volumes(&self) -> &[TrackingVolume] {
        &self.volumes
    }

    pub fn len(&self) -> usize {
        self.volumes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.volumes.is_empty()
    }

    /// Deepest volume enclosing `point`, `None` outside the world.
    pub fn volume(&self, point: &Point3<f64>) -> Option<&TrackingVolume> {
        self.world()
            .inside(point, 0.0)
            .then(|| self.lowest_volume_from(self.world, point))
    }

    /// Descends from volume `id` to the deepest child enclosing `point`.
    ///
    /// Children are tried exactly first and then with [`GEOMETRY_TOLERANCE`];
    /// the descent stops at the last volume with no matching child.
    pub fn lowest_volume_from(&self, id: VolumeId, point: &Point3<f64>) -> &TrackingVolume {
        let mut volume = self.get(id);
        while volume.is_container() {
            let child = [0.0, GEOMETRY_TOLERANCE].iter().find_map(|&tol| {
                volume
                    .children()
                    .iter()
                    .map(|&c| self.get(c))
                    .find(|c| c.inside(point, tol))
            });
            match child {
                Some(child) => volume = child,
                None => break,
            }
        }
        volume
    }

    /// The volume owning the surface with identifier `geo_id`.
    pub fn volume_of(&self, geo_id: &GeometryId) -> Option<&TrackingVolume> {
        geo_id.volume_id().and_then(|id| self.volumes.get(id.0))
    }

    /// The layer owning the surface with identifier `geo_id`.
    pub fn layer(&self, geo_id: &GeometryId) -> Option<&Layer> {
        if geo_id.layer == 0 || geo_id.is_boundary() {
            return None;
        }
        self.volume_of(geo_id)?
            .layers()
            .get(geo_id.layer as usize - 1)
    }

    /// Resolves an identifier to its surface.
    pub fn find_surface(&self, geo_id: &GeometryId) -> Option<&Surface> {
        if geo_id.is_boundary() {
            return self
                .volume_of(geo_id)?
                .boundaries()
                .get(geo_id.boundary as usize - 1)
                .map(|b| &b.surface);
        }
        self.layer(geo_id)?.surface(geo_id)
    }

    fn fmt_volume(&self, f: &mut fmt::Formatter<'_>, id: VolumeId, depth: usize) -> fmt::Result {
        let volume = self.get(id);
        writeln!(f, "{:indent$}{}", "", volume, indent = depth * 2)?;
        for &child in volume.children() {
            self.fmt_volume(f, child, depth + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for TrackingGeometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_volume(f, self.world, 0)
    }
}

//! Hierarchical identifiers for volumes and surfaces.
//!
//! Every surface that takes part in navigation is stamped with a
//! [`GeometryId`] when the geometry is closed. The identifier encodes where the
//! surface lives in the hierarchy (volume, boundary, layer, approach, sensitive)
//! so that back-references from a surface to its owning layer and volume are
//! resolved through the [`TrackingGeometry`](crate::geometry::TrackingGeometry)
//! rather than stored as pointers.
//!
//! All indices are 1-based; `0` means "not set" at that level.

use serde::Serialize;
use std::fmt;

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn ordering_follows_hierarchy() {
        let a = GeometryId::new(1).with_layer(2).with_sensitive(5);
        let b = GeometryId::new(1).with_layer(3);
        let c = GeometryId::new(2).with_boundary(1);
        assert!(a < b);
        assert!(b < c);
        assert_eq!(a.volume_id(), Some(VolumeId(0)));
        assert_eq!(GeometryId::default().volume_id(), None);
    }

    #[test]
    fn classification() {
        let boundary = GeometryId::new(3).with_boundary(2);
        assert!(boundary.is_boundary());
        assert!(!boundary.is_sensitive());

        let approach = GeometryId::new(3).with_layer(1).with_approach(2);
        assert!(approach.is_approach());
        assert_eq!(approach.to_string(), "vol=3|bnd=0|lay=1|apr=2|sen=0");
    }
}

/// Index of a volume inside the geometry's volume arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct VolumeId(pub usize);

impl fmt::Display for VolumeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifier of a surface in the tracking geometry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct GeometryId {
    pub volume: u32,
    pub boundary: u32,
    pub layer: u32,
    pub approach: u32,
    pub sensitive: u32,
}

impl GeometryId {
    /// Identifier of volume number `volume` (1-based).
    pub fn new(volume: u32) -> Self {
        Self {
            volume,
            ..Self::default()
        }
    }

    /// Identifier of the volume stored at arena index `id`.
    pub fn from_volume(id: VolumeId) -> Self {
        Self::new(id.0 as u32 + 1)
    }

    pub fn with_boundary(self, boundary: u32) -> Self {
        Self { boundary, ..self }
    }

    pub fn with_layer(self, layer: u32) -> Self {
        Self { layer, ..self }
    }

    pub fn with_approach(self, approach: u32) -> Self {
        Self { approach, ..self }
    }

    pub fn with_sensitive(self, sensitive: u32) -> Self {
        Self { sensitive, ..self }
    }

    /// Arena index of the owning volume, if the volume level is set.
    pub fn volume_id(&self) -> Option<VolumeId> {
        (self.volume > 0).then(|| VolumeId(self.volume as usize - 1))
    }

    pub fn is_boundary(&self) -> bool {
        self.boundary > 0
    }

    pub fn is_approach(&self) -> bool {
        self.approach > 0
    }

    pub fn is_sensitive(&self) -> bool {
        self.sensitive > 0
    }

    /// A layer's representing surface: layer set, nothing below it.
    pub fn is_layer(&self) -> bool {
        self.layer > 0 && self.approach == 0 && self.sensitive == 0
    }
}

impl fmt::Display for GeometryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "vol={}|bnd={}|lay={}|apr={}|sen={}",
            self.volume, self.boundary, self.layer, self.approach, self.sensitive
        )
    }
}

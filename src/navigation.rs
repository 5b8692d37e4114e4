//! Per-trajectory navigation cache.
//!
//! A [`NavigationState`] is created for one trajectory and mutated in place by
//! every [`Navigator::status`](crate::navigator::Navigator::status) and
//! [`Navigator::target`](crate::navigator::Navigator::target) call. It only
//! borrows the geometry, so any number of states can navigate the same
//! [`TrackingGeometry`](crate::geometry::TrackingGeometry) concurrently.

use serde::Serialize;
use std::fmt;

use crate::intersection::Candidates;
use crate::layer::Layer;
use crate::surface::Surface;
use crate::volume::{BoundarySurface, TrackingVolume};

#[cfg(test)]
mod tests {

    use super::*;
    use crate::intersection::{Candidate, Intersection};
    use nalgebra::{Isometry3, Point3};

    #[test]
    fn active_sequence_prefers_surfaces() {
        let surface = Surface::rectangle(Isometry3::identity(), 1.0, 1.0);
        let layer = Layer::new(surface.clone(), 1.0, crate::layer::LayerType::Passive);
        let hit = Intersection::new(Point3::origin(), 1.0, true);

        let mut state = NavigationState::default();
        assert_eq!(state.active(), ActiveSequence::None);

        state.nav_layers.replace(vec![Candidate::new(&layer, &surface, hit)]);
        assert_eq!(state.active(), ActiveSequence::Layers);

        state.nav_surfaces.replace(vec![Candidate::new(&surface, &surface, hit)]);
        assert_eq!(state.active(), ActiveSequence::Surfaces);

        state.nav_surfaces.advance();
        assert_eq!(state.active(), ActiveSequence::Layers);

        state.reset_volume();
        assert_eq!(state.active(), ActiveSequence::None);
        assert!(!state.layers_resolved);
    }

    #[test]
    fn terminal_stages() {
        assert!(NavigationStage::TargetReached.is_terminal());
        assert!(NavigationStage::GeometryExhausted.is_terminal());
        assert!(!NavigationStage::BoundaryReached.is_terminal());
        assert_eq!(NavigationStage::LayerReached.to_string(), "layer reached");
    }
}

/// Where the navigation of a trajectory stands.
///
/// `SurfaceReached`, `LayerReached` and `BoundaryReached` name the last event
/// confirmed by `status()`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NavigationStage {
    #[default]
    Uninitialized,
    Initialized,
    SurfaceReached,
    LayerReached,
    BoundaryReached,
    TargetReached,
    GeometryExhausted,
}

impl NavigationStage {
    pub fn is_terminal(self) -> bool {
        matches!(self, NavigationStage::TargetReached | NavigationStage::GeometryExhausted)
    }
}

impl fmt::Display for NavigationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NavigationStage::Uninitialized => "uninitialized",
            NavigationStage::Initialized => "initialized",
            NavigationStage::SurfaceReached => "surface reached",
            NavigationStage::LayerReached => "layer reached",
            NavigationStage::BoundaryReached => "boundary reached",
            NavigationStage::TargetReached => "target reached",
            NavigationStage::GeometryExhausted => "geometry exhausted",
        };
        f.write_str(name)
    }
}

/// The candidate sequence the navigator is working through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveSequence {
    Surfaces,
    Layers,
    Boundaries,
    None,
}

/// Mutable navigation cache of a single trajectory.
#[derive(Debug, Default)]
pub struct NavigationState<'g> {
    pub start_volume: Option<&'g TrackingVolume>,
    pub start_layer: Option<&'g Layer>,
    pub start_surface: Option<&'g Surface>,
    pub current_volume: Option<&'g TrackingVolume>,
    pub current_surface: Option<&'g Surface>,
    pub target_volume: Option<&'g TrackingVolume>,
    /// Optional destination; navigation ends once it is reached.
    pub target_surface: Option<&'g Surface>,
    pub target_reached: bool,

    /// Surfaces of the layer being traversed.
    pub nav_surfaces: Candidates<'g, Surface>,
    /// Layers of the current volume.
    pub nav_layers: Candidates<'g, Layer>,
    /// Boundaries of the current volume.
    pub nav_boundaries: Candidates<'g, BoundarySurface>,

    pub layers_resolved: bool,
    pub boundaries_resolved: bool,
    pub start_layer_resolved: bool,
    pub stage: NavigationStage,
}

impl<'g> NavigationState<'g> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Navigation ending at `target`.
    pub fn with_target(target: &'g Surface) -> Self {
        Self {
            target_surface: Some(target),
            ..Self::default()
        }
    }

    /// Navigation starting on `start`, e.g. a measurement surface.
    pub fn with_start(mut self, start: &'g Surface) -> Self {
        self.start_surface = Some(start);
        self
    }

    /// The first sequence with a pending candidate, in the order surfaces,
    /// layers, boundaries.
    pub fn active(&self) -> ActiveSequence {
        if self.nav_surfaces.is_pending() {
            ActiveSequence::Surfaces
        } else if self.nav_layers.is_pending() {
            ActiveSequence::Layers
        } else if self.nav_boundaries.is_pending() {
            ActiveSequence::Boundaries
        } else {
            ActiveSequence::None
        }
    }

    /// Discards everything resolved for the current volume.
    pub fn reset_volume(&mut self) {
        self.nav_surfaces.clear();
        self.nav_layers.clear();
        self.nav_boundaries.clear();
        self.layers_resolved = false;
        self.boundaries_resolved = false;
    }
}

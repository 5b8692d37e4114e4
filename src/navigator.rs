//! The navigation state machine.
//!
//! **Context**: A stepper integrating a trajectory through the detector needs
//! to know, after every step, which surfaces lie ahead and how far away the
//! next one is, so it never steps across a surface it must stop on. The
//! detector is a hierarchy (world, container volumes, leaf volumes, layers,
//! surfaces) and only the part of it around the trajectory should be looked at.
//!
//! **How it Works**: The [`Navigator`] keeps no state of its own. All of it
//! lives in the [`NavigationState`] of the trajectory, which holds three
//! sorted candidate sequences: surfaces of the layer being crossed, layers of
//! the current volume and boundaries of the current volume. Two calls alternate
//! with every step:
//!
//! - [`Navigator::status`] checks whether the position now lies on the
//!   candidate that was targeted and, if so, consumes it. Reaching a boundary
//!   moves the state into the volume behind it.
//! - [`Navigator::target`] picks the next candidate (surfaces before layers
//!   before boundaries, each resolved lazily) and writes its distance into the
//!   stepper's step size.
//!
//! A trajectory that leaves the world, or starts outside it and never
//! enters, ends in [`NavigationStage::GeometryExhausted`].

use log::{debug, trace};
use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};
use std::ptr;

use crate::geometry::TrackingGeometry;
use crate::identifier::VolumeId;
use crate::intersection::{Candidates, IntersectOptions, Identified};
use crate::layer::ResolveFilter;
use crate::navigation::{ActiveSequence, NavigationStage, NavigationState};
use crate::propagator::{ConstraintType, PropagatorState};
use crate::volume::TrackingVolume;


/// Switches and tolerance of the navigator.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct NavigatorConfig {
    /// Stop on sensitive surfaces.
    #[serde(default = "default_true")]
    pub resolve_sensitive: bool,
    /// Stop on surfaces carrying material.
    #[serde(default = "default_true")]
    pub resolve_material: bool,
    /// Stop on surfaces that are neither.
    #[serde(default)]
    pub resolve_passive: bool,
    /// Distance (mm) within which a surface counts as reached.
    #[serde(default = "default_tolerance")]
    pub on_surface_tolerance: f64,
}

fn default_true() -> bool {
    true
}

fn default_tolerance() -> f64 {
    1e-4
}

impl Default for NavigatorConfig {
    fn default() -> Self {
        Self {
            resolve_sensitive: true,
            resolve_material: true,
            resolve_passive: false,
            on_surface_tolerance: default_tolerance(),
        }
    }
}

impl NavigatorConfig {
    pub fn filter(&self) -> ResolveFilter {
        ResolveFilter::new(self.resolve_sensitive, self.resolve_material, self.resolve_passive)
    }
}

/// Navigates trajectories through one geometry.
#[derive(Debug, Clone)]
pub struct Navigator<'g> {
    geometry: &'g TrackingGeometry,
    config: NavigatorConfig,
}

/// Distance of the next target along the direction of motion.
struct Targeted {
    path: f64,
    what: &'static str,
}

impl<'g> Navigator<'g> {
    pub fn new(geometry: &'g TrackingGeometry, config: NavigatorConfig) -> Self {
        Self { geometry, config }
    }

    pub fn geometry(&self) -> &'g TrackingGeometry {
        self.geometry
    }

    pub fn config(&self) -> &NavigatorConfig {
        &self.config
    }

    fn options(&self) -> IntersectOptions {
        IntersectOptions::new(self.config.on_surface_tolerance)
    }

    /// Confirms what the last step reached. Never moves the stepper.
    pub fn status(&self, state: &mut PropagatorState<'g>) {
        let pos = state.stepping.pos;
        let dir = state.stepping.direction();
        let nav = &mut state.navigation;
        let tol = self.config.on_surface_tolerance;

        if nav.stage == NavigationStage::Uninitialized {
            self.initialize(&pos, &dir, nav);
            return;
        }
        if nav.stage.is_terminal() {
            trace!("status: navigation already ended ({})", nav.stage);
            return;
        }
        if let Some(current) = nav.current_surface {
            if current.is_on_surface(&pos, tol, true) {
                trace!("status: still on {}", current.geo_id());
                return;
            }
        }
        nav.current_surface = None;

        if let Some(target) = nav.target_surface {
            if target.is_on_surface(&pos, tol, true) {
                debug!("status: target surface {} reached", target.geo_id());
                nav.current_surface = Some(target);
                nav.target_reached = true;
                nav.stage = NavigationStage::TargetReached;
                return;
            }
        }

        match nav.active() {
            ActiveSequence::Surfaces => {
                if let Some(c) = nav.nav_surfaces.current().copied() {
                    if c.surface.is_on_surface(&pos, tol, true) {
                        debug!("status: surface {} reached", c.surface.geo_id());
                        nav.current_surface = Some(c.surface);
                        nav.nav_surfaces.advance();
                        nav.stage = NavigationStage::SurfaceReached;
                    }
                }
            }
            ActiveSequence::Layers => {
                if let Some(c) = nav.nav_layers.current().copied() {
                    if c.surface.is_on_surface(&pos, tol, true) {
                        debug!("status: layer {} reached at {}", c.object.geo_id(), c.surface.geo_id());
                        nav.current_surface = Some(c.surface);
                        nav.stage = NavigationStage::LayerReached;
                    }
                }
            }
            ActiveSequence::Boundaries => {
                if let Some(c) = nav.nav_boundaries.current().copied() {
                    if c.surface.is_on_surface(&pos, tol, true) {
                        nav.nav_boundaries.advance();
                        self.cross_boundary(&pos, &dir, c.object.attached_volume(&pos, &dir), nav);
                        nav.current_surface = Some(c.surface);
                    }
                }
            }
            ActiveSequence::None => trace!("status: nothing targeted"),
        }
    }

    fn initialize(&self, pos: &Point3<f64>, dir: &Vector3<f64>, nav: &mut NavigationState<'g>) {
        let tol = self.config.on_surface_tolerance;
        let from_surface = nav.start_surface.and_then(|s| {
            let geo_id = s.geo_id();
            Some((self.geometry.volume_of(&geo_id)?, self.geometry.layer(&geo_id)?))
        });
        let (volume, layer) = match from_surface {
            Some((volume, layer)) => (Some(volume), Some(layer)),
            None => {
                let volume = self.start_volume(pos, dir);
                (volume, volume.and_then(|v| v.associated_layer(pos, tol)))
            }
        };

        nav.start_volume = volume;
        nav.start_layer = layer;
        nav.current_volume = volume;
        nav.current_surface = nav.start_surface;
        nav.target_volume = nav
            .target_surface
            .and_then(|s| self.geometry.volume_of(&s.geo_id()));
        nav.reset_volume();
        nav.start_layer_resolved = layer.is_none();
        nav.stage = NavigationStage::Initialized;

        match volume {
            Some(v) => debug!(
                "status: initialized in {} '{}'{}",
                v.id(),
                v.name(),
                layer.map_or(String::new(), |l| format!(" on layer {}", l.geo_id()))
            ),
            None => debug!("status: initialized outside the geometry at {pos:?}"),
        }
    }

    /// The volume enclosing `pos`. On a boundary, or just outside the world,
    /// the volume a short step along `dir` decides.
    fn start_volume(&self, pos: &Point3<f64>, dir: &Vector3<f64>) -> Option<&'g TrackingVolume> {
        let tol = self.config.on_surface_tolerance;
        let volume = self.geometry.volume(pos);
        let on_boundary = volume.map_or(true, |v| {
            v.boundaries()
                .iter()
                .any(|b| b.surface.is_on_surface(pos, tol, true))
        });
        if !on_boundary {
            return volume;
        }
        let ahead = pos + dir * (10.0 * tol);
        match self.geometry.volume(&ahead) {
            Some(next) => {
                if volume.is_some_and(|v| !ptr::eq(v, next)) {
                    trace!("status: start on a boundary, continuing in '{}'", next.name());
                }
                Some(next)
            }
            None => volume,
        }
    }

    fn cross_boundary(
        &self,
        pos: &Point3<f64>,
        dir: &Vector3<f64>,
        attached: Option<VolumeId>,
        nav: &mut NavigationState<'g>,
    ) {
        nav.reset_volume();
        match attached {
            Some(id) => {
                let inside = pos + dir * (10.0 * self.config.on_surface_tolerance);
                let volume = self.geometry.lowest_volume_from(id, &inside);
                debug!("status: boundary reached, entering {} '{}'", volume.id(), volume.name());
                nav.current_volume = Some(volume);
                nav.stage = NavigationStage::BoundaryReached;
            }
            None => {
                debug!("status: boundary reached, leaving the geometry");
                nav.current_volume = None;
                nav.stage = NavigationStage::GeometryExhausted;
            }
        }
    }

    /// Resolves the next candidate and constrains the step size to reach it.
    ///
    /// Panics when called before [`status`](Self::status).
    pub fn target(&self, state: &mut PropagatorState<'g>) {
        let pos = state.stepping.pos;
        let dir = state.stepping.direction();
        let sign = state.stepping.nav_dir.sign();
        let nav = &mut state.navigation;

        match nav.stage {
            NavigationStage::Uninitialized => {
                panic!("navigator target() called before status(): the navigation state is uninitialized")
            }
            stage if stage.is_terminal() => {
                trace!("target: navigation already ended ({stage})");
                return;
            }
            _ => {}
        }
        assert!(
            nav.current_volume.is_some() || nav.stage == NavigationStage::Initialized,
            "navigation state has no current volume in stage '{}'",
            nav.stage
        );

        self.resolve_surfaces(&pos, &dir, nav);

        let mut structural = self.target_surfaces(&pos, &dir, nav);
        if structural.is_none() {
            structural = self.target_layers(&pos, &dir, nav);
        }
        if structural.is_none() {
            structural = self.target_boundaries(&pos, &dir, nav);
        }

        let destination = nav
            .target_surface
            .map(|t| t.intersect(&pos, &dir, &self.options()))
            .filter(|i| i.valid)
            .map(|i| Targeted {
                path: i.path_length,
                what: "target surface",
            });

        let next = match (structural, destination) {
            (Some(s), Some(d)) if d.path < s.path => Some(d),
            (None, Some(d)) => Some(d),
            (s, _) => s,
        };

        match next {
            Some(next) => {
                debug!("target: {} at {:.6}", next.what, next.path);
                state
                    .stepping
                    .step_size
                    .update(sign * next.path, ConstraintType::Actor, true);
            }
            None => {
                debug!("target: no candidates left, geometry exhausted");
                nav.stage = NavigationStage::GeometryExhausted;
            }
        }
    }

    /// Fills `nav_surfaces` from the start layer, or from a layer whose
    /// approach surface `status()` has just confirmed.
    fn resolve_surfaces(&self, pos: &Point3<f64>, dir: &Vector3<f64>, nav: &mut NavigationState<'g>) {
        let filter = self.config.filter();
        if !nav.start_layer_resolved {
            nav.start_layer_resolved = true;
            if let Some(layer) = nav.start_layer {
                nav.nav_surfaces
                    .replace(layer.compatible_surfaces(pos, dir, &self.options(), filter));
                trace!(
                    "target: {} surfaces on start layer {}",
                    nav.nav_surfaces.len(),
                    layer.geo_id()
                );
            }
        }

        let Some(reached) = nav.current_surface else {
            return;
        };
        if let Some(c) = nav.nav_layers.current().copied() {
            if ptr::eq(reached, c.surface) {
                nav.nav_surfaces
                    .replace(c.object.compatible_surfaces(pos, dir, &self.options(), filter));
                nav.nav_layers.advance();
                trace!("target: {} surfaces on layer {}", nav.nav_surfaces.len(), c.object.geo_id());
            }
        }
    }

    fn target_surfaces(&self, pos: &Point3<f64>, dir: &Vector3<f64>, nav: &mut NavigationState<'g>) -> Option<Targeted> {
        next_valid(&mut nav.nav_surfaces, pos, dir, &self.options()).map(|path| Targeted {
            path,
            what: "surface",
        })
    }

    fn target_layers(&self, pos: &Point3<f64>, dir: &Vector3<f64>, nav: &mut NavigationState<'g>) -> Option<Targeted> {
        let volume = nav.current_volume?;
        if !nav.layers_resolved {
            nav.layers_resolved = true;
            let skip = match nav.start_volume {
                Some(start) if ptr::eq(start, volume) => nav.start_layer,
                _ => None,
            };
            let layers = volume.compatible_layers(pos, dir, &self.options(), self.config.filter(), skip);
            nav.nav_layers.replace(layers);
            trace!("target: {} layers in {} '{}'", nav.nav_layers.len(), volume.id(), volume.name());
        }
        next_valid(&mut nav.nav_layers, pos, dir, &self.options()).map(|path| Targeted { path, what: "layer" })
    }

    fn target_boundaries(&self, pos: &Point3<f64>, dir: &Vector3<f64>, nav: &mut NavigationState<'g>) -> Option<Targeted> {
        // outside every volume: try to enter through the world's boundaries
        let volume = nav.current_volume.unwrap_or_else(|| self.geometry.world());
        let options = self.options();

        for attempt in 0..2 {
            if !nav.boundaries_resolved || attempt > 0 {
                nav.boundaries_resolved = true;
                nav.nav_boundaries
                    .replace(volume.compatible_boundaries(pos, dir, &options));
                trace!(
                    "target: {} boundaries of {} '{}'",
                    nav.nav_boundaries.len(),
                    volume.id(),
                    volume.name()
                );
            }
            if let Some(path) = next_valid(&mut nav.nav_boundaries, pos, dir, &options) {
                return Some(Targeted { path, what: "boundary" });
            }
        }
        None
    }
}

/// Re-intersects the pending candidates, skipping those no longer reachable,
/// and returns the path length to the first valid one.
fn next_valid<T>(
    candidates: &mut Candidates<'_, T>,
    pos: &Point3<f64>,
    dir: &Vector3<f64>,
    options: &IntersectOptions,
) -> Option<f64> {
    while let Some(c) = candidates.current_mut() {
        let intersection = c.surface.intersect(pos, dir, options);
        if intersection.valid {
            c.intersection = intersection;
            return Some(intersection.path_length);
        }
        trace!("target: skipping unreachable {}", c.surface.geo_id());
        candidates.advance();
    }
    None
}
